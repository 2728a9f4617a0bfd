pub mod auth;
pub mod delete;
pub mod extract;
pub mod pipeline;
pub mod store;
