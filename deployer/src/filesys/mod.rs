pub mod dir;
pub mod file;
pub mod walk;
