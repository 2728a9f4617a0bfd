pub mod changeset;
pub mod filter;
pub mod snapshot;
pub mod vcs;
