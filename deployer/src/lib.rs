//! Deployer Library
//!
//! Incremental deployment of a project tree to a remote target: change
//! detection, packaging and the receiver that applies packages.

pub mod app;
pub mod errors;
pub mod filesys;
pub mod http;
pub mod logs;
pub mod package;
pub mod receiver;
pub mod runner;
pub mod server;
pub mod storage;
pub mod sync;
pub mod transport;
pub mod utils;

/// Macro for creating trace information
#[macro_export]
macro_rules! trace {
    () => {
        format!("{}:{}", file!(), line!())
    };
}
