//! Deployment API
//!
//! Wire models shared by the deployer client and the deployment receiver.

pub mod models;
