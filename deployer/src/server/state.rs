//! Server state

use std::sync::Arc;

use crate::receiver::pipeline::DeploymentReceiver;
use crate::storage::settings::Settings;

/// Server state shared across handlers
pub struct ServerState {
    pub settings: Arc<Settings>,
    pub receiver: Arc<DeploymentReceiver>,
}

impl ServerState {
    pub fn new(settings: Arc<Settings>, receiver: Arc<DeploymentReceiver>) -> Self {
        Self { settings, receiver }
    }
}
