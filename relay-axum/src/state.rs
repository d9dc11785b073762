use std::sync::Arc;

use relay_device::RelayOrchestrator;

#[derive(Clone)]
pub struct RelayAxumState {
    pub relay: Arc<RelayOrchestrator>,
}

impl RelayAxumState {
    pub fn new(relay: RelayOrchestrator) -> Self {
        Self {
            relay: Arc::new(relay),
        }
    }
}
