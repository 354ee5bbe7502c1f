//! Process-wide handles shared with every runner.

use std::sync::Arc;

use tokio_util::task::TaskTracker;

use crate::config::GatewayConfig;
use crate::leader::ElectedGate;

/// Immutable configuration snapshot plus the handles the supervisor creates
/// once and threads through every runner constructor.
#[derive(Debug, Clone)]
pub struct Server {
    /// Validated configuration, read-only after startup
    pub gateway: Arc<GatewayConfig>,
    /// Set once this replica is elected leader
    pub elected: ElectedGate,
    /// Tracks every background task spawned by runners
    pub tasks: TaskTracker,
}

impl Server {
    pub fn new(gateway: GatewayConfig) -> Self {
        Self::with_shared(Arc::new(gateway))
    }

    pub fn with_shared(gateway: Arc<GatewayConfig>) -> Self {
        Self { gateway, elected: ElectedGate::new(), tasks: TaskTracker::new() }
    }
}
