//! # Leader Election Gate
//!
//! Redundant replicas all read, translate and publish, but only the elected
//! leader performs externally visible writes (status write-back,
//! infrastructure changes). Those writes wait on the [`ElectedGate`].

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::errors::Result;
use crate::observability::metrics::record_leadership;

/// One-shot broadcast signal: unset until this replica holds the lease, then
/// set for the rest of the process lifetime.
#[derive(Debug, Clone)]
pub struct ElectedGate {
    tx: Arc<watch::Sender<bool>>,
}

impl ElectedGate {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Set the gate. Returns `true` only for the call that performed the
    /// transition.
    pub fn set(&self) -> bool {
        let transitioned = self.tx.send_if_modified(|elected| {
            if *elected {
                return false;
            }
            *elected = true;
            true
        });
        if transitioned {
            record_leadership(true);
            info!("Elected as leader, releasing leader-gated work");
        }
        transitioned
    }

    pub fn is_set(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until the gate is set. Never returns if leadership is never
    /// acquired.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this cannot observe a closed channel.
        let _ = rx.wait_for(|elected| *elected).await;
    }

    /// Wait until the gate is set or `ctx` is cancelled. Returns `true` if the
    /// gate is set.
    pub async fn wait_or_cancelled(&self, ctx: &CancellationToken) -> bool {
        if self.is_set() {
            return true;
        }
        tokio::select! {
            biased;
            _ = ctx.cancelled() => self.is_set(),
            _ = self.wait() => true,
        }
    }
}

impl Default for ElectedGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Arbitrates leadership among replicas. `acquire` resolves once this
/// process holds the lease.
#[async_trait]
pub trait LeaderElector: Send + Sync {
    async fn acquire(&self, ctx: CancellationToken) -> Result<()>;
}

/// Elector for single-replica deployments: leadership is immediate.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandaloneElector;

#[async_trait]
impl LeaderElector for StandaloneElector {
    async fn acquire(&self, _ctx: CancellationToken) -> Result<()> {
        Ok(())
    }
}

/// Run `elector` in the background and set `gate` once it acquires the lease.
pub fn spawn_election(
    elector: Arc<dyn LeaderElector>,
    gate: ElectedGate,
    ctx: CancellationToken,
    tasks: &tokio_util::task::TaskTracker,
) {
    tasks.spawn(async move {
        tokio::select! {
            _ = ctx.cancelled() => {}
            result = elector.acquire(ctx.clone()) => match result {
                Ok(()) => {
                    gate.set();
                }
                Err(e) => {
                    error!(error = %e, "Leader election failed, leader-gated work stays blocked");
                }
            },
        }
    });
}
