//! Configuration loader with hot reload.
//!
//! The loader owns the current configuration generation. Each generation runs
//! the supplied hook with a fresh [`Server`] handle under a child cancellation
//! token. When reload is enabled and the file changes, the new configuration
//! is validated, the running generation is cancelled and drained, and a new
//! generation starts.

use std::future::Future;
use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{load_config, FileWatcher, GatewayConfig, Server};
use crate::errors::{GatewayError, Result};

pub struct Loader {
    path: Option<PathBuf>,
    config: GatewayConfig,
}

impl Loader {
    /// Load and validate the initial configuration.
    pub fn new(path: Option<PathBuf>) -> Result<Self> {
        let config = load_config(path.as_deref())?;
        Ok(Self { path, config })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Run `hook` for every configuration generation until `ctx` is
    /// cancelled or a generation returns on its own.
    pub async fn run<F, Fut>(mut self, ctx: CancellationToken, hook: F) -> Result<()>
    where
        F: Fn(Server, CancellationToken) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let mut watcher = match (&self.path, self.config.reload.enabled) {
            (Some(path), true) => Some(FileWatcher::new(path, self.config.reload.poll_interval())?),
            _ => None,
        };

        let mut generation = 1u64;
        loop {
            let generation_ctx = ctx.child_token();
            let server = Server::new(self.config.clone());
            info!(generation, "Starting configuration generation");

            let running = hook(server, generation_ctx.clone());
            tokio::pin!(running);

            let next = tokio::select! {
                result = &mut running => return result,
                next = wait_for_change(watcher.as_mut(), &ctx, &self.config) => next,
            };

            let Some(config) = next else {
                return running.await;
            };

            info!(generation, "Configuration changed, restarting pipeline");
            generation_ctx.cancel();
            if let Err(e) = running.await {
                warn!(generation, error = %e, "Previous configuration generation stopped with error");
            }
            self.config = config;
            if !self.config.reload.enabled {
                info!("Reload disabled by the new configuration");
                watcher = None;
            }
            generation += 1;
        }
    }
}

/// Wait for a valid configuration that differs from `current`. Returns
/// `None` when `ctx` is cancelled. Never returns otherwise without a watcher.
async fn wait_for_change(
    watcher: Option<&mut FileWatcher>,
    ctx: &CancellationToken,
    current: &GatewayConfig,
) -> Option<GatewayConfig> {
    let Some(watcher) = watcher else {
        ctx.cancelled().await;
        return None;
    };

    while watcher.changed(ctx).await {
        match reload(watcher.path()).await {
            Ok(config) if same_config(&config, current) => {
                debug!(path = %watcher.path().display(), "Configuration file touched without changes");
            }
            Ok(config) => return Some(config),
            Err(e) => {
                error!(path = %watcher.path().display(), error = %e, "Ignoring invalid configuration change");
            }
        }
    }
    None
}

async fn reload(path: &Path) -> Result<GatewayConfig> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || load_config(Some(&path)))
        .await
        .map_err(|e| GatewayError::internal(format!("Configuration reload task failed: {e}")))?
}

fn same_config(a: &GatewayConfig, b: &GatewayConfig) -> bool {
    matches!(
        (serde_json::to_value(a), serde_json::to_value(b)),
        (Ok(a), Ok(b)) if a == b
    )
}
