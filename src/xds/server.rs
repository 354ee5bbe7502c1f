//! xDS server runner
//!
//! Serves translated resources to proxies. The runner keeps the
//! [`SnapshotCache`] in step with the xds store; connected proxy streams
//! follow the cache's broadcast updates.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::Server;
use crate::errors::{GatewayError, Result};
use crate::message::{handle_subscription, Xds};
use crate::xds::cache::SnapshotCache;

pub const NAME: &str = "xds-server";

pub struct Config {
    pub server: Server,
    pub xds: Xds,
    pub cache: Arc<SnapshotCache>,
}

pub struct Runner {
    config: Config,
}

impl Runner {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn cache(&self) -> Arc<SnapshotCache> {
        self.config.cache.clone()
    }
}

#[async_trait]
impl crate::runner::Runner for Runner {
    fn name(&self) -> &str {
        NAME
    }

    async fn start(&self, ctx: CancellationToken) -> Result<()> {
        let xds_server = &self.config.server.gateway.xds_server;
        if xds_server.host.is_empty() || xds_server.host.contains(char::is_whitespace) {
            return Err(GatewayError::runner(
                NAME,
                format!("invalid bind host '{}'", xds_server.host),
            ));
        }
        let bind_address = xds_server.bind_address();
        let resolved = tokio::net::lookup_host(&bind_address)
            .await
            .map_err(|e| GatewayError::runner(NAME, format!("invalid bind address '{}': {}", bind_address, e)))?
            .next()
            .ok_or_else(|| {
                GatewayError::runner(NAME, format!("bind address '{}' did not resolve", bind_address))
            })?;
        info!(address = %resolved, "xDS server ready to serve snapshots");

        let subscription = self.config.xds.subscribe();
        let cache = self.config.cache.clone();
        self.config.server.tasks.spawn(async move {
            handle_subscription(NAME, &ctx, subscription, |update| {
                let cache = cache.clone();
                async move {
                    let changed = match &update.value {
                        Some(resources) => cache.set_snapshot(&update.key, resources),
                        None => cache.clear_snapshot(&update.key),
                    };
                    if let Some(changed) = changed {
                        debug!(gateway = %update.key, version = changed.version, "Snapshot updated");
                    }
                    Ok(())
                }
            })
            .await;
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use crate::message::Store;
    use crate::runner::Runner as _;
    use crate::xds::resources::{BuiltResource, XdsResources, LISTENER_TYPE_URL};
    use std::time::Duration;

    fn runner(config: GatewayConfig, xds: Xds) -> Runner {
        Runner::new(Config {
            server: Server::new(config),
            xds,
            cache: Arc::new(SnapshotCache::new()),
        })
    }

    #[tokio::test]
    async fn test_invalid_bind_address_fails_setup() {
        let mut config = GatewayConfig::default();
        config.xds_server.host = "not a host".into();
        let runner = runner(config, Store::new("xds"));

        let error = runner.start(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(error, GatewayError::Runner { .. }));
    }

    #[tokio::test]
    async fn test_snapshots_follow_store() {
        let mut config = GatewayConfig::default();
        config.xds_server.host = "127.0.0.1".into();
        let xds: Xds = Store::new("xds");
        let runner = runner(config, xds.clone());
        let cache = runner.cache();
        let mut updates = cache.subscribe_updates();
        let ctx = CancellationToken::new();
        runner.start(ctx.clone()).await.unwrap();

        let resources = XdsResources {
            listeners: vec![BuiltResource::new("l", LISTENER_TYPE_URL, serde_json::json!({}))],
            ..Default::default()
        };
        xds.update("default/web".into(), resources);
        let update = tokio::time::timeout(Duration::from_secs(1), updates.recv()).await.unwrap().unwrap();
        assert_eq!(update.node, "default/web");

        xds.delete("default/web");
        let update = tokio::time::timeout(Duration::from_secs(1), updates.recv()).await.unwrap().unwrap();
        assert_eq!(update.deltas[0].removed, vec!["l".to_string()]);
        assert!(cache.nodes().is_empty());
        ctx.cancel();
    }
}
