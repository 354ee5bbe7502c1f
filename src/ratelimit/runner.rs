//! Global rate-limit runner

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::Server;
use crate::errors::{GatewayError, Result};
use crate::message::{handle_subscription, XdsIr};
use crate::ratelimit::{translate, RateLimitServiceConfig};

pub const NAME: &str = "global-ratelimit";

/// Latest rate-limit service configuration per gateway.
#[derive(Debug, Default)]
pub struct RateLimitCache {
    configs: RwLock<BTreeMap<String, RateLimitServiceConfig>>,
}

impl RateLimitCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, gateway: &str) -> Option<RateLimitServiceConfig> {
        self.configs.read().unwrap_or_else(|p| p.into_inner()).get(gateway).cloned()
    }

    pub fn len(&self) -> usize {
        self.configs.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn set(&self, gateway: &str, config: Option<RateLimitServiceConfig>) {
        let mut configs = self.configs.write().unwrap_or_else(|p| p.into_inner());
        match config {
            Some(config) => {
                configs.insert(gateway.to_string(), config);
            }
            None => {
                configs.remove(gateway);
            }
        }
    }
}

pub struct Config {
    pub server: Server,
    pub xds_ir: XdsIr,
    pub cache: Arc<RateLimitCache>,
}

pub struct Runner {
    config: Config,
}

impl Runner {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

#[async_trait]
impl crate::runner::Runner for Runner {
    fn name(&self) -> &str {
        NAME
    }

    async fn start(&self, ctx: CancellationToken) -> Result<()> {
        let domain = self
            .config
            .server
            .gateway
            .rate_limit
            .as_ref()
            .map(|rate_limit| rate_limit.domain.clone())
            .ok_or_else(|| GatewayError::runner(NAME, "rate limiting is not configured"))?;

        let subscription = self.config.xds_ir.subscribe();
        let cache = self.config.cache.clone();
        self.config.server.tasks.spawn(async move {
            handle_subscription(NAME, &ctx, subscription, |update| {
                let config = update.value.as_ref().and_then(|ir| translate(&update.key, &domain, ir));
                debug!(
                    gateway = %update.key,
                    descriptors = config.as_ref().map(|c| c.descriptors.len()).unwrap_or(0),
                    "Updated rate limit configuration"
                );
                cache.set(&update.key, config);
                async { Ok(()) }
            })
            .await;
        });
        Ok(())
    }
}
