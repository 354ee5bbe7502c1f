//! Gateway API runner
//!
//! Subscribes to provider resources and publishes per-gateway IR. Each
//! gateway class owns the gateway keys and status keys it produced last
//! time, so keys that disappear from a class are deleted downstream.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use metrics::counter;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::Server;
use crate::domain::{GatewayResources, ResourceKey, ResourceKind, ResourceStatus};
use crate::errors::Result;
use crate::extension::{HookPoint, Manager};
use crate::gatewayapi::translate;
use crate::message::{handle_subscription, InfraIr, ProviderResources, Update, XdsIr};
use crate::observability::metrics::TRANSLATION_ERRORS;

pub const NAME: &str = "gateway-api";

pub struct Config {
    pub server: Server,
    pub provider_resources: ProviderResources,
    pub xds_ir: XdsIr,
    pub infra_ir: InfraIr,
    pub extension_manager: Option<Arc<Manager>>,
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
        let subscription = self.config.provider_resources.resources.subscribe();
        let stage = Arc::new(Stage {
            xds_ir: self.config.xds_ir.clone(),
            infra_ir: self.config.infra_ir.clone(),
            statuses: self.config.provider_resources.statuses.clone(),
            extension_manager: self.config.extension_manager.clone(),
            owned: Mutex::new(HashMap::new()),
        });

        self.config.server.tasks.spawn(async move {
            handle_subscription(NAME, &ctx, subscription, |update| {
                let stage = stage.clone();
                async move { stage.handle(update).await }
            })
            .await;
        });
        Ok(())
    }
}

struct Stage {
    xds_ir: XdsIr,
    infra_ir: InfraIr,
    statuses: crate::message::Store<ResourceKey, ResourceStatus>,
    extension_manager: Option<Arc<Manager>>,
    owned: Mutex<HashMap<String, Owned>>,
}

/// What one gateway class produced last time.
#[derive(Debug, Default)]
struct Owned {
    gateways: HashSet<String>,
    statuses: HashSet<ResourceKey>,
}

impl Stage {
    async fn handle(&self, update: Update<String, GatewayResources>) -> Result<()> {
        let Some(resources) = update.value else {
            let removed = self.owned.lock().unwrap_or_else(|p| p.into_inner()).remove(&update.key);
            let removed = removed.unwrap_or_default();
            for key in &removed.gateways {
                self.delete_gateway(key);
            }
            for key in &removed.statuses {
                self.statuses.delete(key);
            }
            return Ok(());
        };

        let resources = match &self.extension_manager {
            Some(manager) if manager.has_hooks(HookPoint::TranslateResources) => {
                match manager.invoke_typed(HookPoint::TranslateResources, resources.as_ref()).await {
                    Ok(modified) => Arc::new(modified),
                    Err(e) => {
                        counter!(TRANSLATION_ERRORS, "runner" => NAME).increment(1);
                        warn!(gateway_class = %update.key, error = %e, "Extension hook rejected resources");
                        let mut owned = self.owned.lock().unwrap_or_else(|p| p.into_inner());
                        let owned = owned.entry(update.key.clone()).or_default();
                        for gateway in &resources.gateways {
                            let key = ResourceKey::new(ResourceKind::Gateway, &gateway.namespace, &gateway.name);
                            self.statuses.update(key.clone(), ResourceStatus::rejected("ExtensionError", e.to_string()));
                            owned.statuses.insert(key);
                        }
                        return Ok(());
                    }
                }
            }
            _ => resources,
        };

        let translation = translate(&resources);
        let produced = Owned {
            gateways: translation.gateway_keys(),
            statuses: translation.statuses.iter().map(|(key, _)| key.clone()).collect(),
        };

        for (key, xds) in translation.xds_ir {
            self.xds_ir.update(key, xds);
        }
        for (key, infra) in translation.infra_ir {
            self.infra_ir.update(key, infra);
        }
        for (key, status) in translation.statuses {
            self.statuses.update(key, status);
        }

        let gateways = produced.gateways.len();
        let mut owned = self.owned.lock().unwrap_or_else(|p| p.into_inner());
        let previous = owned.remove(&update.key).unwrap_or_default();
        for stale in previous.gateways.difference(&produced.gateways) {
            self.delete_gateway(stale);
        }
        for stale in previous.statuses.difference(&produced.statuses) {
            self.statuses.delete(stale);
        }
        owned.insert(update.key.clone(), produced);

        debug!(gateway_class = %update.key, gateways, "Translated gateway resources");
        Ok(())
    }

    fn delete_gateway(&self, key: &str) {
        debug!(gateway = key, "Removing IR for deleted gateway");
        self.xds_ir.delete(key);
        self.infra_ir.delete(key);
    }
}
