//! Provider runner
//!
//! Publishes resource bags from the [`ResourceSource`] into the
//! provider-resources store and writes computed statuses back to the source
//! once this replica is the leader. Both status stores feed the write-back;
//! what is written is always [`ProviderResources::effective_status`].

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Server;
use crate::domain::GatewayResources;
use crate::errors::{GatewayError, Result};
use crate::message::{handle_subscription, ProviderResources, Subscription};
use crate::observability::metrics::RUNNER_UPDATE_ERRORS;
use crate::provider::ResourceSource;

pub const NAME: &str = "provider";

pub struct Config {
    pub server: Server,
    pub provider_resources: ProviderResources,
    pub source: Arc<dyn ResourceSource>,
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
        let source = self.config.source.clone();
        let resources = self.config.provider_resources.clone();
        if resources.resources.is_closed() {
            return Err(GatewayError::StoreClosed(resources.resources.name()));
        }

        let initial = source.load().await?;
        let published = publish(&resources, initial);
        info!(source = %source.describe(), bags = published, "Published initial provider resources");

        let tasks = &self.config.server.tasks;

        {
            let source = source.clone();
            let resources = resources.clone();
            let ctx = ctx.clone();
            tasks.spawn(async move {
                while source.changed(&ctx).await {
                    match source.load().await {
                        Ok(bags) => {
                            let published = publish(&resources, bags);
                            debug!(bags = published, "Republished provider resources");
                        }
                        Err(e) => {
                            counter!(RUNNER_UPDATE_ERRORS, "runner" => NAME).increment(1);
                            warn!(error = %e, "Failed to reload provider resources, keeping last known state");
                        }
                    }
                }
                debug!("Provider watch stopped");
            });
        }

        let statuses: Subscription<_> = Box::pin(futures::stream::select(
            resources.statuses.subscribe(),
            resources.xds_statuses.subscribe(),
        ));
        let gate = self.config.server.elected.clone();
        tasks.spawn(async move {
            if !gate.wait_or_cancelled(&ctx).await {
                return;
            }
            info!("Writing resource statuses back to the source");
            handle_subscription(NAME, &ctx, statuses, |update| {
                let source = source.clone();
                let status = resources.effective_status(&update.key);
                async move {
                    match status {
                        Some(status) => source.write_status(&update.key, &status).await,
                        None => source.clear_status(&update.key).await,
                    }
                }
            })
            .await;
        });

        Ok(())
    }
}

/// Replace the store contents with `bags`. Unchanged bags are not
/// republished; classes absent from `bags` are deleted.
fn publish(store: &ProviderResources, bags: Vec<GatewayResources>) -> usize {
    let mut current = HashSet::new();
    let mut published = 0;

    for bag in bags {
        let class = bag.gateway_class.clone();
        if !current.insert(class.clone()) {
            warn!(gateway_class = %class, "Duplicate gateway class in source, last definition wins");
        }
        if store.resources.get(&class).as_deref() == Some(&bag) {
            continue;
        }
        if store.resources.update(class, bag) {
            published += 1;
        }
    }

    for class in store.resources.load_all().into_keys() {
        if !current.contains(&class) {
            debug!(gateway_class = %class, "Gateway class removed from source");
            store.resources.delete(&class);
        }
    }

    published
}
