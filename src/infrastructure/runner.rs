//! Infrastructure runner
//!
//! Converges proxy fleets with the infra IR. Only the elected leader changes
//! infrastructure; followers hold their subscription until they are elected.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::Server;
use crate::errors::Result;
use crate::infrastructure::InfraBackend;
use crate::message::{handle_subscription, InfraIr};

pub const NAME: &str = "infrastructure";

pub struct Config {
    pub server: Server,
    pub infra_ir: InfraIr,
    pub backend: Arc<dyn InfraBackend>,
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
        let subscription = self.config.infra_ir.subscribe();
        let backend = self.config.backend.clone();
        let gate = self.config.server.elected.clone();

        self.config.server.tasks.spawn(async move {
            if !gate.wait_or_cancelled(&ctx).await {
                debug!("Cancelled before election, no infrastructure changes made");
                return;
            }
            info!("Managing proxy infrastructure");
            handle_subscription(NAME, &ctx, subscription, |update| {
                let backend = backend.clone();
                async move {
                    match update.value {
                        Some(infra) => backend.create_or_update_proxy(&update.key, &infra).await,
                        None => backend.delete_proxy(&update.key).await,
                    }
                }
            })
            .await;
        });
        Ok(())
    }
}
