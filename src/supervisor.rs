//! # Supervisor
//!
//! Builds the pipeline topology, starts every runner in dependency order,
//! waits for cancellation and tears the topology down.
//!
//! ```text
//! provider ─▶ {provider-resources} ─▶ gateway-api ─▶ {xds-ir} ─▶ xds-translator ─▶ {xds} ─▶ xds-server
//!    ▲              │ statuses                  └──▶ {infra-ir} ─▶ infrastructure
//!    └──────────────┘                              {xds-ir} ─▶ global-ratelimit (optional)
//! ```

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{ProviderType, Server};
use crate::errors::{GatewayError, Result};
use crate::extension::Manager;
use crate::infrastructure::{HostBackend, InfraBackend};
use crate::leader::{spawn_election, LeaderElector, StandaloneElector};
use crate::message::Channels;
use crate::provider::{FileSource, ResourceSource};
use crate::ratelimit::RateLimitCache;
use crate::runner::{start_runners, Runner};
use crate::xds::SnapshotCache;
use crate::{gatewayapi, infrastructure, provider, ratelimit, xds};

type RunnerFactory = Box<dyn FnOnce() -> Box<dyn Runner> + Send>;

pub struct Supervisor {
    server: Server,
    channels: Channels,
    source: Option<Arc<dyn ResourceSource>>,
    elector: Arc<dyn LeaderElector>,
    infra_backend: Arc<dyn InfraBackend>,
    xds_cache: Arc<SnapshotCache>,
    ratelimit_cache: Arc<RateLimitCache>,
}

impl Supervisor {
    /// Supervisor with the boundary implementations selected by configuration.
    pub fn new(server: Server) -> Self {
        let infra_backend = Arc::new(HostBackend::new(server.gateway.infrastructure.output_dir.clone()));
        Self {
            server,
            channels: Channels::new(),
            source: None,
            elector: Arc::new(StandaloneElector),
            infra_backend,
            xds_cache: Arc::new(SnapshotCache::new()),
            ratelimit_cache: Arc::new(RateLimitCache::new()),
        }
    }

    pub fn with_source(mut self, source: Arc<dyn ResourceSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_elector(mut self, elector: Arc<dyn LeaderElector>) -> Self {
        self.elector = elector;
        self
    }

    pub fn with_infra_backend(mut self, backend: Arc<dyn InfraBackend>) -> Self {
        self.infra_backend = backend;
        self
    }

    pub fn server(&self) -> &Server {
        &self.server
    }

    pub fn channels(&self) -> &Channels {
        &self.channels
    }

    pub fn xds_cache(&self) -> Arc<SnapshotCache> {
        self.xds_cache.clone()
    }

    pub fn ratelimit_cache(&self) -> Arc<RateLimitCache> {
        self.ratelimit_cache.clone()
    }

    /// Run the pipeline until `ctx` is cancelled.
    ///
    /// Returns an error, after tearing down the topology, when no resource
    /// source is available, the extension manager cannot be built or a
    /// runner fails setup.
    pub async fn run(&self, ctx: CancellationToken) -> Result<()> {
        let prepared = self
            .resource_source()
            .and_then(|source| Ok((source, self.extension_manager()?)));
        let (source, extension_manager) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                self.shutdown(None).await;
                return Err(e);
            }
        };
        let run_ctx = ctx.child_token();

        if self.server.gateway.leader_election_enabled() {
            info!("Leader election enabled, leader-gated work waits for the lease");
            spawn_election(
                self.elector.clone(),
                self.server.elected.clone(),
                run_ctx.clone(),
                &self.server.tasks,
            );
        } else {
            self.server.elected.set();
        }

        let started =
            start_runners(&run_ctx, self.runners(source, extension_manager.clone())).await;
        match started {
            Ok(count) => {
                info!(runners = count, "All runners started");
                run_ctx.cancelled().await;
                self.shutdown(extension_manager.as_deref()).await;
                Ok(())
            }
            Err(e) => {
                run_ctx.cancel();
                self.shutdown(extension_manager.as_deref()).await;
                Err(e)
            }
        }
    }

    fn extension_manager(&self) -> Result<Option<Arc<Manager>>> {
        if !self.server.gateway.requires_extension_manager() {
            return Ok(None);
        }
        let manager = Manager::new(self.server.gateway.extension_manager.as_ref())?;
        info!(hooks = manager.hook_count(), "Extension manager created");
        Ok(Some(Arc::new(manager)))
    }

    fn resource_source(&self) -> Result<Arc<dyn ResourceSource>> {
        if let Some(source) = &self.source {
            return Ok(source.clone());
        }
        match self.server.gateway.provider.provider_type {
            ProviderType::File => Ok(Arc::new(FileSource::from_config(&self.server.gateway.provider.file))),
            ProviderType::Kubernetes => {
                Err(GatewayError::config("Kubernetes provider requires an injected resource source"))
            }
        }
    }

    /// Runner factories in topology order. Construction is deferred so a
    /// failing runner prevents later ones from being built.
    fn runners(
        &self,
        source: Arc<dyn ResourceSource>,
        extension_manager: Option<Arc<Manager>>,
    ) -> impl Iterator<Item = Box<dyn Runner>> {
        let server = &self.server;
        let channels = &self.channels;
        let mut factories: Vec<RunnerFactory> = Vec::with_capacity(6);

        {
            let config = provider::Config {
                server: server.clone(),
                provider_resources: channels.provider_resources.clone(),
                source,
            };
            factories.push(Box::new(move || -> Box<dyn Runner> { Box::new(provider::Runner::new(config)) }));
        }
        {
            let config = gatewayapi::Config {
                server: server.clone(),
                provider_resources: channels.provider_resources.clone(),
                xds_ir: channels.xds_ir.clone(),
                infra_ir: channels.infra_ir.clone(),
                extension_manager: extension_manager.clone(),
            };
            factories.push(Box::new(move || -> Box<dyn Runner> { Box::new(gatewayapi::Runner::new(config)) }));
        }
        {
            let config = xds::translator::Config {
                server: server.clone(),
                xds_ir: channels.xds_ir.clone(),
                xds: channels.xds.clone(),
                xds_statuses: channels.provider_resources.xds_statuses.clone(),
                extension_manager,
            };
            factories.push(Box::new(move || -> Box<dyn Runner> { Box::new(xds::translator::Runner::new(config)) }));
        }
        {
            let config = infrastructure::Config {
                server: server.clone(),
                infra_ir: channels.infra_ir.clone(),
                backend: self.infra_backend.clone(),
            };
            factories.push(Box::new(move || -> Box<dyn Runner> { Box::new(infrastructure::Runner::new(config)) }));
        }
        {
            let config = xds::server::Config {
                server: server.clone(),
                xds: channels.xds.clone(),
                cache: self.xds_cache.clone(),
            };
            factories.push(Box::new(move || -> Box<dyn Runner> { Box::new(xds::server::Runner::new(config)) }));
        }
        if server.gateway.rate_limit.is_some() {
            let config = ratelimit::Config {
                server: server.clone(),
                xds_ir: channels.xds_ir.clone(),
                cache: self.ratelimit_cache.clone(),
            };
            factories.push(Box::new(move || -> Box<dyn Runner> { Box::new(ratelimit::Runner::new(config)) }));
        }

        factories.into_iter().map(|build| build())
    }

    async fn shutdown(&self, extension_manager: Option<&Manager>) {
        self.channels.close_all();
        info!("Runners are shutting down");

        if let Some(manager) = extension_manager {
            manager.cleanup_hook_conns().await;
        }

        self.server.tasks.close();
        let drain_timeout = self.server.gateway.shutdown.drain_timeout();
        if tokio::time::timeout(drain_timeout, self.server.tasks.wait()).await.is_err() {
            warn!(
                pending = self.server.tasks.len(),
                timeout_seconds = drain_timeout.as_secs(),
                "Runner tasks did not drain before the shutdown deadline"
            );
        } else {
            info!("All runner tasks stopped");
        }
    }
}
