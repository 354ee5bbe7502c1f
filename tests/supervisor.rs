//! Supervisor lifecycle tests
//!
//! Startup ordering, optional runners, leader gating, startup failure and
//! teardown of the whole topology.

mod common;

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use flowgate::config::{ProviderType, Server};
use flowgate::domain::{GatewayResources, Listener, ResourceKey, ResourceKind, ResourceStatus};
use flowgate::infrastructure::HostBackend;
use flowgate::leader::LeaderElector;
use flowgate::provider::{FileSource, ResourceSource};
use flowgate::runner::{start_runners, Runner};
use flowgate::supervisor::Supervisor;
use flowgate::{GatewayConfig, GatewayError, Result};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use common::{eventually, sample_resources, test_config, with_rate_limit, SAMPLE_RESOURCES_YAML};

struct Named {
    name: String,
    fail: bool,
    started: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Runner for Named {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self, _ctx: CancellationToken) -> Result<()> {
        if self.fail {
            return Err(GatewayError::runner(self.name.clone(), "setup failed"));
        }
        self.started.lock().unwrap().push(self.name.clone());
        Ok(())
    }
}

#[tokio::test]
async fn test_failing_runner_stops_later_construction() {
    let built = Arc::new(Mutex::new(Vec::new()));
    let started = Arc::new(Mutex::new(Vec::new()));
    let ctx = CancellationToken::new();

    let runners = (1..=5).map(|i| {
        let name = format!("r{}", i);
        built.lock().unwrap().push(name.clone());
        Box::new(Named { name, fail: i == 3, started: started.clone() }) as Box<dyn Runner>
    });

    let result = start_runners(&ctx, runners).await;

    assert!(result.is_err());
    assert_eq!(built.lock().unwrap().as_slice(), &["r1", "r2", "r3"]);
    assert_eq!(started.lock().unwrap().as_slice(), &["r1", "r2"]);
}

/// Elector that acquires the lease only when released by the test.
struct ManualElector {
    release: Notify,
}

#[async_trait]
impl LeaderElector for ManualElector {
    async fn acquire(&self, _ctx: CancellationToken) -> Result<()> {
        self.release.notified().await;
        Ok(())
    }
}

struct Fixture {
    supervisor: Arc<Supervisor>,
    source: Arc<FileSource>,
    backend: Arc<HostBackend>,
    _dir: tempfile::TempDir,
}

fn fixture(configure: impl FnOnce(&Path) -> GatewayConfig) -> Fixture {
    fixture_with_elector(configure, None)
}

fn fixture_with_elector(
    configure: impl FnOnce(&Path) -> GatewayConfig,
    elector: Option<Arc<dyn LeaderElector>>,
) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let resource_file = dir.path().join("resources.yaml");
    std::fs::write(&resource_file, SAMPLE_RESOURCES_YAML).unwrap();
    let proxies = dir.path().join("proxies");

    let source = Arc::new(FileSource::new(&resource_file, Duration::from_millis(50)));
    let backend = Arc::new(HostBackend::new(&proxies));
    let mut supervisor = Supervisor::new(Server::new(configure(&proxies)))
        .with_source(source.clone())
        .with_infra_backend(backend.clone());
    if let Some(elector) = elector {
        supervisor = supervisor.with_elector(elector);
    }

    Fixture { supervisor: Arc::new(supervisor), source, backend, _dir: dir }
}

fn spawn_run(
    supervisor: &Arc<Supervisor>,
    ctx: &CancellationToken,
) -> tokio::task::JoinHandle<Result<()>> {
    let supervisor = supervisor.clone();
    let ctx = ctx.clone();
    tokio::spawn(async move { supervisor.run(ctx).await })
}

#[tokio::test]
async fn test_rate_limit_runner_follows_configuration() {
    let limited = fixture(|dir| with_rate_limit(test_config(dir)));
    let plain = fixture(test_config);
    let ctx = CancellationToken::new();

    let limited_run = spawn_run(&limited.supervisor, &ctx);
    let plain_run = spawn_run(&plain.supervisor, &ctx);

    let limited_cache = limited.supervisor.ratelimit_cache();
    eventually(Duration::from_secs(5), || limited_cache.get("default/eg").is_some()).await;
    let config = limited_cache.get("default/eg").unwrap();
    assert_eq!(config.domain, "flowgate");
    assert_eq!(config.descriptors.len(), 1);
    assert_eq!(config.descriptors[0].rate_limit.requests_per_unit, 10);

    // the mandatory stages behave the same with or without rate limiting
    let plain_xds = plain.supervisor.xds_cache();
    eventually(Duration::from_secs(5), || plain_xds.nodes() == vec!["default/eg".to_string()]).await;
    let plain_descriptor = plain.backend.descriptor_path("default/eg");
    eventually(Duration::from_secs(5), || plain_descriptor.exists()).await;
    assert!(plain.supervisor.ratelimit_cache().is_empty());

    ctx.cancel();
    for run in [limited_run, plain_run] {
        let result = tokio::time::timeout(Duration::from_secs(5), run).await.unwrap().unwrap();
        assert!(result.is_ok());
    }
    assert!(limited.supervisor.channels().all_closed());
    assert!(plain.supervisor.channels().all_closed());
}

#[tokio::test]
async fn test_leader_gated_writes_wait_for_election() {
    let elector = Arc::new(ManualElector { release: Notify::new() });
    let Fixture { supervisor, source, backend, _dir } = fixture_with_elector(
        |dir| {
            let mut config = test_config(dir);
            config.provider.provider_type = ProviderType::Kubernetes;
            config
        },
        Some(elector.clone() as Arc<dyn LeaderElector>),
    );
    let ctx = CancellationToken::new();
    let run = spawn_run(&supervisor, &ctx);

    // serving configuration is not gated
    let cache = supervisor.xds_cache();
    eventually(Duration::from_secs(5), || !cache.nodes().is_empty()).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(!supervisor.server().elected.is_set());
    assert_eq!(source.status_count(), 0);
    assert!(!backend.descriptor_path("default/eg").exists());

    elector.release.notify_one();

    let gateway = ResourceKey::new(ResourceKind::Gateway, "default", "eg");
    eventually(Duration::from_secs(5), || source.status(&gateway).is_some()).await;
    let descriptor = backend.descriptor_path("default/eg");
    eventually(Duration::from_secs(5), || descriptor.exists()).await;
    assert!(supervisor.server().elected.is_set());

    ctx.cancel();
    let result = tokio::time::timeout(Duration::from_secs(5), run).await.unwrap().unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_runner_setup_failure_tears_down_topology() {
    let fixture = fixture(|dir| {
        let mut config = test_config(dir);
        config.xds_server.host = "not a host".to_string();
        config
    });
    let ctx = CancellationToken::new();

    let result = tokio::time::timeout(Duration::from_secs(10), fixture.supervisor.run(ctx.clone()))
        .await
        .unwrap();

    assert!(matches!(result, Err(GatewayError::Runner { .. })));
    assert!(fixture.supervisor.channels().all_closed());
    // the caller's token is untouched; only the run's own scope is cancelled
    assert!(!ctx.is_cancelled());
}

#[tokio::test]
async fn test_kubernetes_mode_requires_injected_source() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.provider.provider_type = ProviderType::Kubernetes;
    let supervisor = Supervisor::new(Server::new(config));

    let result = tokio::time::timeout(Duration::from_secs(5), supervisor.run(CancellationToken::new()))
        .await
        .unwrap();
    assert!(matches!(result, Err(GatewayError::Config { .. })));
    assert!(supervisor.channels().all_closed());
    assert!(supervisor.server().tasks.is_closed());
}

#[tokio::test]
async fn test_missing_resource_file_fails_startup() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.provider.file.path = dir.path().join("missing.yaml");
    let supervisor = Supervisor::new(Server::new(config));

    let result = supervisor.run(CancellationToken::new()).await;
    assert!(result.is_err());
    assert!(supervisor.channels().all_closed());
    assert!(supervisor.xds_cache().nodes().is_empty());
}

/// Source fed by the test that records every status write and clear in order.
#[derive(Default)]
struct RecordingSource {
    bags: Mutex<Vec<GatewayResources>>,
    changes: Notify,
    history: Mutex<Vec<(ResourceKey, Option<String>)>>,
}

impl RecordingSource {
    fn publish(&self, bags: Vec<GatewayResources>) {
        *self.bags.lock().unwrap() = bags;
        self.changes.notify_one();
    }

    fn history_of(&self, key: &ResourceKey) -> Vec<Option<String>> {
        self.history
            .lock()
            .unwrap()
            .iter()
            .filter(|(written, _)| written == key)
            .map(|(_, reason)| reason.clone())
            .collect()
    }
}

#[async_trait]
impl ResourceSource for RecordingSource {
    fn describe(&self) -> String {
        "recording".into()
    }

    async fn load(&self) -> Result<Vec<GatewayResources>> {
        Ok(self.bags.lock().unwrap().clone())
    }

    async fn changed(&self, ctx: &CancellationToken) -> bool {
        tokio::select! {
            _ = ctx.cancelled() => false,
            _ = self.changes.notified() => true,
        }
    }

    async fn write_status(&self, key: &ResourceKey, status: &ResourceStatus) -> Result<()> {
        let reason = status.conditions.first().map(|c| c.reason.clone());
        self.history.lock().unwrap().push((key.clone(), reason));
        Ok(())
    }

    async fn clear_status(&self, key: &ResourceKey) -> Result<()> {
        self.history.lock().unwrap().push((key.clone(), None));
        Ok(())
    }
}

fn conflicting_resources() -> GatewayResources {
    let mut resources = sample_resources();
    resources.gateways[0]
        .listeners
        .push(Listener { name: "alt".into(), port: 8080, hostname: None });
    resources
}

#[tokio::test]
async fn test_xds_failure_status_survives_republish() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(RecordingSource::default());
    source.publish(vec![conflicting_resources()]);
    let supervisor = Arc::new(
        Supervisor::new(Server::new(test_config(dir.path())))
            .with_source(source.clone())
            .with_infra_backend(Arc::new(HostBackend::new(dir.path().join("proxies")))),
    );
    let ctx = CancellationToken::new();
    let run = spawn_run(&supervisor, &ctx);

    let gateway = ResourceKey::new(ResourceKind::Gateway, "default", "eg");
    let failed = Some("XdsTranslationFailed".to_string());
    eventually(Duration::from_secs(5), || source.history_of(&gateway).contains(&failed)).await;
    let written = source.history_of(&gateway).len();

    // a changed bag with the same conflict goes through both translators again
    let mut republished = conflicting_resources();
    republished.backends[0].endpoints[0].port = 9090;
    source.publish(vec![republished]);
    eventually(Duration::from_secs(5), || source.history_of(&gateway).len() >= written + 2).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let history = source.history_of(&gateway);
    let first_failure = history.iter().position(|reason| reason == &failed).unwrap();
    assert!(
        history[first_failure..].iter().all(|reason| reason == &failed),
        "status went back after failing: {:?}",
        history
    );
    assert!(supervisor.xds_cache().nodes().is_empty());

    ctx.cancel();
    let result = tokio::time::timeout(Duration::from_secs(5), run).await.unwrap().unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_deleted_class_statuses_are_cleared_from_source() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(RecordingSource::default());
    source.publish(vec![sample_resources()]);
    let supervisor = Arc::new(
        Supervisor::new(Server::new(test_config(dir.path())))
            .with_source(source.clone())
            .with_infra_backend(Arc::new(HostBackend::new(dir.path().join("proxies")))),
    );
    let ctx = CancellationToken::new();
    let run = spawn_run(&supervisor, &ctx);

    let gateway = ResourceKey::new(ResourceKind::Gateway, "default", "eg");
    let route = ResourceKey::new(ResourceKind::HttpRoute, "default", "web");
    let accepted = Some("Accepted".to_string());
    eventually(Duration::from_secs(5), || {
        source.history_of(&gateway).contains(&accepted) && source.history_of(&route).contains(&accepted)
    })
    .await;

    source.publish(Vec::new());
    eventually(Duration::from_secs(5), || {
        source.history_of(&gateway).last() == Some(&None) && source.history_of(&route).last() == Some(&None)
    })
    .await;
    assert!(supervisor.channels().provider_resources.statuses.is_empty());

    ctx.cancel();
    let result = tokio::time::timeout(Duration::from_secs(5), run).await.unwrap().unwrap();
    assert!(result.is_ok());
}
