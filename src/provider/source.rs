//! Resource sources
//!
//! A [`ResourceSource`] is the source of truth the provider runner reads
//! gateway resources from and writes resource status back to.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{FileProviderConfig, FileWatcher};
use crate::domain::{GatewayResources, ResourceKey, ResourceStatus};
use crate::errors::{GatewayError, Result};

#[async_trait]
pub trait ResourceSource: Send + Sync {
    /// Human-readable description for logs.
    fn describe(&self) -> String;

    /// Resolve the complete current set of resource bags.
    async fn load(&self) -> Result<Vec<GatewayResources>>;

    /// Wait until the source may have changed. Returns `false` once `ctx` is
    /// cancelled.
    async fn changed(&self, ctx: &CancellationToken) -> bool;

    /// Persist the status computed for `key`.
    async fn write_status(&self, key: &ResourceKey, status: &ResourceStatus) -> Result<()>;

    /// Forget the status of a resource that no longer exists.
    async fn clear_status(&self, _key: &ResourceKey) -> Result<()> {
        Ok(())
    }
}

/// Resource file contents: a list of bags, or a single bag.
#[derive(Deserialize)]
#[serde(untagged)]
enum ResourceDocument {
    Many(Vec<GatewayResources>),
    One(GatewayResources),
}

/// Reads resources from a YAML file and reports changes through a
/// [`FileWatcher`].
///
/// The watcher starts on first use, before the first read, so no write
/// between loading and waiting is lost. Written statuses are logged and kept
/// in memory.
#[derive(Debug)]
pub struct FileSource {
    path: PathBuf,
    poll_interval: Duration,
    watcher: Mutex<Option<FileWatcher>>,
    statuses: RwLock<BTreeMap<ResourceKey, ResourceStatus>>,
}

impl FileSource {
    pub fn new<P: Into<PathBuf>>(path: P, poll_interval: Duration) -> Self {
        Self {
            path: path.into(),
            poll_interval,
            watcher: Mutex::new(None),
            statuses: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn from_config(config: &FileProviderConfig) -> Self {
        Self::new(config.path.clone(), config.poll_interval())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last status written for `key`.
    pub fn status(&self, key: &ResourceKey) -> Option<ResourceStatus> {
        self.statuses.read().unwrap_or_else(|p| p.into_inner()).get(key).cloned()
    }

    pub fn status_count(&self) -> usize {
        self.statuses.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    fn start_watcher(&self, slot: &mut Option<FileWatcher>) {
        if slot.is_some() {
            return;
        }
        match FileWatcher::new(&self.path, self.poll_interval) {
            Ok(watcher) => *slot = Some(watcher),
            Err(e) => warn!(path = %self.path.display(), error = %e, "Resource file changes will not be detected"),
        }
    }
}

/// Parse a resource document.
pub fn parse_resources(contents: &str) -> Result<Vec<GatewayResources>> {
    if contents.trim().is_empty() {
        return Ok(Vec::new());
    }
    let document: ResourceDocument = serde_yaml::from_str(contents)?;
    let bags = match document {
        ResourceDocument::Many(bags) => bags,
        ResourceDocument::One(bag) => vec![bag],
    };

    if let Some(bag) = bags.iter().find(|bag| bag.gateway_class.is_empty()) {
        return Err(GatewayError::validation_field(
            format!("Resource bag with {} gateway(s) has no gateway class", bag.gateways.len()),
            "gatewayClass",
        ));
    }
    Ok(bags)
}

#[async_trait]
impl ResourceSource for FileSource {
    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }

    async fn load(&self) -> Result<Vec<GatewayResources>> {
        // a locked slot means changed() is already waiting on a watcher
        if let Ok(mut slot) = self.watcher.try_lock() {
            self.start_watcher(&mut slot);
        }
        let contents = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            GatewayError::io(e, format!("Failed to read resource file '{}'", self.path.display()))
        })?;

        let bags = parse_resources(&contents)
            .map_err(|e| e.context(format!("Invalid resource file '{}'", self.path.display())))?;
        debug!(path = %self.path.display(), bags = bags.len(), "Loaded resource file");
        Ok(bags)
    }

    async fn changed(&self, ctx: &CancellationToken) -> bool {
        let mut slot = self.watcher.lock().await;
        self.start_watcher(&mut slot);
        match slot.as_mut() {
            Some(watcher) => watcher.changed(ctx).await,
            None => {
                ctx.cancelled().await;
                false
            }
        }
    }

    async fn write_status(&self, key: &ResourceKey, status: &ResourceStatus) -> Result<()> {
        info!(
            resource = %key,
            ready = status.is_ready(),
            reason = status.conditions.first().map(|c| c.reason.as_str()).unwrap_or(""),
            "Resource status updated"
        );
        self.statuses
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(key.clone(), status.clone());
        Ok(())
    }

    async fn clear_status(&self, key: &ResourceKey) -> Result<()> {
        let removed =
            self.statuses.write().unwrap_or_else(|p| p.into_inner()).remove(key).is_some();
        if removed {
            info!(resource = %key, "Resource status cleared");
        }
        Ok(())
    }
}
