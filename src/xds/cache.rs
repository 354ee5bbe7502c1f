use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use futures::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

use crate::xds::resources::{BuiltResource, XdsResources};

/// Cached resource along with the cache version it was last changed at.
#[derive(Clone, Debug)]
pub struct CachedResource {
    pub name: String,
    pub type_url: String,
    pub version: u64,
    pub body: serde_json::Value,
}

/// Delta information for a single type URL.
#[derive(Clone, Debug, Default)]
pub struct ResourceDelta {
    pub type_url: String,
    pub added_or_updated: Vec<CachedResource>,
    pub removed: Vec<String>,
}

/// Broadcast payload describing all resources changed for one node.
#[derive(Clone, Debug, Default)]
pub struct ResourceUpdate {
    pub node: String,
    pub version: u64,
    pub deltas: Vec<ResourceDelta>,
}

type TypeCache = HashMap<String, CachedResource>;

/// Versioned per-node resource snapshots served to proxies. A node is the
/// gateway a proxy fleet belongs to.
#[derive(Debug)]
pub struct SnapshotCache {
    version: AtomicU64,
    update_tx: broadcast::Sender<Arc<ResourceUpdate>>,
    nodes: RwLock<HashMap<String, HashMap<String, TypeCache>>>,
}

impl Default for SnapshotCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotCache {
    pub fn new() -> Self {
        let (update_tx, _) = broadcast::channel(128);
        Self { version: AtomicU64::new(1), update_tx, nodes: RwLock::new(HashMap::new()) }
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Relaxed)
    }

    /// Replace the snapshot of `node` and broadcast what changed.
    /// Returns `None` when nothing changed.
    pub fn set_snapshot(&self, node: &str, resources: &XdsResources) -> Option<Arc<ResourceUpdate>> {
        let mut nodes = self.nodes.write().unwrap_or_else(|p| p.into_inner());
        let caches = nodes.entry(node.to_string()).or_default();

        let pending: Vec<(&str, Vec<BuiltResource>, Vec<String>)> = resources
            .by_type()
            .into_iter()
            .filter_map(|(type_url, built)| {
                let cache = caches.get(type_url);
                let incoming: HashSet<&str> = built.iter().map(|r| r.name.as_str()).collect();
                let removed: Vec<String> = cache
                    .map(|c| c.keys().filter(|n| !incoming.contains(n.as_str())).cloned().collect())
                    .unwrap_or_default();
                let changed: Vec<BuiltResource> = built
                    .iter()
                    .filter(|r| cache.and_then(|c| c.get(&r.name)).map(|c| &c.body) != Some(&r.body))
                    .cloned()
                    .collect();
                (!changed.is_empty() || !removed.is_empty()).then_some((type_url, changed, removed))
            })
            .collect();

        if pending.is_empty() {
            return None;
        }

        let version = self.version.fetch_add(1, Ordering::Relaxed) + 1;
        let mut deltas = Vec::with_capacity(pending.len());
        for (type_url, changed, removed) in pending {
            let cache = caches.entry(type_url.to_string()).or_default();
            for name in &removed {
                cache.remove(name);
            }
            let mut delta =
                ResourceDelta { type_url: type_url.to_string(), added_or_updated: Vec::new(), removed };
            for built in changed {
                let cached = CachedResource {
                    name: built.name.clone(),
                    type_url: type_url.to_string(),
                    version,
                    body: built.body,
                };
                cache.insert(built.name, cached.clone());
                delta.added_or_updated.push(cached);
            }
            deltas.push(delta);
        }

        Some(self.broadcast(ResourceUpdate { node: node.to_string(), version, deltas }))
    }

    /// Drop every resource of `node`, broadcasting the removals.
    pub fn clear_snapshot(&self, node: &str) -> Option<Arc<ResourceUpdate>> {
        let removed = self.nodes.write().unwrap_or_else(|p| p.into_inner()).remove(node)?;
        let version = self.version.fetch_add(1, Ordering::Relaxed) + 1;
        let deltas = removed
            .into_iter()
            .filter(|(_, cache)| !cache.is_empty())
            .map(|(type_url, cache)| ResourceDelta {
                type_url,
                added_or_updated: Vec::new(),
                removed: cache.into_keys().collect(),
            })
            .collect();
        Some(self.broadcast(ResourceUpdate { node: node.to_string(), version, deltas }))
    }

    fn broadcast(&self, update: ResourceUpdate) -> Arc<ResourceUpdate> {
        let update = Arc::new(update);
        debug!(node = %update.node, version = update.version, "Publishing snapshot update");
        // No receivers is normal before the first proxy connects.
        let _ = self.update_tx.send(update.clone());
        update
    }

    pub fn subscribe_updates(&self) -> broadcast::Receiver<Arc<ResourceUpdate>> {
        self.update_tx.subscribe()
    }

    /// Updates for a single node, as consumed by that node's proxy streams.
    ///
    /// A stream that falls behind skips the updates it missed; the consumer
    /// resynchronises from [`SnapshotCache::cached_resources`].
    pub fn node_updates(&self, node: &str) -> impl Stream<Item = Arc<ResourceUpdate>> + Send + 'static {
        let node = node.to_string();
        BroadcastStream::new(self.update_tx.subscribe()).filter_map(move |received| {
            let update = match received {
                Ok(update) if update.node == node => Some(update),
                Ok(_) => None,
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(node = %node, skipped, "Proxy stream lagged behind snapshot updates");
                    None
                }
            };
            futures::future::ready(update)
        })
    }

    /// Clone of the cached resources of `node` for `type_url`.
    pub fn cached_resources(&self, node: &str, type_url: &str) -> Vec<CachedResource> {
        let nodes = self.nodes.read().unwrap_or_else(|p| p.into_inner());
        nodes
            .get(node)
            .and_then(|caches| caches.get(type_url))
            .map(|cache| cache.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn nodes(&self) -> Vec<String> {
        self.nodes.read().unwrap_or_else(|p| p.into_inner()).keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xds::resources::CLUSTER_TYPE_URL;
    use futures::StreamExt;
    use serde_json::json;

    fn resources(clusters: &[(&str, i64)]) -> XdsResources {
        XdsResources {
            clusters: clusters
                .iter()
                .map(|(name, value)| BuiltResource::new(*name, CLUSTER_TYPE_URL, json!({"v": value})))
                .collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn set_snapshot_tracks_add_update_and_remove() {
        let cache = SnapshotCache::new();
        let mut receiver = cache.subscribe_updates();

        cache.set_snapshot("default/web", &resources(&[("cluster-1", 1)])).expect("update expected");
        let update = receiver.recv().await.expect("first update");
        assert_eq!(update.version, 2);
        assert_eq!(update.deltas.len(), 1);
        assert_eq!(update.deltas[0].added_or_updated.len(), 1);

        // re-applying the same snapshot is a no-op
        assert!(cache.set_snapshot("default/web", &resources(&[("cluster-1", 1)])).is_none());

        cache.set_snapshot("default/web", &resources(&[("cluster-1", 2)])).expect("update expected");
        let update = receiver.recv().await.expect("second update");
        assert_eq!(update.deltas[0].added_or_updated[0].body, json!({"v": 2}));

        cache.set_snapshot("default/web", &XdsResources::default()).expect("removal expected");
        let update = receiver.recv().await.expect("third update");
        assert_eq!(update.deltas[0].removed, vec!["cluster-1".to_string()]);
    }

    #[tokio::test]
    async fn clear_snapshot_removes_node() {
        let cache = SnapshotCache::new();
        cache.set_snapshot("default/web", &resources(&[("cluster-1", 1)]));
        let mut receiver = cache.subscribe_updates();

        let update = cache.clear_snapshot("default/web").expect("removal expected");
        assert_eq!(update.deltas[0].removed, vec!["cluster-1".to_string()]);
        assert_eq!(receiver.recv().await.unwrap().version, update.version);
        assert!(cache.nodes().is_empty());
        assert!(cache.clear_snapshot("default/web").is_none());
    }

    #[tokio::test]
    async fn node_updates_only_yield_that_node() {
        let cache = SnapshotCache::new();
        let mut updates = Box::pin(cache.node_updates("b/two"));

        cache.set_snapshot("a/one", &resources(&[("c", 1)]));
        cache.set_snapshot("b/two", &resources(&[("c", 1)]));

        let update = updates.next().await.expect("update for b/two");
        assert_eq!(update.node, "b/two");
        assert_eq!(update.version, 3);
    }

    #[test]
    fn nodes_are_isolated() {
        let cache = SnapshotCache::new();
        cache.set_snapshot("a/one", &resources(&[("c", 1)]));
        cache.set_snapshot("b/two", &resources(&[("c", 1)]));

        assert_eq!(cache.cached_resources("a/one", CLUSTER_TYPE_URL).len(), 1);
        assert_eq!(cache.cached_resources("b/two", CLUSTER_TYPE_URL).len(), 1);
        assert!(cache.cached_resources("c/three", CLUSTER_TYPE_URL).is_empty());
    }
}
