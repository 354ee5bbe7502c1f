//! Generic latest-value publish/subscribe store.
//!
//! A [`Store`] is a keyed map of immutable `Arc<V>` snapshots backed by a
//! single `tokio::sync::watch` channel. Every mutation happens under the
//! channel's lock, so `update`, `delete`, `get`, `close` and the state seen by
//! subscribers share one total order.
//!
//! Subscribers never slow the producer down: a subscriber that falls behind
//! observes the latest state the next time it polls, and intermediate values
//! for a key are coalesced. What a subscriber sees is therefore always a
//! subsequence of the publish order for every key.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::pin::Pin;
use std::sync::Arc;

use futures::Stream;
use metrics::counter;
use tokio::sync::watch;
use tracing::debug;

use crate::observability::metrics::{STORE_SUBSCRIPTIONS, STORE_UPDATES};

/// Boxed subscription sequence returned by [`Store::subscribe`] and
/// [`Store::subscribe_key`].
pub type Subscription<T> = Pin<Box<dyn Stream<Item = T> + Send>>;

/// A single key change observed by a store-wide subscriber.
#[derive(Debug)]
pub struct Update<K, V> {
    pub key: K,
    /// New value, or `None` when the key was deleted.
    pub value: Option<Arc<V>>,
}

impl<K, V> Update<K, V> {
    pub fn is_delete(&self) -> bool {
        self.value.is_none()
    }
}

impl<K: Clone, V> Clone for Update<K, V> {
    fn clone(&self) -> Self {
        Self { key: self.key.clone(), value: self.value.clone() }
    }
}

/// State of the whole store plus the changes since the subscriber's previous
/// snapshot.
///
/// Within `updates`, deletions come first, followed by applied values in the
/// order they were published.
#[derive(Debug)]
pub struct Snapshot<K, V> {
    pub state: HashMap<K, Arc<V>>,
    pub updates: Vec<Update<K, V>>,
}

struct Entry<V> {
    value: Arc<V>,
    revision: u64,
}

struct State<K, V> {
    entries: HashMap<K, Entry<V>>,
    revision: u64,
    closed: bool,
}

/// Keyed, latest-value publish/subscribe container connecting two pipeline
/// stages. Cloning a `Store` yields another handle to the same store.
pub struct Store<K, V> {
    name: &'static str,
    tx: Arc<watch::Sender<State<K, V>>>,
}

impl<K, V> Clone for Store<K, V> {
    fn clone(&self) -> Self {
        Self { name: self.name, tx: Arc::clone(&self.tx) }
    }
}

impl<K, V> fmt::Debug for Store<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.tx.borrow();
        f.debug_struct("Store")
            .field("name", &self.name)
            .field("entries", &state.entries.len())
            .field("revision", &state.revision)
            .field("closed", &state.closed)
            .finish()
    }
}

impl<K, V> Store<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + fmt::Debug + 'static,
    V: Send + Sync + 'static,
{
    /// Create an empty, open store. `name` labels logs and metrics.
    pub fn new(name: &'static str) -> Self {
        let (tx, _) =
            watch::channel(State { entries: HashMap::new(), revision: 0, closed: false });
        Self { name, tx: Arc::new(tx) }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Replace the value stored for `key`.
    ///
    /// Returns `false` when the store is closed; the value is dropped.
    pub fn update(&self, key: K, value: V) -> bool {
        let value = Arc::new(value);
        let mut rejected_key = None;
        let accepted = self.tx.send_if_modified(|state| {
            if state.closed {
                rejected_key = Some(key);
                return false;
            }
            state.revision += 1;
            let revision = state.revision;
            state.entries.insert(key, Entry { value, revision });
            true
        });

        if accepted {
            counter!(STORE_UPDATES, "store" => self.name, "op" => "update")
                .increment(1);
        } else {
            debug!(store = self.name, key = ?rejected_key, "Dropped update to closed message store");
        }
        accepted
    }

    /// Remove `key` from the store.
    ///
    /// Returns `true` if the key existed and the store is open.
    pub fn delete<Q>(&self, key: &Q) -> bool
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let deleted = self.tx.send_if_modified(|state| {
            if state.closed || state.entries.remove(key).is_none() {
                return false;
            }
            state.revision += 1;
            true
        });

        if deleted {
            counter!(STORE_UPDATES, "store" => self.name, "op" => "delete")
                .increment(1);
        }
        deleted
    }

    /// Current value for `key`, if any. Never blocks on subscribers.
    pub fn get<Q>(&self, key: &Q) -> Option<Arc<V>>
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.tx.borrow().entries.get(key).map(|entry| Arc::clone(&entry.value))
    }

    /// Copy of every current key/value pair.
    pub fn load_all(&self) -> HashMap<K, Arc<V>> {
        self.tx
            .borrow()
            .entries
            .iter()
            .map(|(key, entry)| (key.clone(), Arc::clone(&entry.value)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tx.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.tx.borrow().closed
    }

    /// Mark the store closed and end every subscription. Idempotent.
    pub fn close(&self) {
        let closed_now = self.tx.send_if_modified(|state| {
            if state.closed {
                return false;
            }
            state.closed = true;
            true
        });
        if closed_now {
            debug!(store = self.name, "Closed message store");
        }
    }

    /// Subscribe to every key in the store.
    ///
    /// The first snapshot carries the current contents (if the store is not
    /// empty); each following snapshot carries the changes since the previous
    /// one. The sequence ends when the store is closed.
    pub fn subscribe(&self) -> Subscription<Snapshot<K, V>> {
        let mut rx = self.tx.subscribe();
        counter!(STORE_SUBSCRIPTIONS, "store" => self.name).increment(1);

        Box::pin(async_stream::stream! {
            let mut seen: HashMap<K, u64> = HashMap::new();
            loop {
                let next = {
                    let state = rx.borrow_and_update();
                    if state.closed {
                        None
                    } else {
                        Some(diff(&state, &mut seen))
                    }
                };

                match next {
                    None => break,
                    Some(Some(snapshot)) => yield snapshot,
                    Some(None) => {}
                }

                if rx.changed().await.is_err() {
                    break;
                }
            }
        })
    }

    /// Subscribe to a single key.
    ///
    /// Yields the current value first if one exists, then every later value.
    /// A deletion after the key has been observed yields `None`. The sequence
    /// ends when the store is closed.
    pub fn subscribe_key(&self, key: K) -> Subscription<Option<Arc<V>>> {
        let mut rx = self.tx.subscribe();
        counter!(STORE_SUBSCRIPTIONS, "store" => self.name).increment(1);

        Box::pin(async_stream::stream! {
            let mut last: Option<u64> = None;
            loop {
                let step = {
                    let state = rx.borrow_and_update();
                    if state.closed {
                        KeyStep::Closed
                    } else {
                        match (state.entries.get(&key), last) {
                            (Some(entry), seen) if seen != Some(entry.revision) => {
                                last = Some(entry.revision);
                                KeyStep::Emit(Some(Arc::clone(&entry.value)))
                            }
                            (None, Some(_)) => {
                                last = None;
                                KeyStep::Emit(None)
                            }
                            _ => KeyStep::Wait,
                        }
                    }
                };

                match step {
                    KeyStep::Closed => break,
                    KeyStep::Emit(value) => yield value,
                    KeyStep::Wait => {}
                }

                if rx.changed().await.is_err() {
                    break;
                }
            }
        })
    }
}

enum KeyStep<V> {
    Emit(Option<Arc<V>>),
    Wait,
    Closed,
}

fn diff<K, V>(state: &State<K, V>, seen: &mut HashMap<K, u64>) -> Option<Snapshot<K, V>>
where
    K: Clone + Eq + Hash,
{
    let mut updates: Vec<Update<K, V>> = seen
        .keys()
        .filter(|key| !state.entries.contains_key(*key))
        .map(|key| Update { key: key.clone(), value: None })
        .collect();

    let mut applied: Vec<(u64, Update<K, V>)> = state
        .entries
        .iter()
        .filter(|(key, entry)| seen.get(*key) != Some(&entry.revision))
        .map(|(key, entry)| {
            (entry.revision, Update { key: key.clone(), value: Some(Arc::clone(&entry.value)) })
        })
        .collect();
    applied.sort_by_key(|(revision, _)| *revision);
    updates.extend(applied.into_iter().map(|(_, update)| update));

    if updates.is_empty() {
        return None;
    }

    seen.clear();
    let mut current = HashMap::with_capacity(state.entries.len());
    for (key, entry) in &state.entries {
        seen.insert(key.clone(), entry.revision);
        current.insert(key.clone(), Arc::clone(&entry.value));
    }

    Some(Snapshot { state: current, updates })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::time::Duration;
    use tokio::time::timeout;

    fn store() -> Store<String, u32> {
        Store::new("test")
    }

    #[test]
    fn update_then_get_returns_latest() {
        let store = store();
        assert!(store.get("a").is_none());

        assert!(store.update("a".to_string(), 1));
        assert!(store.update("a".to_string(), 2));

        assert_eq!(store.get("a").as_deref(), Some(&2));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn lookups_accept_borrowed_and_owned_keys() {
        let store = store();
        store.update("a".to_string(), 1);
        let owned = "a".to_string();

        assert_eq!(store.get("a"), store.get(&owned));
        assert!(store.delete(owned.as_str()));
        assert!(!store.delete(&owned));
        assert!(store.load_all().is_empty());
        assert!(!store.is_closed());
        assert!(format!("{store:?}").contains("test"));
    }

    #[test]
    fn update_after_close_is_rejected() {
        let store = store();
        store.update("a".to_string(), 1);
        store.close();

        assert!(!store.update("a".to_string(), 2));
        assert!(!store.delete("a"));
        assert_eq!(store.get("a").as_deref(), Some(&1));
    }

    #[test]
    fn close_is_idempotent() {
        let store = store();
        store.close();
        store.close();
        assert!(store.is_closed());
    }

    #[test]
    fn delete_reports_missing_keys() {
        let store = store();
        assert!(!store.delete("missing"));
        store.update("a".to_string(), 1);
        assert!(store.delete("a"));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn subscribe_starts_with_latest_value() {
        let store = store();
        store.update("a".to_string(), 1);
        store.update("a".to_string(), 2);
        store.update("a".to_string(), 3);

        let mut sub = store.subscribe();
        let snapshot = sub.next().await.expect("initial snapshot");
        assert_eq!(snapshot.updates.len(), 1);
        assert_eq!(snapshot.updates[0].value.as_deref(), Some(&3));
        assert_eq!(snapshot.state.get("a").map(|v| **v), Some(3));
    }

    #[tokio::test]
    async fn subscribe_on_empty_store_waits_for_first_update() {
        let store = store();
        let mut sub = store.subscribe();

        assert!(timeout(Duration::from_millis(50), sub.next()).await.is_err());

        store.update("a".to_string(), 7);
        let snapshot = sub.next().await.expect("snapshot after update");
        assert_eq!(snapshot.updates[0].key, "a");
    }

    #[tokio::test]
    async fn deletions_are_delivered() {
        let store = store();
        store.update("a".to_string(), 1);
        let mut sub = store.subscribe();
        let _ = sub.next().await;

        store.delete("a");
        let snapshot = sub.next().await.expect("deletion snapshot");
        assert_eq!(snapshot.updates.len(), 1);
        assert!(snapshot.updates[0].is_delete());
        assert!(snapshot.state.is_empty());
    }

    #[tokio::test]
    async fn applied_updates_keep_publish_order() {
        let store = store();
        let mut sub = store.subscribe();

        store.update("b".to_string(), 1);
        store.update("a".to_string(), 2);
        store.update("c".to_string(), 3);

        let snapshot = sub.next().await.expect("coalesced snapshot");
        let keys: Vec<&str> = snapshot.updates.iter().map(|u| u.key.as_str()).collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
    }

    #[tokio::test]
    async fn close_ends_outstanding_and_new_subscriptions() {
        let store = store();
        store.update("a".to_string(), 1);
        let mut outstanding = store.subscribe();
        let _ = outstanding.next().await;

        store.close();

        let end = timeout(Duration::from_secs(1), outstanding.next()).await.expect("not blocked");
        assert!(end.is_none());

        let mut fresh = store.subscribe();
        let end = timeout(Duration::from_secs(1), fresh.next()).await.expect("not blocked");
        assert!(end.is_none());

        let mut keyed = store.subscribe_key("a".to_string());
        let end = timeout(Duration::from_secs(1), keyed.next()).await.expect("not blocked");
        assert!(end.is_none());
    }

    #[tokio::test]
    async fn subscribe_key_filters_other_keys() {
        let store = store();
        let mut sub = store.subscribe_key("a".to_string());

        store.update("b".to_string(), 1);
        store.update("a".to_string(), 2);

        let value = sub.next().await.expect("value for a");
        assert_eq!(value.as_deref(), Some(&2));

        store.delete("a");
        let value = sub.next().await.expect("deletion for a");
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn dropping_every_handle_ends_subscriptions() {
        let store = store();
        let mut sub = store.subscribe();
        drop(store);
        assert!(sub.next().await.is_none());
    }
}

