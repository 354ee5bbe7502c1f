//! # Message Bus
//!
//! Typed publish/subscribe stores connecting the pipeline stages. Every edge
//! of the pipeline is a [`Store`]; no stage calls another directly.

pub mod store;
pub mod types;

pub use store::{Snapshot, Store, Subscription, Update};
pub use types::{Channels, InfraIr, ProviderResources, Xds, XdsIr};

use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;

use futures::StreamExt;
use metrics::counter;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::observability::metrics::RUNNER_UPDATE_ERRORS;

/// Drive a store-wide subscription, calling `handle` once per key update.
///
/// Returns when `ctx` is cancelled or the store is closed. Handler errors are
/// logged and counted; they never end the loop.
pub async fn handle_subscription<K, V, F, Fut>(
    runner: &'static str,
    ctx: &CancellationToken,
    mut subscription: Subscription<Snapshot<K, V>>,
    mut handle: F,
) where
    K: Clone + Eq + Hash + Debug,
    F: FnMut(Update<K, V>) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    loop {
        let snapshot = tokio::select! {
            biased;
            _ = ctx.cancelled() => {
                debug!(runner, "Subscription cancelled");
                return;
            }
            next = subscription.next() => match next {
                Some(snapshot) => snapshot,
                None => {
                    debug!(runner, "Message store closed, ending subscription");
                    return;
                }
            },
        };

        for update in snapshot.updates {
            let key = update.key.clone();
            if let Err(error) = handle(update).await {
                counter!(RUNNER_UPDATE_ERRORS, "runner" => runner).increment(1);
                warn!(runner, key = ?key, error = %error, "Failed to handle message store update");
            }
        }
    }
}
