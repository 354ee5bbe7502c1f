//! Extension manager
//!
//! Holds every hook connection for the lifetime of the process. Translators
//! invoke hooks through the manager; the supervisor releases the connections
//! once at shutdown.

use std::sync::{Arc, RwLock};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::ExtensionManagerConfig;
use crate::errors::{GatewayError, Result};
use crate::extension::{HookClient, HookPoint, HttpHookClient};

#[derive(Debug, Clone)]
struct RegisteredHook {
    client: Arc<dyn HookClient>,
    points: Vec<HookPoint>,
    fail_open: bool,
}

/// Registry of open hook connections. Read-mostly: invoked concurrently by
/// runners, mutated only at construction and teardown.
#[derive(Debug, Default)]
pub struct Manager {
    hooks: RwLock<Vec<RegisteredHook>>,
}

impl Manager {
    /// Build a manager with one HTTP connection per configured hook.
    ///
    /// A missing configuration yields an empty manager.
    pub fn new(config: Option<&ExtensionManagerConfig>) -> Result<Self> {
        let manager = Self::default();
        let Some(config) = config else {
            info!("No extension hooks configured");
            return Ok(manager);
        };

        for hook in &config.hooks {
            let client = HttpHookClient::new(hook)?;
            manager.register(Arc::new(client), hook.points.clone(), hook.fail_open);
        }
        Ok(manager)
    }

    /// Register a hook connection for `points`.
    pub fn register(&self, client: Arc<dyn HookClient>, points: Vec<HookPoint>, fail_open: bool) {
        info!(hook = client.name(), points = ?points, fail_open, "Registering extension hook");
        self.write_hooks().push(RegisteredHook { client, points, fail_open });
    }

    pub fn hook_count(&self) -> usize {
        self.read_hooks().len()
    }

    /// Whether any hook is registered for `point`.
    pub fn has_hooks(&self, point: HookPoint) -> bool {
        self.read_hooks().iter().any(|hook| hook.points.contains(&point))
    }

    /// Pass `payload` through every hook registered for `point`, in
    /// registration order.
    ///
    /// A failing fail-open hook is skipped with a warning; a failing
    /// fail-closed hook aborts the chain with its error.
    pub async fn invoke(&self, point: HookPoint, payload: Value) -> Result<Value> {
        let hooks: Vec<RegisteredHook> =
            self.read_hooks().iter().filter(|hook| hook.points.contains(&point)).cloned().collect();

        let mut current = payload;
        for hook in hooks {
            match hook.client.invoke(point, current.clone()).await {
                Ok(modified) => current = modified,
                Err(e) if hook.fail_open => {
                    warn!(
                        hook = hook.client.name(),
                        point = %point,
                        error = %e,
                        "Extension hook failed, continuing with unmodified resources"
                    );
                }
                Err(e) => return Err(e),
            }
        }
        Ok(current)
    }

    /// Typed wrapper around [`Manager::invoke`].
    pub async fn invoke_typed<T>(&self, point: HookPoint, value: &T) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
    {
        let payload = serde_json::to_value(value)?;
        let modified = self.invoke(point, payload).await?;
        serde_json::from_value(modified).map_err(|e| {
            GatewayError::extension(point.to_string(), format!("hook returned invalid payload: {}", e))
        })
    }

    /// Release every hook connection. Failures are logged, never returned;
    /// calling this again is a no-op.
    pub async fn cleanup_hook_conns(&self) {
        let hooks: Vec<RegisteredHook> = std::mem::take(&mut *self.write_hooks());
        for hook in hooks {
            match hook.client.close().await {
                Ok(()) => info!(hook = hook.client.name(), "Released extension hook connection"),
                Err(e) => warn!(
                    hook = hook.client.name(),
                    error = %e,
                    "Failed to release extension hook connection"
                ),
            }
        }
    }

    fn read_hooks(&self) -> std::sync::RwLockReadGuard<'_, Vec<RegisteredHook>> {
        self.hooks.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_hooks(&self) -> std::sync::RwLockWriteGuard<'_, Vec<RegisteredHook>> {
        self.hooks.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
