//! Hook connections
//!
//! A [`HookClient`] is one open connection to an out-of-process extension.
//! The bundled [`HttpHookClient`] speaks JSON over HTTP.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::ExtensionHookConfig;
use crate::errors::{GatewayError, Result};
use crate::extension::HookPoint;

/// Connection to one extension endpoint.
///
/// Implementations must tolerate concurrent `invoke` calls.
#[async_trait]
pub trait HookClient: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Send `payload` to the hook and return the (possibly modified) payload.
    async fn invoke(&self, point: HookPoint, payload: Value) -> Result<Value>;

    /// Release the connection. Later invocations fail.
    async fn close(&self) -> Result<()>;
}

#[derive(Debug, Serialize)]
struct HookRequest<'a> {
    hook: &'a str,
    point: HookPoint,
    payload: Value,
}

#[derive(Debug, Deserialize)]
struct HookResponse {
    payload: Value,
}

/// JSON-over-HTTP hook client backed by a pooled `reqwest::Client`.
pub struct HttpHookClient {
    name: String,
    endpoint: url::Url,
    client: reqwest::Client,
    closed: AtomicBool,
}

impl fmt::Debug for HttpHookClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpHookClient")
            .field("name", &self.name)
            .field("endpoint", &self.endpoint.as_str())
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl HttpHookClient {
    pub fn new(config: &ExtensionHookConfig) -> Result<Self> {
        let endpoint = url::Url::parse(&config.endpoint).map_err(|e| {
            GatewayError::extension(&config.name, format!("invalid endpoint: {}", e))
        })?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| GatewayError::extension(&config.name, e.to_string()))?;

        Ok(Self { name: config.name.clone(), endpoint, client, closed: AtomicBool::new(false) })
    }
}

#[async_trait]
impl HookClient for HttpHookClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, point: HookPoint, payload: Value) -> Result<Value> {
        if self.closed.load(Ordering::Acquire) {
            return Err(GatewayError::extension(&self.name, "connection released"));
        }

        let request = HookRequest { hook: &self.name, point, payload };
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| GatewayError::extension(&self.name, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::extension(
                &self.name,
                format!("endpoint returned status {}", status),
            ));
        }

        let body: HookResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::extension(&self.name, format!("invalid response: {}", e)))?;

        debug!(hook = %self.name, point = %point, "Extension hook invoked");
        Ok(body.payload)
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(GatewayError::extension(&self.name, "connection already released"));
        }
        Ok(())
    }
}
