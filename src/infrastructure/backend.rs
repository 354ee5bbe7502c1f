//! Infrastructure backends
//!
//! An [`InfraBackend`] creates, updates and deletes the proxy fleet serving
//! one gateway.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::{GatewayError, Result};
use crate::ir;

#[async_trait]
pub trait InfraBackend: Send + Sync {
    /// Create the proxy fleet for `gateway`, or converge an existing one.
    async fn create_or_update_proxy(&self, gateway: &str, infra: &ir::Infra) -> Result<()>;

    /// Remove the proxy fleet for `gateway`. Removing an absent fleet succeeds.
    async fn delete_proxy(&self, gateway: &str) -> Result<()>;
}

/// Descriptor written for every proxy fleet by [`HostBackend`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyDescriptor {
    pub gateway: String,
    pub proxy: ir::ProxyInfra,
    pub updated_at: DateTime<Utc>,
}

/// Backend for host deployments: one JSON descriptor per gateway in a
/// directory that a process supervisor watches.
#[derive(Debug, Clone)]
pub struct HostBackend {
    output_dir: PathBuf,
}

impl HostBackend {
    pub fn new<P: Into<PathBuf>>(output_dir: P) -> Self {
        Self { output_dir: output_dir.into() }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Path of the descriptor for `gateway` (`namespace/name`).
    pub fn descriptor_path(&self, gateway: &str) -> PathBuf {
        self.output_dir.join(format!("{}.json", gateway.replace('/', "_")))
    }

    pub async fn read_descriptor(&self, gateway: &str) -> Result<ProxyDescriptor> {
        let path = self.descriptor_path(gateway);
        let contents = tokio::fs::read(&path)
            .await
            .map_err(|e| GatewayError::io(e, format!("Failed to read '{}'", path.display())))?;
        Ok(serde_json::from_slice(&contents)?)
    }
}

#[async_trait]
impl InfraBackend for HostBackend {
    async fn create_or_update_proxy(&self, gateway: &str, infra: &ir::Infra) -> Result<()> {
        tokio::fs::create_dir_all(&self.output_dir).await.map_err(|e| {
            GatewayError::io(e, format!("Failed to create '{}'", self.output_dir.display()))
        })?;

        let descriptor = ProxyDescriptor {
            gateway: gateway.to_string(),
            proxy: infra.proxy.clone(),
            updated_at: Utc::now(),
        };
        let path = self.descriptor_path(gateway);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(&descriptor)?)
            .await
            .map_err(|e| GatewayError::io(e, format!("Failed to write '{}'", tmp.display())))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| GatewayError::io(e, format!("Failed to write '{}'", path.display())))?;

        info!(gateway, proxy = %infra.proxy.name, path = %path.display(), "Proxy fleet converged");
        Ok(())
    }

    async fn delete_proxy(&self, gateway: &str) -> Result<()> {
        let path = self.descriptor_path(gateway);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!(gateway, path = %path.display(), "Proxy fleet removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(GatewayError::io(e, format!("Failed to remove '{}'", path.display()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn infra() -> ir::Infra {
        ir::Infra {
            proxy: ir::ProxyInfra {
                name: "flowgate-default-web".into(),
                namespace: "default".into(),
                listeners: vec![ir::ProxyListener { name: "http".into(), port: 8080 }],
            },
        }
    }

    #[tokio::test]
    async fn test_descriptor_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let backend = HostBackend::new(dir.path().join("proxies"));

        backend.create_or_update_proxy("default/web", &infra()).await.unwrap();
        let descriptor = backend.read_descriptor("default/web").await.unwrap();
        assert_eq!(descriptor.proxy, infra().proxy);
        assert!(backend.descriptor_path("default/web").ends_with("default_web.json"));

        backend.delete_proxy("default/web").await.unwrap();
        assert!(!backend.descriptor_path("default/web").exists());
        backend.delete_proxy("default/web").await.unwrap();
    }
}
