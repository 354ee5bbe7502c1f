//! # Configuration Settings
//!
//! Defines the configuration structure for the flowgate control plane.
//!
//! Configuration is layered: built-in defaults, then an optional YAML file,
//! then `FLOWGATE__`-prefixed environment variables (`__` separates nested
//! keys, e.g. `FLOWGATE__XDS_SERVER__PORT=18001`).

use crate::errors::{GatewayError, Result};
use crate::extension::HookPoint;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use validator::Validate;

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "FLOWGATE";

/// Main gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Where resources are sourced from
    #[validate(nested)]
    pub provider: ProviderConfig,

    /// Global rate limiting; the rate-limit runner only runs when set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitConfig>,

    /// Out-of-process extension hooks
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension_manager: Option<ExtensionManagerConfig>,

    /// Leader election behaviour
    pub leader_election: LeaderElectionConfig,

    /// Logging configuration
    #[validate(nested)]
    pub logging: LoggingConfig,

    /// xDS server configuration
    #[validate(nested)]
    pub xds_server: XdsServerConfig,

    /// Infrastructure manager configuration
    pub infrastructure: InfrastructureConfig,

    /// Shutdown behaviour
    #[validate(nested)]
    pub shutdown: ShutdownConfig,

    /// Configuration file hot reload
    #[validate(nested)]
    pub reload: ReloadConfig,
}

impl GatewayConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(GatewayError::from)?;
        self.validate_custom()
    }

    /// Validation that goes beyond what the validator crate can express
    fn validate_custom(&self) -> Result<()> {
        if self.provider.provider_type == ProviderType::File
            && self.provider.file.path.as_os_str().is_empty()
        {
            return Err(GatewayError::validation_field(
                "File provider requires a resource path",
                "provider.file.path",
            ));
        }

        if let Some(rate_limit) = &self.rate_limit {
            Validate::validate(rate_limit).map_err(GatewayError::from)?;
        }

        if let Some(extensions) = &self.extension_manager {
            let mut names = HashSet::new();
            for hook in &extensions.hooks {
                Validate::validate(hook).map_err(GatewayError::from)?;
                if !names.insert(hook.name.as_str()) {
                    return Err(GatewayError::validation_field(
                        format!("Duplicate extension hook name '{}'", hook.name),
                        "extension_manager.hooks",
                    ));
                }
                let endpoint = url::Url::parse(&hook.endpoint).map_err(|e| {
                    GatewayError::validation_field(
                        format!("Invalid endpoint for hook '{}': {}", hook.name, e),
                        "extension_manager.hooks.endpoint",
                    )
                })?;
                if !matches!(endpoint.scheme(), "http" | "https") {
                    return Err(GatewayError::validation_field(
                        format!("Hook '{}' endpoint must use http or https", hook.name),
                        "extension_manager.hooks.endpoint",
                    ));
                }
                if hook.points.is_empty() {
                    return Err(GatewayError::validation_field(
                        format!("Hook '{}' must register at least one hook point", hook.name),
                        "extension_manager.hooks.points",
                    ));
                }
            }
        }

        Ok(())
    }

    /// Whether the resource-source mode requires out-of-process hooks
    pub fn requires_extension_manager(&self) -> bool {
        self.provider.provider_type == ProviderType::Kubernetes
    }

    /// Whether leader election gates writes for this deployment
    pub fn leader_election_enabled(&self) -> bool {
        self.provider.provider_type == ProviderType::Kubernetes && !self.leader_election.disable
    }
}

/// Load configuration from defaults, an optional YAML file and the environment
pub fn load_config(path: Option<&Path>) -> Result<GatewayConfig> {
    let mut builder =
        config::Config::builder().add_source(config::Config::try_from(&GatewayConfig::default())?);

    if let Some(path) = path {
        if !path.exists() {
            return Err(GatewayError::config(format!(
                "Configuration file '{}' does not exist",
                path.display()
            )));
        }
        builder = builder
            .add_source(config::File::from(path).format(config::FileFormat::Yaml).required(true));
    }

    let config: GatewayConfig = builder
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()?;

    config.validate()?;
    Ok(config)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    /// Resources come from a dynamic orchestration platform
    Kubernetes,
    /// Resources come from a local YAML file
    #[default]
    File,
}

/// Provider configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
#[serde(default)]
pub struct ProviderConfig {
    #[serde(rename = "type")]
    pub provider_type: ProviderType,

    #[validate(nested)]
    pub file: FileProviderConfig,
}

/// File provider configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct FileProviderConfig {
    /// YAML file holding a list of gateway resource bags
    pub path: PathBuf,

    /// Scan interval where file change notifications fall back to polling
    #[validate(range(min = 1, max = 3600, message = "Poll interval must be between 1 and 3600 seconds"))]
    pub poll_interval_seconds: u64,
}

impl Default for FileProviderConfig {
    fn default() -> Self {
        Self { path: PathBuf::from("resources.yaml"), poll_interval_seconds: 5 }
    }
}

impl FileProviderConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }
}

/// Global rate limit configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RateLimitConfig {
    /// Rate limit service domain the generated descriptors belong to
    #[validate(length(min = 1, message = "Rate limit domain cannot be empty"))]
    pub domain: String,
}

/// Extension manager configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ExtensionManagerConfig {
    pub hooks: Vec<ExtensionHookConfig>,
}

/// A single out-of-process hook endpoint
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ExtensionHookConfig {
    #[validate(length(min = 1, message = "Hook name cannot be empty"))]
    pub name: String,

    /// HTTP endpoint receiving hook invocations
    pub endpoint: String,

    /// Translation points this hook is invoked at
    pub points: Vec<HookPoint>,

    /// Per-invocation timeout in milliseconds
    #[serde(default = "default_hook_timeout_ms")]
    #[validate(range(min = 1, max = 60000, message = "Hook timeout must be between 1 and 60000 ms"))]
    pub timeout_ms: u64,

    /// Continue translation with unmodified resources when the hook fails
    #[serde(default)]
    pub fail_open: bool,
}

fn default_hook_timeout_ms() -> u64 {
    2000
}

impl ExtensionHookConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Leader election configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LeaderElectionConfig {
    /// Treat this replica as leader from startup
    pub disable: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub level: String,

    /// Enable JSON structured logging
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), json: false }
    }
}

/// xDS server configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct XdsServerConfig {
    /// Server bind host
    #[validate(length(min = 1, message = "xDS host cannot be empty"))]
    pub host: String,

    /// Server port
    #[validate(range(min = 1, max = 65535, message = "Port must be between 1 and 65535"))]
    pub port: u16,
}

impl Default for XdsServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 18000 }
    }
}

impl XdsServerConfig {
    /// Get the xDS server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Infrastructure manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InfrastructureConfig {
    /// Directory receiving one proxy descriptor per gateway
    pub output_dir: PathBuf,
}

impl Default for InfrastructureConfig {
    fn default() -> Self {
        Self { output_dir: PathBuf::from("./data/proxies") }
    }
}

/// Shutdown configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ShutdownConfig {
    /// How long runner tasks get to finish after stores are closed
    #[validate(range(min = 1, max = 300, message = "Drain timeout must be between 1 and 300 seconds"))]
    pub drain_timeout_seconds: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self { drain_timeout_seconds: 10 }
    }
}

impl ShutdownConfig {
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_seconds)
    }
}

/// Configuration hot reload
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ReloadConfig {
    pub enabled: bool,

    /// Scan interval where file change notifications fall back to polling
    #[validate(range(min = 1, max = 3600, message = "Reload interval must be between 1 and 3600 seconds"))]
    pub poll_interval_seconds: u64,
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self { enabled: false, poll_interval_seconds: 5 }
    }
}

impl ReloadConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }
}
