//! # Structured Logging
//!
//! Installs the global `tracing` subscriber. `RUST_LOG` takes precedence over
//! the configured level so operators can raise verbosity without editing the
//! configuration file.

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{GatewayConfig, LoggingConfig};
use crate::errors::{GatewayError, Result};

/// Filter from `RUST_LOG`, falling back to `config.level`.
pub fn env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) if !directives.is_empty() => EnvFilter::try_new(directives),
        _ => EnvFilter::try_new(&config.level),
    }
    .map_err(|e| GatewayError::config(format!("Invalid log filter: {}", e)))
}

/// Install the global subscriber.
///
/// Returns `Ok(false)` when a subscriber was already installed (e.g. by a
/// test harness); the existing one is kept.
pub fn init_logging(config: &LoggingConfig) -> Result<bool> {
    let filter = env_filter(config)?;
    let installed = if config.json {
        fmt().json().with_env_filter(filter).with_current_span(false).try_init().is_ok()
    } else {
        fmt().with_env_filter(filter).with_target(true).try_init().is_ok()
    };
    Ok(installed)
}

/// Log the effective configuration at startup.
pub fn log_config_info(config: &GatewayConfig) {
    tracing::info!(
        provider = ?config.provider.provider_type,
        xds_address = %config.xds_server.bind_address(),
        rate_limit_enabled = config.rate_limit.is_some(),
        extension_hooks = config.extension_manager.as_ref().map(|e| e.hooks.len()).unwrap_or(0),
        leader_election = config.leader_election_enabled(),
        reload_enabled = config.reload.enabled,
        "Flowgate control plane configuration"
    );
}
