//! # Configuration Management
//!
//! Layered configuration for the flowgate control plane, the process-wide
//! [`Server`] handle, and the hot-reloading [`Loader`].

pub mod loader;
pub mod server;
pub mod settings;
pub mod watcher;

pub use loader::Loader;
pub use server::Server;
pub use watcher::FileWatcher;
pub use settings::{
    load_config, ExtensionHookConfig, ExtensionManagerConfig, FileProviderConfig, GatewayConfig,
    InfrastructureConfig, LeaderElectionConfig, LoggingConfig, ProviderConfig, ProviderType,
    RateLimitConfig, ReloadConfig, ShutdownConfig, XdsServerConfig,
};
