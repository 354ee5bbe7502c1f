//! # Flowgate
//!
//! Flowgate is the orchestration core of a gateway control plane: it turns
//! declarative routing and policy resources into proxy configuration served
//! to remote Envoy proxies.
//!
//! ## Architecture
//!
//! Independently running stages ([`runner::Runner`]s) are connected only
//! through typed latest-value stores ([`message::Store`]):
//!
//! ```text
//! Provider ─▶ {ProviderResources} ─▶ GatewayAPI ─▶ {XdsIR} ─▶ XdsTranslator ─▶ {Xds} ─▶ XdsServer
//!                                         └──▶ {InfraIR} ─▶ Infrastructure
//!                                    {XdsIR} ─▶ RateLimit (optional)
//! ```
//!
//! The [`supervisor::Supervisor`] builds the topology, starts the runners in
//! order, gates leader-only writes on the [`leader::ElectedGate`] and tears
//! everything down on cancellation.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use flowgate::{config::Server, supervisor::Supervisor, Result};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = flowgate::config::load_config(None)?;
//!     let ctx = CancellationToken::new();
//!     Supervisor::new(Server::new(config)).run(ctx).await
//! }
//! ```

pub mod cli;
pub mod config;
pub mod domain;
pub mod errors;
pub mod extension;
pub mod gatewayapi;
pub mod infrastructure;
pub mod ir;
pub mod leader;
pub mod message;
pub mod observability;
pub mod provider;
pub mod ratelimit;
pub mod runner;
pub mod supervisor;
pub mod xds;

// Re-export commonly used types and traits
pub use config::GatewayConfig;
pub use errors::{GatewayError, Result};
pub use leader::ElectedGate;
pub use message::Store;
pub use runner::Runner;
pub use supervisor::Supervisor;

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
