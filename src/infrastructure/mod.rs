//! # Infrastructure Management
//!
//! Provisions the proxy fleets described by the infra IR.

pub mod backend;
pub mod runner;

pub use backend::{HostBackend, InfraBackend, ProxyDescriptor};
pub use runner::{Config, Runner};
