//! Envoy xDS (eXtended Discovery Service) stage
//!
//! - [`translator`]: xDS IR to listener, route and cluster resources
//! - [`cache`]: versioned per-gateway snapshots with change broadcasts
//! - [`server`]: keeps the snapshot cache in step with the xds store

pub mod cache;
pub mod resources;
pub mod server;
pub mod translator;

pub use cache::{CachedResource, ResourceDelta, ResourceUpdate, SnapshotCache};
pub use resources::{BuiltResource, XdsResources};
