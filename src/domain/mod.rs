//! Domain layer
//!
//! Plain resource types exchanged between the provider and the translators.
//! They carry no infrastructure dependencies.
//!
//! ## Module Organization
//!
//! - `gateway`: gateways, routes and backends as declared by the source of truth
//! - `status`: status conditions written back to the source of truth

pub mod gateway;
pub mod status;

pub use gateway::{
    Backend, Endpoint, Gateway, GatewayResources, HttpRoute, Listener, RateLimitRule,
    RateLimitUnit, RouteRule,
};
pub use status::{Condition, ResourceKey, ResourceKind, ResourceStatus};
