//! Intermediate representations exchanged between translation stages.

pub mod infra;
pub mod xds;

pub use infra::{Infra, ProxyInfra, ProxyListener};
pub use xds::{HttpListener, HttpRoute, RouteDestination, Xds};
