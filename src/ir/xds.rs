//! xDS intermediate representation
//!
//! Produced by the Gateway API translator for one gateway, consumed by the
//! xDS translator and the global rate-limit runner.

use serde::{Deserialize, Serialize};

use crate::domain::{Endpoint, RateLimitRule};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Xds {
    pub http: Vec<HttpListener>,
}

impl Xds {
    /// Routes across every listener that carry a global rate limit.
    pub fn rate_limited_routes(&self) -> impl Iterator<Item = (&HttpListener, &HttpRoute)> {
        self.http.iter().flat_map(|listener| {
            listener
                .routes
                .iter()
                .filter(|route| route.rate_limit.is_some())
                .map(move |route| (listener, route))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpListener {
    pub name: String,
    pub address: String,
    pub port: u16,
    pub hostnames: Vec<String>,
    pub routes: Vec<HttpRoute>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpRoute {
    pub name: String,
    pub hostname: String,
    pub path_prefix: String,
    pub destination: RouteDestination,
    pub rate_limit: Option<RateLimitRule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteDestination {
    pub name: String,
    pub endpoints: Vec<Endpoint>,
}
