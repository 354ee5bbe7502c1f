//! Declarative gateway resources
//!
//! The resource bag a provider resolves from its source of truth and publishes
//! into the provider-resources store, keyed by gateway class.

use serde::{Deserialize, Serialize};
use std::fmt;

/// All resources managed under one gateway class.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayResources {
    pub gateway_class: String,
    #[serde(default)]
    pub gateways: Vec<Gateway>,
    #[serde(default)]
    pub routes: Vec<HttpRoute>,
    #[serde(default)]
    pub backends: Vec<Backend>,
}

impl GatewayResources {
    pub fn new<S: Into<String>>(gateway_class: S) -> Self {
        Self { gateway_class: gateway_class.into(), ..Default::default() }
    }

    /// Routes attached to `gateway` through their parent reference.
    pub fn routes_for<'a>(&'a self, gateway: &'a Gateway) -> impl Iterator<Item = &'a HttpRoute> {
        let parent = gateway.key();
        self.routes.iter().filter(move |route| route.parent_key() == parent)
    }

    pub fn backend(&self, namespace: &str, name: &str) -> Option<&Backend> {
        self.backends.iter().find(|b| b.namespace == namespace && b.name == name)
    }
}

/// A gateway: a set of listeners served by one proxy fleet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Gateway {
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub listeners: Vec<Listener>,
}

impl Gateway {
    /// Stable identity used as the key of every downstream store.
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listener {
    pub name: String,
    pub port: u16,
    #[serde(default)]
    pub hostname: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRoute {
    pub namespace: String,
    pub name: String,
    /// Parent gateway as `namespace/name`; a bare name resolves in the
    /// route's own namespace.
    pub parent: String,
    #[serde(default)]
    pub hostnames: Vec<String>,
    #[serde(default)]
    pub rules: Vec<RouteRule>,
}

impl HttpRoute {
    pub fn parent_key(&self) -> String {
        if self.parent.contains('/') {
            self.parent.clone()
        } else {
            format!("{}/{}", self.namespace, self.parent)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRule {
    #[serde(default = "default_path_prefix")]
    pub path_prefix: String,
    /// Backend name in the route's namespace.
    pub backend: String,
    #[serde(default)]
    pub rate_limit: Option<RateLimitRule>,
}

fn default_path_prefix() -> String {
    "/".to_string()
}

/// Global rate limit applied to a route rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitRule {
    pub requests: u32,
    pub unit: RateLimitUnit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitUnit {
    Second,
    Minute,
    Hour,
    Day,
}

impl fmt::Display for RateLimitUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = match self {
            RateLimitUnit::Second => "second",
            RateLimitUnit::Minute => "minute",
            RateLimitUnit::Hour => "hour",
            RateLimitUnit::Day => "day",
        };
        write!(f, "{}", unit)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Backend {
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}
