use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const CLUSTER_TYPE_URL: &str = "type.googleapis.com/envoy.config.cluster.v3.Cluster";
pub const ROUTE_TYPE_URL: &str = "type.googleapis.com/envoy.config.route.v3.RouteConfiguration";
pub const LISTENER_TYPE_URL: &str = "type.googleapis.com/envoy.config.listener.v3.Listener";

/// Wrapper for a built Envoy resource along with its name.
///
/// The body is the resource in its JSON mapping; encoding for the wire is the
/// xDS server's concern.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BuiltResource {
    pub name: String,
    pub type_url: String,
    pub body: Value,
}

impl BuiltResource {
    pub fn new<N: Into<String>>(name: N, type_url: &str, body: Value) -> Self {
        Self { name: name.into(), type_url: type_url.to_string(), body }
    }
}

/// Complete xDS resource set for one gateway.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct XdsResources {
    pub listeners: Vec<BuiltResource>,
    pub routes: Vec<BuiltResource>,
    pub clusters: Vec<BuiltResource>,
}

impl XdsResources {
    /// Resources grouped by type URL.
    pub fn by_type(&self) -> [(&'static str, &[BuiltResource]); 3] {
        [
            (LISTENER_TYPE_URL, self.listeners.as_slice()),
            (ROUTE_TYPE_URL, self.routes.as_slice()),
            (CLUSTER_TYPE_URL, self.clusters.as_slice()),
        ]
    }

    pub fn len(&self) -> usize {
        self.listeners.len() + self.routes.len() + self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mutable access to the resources of `type_url`, if it is known.
    pub fn resources_mut(&mut self, type_url: &str) -> Option<&mut Vec<BuiltResource>> {
        match type_url {
            LISTENER_TYPE_URL => Some(&mut self.listeners),
            ROUTE_TYPE_URL => Some(&mut self.routes),
            CLUSTER_TYPE_URL => Some(&mut self.clusters),
            _ => None,
        }
    }
}
