//! xDS translation
//!
//! Builds listener, route and cluster resources (in their JSON mapping) from
//! the xDS IR of one gateway, then lets `PostTranslateModify` hooks adjust
//! the result before it is published.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::Server;
use crate::domain::{ResourceKey, ResourceKind, ResourceStatus};
use crate::errors::{GatewayError, Result};
use crate::extension::{HookPoint, Manager};
use crate::ir;
use crate::message::{handle_subscription, Store, Update, Xds, XdsIr};
use crate::observability::metrics::TRANSLATION_ERRORS;
use crate::xds::resources::{
    BuiltResource, XdsResources, CLUSTER_TYPE_URL, LISTENER_TYPE_URL, ROUTE_TYPE_URL,
};

pub const NAME: &str = "xds-translator";

const HTTP_CONNECTION_MANAGER: &str = "envoy.filters.network.http_connection_manager";

/// Translate the IR of one gateway into xDS resources.
pub fn translate(ir: &ir::Xds) -> Result<XdsResources> {
    let mut resources = XdsResources::default();
    let mut bound = HashSet::new();
    let mut clusters: BTreeMap<&str, &ir::RouteDestination> = BTreeMap::new();

    for listener in &ir.http {
        if !bound.insert((listener.address.as_str(), listener.port)) {
            return Err(GatewayError::validation_field(
                format!(
                    "Listener '{}' conflicts with another listener on {}:{}",
                    listener.name, listener.address, listener.port
                ),
                "listeners.port",
            ));
        }

        resources.listeners.push(build_listener(listener));
        resources.routes.push(build_route_configuration(listener));
        for route in &listener.routes {
            clusters.entry(route.destination.name.as_str()).or_insert(&route.destination);
        }
    }

    resources.clusters = clusters.into_values().map(build_cluster).collect();
    Ok(resources)
}

fn build_listener(listener: &ir::HttpListener) -> BuiltResource {
    BuiltResource::new(
        &listener.name,
        LISTENER_TYPE_URL,
        json!({
            "name": listener.name,
            "address": {
                "socketAddress": { "address": listener.address, "portValue": listener.port }
            },
            "filterChains": [{
                "filters": [{
                    "name": HTTP_CONNECTION_MANAGER,
                    "typedConfig": {
                        "statPrefix": listener.name,
                        "rds": { "routeConfigName": listener.name }
                    }
                }]
            }]
        }),
    )
}

fn build_route_configuration(listener: &ir::HttpListener) -> BuiltResource {
    let mut virtual_hosts: BTreeMap<&str, Vec<Value>> = BTreeMap::new();
    for route in &listener.routes {
        let mut entry = json!({
            "name": route.name,
            "match": { "prefix": route.path_prefix },
            "route": { "cluster": route.destination.name }
        });
        if route.rate_limit.is_some() {
            entry["route"]["rateLimits"] = json!([{
                "actions": [{ "genericKey": { "descriptorValue": route.name } }]
            }]);
        }
        virtual_hosts.entry(route.hostname.as_str()).or_default().push(entry);
    }

    let virtual_hosts: Vec<Value> = virtual_hosts
        .into_iter()
        .map(|(hostname, routes)| {
            json!({
                "name": format!("{}/{}", listener.name, hostname),
                "domains": [hostname],
                "routes": routes
            })
        })
        .collect();

    BuiltResource::new(
        &listener.name,
        ROUTE_TYPE_URL,
        json!({ "name": listener.name, "virtualHosts": virtual_hosts }),
    )
}

fn build_cluster(destination: &ir::RouteDestination) -> BuiltResource {
    let endpoints: Vec<Value> = destination
        .endpoints
        .iter()
        .map(|endpoint| {
            json!({
                "endpoint": {
                    "address": {
                        "socketAddress": { "address": endpoint.host, "portValue": endpoint.port }
                    }
                }
            })
        })
        .collect();

    BuiltResource::new(
        &destination.name,
        CLUSTER_TYPE_URL,
        json!({
            "name": destination.name,
            "type": "STRICT_DNS",
            "connectTimeout": "5s",
            "loadAssignment": {
                "clusterName": destination.name,
                "endpoints": [{ "lbEndpoints": endpoints }]
            }
        }),
    )
}

/// Status key of the gateway identified by `namespace/name`.
fn gateway_status_key(key: &str) -> ResourceKey {
    let (namespace, name) = key.split_once('/').unwrap_or(("", key));
    ResourceKey::new(ResourceKind::Gateway, namespace, name)
}

pub struct Config {
    pub server: Server,
    pub xds_ir: XdsIr,
    pub xds: Xds,
    /// Translation failures per gateway. Written only by this runner.
    pub xds_statuses: Store<ResourceKey, ResourceStatus>,
    pub extension_manager: Option<Arc<Manager>>,
}

pub struct Runner {
    config: Config,
}

impl Runner {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

#[async_trait]
impl crate::runner::Runner for Runner {
    fn name(&self) -> &str {
        NAME
    }

    async fn start(&self, ctx: CancellationToken) -> Result<()> {
        let subscription = self.config.xds_ir.subscribe();
        let xds = self.config.xds.clone();
        let statuses = self.config.xds_statuses.clone();
        let manager = self.config.extension_manager.clone();

        self.config.server.tasks.spawn(async move {
            handle_subscription(NAME, &ctx, subscription, |update| {
                let xds = xds.clone();
                let statuses = statuses.clone();
                let manager = manager.clone();
                async move { handle_update(update, &xds, &statuses, manager.as_deref()).await }
            })
            .await;
        });
        Ok(())
    }
}

async fn handle_update(
    update: Update<String, ir::Xds>,
    xds: &Xds,
    statuses: &Store<ResourceKey, ResourceStatus>,
    manager: Option<&Manager>,
) -> Result<()> {
    let Some(ir) = update.value else {
        xds.delete(&update.key);
        statuses.delete(&gateway_status_key(&update.key));
        return Ok(());
    };

    let translated = match translate(&ir) {
        Ok(resources) => resources,
        Err(e) => {
            reject(statuses, &update.key, "XdsTranslationFailed", &e);
            return Ok(());
        }
    };

    let resources = match manager {
        Some(manager) if manager.has_hooks(HookPoint::PostTranslateModify) => {
            match manager.invoke_typed(HookPoint::PostTranslateModify, &translated).await {
                Ok(modified) => modified,
                Err(e) => {
                    reject(statuses, &update.key, "ExtensionError", &e);
                    return Ok(());
                }
            }
        }
        _ => translated,
    };

    debug!(gateway = %update.key, resources = resources.len(), "Translated xDS resources");
    statuses.delete(&gateway_status_key(&update.key));
    xds.update(update.key, resources);
    Ok(())
}

fn reject(
    statuses: &Store<ResourceKey, ResourceStatus>,
    gateway: &str,
    reason: &str,
    error: &GatewayError,
) {
    counter!(TRANSLATION_ERRORS, "runner" => NAME).increment(1);
    warn!(gateway, reason, error = %error, "xDS translation failed");
    statuses.update(gateway_status_key(gateway), ResourceStatus::rejected(reason, error.to_string()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Endpoint;

    fn listener(name: &str, port: u16) -> ir::HttpListener {
        ir::HttpListener {
            name: name.into(),
            address: "0.0.0.0".into(),
            port,
            hostnames: vec![],
            routes: vec![ir::HttpRoute {
                name: format!("{}-route", name),
                hostname: "*".into(),
                path_prefix: "/".into(),
                destination: ir::RouteDestination {
                    name: "backend/default/svc".into(),
                    endpoints: vec![Endpoint { host: "10.0.0.1".into(), port: 80 }],
                },
                rate_limit: None,
            }],
        }
    }

    #[test]
    fn test_translate_builds_all_resource_types() {
        let ir = ir::Xds { http: vec![listener("default/web/http", 8080), listener("default/web/alt", 8081)] };
        let resources = translate(&ir).unwrap();

        assert_eq!(resources.listeners.len(), 2);
        assert_eq!(resources.routes.len(), 2);
        // both listeners share one backend
        assert_eq!(resources.clusters.len(), 1);
        assert_eq!(
            resources.listeners[0].body["address"]["socketAddress"]["portValue"],
            json!(8080)
        );
        assert_eq!(
            resources.routes[0].body["virtualHosts"][0]["routes"][0]["route"]["cluster"],
            json!("backend/default/svc")
        );
    }

    #[test]
    fn test_translate_rejects_port_conflicts() {
        let ir = ir::Xds { http: vec![listener("a", 8080), listener("b", 8080)] };
        assert!(matches!(translate(&ir), Err(GatewayError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_failure_becomes_status_and_nothing_is_published() {
        let xds: Xds = Store::new("xds");
        let statuses = Store::new("statuses");
        let update = Update {
            key: "default/web".to_string(),
            value: Some(Arc::new(ir::Xds { http: vec![listener("a", 80), listener("b", 80)] })),
        };

        handle_update(update, &xds, &statuses, None).await.unwrap();

        assert!(xds.is_empty());
        let status = statuses.get(&gateway_status_key("default/web")).unwrap();
        assert_eq!(status.conditions[0].reason, "XdsTranslationFailed");
    }

    #[tokio::test]
    async fn test_failure_status_is_cleared_by_success_and_deletion() {
        let xds: Xds = Store::new("xds");
        let statuses = Store::new("statuses");
        let key = gateway_status_key("default/web");
        let update = |http| Update {
            key: "default/web".to_string(),
            value: Some(Arc::new(ir::Xds { http })),
        };

        handle_update(update(vec![listener("a", 80), listener("b", 80)]), &xds, &statuses, None)
            .await
            .unwrap();
        assert!(statuses.get(&key).is_some());

        handle_update(update(vec![listener("a", 80)]), &xds, &statuses, None).await.unwrap();
        assert!(statuses.get(&key).is_none());
        assert_eq!(xds.len(), 1);

        handle_update(update(vec![listener("a", 80), listener("b", 80)]), &xds, &statuses, None)
            .await
            .unwrap();
        assert!(statuses.get(&key).is_some());
        // the last good translation stays published
        assert_eq!(xds.len(), 1);

        let deleted = Update { key: "default/web".to_string(), value: None };
        handle_update(deleted, &xds, &statuses, None).await.unwrap();
        assert!(statuses.is_empty());
        assert!(xds.is_empty());
    }

    #[test]
    fn test_gateway_status_key() {
        let key = gateway_status_key("default/web");
        assert_eq!(key.namespace, "default");
        assert_eq!(key.name, "web");
    }
}
