//! Gateway API translation
//!
//! Turns one resource bag into per-gateway xDS and infrastructure IR plus the
//! statuses of every gateway and route it touched.

use std::collections::{BTreeMap, HashSet};

use crate::domain::{
    Gateway, GatewayResources, HttpRoute, Listener, ResourceKey, ResourceKind, ResourceStatus,
};
use crate::ir;

/// Default bind address for generated listeners.
const LISTENER_ADDRESS: &str = "0.0.0.0";

/// Result of translating a resource bag. Keys are gateway identities.
#[derive(Debug, Default)]
pub struct Translation {
    pub xds_ir: BTreeMap<String, ir::Xds>,
    pub infra_ir: BTreeMap<String, ir::Infra>,
    pub statuses: Vec<(ResourceKey, ResourceStatus)>,
}

impl Translation {
    pub fn gateway_keys(&self) -> HashSet<String> {
        self.xds_ir.keys().chain(self.infra_ir.keys()).cloned().collect()
    }
}

pub fn translate(resources: &GatewayResources) -> Translation {
    let mut translation = Translation::default();
    let gateway_keys: HashSet<String> = resources.gateways.iter().map(Gateway::key).collect();

    for gateway in &resources.gateways {
        let key = gateway.key();
        let status_key = ResourceKey::new(ResourceKind::Gateway, &gateway.namespace, &gateway.name);

        if gateway.listeners.is_empty() {
            translation.statuses.push((
                status_key,
                ResourceStatus::rejected("NoListeners", "Gateway defines no listeners"),
            ));
            continue;
        }

        let mut http = Vec::with_capacity(gateway.listeners.len());
        for listener in &gateway.listeners {
            let mut ir_listener = ir::HttpListener {
                name: format!("{}/{}", key, listener.name),
                address: LISTENER_ADDRESS.to_string(),
                port: listener.port,
                hostnames: listener.hostname.iter().cloned().collect(),
                routes: Vec::new(),
            };
            for route in resources.routes_for(gateway) {
                translate_route(resources, listener, route, &mut ir_listener);
            }
            http.push(ir_listener);
        }

        translation.infra_ir.insert(key.clone(), infra_for(gateway));
        translation.xds_ir.insert(key, ir::Xds { http });
        translation.statuses.push((status_key, ResourceStatus::accepted()));
    }

    for route in &resources.routes {
        let status_key = ResourceKey::new(ResourceKind::HttpRoute, &route.namespace, &route.name);
        let status = if !gateway_keys.contains(&route.parent_key()) {
            ResourceStatus::rejected(
                "NoMatchingParent",
                format!("Parent gateway '{}' not found", route.parent_key()),
            )
        } else if let Some(missing) = route
            .rules
            .iter()
            .find(|rule| resources.backend(&route.namespace, &rule.backend).is_none())
        {
            ResourceStatus::rejected(
                "BackendNotFound",
                format!("Backend '{}/{}' not found", route.namespace, missing.backend),
            )
        } else {
            ResourceStatus::accepted()
        };
        translation.statuses.push((status_key, status));
    }

    translation
}

/// Hostnames a route serves on `listener`. Empty when they do not intersect.
fn effective_hostnames(listener: &Listener, route: &HttpRoute) -> Vec<String> {
    match &listener.hostname {
        Some(hostname) if route.hostnames.is_empty() || route.hostnames.contains(hostname) => {
            vec![hostname.clone()]
        }
        Some(_) => Vec::new(),
        None if route.hostnames.is_empty() => vec!["*".to_string()],
        None => route.hostnames.clone(),
    }
}

fn translate_route(
    resources: &GatewayResources,
    listener: &Listener,
    route: &HttpRoute,
    out: &mut ir::HttpListener,
) {
    let hostnames = effective_hostnames(listener, route);

    for (index, rule) in route.rules.iter().enumerate() {
        let Some(backend) = resources.backend(&route.namespace, &rule.backend) else {
            continue;
        };
        for hostname in &hostnames {
            out.routes.push(ir::HttpRoute {
                name: format!("httproute/{}/{}/rule/{}", route.namespace, route.name, index),
                hostname: hostname.clone(),
                path_prefix: rule.path_prefix.clone(),
                destination: ir::RouteDestination {
                    name: format!("backend/{}/{}", backend.namespace, backend.name),
                    endpoints: backend.endpoints.clone(),
                },
                rate_limit: rule.rate_limit.clone(),
            });
        }
    }
}

fn infra_for(gateway: &Gateway) -> ir::Infra {
    let mut seen = HashSet::new();
    let listeners = gateway
        .listeners
        .iter()
        .filter(|listener| seen.insert(listener.port))
        .map(|listener| ir::ProxyListener { name: listener.name.clone(), port: listener.port })
        .collect();

    ir::Infra {
        proxy: ir::ProxyInfra {
            name: format!("flowgate-{}-{}", gateway.namespace, gateway.name),
            namespace: gateway.namespace.clone(),
            listeners,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Backend, Endpoint, RouteRule};

    fn bag() -> GatewayResources {
        GatewayResources {
            gateway_class: "eg".into(),
            gateways: vec![Gateway {
                namespace: "default".into(),
                name: "web".into(),
                listeners: vec![
                    Listener { name: "http".into(), port: 8080, hostname: None },
                    Listener { name: "admin".into(), port: 8081, hostname: Some("admin.local".into()) },
                ],
            }],
            routes: vec![HttpRoute {
                namespace: "default".into(),
                name: "api".into(),
                parent: "web".into(),
                hostnames: vec!["api.local".into()],
                rules: vec![RouteRule {
                    path_prefix: "/api".into(),
                    backend: "api-svc".into(),
                    rate_limit: None,
                }],
            }],
            backends: vec![Backend {
                namespace: "default".into(),
                name: "api-svc".into(),
                endpoints: vec![Endpoint { host: "10.0.0.1".into(), port: 9000 }],
            }],
        }
    }

    fn status_of<'a>(translation: &'a Translation, kind: ResourceKind, name: &str) -> &'a ResourceStatus {
        &translation
            .statuses
            .iter()
            .find(|(key, _)| key.kind == kind && key.name == name)
            .unwrap()
            .1
    }

    #[test]
    fn test_translate_produces_ir_per_gateway() {
        let translation = translate(&bag());

        let xds = &translation.xds_ir["default/web"];
        assert_eq!(xds.http.len(), 2);
        assert_eq!(xds.http[0].name, "default/web/http");
        assert_eq!(xds.http[0].routes.len(), 1);
        assert_eq!(xds.http[0].routes[0].hostname, "api.local");
        assert_eq!(xds.http[0].routes[0].destination.endpoints.len(), 1);
        // route hostnames do not intersect the admin listener hostname
        assert!(xds.http[1].routes.is_empty());

        let infra = &translation.infra_ir["default/web"];
        assert_eq!(infra.proxy.ports().collect::<Vec<_>>(), vec![8080, 8081]);

        assert!(status_of(&translation, ResourceKind::Gateway, "web").is_ready());
        assert!(status_of(&translation, ResourceKind::HttpRoute, "api").is_ready());
    }

    #[test]
    fn test_missing_backend_rejects_route() {
        let mut resources = bag();
        resources.backends.clear();
        let translation = translate(&resources);

        assert!(translation.xds_ir["default/web"].http[0].routes.is_empty());
        let status = status_of(&translation, ResourceKind::HttpRoute, "api");
        assert_eq!(status.conditions[0].reason, "BackendNotFound");
    }

    #[test]
    fn test_orphan_route_and_empty_gateway_are_rejected() {
        let mut resources = bag();
        resources.routes[0].parent = "other/web".into();
        resources.gateways[0].listeners.clear();
        let translation = translate(&resources);

        assert!(translation.gateway_keys().is_empty());
        assert_eq!(
            status_of(&translation, ResourceKind::Gateway, "web").conditions[0].reason,
            "NoListeners"
        );
        assert_eq!(
            status_of(&translation, ResourceKind::HttpRoute, "api").conditions[0].reason,
            "NoMatchingParent"
        );
    }
}
