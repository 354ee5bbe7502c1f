//! Common test utilities for all integration tests.
//!
//! Provides configuration builders, resource fixtures and polling helpers
//! shared by the pipeline and supervisor suites.

#![allow(dead_code)]

use std::path::Path;
use std::time::Duration;

use flowgate::config::{GatewayConfig, RateLimitConfig};
use flowgate::domain::{
    Backend, Endpoint, Gateway, GatewayResources, HttpRoute, Listener, RateLimitRule,
    RateLimitUnit, RouteRule,
};

/// Configuration suitable for an in-process pipeline: loopback xDS address,
/// proxy descriptors under `output_dir` and a short drain timeout.
pub fn test_config(output_dir: &Path) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.xds_server.host = "127.0.0.1".to_string();
    config.infrastructure.output_dir = output_dir.to_path_buf();
    config.shutdown.drain_timeout_seconds = 2;
    config
}

pub fn with_rate_limit(mut config: GatewayConfig) -> GatewayConfig {
    config.rate_limit = Some(RateLimitConfig { domain: "flowgate".to_string() });
    config
}

/// One gateway `default/eg` with a single listener and a rate-limited route
/// to backend `default/web`.
pub fn sample_resources() -> GatewayResources {
    let mut resources = GatewayResources::new("eg");
    resources.gateways.push(Gateway {
        namespace: "default".into(),
        name: "eg".into(),
        listeners: vec![Listener { name: "http".into(), port: 8080, hostname: None }],
    });
    resources.routes.push(HttpRoute {
        namespace: "default".into(),
        name: "web".into(),
        parent: "eg".into(),
        hostnames: vec!["www.example.com".into()],
        rules: vec![RouteRule {
            path_prefix: "/".into(),
            backend: "web".into(),
            rate_limit: Some(RateLimitRule { requests: 10, unit: RateLimitUnit::Minute }),
        }],
    });
    resources.backends.push(Backend {
        namespace: "default".into(),
        name: "web".into(),
        endpoints: vec![Endpoint { host: "10.0.0.10".into(), port: 8080 }],
    });
    resources
}

/// The same resources as [`sample_resources`] in resource-file form.
pub const SAMPLE_RESOURCES_YAML: &str = r#"
- gatewayClass: eg
  gateways:
    - namespace: default
      name: eg
      listeners:
        - name: http
          port: 8080
  routes:
    - namespace: default
      name: web
      parent: eg
      hostnames: ["www.example.com"]
      rules:
        - pathPrefix: /
          backend: web
          rateLimit:
            requests: 10
            unit: minute
  backends:
    - namespace: default
      name: web
      endpoints:
        - host: 10.0.0.10
          port: 8080
"#;

/// Poll `check` until it holds, panicking after `within`.
pub async fn eventually<F: FnMut() -> bool>(within: Duration, mut check: F) {
    let result = tokio::time::timeout(within, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(result.is_ok(), "condition not met within {:?}", within);
}
