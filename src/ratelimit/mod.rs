//! # Global Rate Limiting
//!
//! Generates rate-limit service configuration from the routes of each
//! gateway that carry a global rate limit.

pub mod runner;

pub use runner::{Config, RateLimitCache, Runner};

use serde::{Deserialize, Serialize};

use crate::domain::RateLimitUnit;
use crate::ir;

/// Descriptor key matching the `genericKey` action emitted on routes.
pub const GENERIC_KEY: &str = "generic_key";

/// Rate-limit service configuration for one gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitServiceConfig {
    pub name: String,
    pub domain: String,
    pub descriptors: Vec<Descriptor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    pub key: String,
    pub value: String,
    pub rate_limit: RateLimitPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    pub unit: RateLimitUnit,
    pub requests_per_unit: u32,
}

impl RateLimitServiceConfig {
    /// Render in the rate-limit service's YAML format.
    pub fn to_yaml(&self) -> crate::errors::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// Build the configuration for `gateway`, or `None` when none of its routes
/// is rate limited.
pub fn translate(gateway: &str, domain: &str, ir: &ir::Xds) -> Option<RateLimitServiceConfig> {
    let mut descriptors: Vec<Descriptor> = ir
        .rate_limited_routes()
        .filter_map(|(_, route)| {
            let limit = route.rate_limit.as_ref()?;
            Some(Descriptor {
                key: GENERIC_KEY.to_string(),
                value: route.name.clone(),
                rate_limit: RateLimitPolicy { unit: limit.unit, requests_per_unit: limit.requests },
            })
        })
        .collect();

    if descriptors.is_empty() {
        return None;
    }
    // a route attached to several hostnames yields one descriptor
    descriptors.sort_by(|a, b| a.value.cmp(&b.value));
    descriptors.dedup_by(|a, b| a.value == b.value);

    Some(RateLimitServiceConfig { name: gateway.to_string(), domain: domain.to_string(), descriptors })
}
