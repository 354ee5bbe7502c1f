//! The stores making up the pipeline topology.

use std::sync::Arc;

use crate::domain::{GatewayResources, ResourceKey, ResourceStatus};
use crate::ir;
use crate::message::Store;
use crate::xds::resources::XdsResources;

/// Resolved provider resources keyed by gateway class, plus the status
/// write-back path keyed by resource identity. All stores close together.
///
/// Each status store has a single writer: `statuses` belongs to the gateway
/// API translator, `xds_statuses` to the xDS translator. The xDS translator
/// only records failures, which take precedence over the gateway API status.
#[derive(Debug, Clone)]
pub struct ProviderResources {
    pub resources: Store<String, GatewayResources>,
    pub statuses: Store<ResourceKey, ResourceStatus>,
    pub xds_statuses: Store<ResourceKey, ResourceStatus>,
}

impl ProviderResources {
    pub fn new() -> Self {
        Self {
            resources: Store::new("provider-resources"),
            statuses: Store::new("resource-statuses"),
            xds_statuses: Store::new("xds-statuses"),
        }
    }

    /// The status to report for `key`, if any.
    pub fn effective_status(&self, key: &ResourceKey) -> Option<Arc<ResourceStatus>> {
        self.xds_statuses.get(key).or_else(|| self.statuses.get(key))
    }

    pub fn close(&self) {
        self.resources.close();
        self.statuses.close();
        self.xds_statuses.close();
    }

    pub fn is_closed(&self) -> bool {
        self.resources.is_closed() && self.statuses.is_closed() && self.xds_statuses.is_closed()
    }
}

impl Default for ProviderResources {
    fn default() -> Self {
        Self::new()
    }
}

/// xDS IR keyed by gateway (`namespace/name`).
pub type XdsIr = Store<String, ir::Xds>;

/// Infra IR keyed by gateway (`namespace/name`).
pub type InfraIr = Store<String, ir::Infra>;

/// Translated xDS resources keyed by gateway (`namespace/name`).
pub type Xds = Store<String, XdsResources>;

/// The four pipeline stores, one per edge.
#[derive(Debug, Clone)]
pub struct Channels {
    pub provider_resources: ProviderResources,
    pub xds_ir: XdsIr,
    pub infra_ir: InfraIr,
    pub xds: Xds,
}

impl Channels {
    pub fn new() -> Self {
        Self {
            provider_resources: ProviderResources::new(),
            xds_ir: Store::new("xds-ir"),
            infra_ir: Store::new("infra-ir"),
            xds: Store::new("xds"),
        }
    }

    /// Close every store. Order is not significant.
    pub fn close_all(&self) {
        self.provider_resources.close();
        self.xds_ir.close();
        self.infra_ir.close();
        self.xds.close();
    }

    pub fn all_closed(&self) -> bool {
        self.provider_resources.is_closed()
            && self.xds_ir.is_closed()
            && self.infra_ir.is_closed()
            && self.xds.is_closed()
    }
}

impl Default for Channels {
    fn default() -> Self {
        Self::new()
    }
}
