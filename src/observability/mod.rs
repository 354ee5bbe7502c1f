//! # Observability
//!
//! Structured logging and metric registration for the flowgate control plane.

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, log_config_info};
pub use metrics::describe_metrics;
