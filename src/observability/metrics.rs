//! # Metrics Collection
//!
//! Metric names and descriptions for the pipeline. Metrics are recorded
//! through the `metrics` facade; exporting them is left to whichever recorder
//! the embedding process installs.

use metrics::{describe_counter, describe_gauge, gauge, Unit};

pub const STORE_UPDATES: &str = "message_store_updates_total";
pub const STORE_SUBSCRIPTIONS: &str = "message_store_subscriptions_total";
pub const RUNNER_STARTS: &str = "runner_starts_total";
pub const RUNNER_UPDATE_ERRORS: &str = "runner_update_errors_total";
pub const TRANSLATION_ERRORS: &str = "translation_errors_total";
pub const LEADER: &str = "leader_elected";

/// Register descriptions so exporters show metrics before events occur.
pub fn describe_metrics() {
    describe_counter!(STORE_UPDATES, Unit::Count, "Message store writes grouped by store and operation");
    describe_counter!(STORE_SUBSCRIPTIONS, Unit::Count, "Message store subscriptions opened");
    describe_counter!(RUNNER_STARTS, Unit::Count, "Runners that completed setup");
    describe_counter!(
        RUNNER_UPDATE_ERRORS,
        Unit::Count,
        "Store updates a runner failed to process"
    );
    describe_counter!(
        TRANSLATION_ERRORS,
        Unit::Count,
        "Translations rejected and surfaced as resource status"
    );
    describe_gauge!(LEADER, "1 when this replica holds the leader lease");
}

/// Record whether this replica is the elected leader.
pub fn record_leadership(elected: bool) {
    gauge!(LEADER).set(if elected { 1.0 } else { 0.0 });
}
