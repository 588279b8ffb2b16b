//! Metrics for group state transitions
//!
//! Recorded through the `metrics` facade; the library installs no exporter.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Instant;

pub const MODIFY_APPLIED: &str = "group.modify.applied";
pub const MODIFY_CONFLICT: &str = "group.modify.conflict";
pub const MODIFY_REJECTED: &str = "group.modify.rejected";
pub const MODIFY_DURATION_MS: &str = "group.modify.duration_ms";
pub const GROUPS_CONSTRUCTED: &str = "group.constructed";

/// Initialize metrics with descriptions
pub fn init_metrics() {
    describe_counter!(MODIFY_APPLIED, "Number of committed group changes");
    describe_counter!(
        MODIFY_CONFLICT,
        "Number of modify calls rejected by the version precondition"
    );
    describe_counter!(
        MODIFY_REJECTED,
        "Number of modify calls aborted by an error, labelled by kind"
    );
    describe_histogram!(MODIFY_DURATION_MS, "Group modify duration in milliseconds");
    describe_counter!(GROUPS_CONSTRUCTED, "Number of groups constructed");
}

/// Record a counter metric
pub fn record_counter(name: &'static str, value: u64) {
    counter!(name).increment(value);
}

/// Record a rejected modify call
pub fn record_rejection(kind: &'static str) {
    counter!(MODIFY_REJECTED, "kind" => kind).increment(1);
}

/// Timer for measuring operation duration
pub struct Timer {
    name: &'static str,
    start: Instant,
}

impl Timer {
    pub fn new(name: &'static str) -> Self {
        Self { name, start: Instant::now() }
    }

    /// Stop the timer and record the duration
    pub fn stop(self) {
        let duration = self.start.elapsed();
        histogram!(self.name).record(duration.as_secs_f64() * 1000.0);
    }
}
