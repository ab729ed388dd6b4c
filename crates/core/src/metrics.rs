//! Metric names and descriptions
//!
//! Every metric the harness records is named here. Call sites use the
//! constants with `metrics::counter!()` / `metrics::histogram!()`.
//!
//! # Naming
//!
//! - prefix: `ozone_harness_`
//! - suffix: `_total` (counter), `_seconds` (histogram)

// ─── label keys ───────────────────────────────────────────────────

/// Lifecycle script name (start.sh, stop-demo.sh, ...)
pub const LABEL_SCRIPT: &str = "script";

/// App id (openmrs, odoo, keycloak)
pub const LABEL_APP: &str = "app";

/// Outcome (success, failure, timeout)
pub const LABEL_RESULT: &str = "result";

// ─── scripts ──────────────────────────────────────────────────────

/// Script executions by script and result (counter)
pub const SCRIPT_RUNS_TOTAL: &str = "ozone_harness_script_runs_total";

/// Script wall-clock duration (histogram, seconds)
pub const SCRIPT_DURATION_SECONDS: &str = "ozone_harness_script_duration_seconds";

// ─── readiness ────────────────────────────────────────────────────

/// Health probes by app and result (counter)
pub const PROBES_TOTAL: &str = "ozone_harness_probes_total";

/// Time spent waiting for readiness (histogram, seconds)
pub const READINESS_WAIT_SECONDS: &str = "ozone_harness_readiness_wait_seconds";

// ─── workspace ────────────────────────────────────────────────────

/// Workspace preparations (counter)
pub const WORKSPACE_PREPARATIONS_TOTAL: &str = "ozone_harness_workspace_preparations_total";

/// Files that could not be removed during cleanup (counter)
pub const WORKSPACE_CLEANUP_FAILURES_TOTAL: &str = "ozone_harness_workspace_cleanup_failures_total";

/// Registers descriptions for every metric. Call once after installing a
/// recorder.
pub fn describe_all() {
    use metrics::{describe_counter, describe_histogram};

    describe_counter!(
        SCRIPT_RUNS_TOTAL,
        "Lifecycle script executions by script and result"
    );
    describe_histogram!(
        SCRIPT_DURATION_SECONDS,
        "Lifecycle script wall-clock duration in seconds"
    );
    describe_counter!(PROBES_TOTAL, "Health probes by app and result");
    describe_histogram!(
        READINESS_WAIT_SECONDS,
        "Time spent waiting for all apps to become ready"
    );
    describe_counter!(
        WORKSPACE_PREPARATIONS_TOTAL,
        "Workspace directories prepared"
    );
    describe_counter!(
        WORKSPACE_CLEANUP_FAILURES_TOTAL,
        "Workspace entries that could not be removed during cleanup"
    );
}
