//! Metric descriptions.
//!
//! The library only records through the `metrics` facade; installing an
//! exporter is the embedding application's job. Call
//! [`register_metric_descriptions`] once after the recorder is installed.

use metrics::{describe_counter, describe_gauge, gauge};

/// Counter names recorded by this crate.
pub const ERRORS_TOTAL: &str = "portal_errors_total";
pub const EVENTS_EMITTED_TOTAL: &str = "portal_events_emitted_total";
pub const ACCESS_DECISIONS_TOTAL: &str = "portal_access_decisions_total";
pub const INIT_ATTEMPTS_TOTAL: &str = "portal_init_attempts_total";
pub const BOOTSTRAP_DEGRADED_TOTAL: &str = "portal_bootstrap_degraded_total";

/// Gauge name for the session manager state.
pub const SESSION_STATE: &str = "portal_session_state";

pub fn register_metric_descriptions() {
    describe_counter!(ERRORS_TOTAL, "Errors created, by code and category");
    describe_counter!(EVENTS_EMITTED_TOTAL, "Lifecycle events emitted, by event name");
    describe_counter!(ACCESS_DECISIONS_TOTAL, "Page access decisions, by outcome");
    describe_counter!(INIT_ATTEMPTS_TOTAL, "Session initialization attempts");
    describe_counter!(
        BOOTSTRAP_DEGRADED_TOTAL,
        "Page bootstraps that stopped waiting for the session and ran unauthenticated"
    );
    describe_gauge!(
        SESSION_STATE,
        "Session manager state (0=uninitialized, 1=initializing, 2=ready, 3=failed)"
    );
}

/// Record the session manager state gauge.
pub fn record_session_state(state: crate::session::InitState) {
    use crate::session::InitState;

    let value = match state {
        InitState::Uninitialized => 0.0,
        InitState::Initializing => 1.0,
        InitState::Ready => 2.0,
        InitState::Failed => 3.0,
    };
    gauge!(SESSION_STATE).set(value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::InitState;

    #[test]
    fn test_recording_without_exporter_is_a_no_op() {
        register_metric_descriptions();
        for state in [InitState::Uninitialized, InitState::Ready, InitState::Failed] {
            record_session_state(state);
        }
    }
}
