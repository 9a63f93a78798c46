use serde_json::Value;
use tracing::{debug, error, info};

/// Safety predicate: must hold at every evaluation. A violation is the
/// headline finding of a run; it is logged, never thrown.
pub fn always(condition: bool, property: &str, details: Value) {
    if condition {
        debug!(target: "sdk::assert", kind = "always", property, %details, "pass");
    } else {
        error!(target: "sdk::assert", kind = "always", property, %details, "VIOLATION");
    }
}

/// Liveness predicate: must hold at least once across the run.
pub fn sometimes(condition: bool, property: &str, details: Value) {
    if condition {
        info!(target: "sdk::assert", kind = "sometimes", property, %details, "reached");
    } else {
        debug!(target: "sdk::assert", kind = "sometimes", property, %details, "not reached");
    }
}

/// Marks a code path as reached, unconditionally.
pub fn reachable(property: &str, details: Value) {
    sometimes(true, property, details);
}

/// Signals the simulator that setup finished and fault injection may begin.
pub fn setup_complete(details: Value) {
    info!(target: "sdk::lifecycle", %details, "setup complete");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // The wrappers must never panic or early-return regardless of outcome;
    // the log stream is the only observable surface.
    #[test]
    fn assertion_wrappers_are_infallible() {
        always(true, "holds", json!({"n": 1}));
        always(false, "violated", json!({"n": 2}));
        sometimes(true, "reached", json!({}));
        sometimes(false, "pending", json!({}));
        reachable("marker", json!({"phase": "test"}));
        setup_complete(json!({"nodes": 3}));
    }
}
