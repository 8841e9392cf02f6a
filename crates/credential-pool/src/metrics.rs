//! Pool metrics
//!
//! Emitted through the `metrics` facade; whoever embeds the pool decides
//! whether to install a recorder.
//!
//! - `credential_pool_selections_total` (counter)
//! - `credential_pool_no_capacity_total` (counter)
//! - `credential_pool_outcomes_total` (counter): label `result`
//! - `credential_pool_transitions_total` (counter): label `kind`

/// Record an account handed out by `select()`.
pub fn record_selection() {
    metrics::counter!("credential_pool_selections_total").increment(1);
}

/// Record a `select()` call that found nothing eligible.
pub fn record_no_capacity() {
    metrics::counter!("credential_pool_no_capacity_total").increment(1);
}

/// Record a reported outcome.
pub fn record_outcome(success: bool) {
    let result = if success { "success" } else { "failure" };
    metrics::counter!("credential_pool_outcomes_total", "result" => result).increment(1);
}

/// Record a failure-driven state transition (`cooldown` or `auto_disable`).
pub fn record_transition(kind: &'static str) {
    metrics::counter!("credential_pool_transitions_total", "kind" => kind).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle, PrometheusRecorder};

    #[test]
    fn record_functions_do_not_panic_without_recorder() {
        record_selection();
        record_no_capacity();
        record_outcome(true);
        record_transition("cooldown");
    }

    /// Isolated recorder/handle pair; `install_recorder()` would claim the
    /// process-wide singleton.
    fn isolated_recorder() -> (PrometheusRecorder, PrometheusHandle) {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        (recorder, handle)
    }

    #[test]
    fn counters_render_with_labels() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_selection();
        record_selection();
        record_no_capacity();
        record_outcome(true);
        record_outcome(false);
        record_transition("auto_disable");

        let output = handle.render();
        assert!(
            output.contains("credential_pool_selections_total 2"),
            "selections counter missing, got:\n{output}"
        );
        assert!(output.contains("credential_pool_no_capacity_total 1"));
        assert!(output.contains("result=\"success\""));
        assert!(output.contains("result=\"failure\""));
        assert!(output.contains("kind=\"auto_disable\""));
    }
}
