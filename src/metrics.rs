//! Thin recording interface over the `metrics` crate's macros.
//! Exposition (a Prometheus endpoint) is out of scope here; only the
//! call sites that record values live in this crate. A binary that
//! wants scraping installs `metrics-exporter-prometheus`'s recorder
//! before calling any of these.

#[cfg(feature = "metrics")]
pub fn record_cycle_duration(seconds: f64) {
    metrics::histogram!("bess_cycle_duration_seconds").record(seconds);
}

#[cfg(feature = "metrics")]
pub fn record_fieldbus_error(register: &str) {
    metrics::counter!("bess_fieldbus_errors_total", "register" => register.to_string()).increment(1);
}

#[cfg(feature = "metrics")]
pub fn record_safety_violation(kind: &str) {
    metrics::counter!("bess_safety_violations_total", "kind" => kind.to_string()).increment(1);
}

#[cfg(feature = "metrics")]
pub fn set_grid_state(state: &str) {
    metrics::gauge!("bess_grid_state_info", "state" => state.to_string()).set(1.0);
}

#[cfg(not(feature = "metrics"))]
pub fn record_cycle_duration(_seconds: f64) {}
#[cfg(not(feature = "metrics"))]
pub fn record_fieldbus_error(_register: &str) {}
#[cfg(not(feature = "metrics"))]
pub fn record_safety_violation(_kind: &str) {}
#[cfg(not(feature = "metrics"))]
pub fn set_grid_state(_state: &str) {}
