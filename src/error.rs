use thiserror::Error;

/// Error taxonomy for every fallible surface in the controller. Callers
/// that only need to propagate use `anyhow::Result` at task boundaries;
/// callers that branch on the failure mode match on this enum.
#[derive(Debug, Error)]
pub enum EdgeError {
    #[error("fieldbus transport error on {register}: {source}")]
    Transport {
        register: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("fieldbus response did not match the expected schema: {0}")]
    SchemaMismatch(String),

    #[error("cache entry '{0}' is stale and has no fallback")]
    CacheStale(String),

    #[error("hard safety violation: {0}")]
    SafetyHard(String),

    #[error("thermal safety violation: {0}")]
    SafetyThermal(String),

    #[error("invalid grid state transition: {from} -> {to}")]
    StateTransitionInvalid { from: String, to: String },

    #[error("durable store is full or unwritable: {0}")]
    PersistentStoreFull(String),

    #[error("messaging broker unavailable: {0}")]
    BrokerUnavailable(String),

    #[error("watchdog timeout: no heartbeat for {elapsed_s:.1}s (limit {limit_s:.1}s)")]
    WatchdogTimeout { elapsed_s: f64, limit_s: f64 },
}

pub type EdgeResult<T> = std::result::Result<T, EdgeError>;
