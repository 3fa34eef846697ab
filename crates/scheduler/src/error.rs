//! Error types for pass scheduling.
//!
//! Three layers of failure exist: configuration rejected before a pass starts,
//! faults raised by the external rendering engine, and scheduler-level failures
//! such as a worker that terminates with an error.

use std::io;

/// Errors raised while loading or validating a [`SchedulerConfig`](crate::SchedulerConfig).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Latency band bounds are not ordered `0 < min <= mid <= max`
    #[error("invalid latency band: min={min}ms mid={mid}ms max={max}ms")]
    InvalidBand { min: f64, mid: f64, max: f64 },

    #[error("initial chunk size must be at least 1")]
    ZeroInitialChunk,

    #[error("worker pool size must be at least 1")]
    ZeroPoolSize,

    #[error("pool poll interval must be non-zero")]
    ZeroPollInterval,

    #[error("max_passes must be at least 1")]
    ZeroMaxPasses,

    #[error("display period must be non-zero")]
    ZeroDisplayPeriod,

    #[error("preview divisor must be at least 1")]
    ZeroPreviewDivisor,

    /// A value from the environment could not be parsed
    #[error("invalid value for configuration key: {0}")]
    InvalidValue(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("config serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Faults reported by the external rendering engine.
///
/// `Unit` failures are transient: the scheduler logs them, counts the affected
/// units as failed and keeps going. `Fatal` failures abort the pass.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("unit execution failed: {reason}")]
    Unit { reason: String },

    #[error("engine failure: {reason}")]
    Fatal { reason: String },
}

impl EngineError {
    /// Transient failure for a single unit or chunk
    pub fn unit(reason: impl Into<String>) -> Self {
        Self::Unit {
            reason: reason.into(),
        }
    }

    /// Non-recoverable engine failure
    pub fn fatal(reason: impl Into<String>) -> Self {
        Self::Fatal {
            reason: reason.into(),
        }
    }

    /// Whether this error must abort the pass
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. })
    }
}

/// Errors surfaced to the caller of a pass.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    /// A worker reported a terminal error; the pool still drained and resolved
    #[error("worker {worker} failed: {reason}")]
    WorkerFailed { worker: usize, reason: String },

    /// Workers disappeared without reporting a terminal status
    #[error("{remaining} worker(s) exited without reporting a terminal status")]
    WorkerLost { remaining: usize },

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] io::Error),
}
