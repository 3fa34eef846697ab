//! Raypace Scheduler Library
//!
//! Adaptive pass scheduling for progressive renderers.
//!
//! This crate sizes and distributes rendering work so that a host stays
//! responsive while an external engine fills in an image. A feedback
//! controller keeps each scheduling tick inside a target latency band, a
//! shared work queue hands out every unit of a pass exactly once, and a
//! progressive escalator runs a cheap preview followed by full-fidelity
//! passes. Passes run either cooperatively on the host thread or across a
//! pool of worker threads.
//!
//! # Example
//!
//! ```
//! use raypace_scheduler::{
//!     CancellationToken, DisplayClock, EngineError, EngineOptions, PassContext,
//!     PassExecutor, PassKind, PassSpec, RenderEngine, CooperativeScheduler,
//!     SchedulerConfig, WorkUnit,
//! };
//!
//! #[derive(Default)]
//! struct CountingEngine {
//!     executed: usize,
//! }
//!
//! impl RenderEngine for CountingEngine {
//!     fn init_engine(_scene: &str, _options: &EngineOptions) -> Result<Self, EngineError> {
//!         Ok(Self::default())
//!     }
//!     fn execute_chunk(&mut self, _pass: &PassSpec, units: &[WorkUnit]) -> Result<(), EngineError> {
//!         self.executed += units.len();
//!         Ok(())
//!     }
//!     fn commit_to_display(&mut self) -> Result<(), EngineError> {
//!         Ok(())
//!     }
//!     fn resize(&mut self, _width: u32, _height: u32) -> Result<(), EngineError> {
//!         Ok(())
//!     }
//!     fn rescan(&mut self) -> Result<(), EngineError> {
//!         Ok(())
//!     }
//! }
//!
//! let options = EngineOptions::new(32, 16, 1);
//! let mut engine = CountingEngine::init_engine("scene", &options).unwrap();
//! let mut scheduler = CooperativeScheduler::new(&SchedulerConfig::default()).unwrap();
//!
//! let spec = PassSpec::new(PassKind::Full(1), options.resolution(), 1, 1);
//! let mut display = DisplayClock::default();
//! let cancel = CancellationToken::new();
//!
//! let report = scheduler
//!     .execute_pass(&mut engine, &spec, PassContext { display: &mut display, cancel: &cancel })
//!     .unwrap();
//!
//! assert!(report.is_complete());
//! assert_eq!(engine.executed, 32 * 16);
//! ```

pub mod budget;
mod cancel;
mod clock;
mod config;
mod cooperative;
mod display;
mod engine;
mod error;
mod pass;
mod progressive;
mod queue;
mod worker;

#[cfg(test)]
mod testing;

// Re-export public API
pub use budget::{next_chunk_size, ChunkBudgetController, LatencyBand, TickMeasurement};
pub use cancel::CancellationToken;
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{
    default_pool_size, CooperativeConfig, DisplayConfig, PoolConfig, ProgressiveConfig,
    SchedulerConfig,
};
pub use cooperative::{CooperativePass, CooperativeScheduler, PassState};
pub use display::{DisplayClock, DEFAULT_DISPLAY_PERIOD};
pub use engine::{EngineOptions, ParallelEngine, RenderEngine, RenderTask, SharedTarget};
pub use error::{ConfigError, EngineError, SchedulerError};
pub use pass::{PassContext, PassExecutor, PassKind, PassOutcome, PassReport, PassSpec};
pub use progressive::{EscalationReport, EscalatorState, ProgressiveEscalator};
pub use queue::{Claim, Resolution, UnitGranularity, WorkQueue, WorkUnit};
pub use worker::{Directive, WorkerEvent, WorkerPool};
