//! Single-threaded cooperative pass execution
//!
//! One logical thread of control drives the engine a chunk at a time. Each tick
//! claims `ChunkSize` units, hands them to the engine, measures how long that
//! took and feeds the measurement to the [`ChunkBudgetController`]. Control goes
//! back to the host between ticks, so the host stays responsive for all but one
//! chunk's execution time.
//!
//! Hosts with their own event loop call [`CooperativePass::tick`] once per
//! frame. Hosts without one use the blocking [`PassExecutor`] implementation,
//! which ticks until the pass resolves and polls the display clock in between.

use crate::budget::{ChunkBudgetController, LatencyBand, TickMeasurement};
use crate::cancel::CancellationToken;
use crate::clock::{Clock, MonotonicClock};
use crate::config::SchedulerConfig;
use crate::engine::RenderEngine;
use crate::error::{ConfigError, SchedulerError};
use crate::pass::{PassContext, PassExecutor, PassOutcome, PassReport, PassSpec};
use crate::queue::{Claim, UnitGranularity, WorkQueue};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Lifecycle of a cooperative pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassState {
    /// Waiting for the next tick
    Idle,

    /// A chunk is executing
    Ticking,

    /// Every unit was issued and executed
    Complete,

    /// Stopped at a tick boundary; executed work is kept
    Cancelled,

    /// Aborted by a fatal engine error
    Failed,
}

impl PassState {
    /// Whether the pass has resolved
    pub fn is_terminal(&self) -> bool {
        matches!(self, PassState::Complete | PassState::Cancelled | PassState::Failed)
    }
}

/// Factory for cooperative passes
///
/// # Example
///
/// ```
/// use raypace_scheduler::{CooperativeScheduler, SchedulerConfig};
///
/// let scheduler = CooperativeScheduler::new(&SchedulerConfig::default()).unwrap();
/// assert_eq!(scheduler.initial_chunk_size(), 10);
/// ```
#[derive(Debug, Clone)]
pub struct CooperativeScheduler<C: Clock = MonotonicClock> {
    band: LatencyBand,
    initial_chunk_size: usize,
    granularity: UnitGranularity,
    clock: C,
}

impl CooperativeScheduler<MonotonicClock> {
    /// Create a scheduler measuring ticks against the wall clock
    pub fn new(config: &SchedulerConfig) -> Result<Self, ConfigError> {
        config.band.validate()?;
        if config.cooperative.initial_chunk_size == 0 {
            return Err(ConfigError::ZeroInitialChunk);
        }

        Ok(Self {
            band: config.band,
            initial_chunk_size: config.cooperative.initial_chunk_size,
            granularity: config.cooperative.granularity,
            clock: MonotonicClock,
        })
    }
}

impl<C: Clock> CooperativeScheduler<C> {
    /// Measure ticks with a different time source
    pub fn with_clock<C2: Clock>(self, clock: C2) -> CooperativeScheduler<C2> {
        CooperativeScheduler {
            band: self.band,
            initial_chunk_size: self.initial_chunk_size,
            granularity: self.granularity,
            clock,
        }
    }

    pub fn band(&self) -> &LatencyBand {
        &self.band
    }

    pub fn initial_chunk_size(&self) -> usize {
        self.initial_chunk_size
    }

    pub fn granularity(&self) -> UnitGranularity {
        self.granularity
    }

    /// Start a pass with a fresh queue and a fresh controller
    pub fn begin_pass(&self, spec: &PassSpec) -> Result<CooperativePass<C>, ConfigError> {
        let controller = ChunkBudgetController::new(self.band, self.initial_chunk_size)?;
        let queue = WorkQueue::new(spec.resolution, self.granularity);

        info!(
            pass = %spec.kind,
            width = spec.resolution.width,
            height = spec.resolution.height,
            units = queue.total(),
            "starting cooperative pass"
        );

        Ok(CooperativePass {
            report: PassReport::new(spec, queue.total()),
            spec: spec.clone(),
            queue,
            controller,
            clock: self.clock.clone(),
            state: PassState::Idle,
            started: self.clock.now(),
        })
    }
}

/// One pass in progress, advanced a tick at a time
pub struct CooperativePass<C: Clock = MonotonicClock> {
    spec: PassSpec,
    queue: WorkQueue,
    controller: ChunkBudgetController,
    clock: C,
    state: PassState,
    report: PassReport,
    started: Instant,
}

impl<C: Clock> CooperativePass<C> {
    /// Run one scheduling tick
    ///
    /// Cancellation is observed only here, before a chunk is claimed; a chunk
    /// already handed to the engine always finishes. Ticking a resolved pass
    /// is a no-op. A fatal engine error leaves the pass `Failed`.
    pub fn tick<E: RenderEngine>(
        &mut self,
        engine: &mut E,
        cancel: &CancellationToken,
    ) -> Result<PassState, SchedulerError> {
        if self.state.is_terminal() {
            return Ok(self.state);
        }
        if cancel.is_cancelled() {
            self.finish(PassState::Cancelled);
            return Ok(self.state);
        }

        self.state = PassState::Ticking;
        let units = match self.queue.claim_chunk(self.controller.chunk_size()) {
            Claim::Claimed(units) => units,
            Claim::Exhausted => {
                self.finish(PassState::Complete);
                return Ok(self.state);
            }
        };

        let start = self.clock.now();
        let result = engine.execute_chunk(&self.spec, &units);
        let elapsed = self.clock.now().saturating_duration_since(start);

        match result {
            Ok(()) => self.report.units_executed += units.len() as u64,
            Err(err) if !err.is_fatal() => {
                warn!(pass = %self.spec.kind, units = units.len(), error = %err, "chunk failed");
                self.report.units_failed += units.len() as u64;
            }
            Err(err) => {
                error!(pass = %self.spec.kind, error = %err, "aborting pass");
                self.state = PassState::Failed;
                self.report.elapsed = self.clock.now().saturating_duration_since(self.started);
                self.report.final_chunk_size = Some(self.controller.chunk_size());
                return Err(err.into());
            }
        }

        self.report.ticks += 1;
        let next = self
            .controller
            .observe(TickMeasurement::new(units.len(), elapsed));
        debug!(
            attempted = units.len(),
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            next,
            "tick"
        );

        if self.queue.is_exhausted() {
            self.finish(PassState::Complete);
        } else {
            self.state = PassState::Idle;
        }
        Ok(self.state)
    }

    pub fn state(&self) -> PassState {
        self.state
    }

    /// Whether every unit of the pass has been issued and executed
    pub fn is_complete(&self) -> bool {
        self.state == PassState::Complete
    }

    /// Chunk size the next tick will request
    pub fn chunk_size(&self) -> usize {
        self.controller.chunk_size()
    }

    pub fn spec(&self) -> &PassSpec {
        &self.spec
    }

    /// Fraction of units issued so far
    pub fn progress(&self) -> f64 {
        self.queue.progress()
    }

    /// Statistics so far; final once the pass has resolved
    pub fn into_report(mut self) -> PassReport {
        if !self.state.is_terminal() {
            self.report.elapsed = self.clock.now().saturating_duration_since(self.started);
            self.report.final_chunk_size = Some(self.controller.chunk_size());
        }
        self.report
    }

    fn finish(&mut self, state: PassState) {
        self.state = state;
        self.report.outcome = match state {
            PassState::Cancelled => PassOutcome::Cancelled,
            _ => PassOutcome::Completed,
        };
        self.report.elapsed = self.clock.now().saturating_duration_since(self.started);
        self.report.final_chunk_size = Some(self.controller.chunk_size());

        info!(
            pass = %self.spec.kind,
            outcome = ?self.report.outcome,
            executed = self.report.units_executed,
            failed = self.report.units_failed,
            ticks = self.report.ticks,
            in_band = self.controller.ticks_in_band(),
            elapsed_ms = self.report.elapsed.as_millis() as u64,
            "cooperative pass finished"
        );
    }
}

impl<E: RenderEngine, C: Clock> PassExecutor<E> for CooperativeScheduler<C> {
    fn execute_pass(
        &mut self,
        engine: &mut E,
        spec: &PassSpec,
        ctx: PassContext<'_>,
    ) -> Result<PassReport, SchedulerError> {
        let commits_before = ctx.display.commits();
        let mut pass = self.begin_pass(spec)?;

        loop {
            let state = pass.tick(engine, ctx.cancel)?;
            ctx.display.poll(self.clock.now(), engine)?;
            if state.is_terminal() {
                break;
            }
        }

        let mut report = pass.into_report();
        report.display_commits = ctx.display.commits() - commits_before;
        Ok(report)
    }
}
