//! Progressive fidelity escalation
//!
//! Renders a scene in stages:
//! 1. A preview pass at reduced resolution and sample count, for immediate
//!    visual feedback
//! 2. Full-resolution passes, each accumulating another independent set of
//!    samples, up to `max_passes`
//!
//! Cancellation is honored only at full-pass boundaries. A pass that has
//! started always runs to completion, so the image on screen is never a
//! half-accumulated pass.

use crate::cancel::CancellationToken;
use crate::config::SchedulerConfig;
use crate::display::DisplayClock;
use crate::engine::{EngineOptions, RenderEngine};
use crate::error::{ConfigError, SchedulerError};
use crate::pass::{PassContext, PassExecutor, PassKind, PassReport, PassSpec};
use crate::queue::Resolution;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Escalation stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalatorState {
    /// Reduced-fidelity pass (also the state before `run`)
    Preview,

    /// Full-fidelity pass `k`, starting at 1
    FullPass(u32),

    /// Final commit issued and display clock stopped
    Done,
}

/// Outcome of a complete escalation
#[derive(Debug, Clone, PartialEq)]
pub struct EscalationReport {
    /// Every pass run, preview first
    pub passes: Vec<PassReport>,

    /// Whether escalation stopped early on a cancellation request
    pub cancelled: bool,

    pub elapsed: Duration,
}

impl EscalationReport {
    /// Number of full-fidelity passes that ran
    pub fn full_passes(&self) -> usize {
        self.passes
            .iter()
            .filter(|p| matches!(p.kind, PassKind::Full(_)))
            .count()
    }
}

/// Drives an engine from preview to full fidelity through a pass executor
///
/// The executor decides how each pass is run: a
/// [`CooperativeScheduler`](crate::CooperativeScheduler) on the host thread or
/// a [`WorkerPool`](crate::WorkerPool) across threads.
pub struct ProgressiveEscalator<E, X> {
    engine: E,
    executor: X,
    options: EngineOptions,
    max_passes: u32,
    preview_divisor: u32,
    preview_samples_per_unit: u32,
    display: DisplayClock,
    cancel: CancellationToken,
    state: EscalatorState,
}

impl<E, X> ProgressiveEscalator<E, X>
where
    E: RenderEngine,
    X: PassExecutor<E>,
{
    /// Wrap an already initialised engine
    pub fn new(
        engine: E,
        executor: X,
        options: EngineOptions,
        config: &SchedulerConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            engine,
            executor,
            options,
            max_passes: config.progressive.max_passes,
            preview_divisor: config.progressive.preview_divisor,
            preview_samples_per_unit: config.progressive.preview_samples_per_unit,
            display: DisplayClock::new(config.display.period()),
            cancel: CancellationToken::new(),
            state: EscalatorState::Preview,
        })
    }

    /// Initialise an engine for `scene_description` and wrap it
    pub fn launch(
        scene_description: &str,
        options: EngineOptions,
        executor: X,
        config: &SchedulerConfig,
    ) -> Result<Self, SchedulerError> {
        config.validate()?;
        let engine = E::init_engine(scene_description, &options)?;
        Ok(Self::new(engine, executor, options, config)?)
    }

    /// Token that stops escalation at the next full-pass boundary
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> EscalatorState {
        self.state
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn into_engine(self) -> E {
        self.engine
    }

    pub fn display(&self) -> &DisplayClock {
        &self.display
    }

    pub fn preview_spec(&self) -> PassSpec {
        PassSpec::new(
            PassKind::Preview,
            self.options.resolution().scaled_down(self.preview_divisor),
            self.preview_samples_per_unit,
            self.max_passes,
        )
    }

    pub fn full_spec(&self, pass: u32) -> PassSpec {
        PassSpec::new(
            PassKind::Full(pass),
            self.options.resolution(),
            self.options.samples_per_unit,
            self.max_passes,
        )
    }

    /// Run the preview and every full pass, blocking until `Done`
    ///
    /// The display clock runs for the whole escalation and is stopped on
    /// every exit path, including errors.
    pub fn run(&mut self) -> Result<EscalationReport, SchedulerError> {
        let started = Instant::now();
        let mut passes = Vec::new();

        self.display.start();
        let escalated = self.escalate(&mut passes);
        self.display.stop();
        let cancelled = escalated?;

        self.state = EscalatorState::Done;
        self.display.commit_now(Instant::now(), &mut self.engine)?;

        let report = EscalationReport {
            passes,
            cancelled,
            elapsed: started.elapsed(),
        };
        info!(
            passes = report.passes.len(),
            cancelled,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "scene rendered"
        );
        Ok(report)
    }

    /// Returns whether escalation stopped on cancellation
    fn escalate(&mut self, passes: &mut Vec<PassReport>) -> Result<bool, SchedulerError> {
        let preview = self.preview_spec();
        self.state = EscalatorState::Preview;
        self.resize_to(preview.resolution)?;
        passes.push(self.run_pass(&preview)?);

        let full = self.options.resolution();
        self.resize_to(full)?;
        let mut pass = 1;
        loop {
            self.state = EscalatorState::FullPass(pass);
            if pass > 1 {
                self.engine.rescan()?;
            }
            let spec = self.full_spec(pass);
            passes.push(self.run_pass(&spec)?);

            if self.cancel.is_cancelled() {
                info!(completed = pass, max_passes = self.max_passes, "escalation cancelled");
                return Ok(true);
            }
            if pass >= self.max_passes {
                return Ok(false);
            }
            pass += 1;
        }
    }

    fn run_pass(&mut self, spec: &PassSpec) -> Result<PassReport, SchedulerError> {
        // A fresh token per pass: the escalator's own token never preempts a pass
        let pass_cancel = CancellationToken::new();
        let report = self.executor.execute_pass(
            &mut self.engine,
            spec,
            PassContext {
                display: &mut self.display,
                cancel: &pass_cancel,
            },
        )?;

        if report.units_failed > 0 {
            warn!(pass = %spec.kind, failed = report.units_failed, "pass finished with failed units");
        }
        Ok(report)
    }

    fn resize_to(&mut self, resolution: Resolution) -> Result<(), SchedulerError> {
        debug!(width = resolution.width, height = resolution.height, "resizing engine");
        self.engine.resize(resolution.width, resolution.height)?;
        Ok(())
    }
}
