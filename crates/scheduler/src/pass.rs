//! Pass descriptors and the executor contract
//!
//! A pass is one full traversal of the work queue at fixed fidelity. Both the
//! cooperative scheduler and the worker pool execute passes through the same
//! [`PassExecutor`] contract, so the escalator can use either.

use crate::cancel::CancellationToken;
use crate::display::DisplayClock;
use crate::error::SchedulerError;
use crate::queue::Resolution;
use std::fmt;
use std::time::Duration;

/// Which stage of progressive rendering a pass belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassKind {
    /// Reduced resolution and sample count
    Preview,

    /// Full-fidelity pass number `k`, starting at 1
    Full(u32),
}

impl fmt::Display for PassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PassKind::Preview => write!(f, "preview"),
            PassKind::Full(k) => write!(f, "full pass {}", k),
        }
    }
}

/// Immutable parameters of one pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassSpec {
    pub kind: PassKind,
    pub resolution: Resolution,
    pub samples_per_unit: u32,
    /// Number of full passes the escalator may run in total
    pub max_passes: u32,
}

impl PassSpec {
    pub fn new(kind: PassKind, resolution: Resolution, samples_per_unit: u32, max_passes: u32) -> Self {
        Self {
            kind,
            resolution,
            samples_per_unit,
            max_passes,
        }
    }
}

/// How a pass resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// Every unit was claimed and executed
    Completed,

    /// Cancelled at a boundary; work already done is kept
    Cancelled,
}

/// Statistics for a finished pass
#[derive(Debug, Clone, PartialEq)]
pub struct PassReport {
    pub kind: PassKind,
    pub outcome: PassOutcome,
    pub units_total: u64,
    pub units_executed: u64,
    /// Units whose execution raised a transient error
    pub units_failed: u64,
    /// Scheduling ticks (cooperative passes only)
    pub ticks: u64,
    /// Chunk size the controller settled on (cooperative passes only)
    pub final_chunk_size: Option<usize>,
    /// Workers that took part (pool passes only)
    pub workers: usize,
    /// `Ready` reports received from workers (pool passes only)
    pub workers_ready: usize,
    /// `Done` reports received from workers (pool passes only)
    pub workers_done: usize,
    pub display_commits: u64,
    pub elapsed: Duration,
}

impl PassReport {
    pub(crate) fn new(spec: &PassSpec, units_total: u64) -> Self {
        Self {
            kind: spec.kind,
            outcome: PassOutcome::Completed,
            units_total,
            units_executed: 0,
            units_failed: 0,
            ticks: 0,
            final_chunk_size: None,
            workers: 0,
            workers_ready: 0,
            workers_done: 0,
            display_commits: 0,
            elapsed: Duration::ZERO,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.outcome == PassOutcome::Completed
    }

    /// Units attempted, successful or not
    pub fn units_attempted(&self) -> u64 {
        self.units_executed + self.units_failed
    }
}

/// Per-pass collaborators handed to an executor
pub struct PassContext<'a> {
    /// Periodic display commit, polled between units of work
    pub display: &'a mut DisplayClock,

    /// Checked only at the executor's boundaries
    pub cancel: &'a CancellationToken,
}

/// Strategy that runs one pass against an engine
pub trait PassExecutor<E> {
    fn execute_pass(
        &mut self,
        engine: &mut E,
        spec: &PassSpec,
        ctx: PassContext<'_>,
    ) -> Result<PassReport, SchedulerError>;
}
