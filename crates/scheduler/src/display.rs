//! Rate-limited display commits
//!
//! Display commits run on their own cadence, independent of how often compute
//! chunks complete. Whatever partial state the engine holds at commit time is
//! shown; the preview is never authoritative.

use crate::engine::RenderEngine;
use crate::error::EngineError;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Default commit period, roughly 30 commits per second
pub const DEFAULT_DISPLAY_PERIOD: Duration = Duration::from_millis(33);

/// Periodic display-commit clock
///
/// The first poll after [`start`](Self::start) commits immediately. Later polls
/// commit only once a full period has elapsed since the previous commit;
/// earlier polls are skipped.
#[derive(Debug, Clone)]
pub struct DisplayClock {
    period: Duration,
    last_commit: Option<Instant>,
    running: bool,
    commits: u64,
}

impl DisplayClock {
    /// Create a stopped clock
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            last_commit: None,
            running: false,
            commits: 0,
        }
    }

    pub fn start(&mut self) {
        self.running = true;
        self.last_commit = None;
    }

    /// Stop periodic commits; polls become no-ops
    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Total commits issued, periodic and forced
    pub fn commits(&self) -> u64 {
        self.commits
    }

    /// Whether a poll at `now` would commit
    pub fn is_due(&self, now: Instant) -> bool {
        if !self.running {
            return false;
        }
        match self.last_commit {
            Some(last) => now.saturating_duration_since(last) >= self.period,
            None => true,
        }
    }

    /// Commit if the clock is running and a period has elapsed
    ///
    /// Returns whether a commit happened. Transient commit failures are logged
    /// and count as a skipped commit.
    pub fn poll<E: RenderEngine>(&mut self, now: Instant, engine: &mut E) -> Result<bool, EngineError> {
        if !self.is_due(now) {
            return Ok(false);
        }

        self.last_commit = Some(now);
        match engine.commit_to_display() {
            Ok(()) => {
                self.commits += 1;
                debug!(commits = self.commits, "display commit");
                Ok(true)
            }
            Err(err) if !err.is_fatal() => {
                warn!(error = %err, "display commit skipped");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    /// Commit unconditionally, whether or not the clock is running
    pub fn commit_now<E: RenderEngine>(&mut self, now: Instant, engine: &mut E) -> Result<(), EngineError> {
        engine.commit_to_display()?;
        self.last_commit = Some(now);
        self.commits += 1;
        Ok(())
    }
}

impl Default for DisplayClock {
    fn default() -> Self {
        Self::new(DEFAULT_DISPLAY_PERIOD)
    }
}
