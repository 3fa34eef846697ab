//! In-crate test doubles for the engine seams

use crate::cancel::CancellationToken;
use crate::clock::ManualClock;
use crate::engine::{EngineOptions, ParallelEngine, RenderEngine, RenderTask, SharedTarget};
use crate::error::EngineError;
use crate::pass::{PassKind, PassSpec};
use crate::queue::{Resolution, WorkUnit};
use rand::Rng;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Engine whose execution cost is charged to a shared [`ManualClock`]
pub(crate) struct SyntheticEngine {
    pub clock: ManualClock,
    pub cost_per_unit: Duration,
    pub resolution: Resolution,
    pub executed: Vec<(PassKind, WorkUnit)>,
    /// Size of every chunk handed to `execute_chunk`, in call order
    pub chunks: Vec<usize>,
    /// Chunk call index -> error returned instead of executing
    pub chunk_failures: HashMap<usize, EngineError>,
    pub commits: u64,
    pub commit_error: Option<EngineError>,
    pub resizes: Vec<Resolution>,
    pub rescans: u32,
    /// Cancel the token while executing the first chunk of this pass
    pub cancel_during: Option<(PassKind, CancellationToken)>,
    pub target: Arc<CountingTarget>,
}

impl SyntheticEngine {
    pub fn new() -> Self {
        Self {
            clock: ManualClock::new(),
            cost_per_unit: Duration::from_millis(5),
            resolution: Resolution::new(8, 8),
            executed: Vec::new(),
            chunks: Vec::new(),
            chunk_failures: HashMap::new(),
            commits: 0,
            commit_error: None,
            resizes: Vec::new(),
            rescans: 0,
            cancel_during: None,
            target: Arc::new(CountingTarget::new()),
        }
    }

    pub fn with_cost(mut self, cost_per_unit: Duration) -> Self {
        self.cost_per_unit = cost_per_unit;
        self
    }

    pub fn with_clock(mut self, clock: ManualClock) -> Self {
        self.clock = clock;
        self
    }

    /// Units executed during passes of `kind`
    pub fn executed_in(&self, kind: PassKind) -> Vec<WorkUnit> {
        self.executed
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, unit)| *unit)
            .collect()
    }
}

impl RenderEngine for SyntheticEngine {
    fn init_engine(scene_description: &str, options: &EngineOptions) -> Result<Self, EngineError> {
        if scene_description.trim().is_empty() {
            return Err(EngineError::fatal("empty scene description"));
        }
        let mut engine = Self::new();
        engine.resolution = options.resolution();
        Ok(engine)
    }

    fn execute_chunk(&mut self, pass: &PassSpec, units: &[WorkUnit]) -> Result<(), EngineError> {
        let index = self.chunks.len();
        self.chunks.push(units.len());
        self.clock.advance(self.cost_per_unit * units.len() as u32);

        if let Some((kind, token)) = &self.cancel_during {
            if *kind == pass.kind {
                token.cancel();
            }
        }

        if let Some(err) = self.chunk_failures.remove(&index) {
            return Err(err);
        }

        self.executed.extend(units.iter().map(|unit| (pass.kind, *unit)));
        Ok(())
    }

    fn commit_to_display(&mut self) -> Result<(), EngineError> {
        if let Some(err) = &self.commit_error {
            return Err(err.clone());
        }
        self.commits += 1;
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), EngineError> {
        self.resolution = Resolution::new(width, height);
        self.resizes.push(self.resolution);
        Ok(())
    }

    fn rescan(&mut self) -> Result<(), EngineError> {
        self.rescans += 1;
        Ok(())
    }
}

impl ParallelEngine for SyntheticEngine {
    type Target = CountingTarget;

    fn shared_target(&self) -> Arc<CountingTarget> {
        self.target.clone()
    }
}

/// Shared target that records which worker executed which unit
pub(crate) struct CountingTarget {
    pub executed: Mutex<Vec<(usize, PassKind, WorkUnit)>>,
    /// Upper bound of the per-unit sleep
    pub delay: Duration,
    /// Sleep a random fraction of `delay` instead of all of it
    pub jitter: bool,
    pub fail_on: Option<(WorkUnit, EngineError)>,
    pub panic_on: Option<WorkUnit>,
    pub cancel_during: Option<(PassKind, CancellationToken)>,
}

impl CountingTarget {
    pub fn new() -> Self {
        Self {
            executed: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
            jitter: false,
            fail_on: None,
            panic_on: None,
            cancel_during: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration, jitter: bool) -> Self {
        self.delay = delay;
        self.jitter = jitter;
        self
    }

    pub fn failing_on(mut self, unit: WorkUnit, err: EngineError) -> Self {
        self.fail_on = Some((unit, err));
        self
    }

    pub fn panicking_on(mut self, unit: WorkUnit) -> Self {
        self.panic_on = Some(unit);
        self
    }

    pub fn cancelling_during(mut self, kind: PassKind, token: CancellationToken) -> Self {
        self.cancel_during = Some((kind, token));
        self
    }

    pub fn executed(&self) -> Vec<(usize, PassKind, WorkUnit)> {
        self.executed.lock().unwrap().clone()
    }

    pub fn executed_in(&self, kind: PassKind) -> Vec<WorkUnit> {
        self.executed()
            .into_iter()
            .filter(|(_, k, _)| *k == kind)
            .map(|(_, _, unit)| unit)
            .collect()
    }
}

impl SharedTarget for CountingTarget {
    fn execute_unit(&self, task: &RenderTask, unit: WorkUnit) -> Result<(), EngineError> {
        if !self.delay.is_zero() {
            let sleep = if self.jitter {
                self.delay.mul_f64(rand::thread_rng().gen_range(0.0..1.0))
            } else {
                self.delay
            };
            thread::sleep(sleep);
        }

        if let Some((kind, token)) = &self.cancel_during {
            if *kind == task.pass.kind {
                token.cancel();
            }
        }

        if self.panic_on == Some(unit) {
            panic!("synthetic panic on {:?}", unit);
        }
        if let Some((failing, err)) = &self.fail_on {
            if *failing == unit {
                return Err(err.clone());
            }
        }

        self.executed
            .lock()
            .unwrap()
            .push((task.worker, task.pass.kind, unit));
        Ok(())
    }
}
