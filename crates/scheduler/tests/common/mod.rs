#![allow(dead_code)]

use rand::Rng;
use raypace_scheduler::{
    CancellationToken, EngineError, EngineOptions, ManualClock, ParallelEngine, PassKind, PassSpec,
    RenderEngine, RenderTask, Resolution, SharedTarget, WorkUnit,
};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Engine with a constant per-unit cost charged to a manual clock
pub struct MockEngine {
    pub clock: ManualClock,
    pub cost_per_unit: Duration,
    pub resolution: Resolution,
    pub executed: Vec<(PassKind, WorkUnit)>,
    pub commits: u64,
    pub rescans: u32,
    pub cancel_during: Option<(PassKind, CancellationToken)>,
    pub target: Arc<MockTarget>,
}

impl MockEngine {
    pub fn new(clock: ManualClock, cost_per_unit: Duration) -> Self {
        Self {
            clock,
            cost_per_unit,
            resolution: Resolution::new(1, 1),
            executed: Vec::new(),
            commits: 0,
            rescans: 0,
            cancel_during: None,
            target: Arc::new(MockTarget::new(Duration::ZERO)),
        }
    }

    pub fn count(&self, kind: PassKind) -> usize {
        self.executed.iter().filter(|(k, _)| *k == kind).count()
    }
}

impl RenderEngine for MockEngine {
    fn init_engine(_scene: &str, options: &EngineOptions) -> Result<Self, EngineError> {
        let mut engine = Self::new(ManualClock::new(), Duration::from_millis(1));
        engine.resolution = options.resolution();
        Ok(engine)
    }

    fn execute_chunk(&mut self, pass: &PassSpec, units: &[WorkUnit]) -> Result<(), EngineError> {
        self.clock.advance(self.cost_per_unit * units.len() as u32);
        if let Some((kind, token)) = &self.cancel_during {
            if *kind == pass.kind {
                token.cancel();
            }
        }
        self.executed.extend(units.iter().map(|u| (pass.kind, *u)));
        Ok(())
    }

    fn commit_to_display(&mut self) -> Result<(), EngineError> {
        self.commits += 1;
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), EngineError> {
        self.resolution = Resolution::new(width, height);
        Ok(())
    }

    fn rescan(&mut self) -> Result<(), EngineError> {
        self.rescans += 1;
        Ok(())
    }
}

impl ParallelEngine for MockEngine {
    type Target = MockTarget;

    fn shared_target(&self) -> Arc<MockTarget> {
        self.target.clone()
    }
}

/// Shared render target logging `(worker, unit)` pairs
pub struct MockTarget {
    pub log: Mutex<Vec<(usize, WorkUnit)>>,
    pub max_delay: Duration,
}

impl MockTarget {
    pub fn new(max_delay: Duration) -> Self {
        Self {
            log: Mutex::new(Vec::new()),
            max_delay,
        }
    }

    pub fn log(&self) -> Vec<(usize, WorkUnit)> {
        self.log.lock().unwrap().clone()
    }
}

impl SharedTarget for MockTarget {
    fn execute_unit(&self, task: &RenderTask, unit: WorkUnit) -> Result<(), EngineError> {
        if !self.max_delay.is_zero() {
            let fraction = rand::thread_rng().gen_range(0.0..1.0);
            thread::sleep(self.max_delay.mul_f64(fraction));
        }
        self.log.lock().unwrap().push((task.worker, unit));
        Ok(())
    }
}
