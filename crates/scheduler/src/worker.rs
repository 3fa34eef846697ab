//! Worker pool for parallel pass execution.
//!
//! Each pass spawns a set of worker threads that pull units from one shared
//! [`WorkQueue`]. Lifecycle coordination is pure message passing: a worker
//! announces itself with [`WorkerEvent::Ready`], the controller answers with a
//! [`Directive::Render`] carrying a data-only [`RenderTask`], and the worker
//! claims and executes units until the queue is exhausted, then reports
//! [`WorkerEvent::Done`]. The pass resolves once every worker has reported a
//! terminal status.
//!
//! Workers never share anything beyond the queue and the engine's
//! [`SharedTarget`]; units are disjoint, so the target needs no lock.

use crate::cancel::CancellationToken;
use crate::config::{PoolConfig, SchedulerConfig};
use crate::display::DisplayClock;
use crate::engine::{ParallelEngine, RenderEngine, RenderTask, SharedTarget};
use crate::error::{ConfigError, SchedulerError};
use crate::pass::{PassContext, PassExecutor, PassOutcome, PassReport, PassSpec};
use crate::queue::{Claim, UnitGranularity, WorkQueue};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Messages from a worker to the pool controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    /// Worker started and is waiting for a directive
    Ready { worker: usize },

    /// Queue exhausted or pass cancelled; terminal
    Done {
        worker: usize,
        executed: u64,
        failed: u64,
    },

    /// Worker stopped on a fatal engine error or a panic; terminal
    Error {
        worker: usize,
        reason: String,
        executed: u64,
        failed: u64,
    },
}

impl WorkerEvent {
    pub fn worker(&self) -> usize {
        match self {
            WorkerEvent::Ready { worker }
            | WorkerEvent::Done { worker, .. }
            | WorkerEvent::Error { worker, .. } => *worker,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, WorkerEvent::Ready { .. })
    }
}

/// Messages from the pool controller to a worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Start claiming units for this task
    Render(RenderTask),

    /// Exit without claiming anything
    Stop,
}

/// One spawned worker thread and its directive channel
struct WorkerHandle {
    id: usize,
    thread: JoinHandle<()>,
    directives: Sender<Directive>,
}

#[derive(Debug, Default, Clone, Copy)]
struct WorkerStats {
    executed: u64,
    failed: u64,
}

/// Running totals while the controller waits on its workers
#[derive(Debug, Default)]
struct PoolTally {
    live: usize,
    ready: usize,
    done: usize,
    executed: u64,
    failed: u64,
    failure: Option<SchedulerError>,
}

impl PoolTally {
    fn fail(&mut self, err: SchedulerError) {
        if self.failure.is_none() {
            self.failure = Some(err);
        }
    }
}

/// Parallel pass executor
///
/// # Example
///
/// ```
/// use raypace_scheduler::{SchedulerConfig, WorkerPool};
///
/// let mut config = SchedulerConfig::default();
/// config.pool.workers = Some(3);
///
/// let pool = WorkerPool::new(&config).unwrap();
/// assert_eq!(pool.size(), 3);
/// ```
#[derive(Debug, Clone)]
pub struct WorkerPool {
    size: usize,
    poll_interval: Duration,
    granularity: UnitGranularity,
}

impl WorkerPool {
    /// Create a pool from the `pool` section of the configuration
    pub fn new(config: &SchedulerConfig) -> Result<Self, ConfigError> {
        Self::from_pool_config(&config.pool)
    }

    pub fn from_pool_config(config: &PoolConfig) -> Result<Self, ConfigError> {
        let size = config.resolved_workers();
        if size == 0 {
            return Err(ConfigError::ZeroPoolSize);
        }
        if config.poll_interval_ms == 0 {
            return Err(ConfigError::ZeroPollInterval);
        }

        Ok(Self {
            size,
            poll_interval: config.poll_interval(),
            granularity: config.granularity,
        })
    }

    /// Number of workers spawned per pass
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn granularity(&self) -> UnitGranularity {
        self.granularity
    }

    fn spawn_workers<T: SharedTarget>(
        &self,
        queue: &Arc<WorkQueue>,
        target: &Arc<T>,
        stop: &[CancellationToken; 2],
        events: &Sender<WorkerEvent>,
    ) -> Result<Vec<WorkerHandle>, SchedulerError> {
        let mut handles = Vec::with_capacity(self.size);

        for id in 0..self.size {
            let (directive_tx, directive_rx) = mpsc::channel();
            let queue = queue.clone();
            let target = target.clone();
            let worker_stop = stop.clone();
            let events = events.clone();

            let spawned = thread::Builder::new()
                .name(format!("raypace-worker-{}", id))
                .spawn(move || run_worker(id, &queue, &*target, &worker_stop, &events, &directive_rx));

            match spawned {
                Ok(thread) => handles.push(WorkerHandle {
                    id,
                    thread,
                    directives: directive_tx,
                }),
                Err(err) => {
                    error!(worker = id, error = %err, "failed to spawn worker");
                    // Already-running workers see their directive channel close and exit
                    stop[1].cancel();
                    join_workers(handles);
                    return Err(SchedulerError::Spawn(err));
                }
            }
        }

        Ok(handles)
    }

    /// Wait for every worker to report a terminal status
    ///
    /// Wakes at least once per poll interval to poll the display clock, so
    /// completion is detected with bounded latency and without busy-waiting.
    fn collect<E: RenderEngine>(
        &self,
        events: &Receiver<WorkerEvent>,
        directives: &[Sender<Directive>],
        spec: &PassSpec,
        display: &mut DisplayClock,
        engine: &mut E,
        abort: &CancellationToken,
    ) -> PoolTally {
        let mut tally = PoolTally {
            live: directives.len(),
            ..PoolTally::default()
        };
        let mut display_failed = false;

        while tally.live > 0 {
            match events.recv_timeout(self.poll_interval) {
                Ok(WorkerEvent::Ready { worker }) => {
                    tally.ready += 1;
                    debug!(worker, "worker ready");
                    let directive = if abort.is_cancelled() {
                        Directive::Stop
                    } else {
                        Directive::Render(RenderTask {
                            worker,
                            pass: spec.clone(),
                        })
                    };
                    if let Some(tx) = directives.get(worker) {
                        // A closed channel means the worker is gone; disconnection catches it
                        let _ = tx.send(directive);
                    }
                }
                Ok(WorkerEvent::Done {
                    worker,
                    executed,
                    failed,
                }) => {
                    tally.live = tally.live.saturating_sub(1);
                    tally.done += 1;
                    tally.executed += executed;
                    tally.failed += failed;
                    debug!(worker, executed, failed, live = tally.live, "worker done");
                }
                Ok(WorkerEvent::Error {
                    worker,
                    reason,
                    executed,
                    failed,
                }) => {
                    tally.live = tally.live.saturating_sub(1);
                    tally.executed += executed;
                    tally.failed += failed;
                    error!(worker, reason = %reason, live = tally.live, "worker failed");
                    tally.fail(SchedulerError::WorkerFailed { worker, reason });
                }
                Err(RecvTimeoutError::Timeout) => {
                    debug!(live = tally.live, "waiting on workers");
                }
                Err(RecvTimeoutError::Disconnected) => {
                    error!(remaining = tally.live, "workers exited without reporting");
                    tally.fail(SchedulerError::WorkerLost {
                        remaining: tally.live,
                    });
                    break;
                }
            }

            if !display_failed {
                if let Err(err) = display.poll(Instant::now(), engine) {
                    error!(error = %err, "display commit failed, stopping workers");
                    display_failed = true;
                    abort.cancel();
                    tally.fail(err.into());
                }
            }
        }

        tally
    }
}

impl<E: ParallelEngine> PassExecutor<E> for WorkerPool {
    fn execute_pass(
        &mut self,
        engine: &mut E,
        spec: &PassSpec,
        ctx: PassContext<'_>,
    ) -> Result<PassReport, SchedulerError> {
        let started = Instant::now();
        let commits_before = ctx.display.commits();
        let queue = Arc::new(WorkQueue::new(spec.resolution, self.granularity));
        let target = engine.shared_target();

        info!(
            pass = %spec.kind,
            workers = self.size,
            units = queue.total(),
            "starting pool pass"
        );

        // Workers stop claiming on either the caller's token or an internal abort
        let abort = CancellationToken::new();
        let stop = [ctx.cancel.clone(), abort.clone()];

        let (event_tx, event_rx) = mpsc::channel();
        let handles = self.spawn_workers(&queue, &target, &stop, &event_tx)?;
        drop(event_tx);

        let directives: Vec<Sender<Directive>> =
            handles.iter().map(|h| h.directives.clone()).collect();
        let tally = self.collect(&event_rx, &directives, spec, ctx.display, engine, &abort);
        drop(directives);
        join_workers(handles);

        if let Some(err) = tally.failure {
            return Err(err);
        }

        let mut report = PassReport::new(spec, queue.total());
        report.outcome = if queue.is_exhausted() {
            PassOutcome::Completed
        } else {
            PassOutcome::Cancelled
        };
        report.units_executed = tally.executed;
        report.units_failed = tally.failed;
        report.workers = self.size;
        report.workers_ready = tally.ready;
        report.workers_done = tally.done;
        report.display_commits = ctx.display.commits() - commits_before;
        report.elapsed = started.elapsed();

        info!(
            pass = %spec.kind,
            outcome = ?report.outcome,
            executed = report.units_executed,
            failed = report.units_failed,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "pool pass finished"
        );
        Ok(report)
    }
}

/// Worker thread body
fn run_worker<T: SharedTarget>(
    id: usize,
    queue: &WorkQueue,
    target: &T,
    stop: &[CancellationToken; 2],
    events: &Sender<WorkerEvent>,
    directives: &Receiver<Directive>,
) {
    if events.send(WorkerEvent::Ready { worker: id }).is_err() {
        return;
    }

    let task = match directives.recv() {
        Ok(Directive::Render(task)) => task,
        Ok(Directive::Stop) | Err(_) => {
            let _ = events.send(WorkerEvent::Done {
                worker: id,
                executed: 0,
                failed: 0,
            });
            return;
        }
    };

    let mut stats = WorkerStats::default();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        render_units(&task, queue, target, stop, &mut stats)
    }));

    let event = match outcome {
        Ok(Ok(())) => WorkerEvent::Done {
            worker: id,
            executed: stats.executed,
            failed: stats.failed,
        },
        Ok(Err(err)) => WorkerEvent::Error {
            worker: id,
            reason: err.to_string(),
            executed: stats.executed,
            failed: stats.failed,
        },
        Err(payload) => WorkerEvent::Error {
            worker: id,
            reason: format!("worker panicked: {}", panic_message(&*payload)),
            executed: stats.executed,
            failed: stats.failed,
        },
    };
    let _ = events.send(event);
}

/// Claim and execute units until the queue is exhausted or a stop is requested
fn render_units<T: SharedTarget>(
    task: &RenderTask,
    queue: &WorkQueue,
    target: &T,
    stop: &[CancellationToken; 2],
    stats: &mut WorkerStats,
) -> Result<(), crate::error::EngineError> {
    loop {
        if stop.iter().any(CancellationToken::is_cancelled) {
            return Ok(());
        }

        let unit = match queue.claim_next() {
            Claim::Claimed(unit) => unit,
            Claim::Exhausted => return Ok(()),
        };

        match target.execute_unit(task, unit) {
            Ok(()) => stats.executed += 1,
            Err(err) if !err.is_fatal() => {
                warn!(worker = task.worker, ?unit, error = %err, "unit failed");
                stats.failed += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

fn join_workers(handles: Vec<WorkerHandle>) {
    for handle in handles {
        drop(handle.directives);
        if handle.thread.join().is_err() {
            error!(worker = handle.id, "worker thread panicked outside its task");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
