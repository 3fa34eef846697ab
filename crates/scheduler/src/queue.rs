//! Shared, exhaustible work queue
//!
//! Enumerates every work unit of a pass exactly once. Consumers claim units
//! through an atomic claim-and-advance on a single cursor, so the queue can be
//! shared between any number of workers without a lock and no unit is ever
//! issued twice or skipped.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Output resolution of a pass, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Total number of pixels
    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Resolution reduced by `divisor` on both axes, never below 1x1
    pub fn scaled_down(&self, divisor: u32) -> Self {
        let divisor = divisor.max(1);
        Self {
            width: (self.width / divisor).max(1),
            height: (self.height / divisor).max(1),
        }
    }
}

/// How a pass is sliced into work units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitGranularity {
    /// One unit per pixel, enumerated column-major
    Pixel,

    /// One unit per full-height column
    Column,
}

/// One indivisible slice of the workload
///
/// Units of one pass never overlap, so each maps to a disjoint region of the
/// render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WorkUnit {
    Pixel { x: u32, y: u32 },
    Column { x: u32 },
}

/// Result of a claim against the queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim<T> {
    /// Work handed to the caller, owned exclusively by it
    Claimed(T),

    /// Every unit has been issued; this is a normal terminal signal
    Exhausted,
}

impl<T> Claim<T> {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Claim::Exhausted)
    }

    /// Convert into an `Option`, mapping `Exhausted` to `None`
    pub fn claimed(self) -> Option<T> {
        match self {
            Claim::Claimed(value) => Some(value),
            Claim::Exhausted => None,
        }
    }
}

/// Ordered, exhaustible queue of work units for a single pass
///
/// # Example
///
/// ```
/// use raypace_scheduler::{Claim, Resolution, UnitGranularity, WorkQueue, WorkUnit};
///
/// let queue = WorkQueue::new(Resolution::new(2, 2), UnitGranularity::Column);
/// assert_eq!(queue.claim_next(), Claim::Claimed(WorkUnit::Column { x: 0 }));
/// assert_eq!(queue.claim_next(), Claim::Claimed(WorkUnit::Column { x: 1 }));
/// assert!(queue.claim_next().is_exhausted());
/// ```
#[derive(Debug)]
pub struct WorkQueue {
    resolution: Resolution,
    granularity: UnitGranularity,
    total: u64,
    cursor: AtomicU64,
}

impl WorkQueue {
    /// Create a queue covering every unit of `resolution`
    pub fn new(resolution: Resolution, granularity: UnitGranularity) -> Self {
        let total = match granularity {
            UnitGranularity::Pixel => resolution.pixel_count(),
            UnitGranularity::Column => resolution.width as u64,
        };

        Self {
            resolution,
            granularity,
            total,
            cursor: AtomicU64::new(0),
        }
    }

    /// Claim the next unit
    pub fn claim_next(&self) -> Claim<WorkUnit> {
        match self.advance(1) {
            Some(start) => Claim::Claimed(self.unit_at(start)),
            None => Claim::Exhausted,
        }
    }

    /// Claim up to `max_units` consecutive units in one atomic step
    ///
    /// Returns fewer units than requested when the queue is nearly exhausted.
    /// A request for zero units is treated as a request for one.
    pub fn claim_chunk(&self, max_units: usize) -> Claim<Vec<WorkUnit>> {
        let max_units = (max_units.max(1) as u64).min(self.total);
        let Some(start) = self.advance(max_units) else {
            return Claim::Exhausted;
        };

        let end = (start + max_units).min(self.total);
        Claim::Claimed((start..end).map(|index| self.unit_at(index)).collect())
    }

    /// Total units in this pass
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Units issued so far
    pub fn claimed(&self) -> u64 {
        self.cursor.load(Ordering::Acquire).min(self.total)
    }

    /// Units not yet issued
    pub fn remaining(&self) -> u64 {
        self.total - self.claimed()
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    /// Fraction of units issued (0.0 to 1.0)
    pub fn progress(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        self.claimed() as f64 / self.total as f64
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn granularity(&self) -> UnitGranularity {
        self.granularity
    }

    /// Advance the cursor by up to `count`, returning the start index of the claim
    fn advance(&self, count: u64) -> Option<u64> {
        let total = self.total;
        self.cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cursor| {
                (cursor < total).then(|| (cursor + count).min(total))
            })
            .ok()
    }

    fn unit_at(&self, index: u64) -> WorkUnit {
        match self.granularity {
            UnitGranularity::Pixel => {
                let height = self.resolution.height as u64;
                WorkUnit::Pixel {
                    x: (index / height) as u32,
                    y: (index % height) as u32,
                }
            }
            UnitGranularity::Column => WorkUnit::Column { x: index as u32 },
        }
    }
}
