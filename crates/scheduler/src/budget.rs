//! Chunk budget control for host responsiveness
//!
//! Sizes each scheduling tick so that the time spent computing stays inside a
//! target latency band. A tick that finishes early grows the next chunk, a tick
//! that overruns shrinks it, and a tick inside the band is nudged toward the
//! band midpoint.
//!
//! # Gains
//! - Outside the band: 0.5, rounded up when growing and down when shrinking
//! - Inside the band: 0.1, rounded to nearest
//!
//! The controller is purely proportional and keeps no history beyond the
//! current chunk size.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Gain applied when the measured tick is outside the band
const OUT_OF_BAND_GAIN: f64 = 0.5;

/// Gain applied when the measured tick is inside the band
const IN_BAND_GAIN: f64 = 0.1;

/// Acceptable range of tick durations, in milliseconds
///
/// When deserialized, omitted bounds take their defaults and an omitted
/// `mid_ms` sits at the midpoint of the resulting bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "BandFields")]
pub struct LatencyBand {
    pub min_ms: f64,
    pub max_ms: f64,
    /// Target inside the band, usually the midpoint
    pub mid_ms: f64,
}

impl LatencyBand {
    /// Band with `mid` at the midpoint of `min` and `max`
    pub fn new(min_ms: f64, max_ms: f64) -> Self {
        Self {
            min_ms,
            max_ms,
            mid_ms: (min_ms + max_ms) / 2.0,
        }
    }

    /// Override the target inside the band
    pub fn with_mid(mut self, mid_ms: f64) -> Self {
        self.mid_ms = mid_ms;
        self
    }

    /// Check `0 < min <= mid <= max` with all bounds finite
    pub fn validate(&self) -> Result<(), ConfigError> {
        let finite = self.min_ms.is_finite() && self.max_ms.is_finite() && self.mid_ms.is_finite();
        let ordered =
            self.min_ms > 0.0 && self.min_ms <= self.mid_ms && self.mid_ms <= self.max_ms;

        if finite && ordered {
            Ok(())
        } else {
            Err(ConfigError::InvalidBand {
                min: self.min_ms,
                mid: self.mid_ms,
                max: self.max_ms,
            })
        }
    }

    /// Whether `elapsed_ms` falls inside `[min, max]`
    pub fn contains(&self, elapsed_ms: f64) -> bool {
        elapsed_ms >= self.min_ms && elapsed_ms <= self.max_ms
    }
}

impl Default for LatencyBand {
    fn default() -> Self {
        Self::new(80.0, 120.0)
    }
}

#[derive(Deserialize)]
struct BandFields {
    min_ms: Option<f64>,
    max_ms: Option<f64>,
    mid_ms: Option<f64>,
}

impl From<BandFields> for LatencyBand {
    fn from(fields: BandFields) -> Self {
        let default = LatencyBand::default();
        let band = LatencyBand::new(
            fields.min_ms.unwrap_or(default.min_ms),
            fields.max_ms.unwrap_or(default.max_ms),
        );
        match fields.mid_ms {
            Some(mid) => band.with_mid(mid),
            None => band,
        }
    }
}

/// One tick's worth of feedback
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickMeasurement {
    /// Units attempted during the tick
    pub chunk_attempted: usize,
    pub elapsed: Duration,
}

impl TickMeasurement {
    pub fn new(chunk_attempted: usize, elapsed: Duration) -> Self {
        Self {
            chunk_attempted,
            elapsed,
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1000.0
    }
}

/// Compute the next chunk size from the previous one and its measured duration
///
/// The result is always at least 1. When `elapsed_ms` is below the band the
/// result is strictly larger than `previous`.
///
/// ```
/// use raypace_scheduler::budget::{next_chunk_size, LatencyBand};
///
/// let band = LatencyBand::new(80.0, 120.0);
/// assert_eq!(next_chunk_size(10, 50.0, &band), 12);
/// assert_eq!(next_chunk_size(100, 150.0, &band), 87);
/// ```
pub fn next_chunk_size(previous: usize, elapsed_ms: f64, band: &LatencyBand) -> usize {
    let previous = previous.max(1);
    let current = previous as f64;

    if elapsed_ms < band.min_ms {
        let factor = 1.0 + OUT_OF_BAND_GAIN * (band.min_ms - elapsed_ms) / band.min_ms;
        // A factor within rounding error of 1.0 must still grow
        to_chunk((current * factor).ceil()).max(previous.saturating_add(1))
    } else if elapsed_ms > band.max_ms {
        let factor = 1.0 - OUT_OF_BAND_GAIN * (elapsed_ms - band.max_ms) / band.max_ms;
        to_chunk((current * factor).floor())
    } else {
        let factor = 1.0 + IN_BAND_GAIN * (band.mid_ms - elapsed_ms) / band.mid_ms;
        to_chunk((current * factor).round())
    }
}

/// Clamp a computed size into `[1, usize::MAX]`
fn to_chunk(value: f64) -> usize {
    if value.is_nan() || value < 1.0 {
        1
    } else {
        // Float-to-int casts saturate at usize::MAX
        value as usize
    }
}

/// Per-pass feedback controller owning the current chunk size
///
/// Each pass creates a fresh controller seeded with the configured initial
/// chunk size; the first tick has no prior measurement.
///
/// # Example
///
/// ```
/// use raypace_scheduler::budget::{ChunkBudgetController, LatencyBand, TickMeasurement};
/// use std::time::Duration;
///
/// let mut controller = ChunkBudgetController::new(LatencyBand::new(80.0, 120.0), 10).unwrap();
/// let next = controller.observe(TickMeasurement::new(10, Duration::from_millis(50)));
/// assert_eq!(next, 12);
/// assert_eq!(controller.chunk_size(), 12);
/// ```
#[derive(Debug, Clone)]
pub struct ChunkBudgetController {
    band: LatencyBand,
    chunk_size: usize,
    ticks: u64,
    ticks_in_band: u64,
}

impl ChunkBudgetController {
    /// Create a controller with a caller-supplied initial chunk size
    pub fn new(band: LatencyBand, initial_chunk_size: usize) -> Result<Self, ConfigError> {
        band.validate()?;
        if initial_chunk_size == 0 {
            return Err(ConfigError::ZeroInitialChunk);
        }

        Ok(Self {
            band,
            chunk_size: initial_chunk_size,
            ticks: 0,
            ticks_in_band: 0,
        })
    }

    /// Feed one tick's measurement and return the next chunk size
    ///
    /// The measurement's attempted count is used as the previous size, so a
    /// short final chunk is judged by the work it actually did.
    pub fn observe(&mut self, measurement: TickMeasurement) -> usize {
        let elapsed_ms = measurement.elapsed_ms();
        let previous = measurement.chunk_attempted.max(1);

        self.ticks += 1;
        if self.band.contains(elapsed_ms) {
            self.ticks_in_band += 1;
        }

        let next = next_chunk_size(previous, elapsed_ms, &self.band);
        if next != self.chunk_size {
            tracing::trace!(
                previous = self.chunk_size,
                next,
                elapsed_ms,
                "chunk size adjusted"
            );
        }
        self.chunk_size = next;
        next
    }

    /// Size to request on the next tick
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn band(&self) -> &LatencyBand {
        &self.band
    }

    /// Number of measurements observed
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Number of measurements that landed inside the band
    pub fn ticks_in_band(&self) -> u64 {
        self.ticks_in_band
    }
}
