//! Seams to the external rendering engine
//!
//! The scheduler never looks inside the engine. It hands over work units,
//! asks for display commits and tells the engine when the pass geometry or
//! sample accumulation changes. Scene parsing, shading and the display surface
//! all live behind these traits.

use crate::error::EngineError;
use crate::pass::PassSpec;
use crate::queue::{Resolution, WorkUnit};
use std::sync::Arc;

/// Options the engine is initialised with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    pub width: u32,
    pub height: u32,
    pub samples_per_unit: u32,
}

impl EngineOptions {
    pub fn new(width: u32, height: u32, samples_per_unit: u32) -> Self {
        Self {
            width,
            height,
            samples_per_unit,
        }
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }
}

/// Engine driven from a single thread of control
pub trait RenderEngine {
    /// Build an engine for `scene_description`
    fn init_engine(scene_description: &str, options: &EngineOptions) -> Result<Self, EngineError>
    where
        Self: Sized;

    /// Execute every unit in `units` for the given pass
    ///
    /// A transient [`EngineError::Unit`] marks the whole chunk failed without
    /// stopping the pass; a fatal error aborts it.
    fn execute_chunk(&mut self, pass: &PassSpec, units: &[WorkUnit]) -> Result<(), EngineError>;

    /// Blit whatever partial state exists to the display
    fn commit_to_display(&mut self) -> Result<(), EngineError>;

    /// Change the output resolution, discarding accumulated samples
    fn resize(&mut self, width: u32, height: u32) -> Result<(), EngineError>;

    /// Start accumulating another independent sample pass
    fn rescan(&mut self) -> Result<(), EngineError>;
}

/// Data-only description of the work a pool worker performs
///
/// Workers receive this instead of a callable; everything else they need is
/// reached through the [`SharedTarget`] they attach to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderTask {
    pub worker: usize,
    pub pass: PassSpec,
}

/// Engine state that several workers can drive at once
///
/// Units of one pass are disjoint, so implementations can write each unit's
/// region of the render target without locking the buffer.
pub trait SharedTarget: Send + Sync + 'static {
    fn execute_unit(&self, task: &RenderTask, unit: WorkUnit) -> Result<(), EngineError>;
}

/// Engine that can fan a pass out to a worker pool
pub trait ParallelEngine: RenderEngine {
    type Target: SharedTarget;

    /// Handle to the current render target
    ///
    /// Called once per pass after any resize, so a target returned here is
    /// valid for the whole pass.
    fn shared_target(&self) -> Arc<Self::Target>;
}
