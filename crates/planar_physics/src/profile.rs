//! World statistics and step timings

use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Counts describing the current world
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    pub body_count: usize,
    pub awake_body_count: usize,
    pub shape_count: usize,
    pub contact_count: usize,
    pub touching_contact_count: usize,
    pub joint_count: usize,
    /// Islands solved by the last step
    pub island_count: usize,
    pub proxy_count: usize,
    pub tree_height: i32,
    /// Scratch budget in bytes
    pub scratch_capacity: usize,
    /// Scratch in use right now (zero between steps)
    pub scratch_used: usize,
    /// High-water mark of scratch use across all steps
    pub scratch_max_used: usize,
}

/// Time spent in each phase of the last step, in milliseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Broad-phase pair search and contact creation
    pub pairs: f32,
    /// Narrow phase and contact state changes
    pub collide: f32,
    /// Island build, island solve and write back
    pub solve: f32,
    pub build_islands: f32,
    pub solve_islands: f32,
    /// Shape bounds and broad-phase sync
    pub finalize: f32,
    pub step: f32,
}

/// Millisecond stopwatch
#[derive(Debug, Clone, Copy)]
pub(crate) struct Timer {
    start: Instant,
}

impl Timer {
    pub fn start() -> Self {
        Self { start: Instant::now() }
    }

    pub fn elapsed_ms(&self) -> f32 {
        self.start.elapsed().as_secs_f32() * 1000.0
    }

    /// Elapsed time, then restart
    pub fn lap_ms(&mut self) -> f32 {
        let ms = self.elapsed_ms();
        self.start = Instant::now();
        ms
    }
}
