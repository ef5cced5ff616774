//! # planar_memory - Scratch Allocation
//!
//! A fixed-budget LIFO allocator for data that lives for one simulation step.
//! The budget never grows; running out is reported as an error so the caller
//! can surface an undersized configuration instead of silently allocating.

pub mod stack;

pub use stack::{ScratchScope, ScratchStack};

use thiserror::Error;

/// Scratch allocation failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ScratchError {
    #[error("scratch budget exhausted: requested {requested} bytes with {used} of {capacity} in use")]
    Exhausted {
        requested: usize,
        used: usize,
        capacity: usize,
    },
}

/// Align a value up to the given alignment
#[inline]
pub const fn align_up(value: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (value + align - 1) & !(align - 1)
}

pub mod prelude {
    pub use crate::stack::{ScratchScope, ScratchStack};
    pub use crate::ScratchError;
}
