//! # planar_structures - Bounded Storage
//!
//! Index-based containers used by the simulation world:
//! - Arena: generational storage with a hard capacity and an explicit exceeded error
//! - BitSet: dense flags indexed by arena slot
//! - TaskSlots: per-item exclusive access to a slice shared across worker tasks

pub mod arena;
pub mod bitset;
pub mod task_slots;

pub use arena::{Arena, ArenaKey, CapacityError, Slot};
pub use bitset::BitSet;
pub use task_slots::TaskSlots;

pub mod prelude {
    pub use crate::arena::{Arena, ArenaKey, CapacityError};
    pub use crate::bitset::BitSet;
    pub use crate::task_slots::TaskSlots;
}
