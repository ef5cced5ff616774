//! TaskSlots - exclusive per-item access to a slice shared by worker tasks
//!
//! A parallel phase hands the same `&TaskSlots` to every task. Each task claims
//! the items of its own range and gets `&mut T` to them. A claim flag per item
//! guarantees no item is handed out twice, so a host scheduler that produced
//! overlapping ranges trips a panic instead of aliasing memory.

use core::marker::PhantomData;
use core::ops::Range;
use core::sync::atomic::{AtomicBool, Ordering};

/// Slice wrapper granting each item to at most one claimant
pub struct TaskSlots<'a, T> {
    ptr: *mut T,
    len: usize,
    claimed: Box<[AtomicBool]>,
    _marker: PhantomData<&'a mut [T]>,
}

// Items are only reachable through a successful claim, and each claim is unique.
unsafe impl<T: Send> Send for TaskSlots<'_, T> {}
unsafe impl<T: Send> Sync for TaskSlots<'_, T> {}

impl<'a, T> TaskSlots<'a, T> {
    /// Borrow the slice for the duration of a parallel phase
    pub fn new(slice: &'a mut [T]) -> Self {
        let len = slice.len();
        Self {
            ptr: slice.as_mut_ptr(),
            len,
            claimed: (0..len).map(|_| AtomicBool::new(false)).collect(),
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Claim one item.
    ///
    /// # Panics
    /// If the index is out of bounds or the item was already claimed.
    pub fn claim(&self, index: usize) -> &mut T {
        assert!(index < self.len, "task slot {index} out of bounds ({})", self.len);
        let already = self.claimed[index].swap(true, Ordering::AcqRel);
        assert!(!already, "task slot {index} claimed twice");
        // SAFETY: index is in bounds, the backing slice is mutably borrowed for 'a,
        // and the claim flag above ensures this is the only reference to the item.
        unsafe { &mut *self.ptr.add(index) }
    }

    /// Claim every item of a task range
    pub fn claim_range(&self, range: Range<usize>) -> impl Iterator<Item = (usize, &mut T)> + '_ {
        range.map(move |index| (index, self.claim(index)))
    }

    /// Number of items claimed so far
    pub fn claimed_count(&self) -> usize {
        self.claimed.iter().filter(|c| c.load(Ordering::Acquire)).count()
    }
}
