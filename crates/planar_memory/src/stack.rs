//! Scratch stack - LIFO allocation with scoped rollback
//!
//! Allocations are made through a [`ScratchScope`], which mutably borrows the
//! stack and rewinds it when dropped. Slices handed out by a scope borrow the
//! scope, so they can never outlive the rewind.

use core::ptr::NonNull;
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::{align_up, ScratchError};

/// Fixed-capacity scratch stack
pub struct ScratchStack {
    /// Backing memory, owned; released in `Drop`
    base: NonNull<u8>,
    /// Current top of stack, as a byte offset from `base`
    top: AtomicUsize,
    /// High-water mark of `top`
    max_used: AtomicUsize,
    capacity: usize,
}

// Safety: the buffer is owned, bump allocation claims disjoint regions through the
// atomic top, and rewinding needs `&mut` via the scope borrow.
unsafe impl Send for ScratchStack {}
unsafe impl Sync for ScratchStack {}

impl ScratchStack {
    /// Create a scratch stack with a byte budget
    pub fn new(capacity: usize) -> Self {
        let buffer = vec![0u8; capacity].into_boxed_slice();
        let raw = Box::into_raw(buffer) as *mut u8;
        // Box::into_raw never returns null; an empty box yields a dangling non-null pointer.
        let base = NonNull::new(raw).unwrap_or(NonNull::dangling());
        log::debug!("scratch stack created with {capacity} bytes");
        Self {
            base,
            top: AtomicUsize::new(0),
            max_used: AtomicUsize::new(0),
            capacity,
        }
    }

    /// Create with capacity in KB
    pub fn with_capacity_kb(kb: usize) -> Self {
        Self::new(kb * 1024)
    }

    /// Open an allocation scope. Everything allocated through it is released on drop.
    pub fn scope(&mut self) -> ScratchScope<'_> {
        let marker = self.top.load(Ordering::Acquire);
        ScratchScope { stack: self, marker }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes currently in use
    pub fn used(&self) -> usize {
        self.top.load(Ordering::Relaxed)
    }

    /// Largest number of bytes ever in use at once
    pub fn max_used(&self) -> usize {
        self.max_used.load(Ordering::Relaxed)
    }

    pub fn available(&self) -> usize {
        self.capacity - self.used()
    }

    /// Claim `size` bytes at `align`, returning the offset from `base`
    fn claim(&self, size: usize, align: usize) -> Result<usize, ScratchError> {
        let base = self.base.as_ptr() as usize;
        loop {
            let current_top = self.top.load(Ordering::Relaxed);
            // Align the absolute address; the buffer itself is byte aligned.
            let user_offset = align_up(base + current_top, align) - base;
            let new_top = user_offset + size;

            if new_top > self.capacity {
                return Err(ScratchError::Exhausted {
                    requested: size,
                    used: current_top,
                    capacity: self.capacity,
                });
            }

            match self.top.compare_exchange_weak(
                current_top,
                new_top,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    self.max_used.fetch_max(new_top, Ordering::Relaxed);
                    return Ok(user_offset);
                }
                Err(_) => continue,
            }
        }
    }

    fn rollback(&self, marker: usize) {
        let current = self.top.load(Ordering::Acquire);
        if marker <= current {
            self.top.store(marker, Ordering::Release);
        }
    }
}

impl Drop for ScratchStack {
    fn drop(&mut self) {
        if self.capacity == 0 {
            return;
        }
        let slice = core::ptr::slice_from_raw_parts_mut(self.base.as_ptr(), self.capacity);
        // SAFETY: `base` came from `Box::into_raw` of a boxed slice of `capacity` bytes.
        unsafe { drop(Box::from_raw(slice)) };
    }
}

impl Default for ScratchStack {
    fn default() -> Self {
        Self::new(1024 * 1024)
    }
}

impl core::fmt::Debug for ScratchStack {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ScratchStack")
            .field("capacity", &self.capacity)
            .field("used", &self.used())
            .field("max_used", &self.max_used())
            .finish()
    }
}

/// Scoped allocation guard. Rewinds the stack to where it was on creation.
pub struct ScratchScope<'a> {
    stack: &'a mut ScratchStack,
    marker: usize,
}

impl<'a> ScratchScope<'a> {
    /// Allocate `len` copies of `value`
    #[allow(clippy::mut_from_ref)]
    pub fn alloc_slice<T: Copy>(&self, len: usize, value: T) -> Result<&mut [T], ScratchError> {
        let size = core::mem::size_of::<T>();
        if len == 0 || size == 0 {
            let ptr = NonNull::<T>::dangling().as_ptr();
            // SAFETY: zero-sized or empty slices may use a dangling aligned pointer.
            return Ok(unsafe { core::slice::from_raw_parts_mut(ptr, len) });
        }

        let bytes = size.checked_mul(len).ok_or(ScratchError::Exhausted {
            requested: usize::MAX,
            used: self.stack.used(),
            capacity: self.stack.capacity,
        })?;
        let offset = self.stack.claim(bytes, core::mem::align_of::<T>())?;

        // SAFETY: the claimed region is in bounds, aligned for T, and disjoint from every
        // other live allocation. It stays valid until this scope rewinds the stack, which
        // cannot happen while the returned slice borrows `self`.
        unsafe {
            let ptr = self.stack.base.as_ptr().add(offset) as *mut T;
            for i in 0..len {
                ptr.add(i).write(value);
            }
            Ok(core::slice::from_raw_parts_mut(ptr, len))
        }
    }

    /// Allocate a slice initialised from an iterator of exactly `len` items
    #[allow(clippy::mut_from_ref)]
    pub fn alloc_from_iter<T: Copy + Default, I>(&self, len: usize, iter: I) -> Result<&mut [T], ScratchError>
    where
        I: IntoIterator<Item = T>,
    {
        let slice = self.alloc_slice(len, T::default())?;
        for (dst, src) in slice.iter_mut().zip(iter) {
            *dst = src;
        }
        Ok(slice)
    }

    /// Bytes in use by the stack, including outer scopes
    pub fn used(&self) -> usize {
        self.stack.used()
    }
}

impl Drop for ScratchScope<'_> {
    fn drop(&mut self) {
        self.stack.rollback(self.marker);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scratch_allocation() {
        let mut stack = ScratchStack::new(1024);
        let scope = stack.scope();

        let a = scope.alloc_slice(4, 7i32).unwrap();
        let b = scope.alloc_slice(3, 1.5f64).unwrap();
        a[0] = 42;
        b[2] = 2.5;

        assert_eq!(a, &[42, 7, 7, 7]);
        assert_eq!(b, &[1.5, 1.5, 2.5]);
        assert_eq!(b.as_ptr() as usize % core::mem::align_of::<f64>(), 0);
    }

    #[test]
    fn test_scope_rollback() {
        let mut stack = ScratchStack::new(1024);
        assert_eq!(stack.used(), 0);

        {
            let scope = stack.scope();
            scope.alloc_slice(16, 0u32).unwrap();
            assert!(scope.used() >= 64);
        }

        assert_eq!(stack.used(), 0);
        assert!(stack.max_used() >= 64);
    }

    #[test]
    fn test_scratch_exhausted() {
        let mut stack = ScratchStack::new(64);
        let scope = stack.scope();
        scope.alloc_slice(8, 0u32).unwrap();

        let err = scope.alloc_slice(16, 0u32).unwrap_err();
        match err {
            ScratchError::Exhausted { requested, capacity, .. } => {
                assert_eq!(requested, 64);
                assert_eq!(capacity, 64);
            }
        }
    }

    #[test]
    fn test_empty_and_from_iter() {
        let mut stack = ScratchStack::new(128);
        let scope = stack.scope();
        assert!(scope.alloc_slice::<u64>(0, 0).unwrap().is_empty());
        let s = scope.alloc_from_iter(3, [1u16, 2, 3]).unwrap();
        assert_eq!(s, &[1, 2, 3]);
    }
}
