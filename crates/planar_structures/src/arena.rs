//! Arena - generational index storage with a hard capacity
//!
//! Provides O(1) insertion, removal, and lookup with use-after-free detection.
//! The capacity is fixed at construction; inserting past it fails without
//! touching the arena.

use core::marker::PhantomData;
use thiserror::Error;

/// Returned when an insertion would exceed the arena capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("arena capacity of {capacity} exceeded")]
pub struct CapacityError {
    pub capacity: usize,
}

/// Key for arena access with generation tracking
pub struct ArenaKey<T> {
    index: u32,
    generation: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ArenaKey<T> {
    #[inline]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self {
            index,
            generation,
            _marker: PhantomData,
        }
    }

    /// Get the raw slot index
    #[inline]
    pub const fn index(&self) -> u32 {
        self.index
    }

    /// Get the generation
    #[inline]
    pub const fn generation(&self) -> u32 {
        self.generation
    }

    /// Create a null/invalid key
    #[inline]
    pub const fn null() -> Self {
        Self::new(u32::MAX, 0)
    }

    #[inline]
    pub const fn is_null(&self) -> bool {
        self.index == u32::MAX
    }
}

// Manual impls so `T` does not need to be Clone/Eq/Hash itself.
impl<T> Clone for ArenaKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for ArenaKey<T> {}
impl<T> PartialEq for ArenaKey<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}
impl<T> Eq for ArenaKey<T> {}
impl<T> PartialOrd for ArenaKey<T> {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl<T> Ord for ArenaKey<T> {
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        (self.index, self.generation).cmp(&(other.index, other.generation))
    }
}
impl<T> core::hash::Hash for ArenaKey<T> {
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<T> Default for ArenaKey<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T> core::fmt::Debug for ArenaKey<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.is_null() {
            write!(f, "ArenaKey(null)")
        } else {
            write!(f, "ArenaKey({}v{})", self.index, self.generation)
        }
    }
}

/// Slot entry
pub struct Slot<T> {
    value: Option<T>,
    generation: u32,
}

impl<T> Slot<T> {
    #[inline]
    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    #[inline]
    pub fn value_mut(&mut self) -> Option<&mut T> {
        self.value.as_mut()
    }

    #[inline]
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

/// Arena - generational storage bounded by a fixed capacity
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free_list: Vec<u32>,
    len: usize,
    capacity: usize,
}

impl<T> Arena<T> {
    /// Create an arena that holds at most `capacity` live values
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free_list: Vec::new(),
            len: 0,
            capacity,
        }
    }

    /// Insert a value and get its key
    pub fn insert(&mut self, value: T) -> Result<ArenaKey<T>, CapacityError> {
        if self.len >= self.capacity {
            return Err(CapacityError { capacity: self.capacity });
        }
        self.len += 1;

        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            Ok(ArenaKey::new(index, slot.generation))
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                value: Some(value),
                generation: 0,
            });
            Ok(ArenaKey::new(index, 0))
        }
    }

    /// Remove a value by key
    pub fn remove(&mut self, key: ArenaKey<T>) -> Option<T> {
        let slot = self.slots.get_mut(key.index as usize)?;

        if slot.generation != key.generation || slot.value.is_none() {
            return None;
        }

        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(key.index);
        self.len -= 1;

        slot.value.take()
    }

    pub fn get(&self, key: ArenaKey<T>) -> Option<&T> {
        let slot = self.slots.get(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        slot.value.as_ref()
    }

    pub fn get_mut(&mut self, key: ArenaKey<T>) -> Option<&mut T> {
        let slot = self.slots.get_mut(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        slot.value.as_mut()
    }

    /// Mutable access to two distinct values at once
    pub fn get2_mut(&mut self, a: ArenaKey<T>, b: ArenaKey<T>) -> Option<(&mut T, &mut T)> {
        if a.index == b.index || !self.contains_key(a) || !self.contains_key(b) {
            return None;
        }
        let (lo, hi, swapped) = if a.index < b.index { (a, b, false) } else { (b, a, true) };
        let (head, tail) = self.slots.split_at_mut(hi.index as usize);
        let first = head[lo.index as usize].value.as_mut()?;
        let second = tail[0].value.as_mut()?;
        if swapped {
            Some((second, first))
        } else {
            Some((first, second))
        }
    }

    pub fn contains_key(&self, key: ArenaKey<T>) -> bool {
        self.slots
            .get(key.index as usize)
            .map(|s| s.generation == key.generation && s.value.is_some())
            .unwrap_or(false)
    }

    /// Key of the live value stored at a raw slot index
    pub fn key_at(&self, index: usize) -> Option<ArenaKey<T>> {
        let slot = self.slots.get(index)?;
        slot.value.as_ref().map(|_| ArenaKey::new(index as u32, slot.generation))
    }

    /// Get the number of live values
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Hard capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Free room before the capacity is reached
    pub fn remaining(&self) -> usize {
        self.capacity - self.len
    }

    /// Number of slots ever used, i.e. an exclusive upper bound on slot indices
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Raw slots, indexed by `ArenaKey::index`
    pub fn slots(&self) -> &[Slot<T>] {
        &self.slots
    }

    /// Raw mutable slots, for partitioning across tasks
    pub fn slots_mut(&mut self) -> &mut [Slot<T>] {
        &mut self.slots
    }

    /// Remove every value; outstanding keys become stale
    pub fn clear(&mut self) {
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if slot.value.is_some() {
                slot.value = None;
                slot.generation = slot.generation.wrapping_add(1);
                self.free_list.push(i as u32);
            }
        }
        self.len = 0;
    }

    /// Iterate over live values in slot order
    pub fn iter(&self) -> impl Iterator<Item = (ArenaKey<T>, &T)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.value.as_ref().map(|v| {
                (ArenaKey::new(i as u32, slot.generation), v)
            })
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ArenaKey<T>, &mut T)> {
        self.slots.iter_mut().enumerate().filter_map(|(i, slot)| {
            let gen = slot.generation;
            slot.value.as_mut().map(|v| {
                (ArenaKey::new(i as u32, gen), v)
            })
        })
    }

    pub fn keys(&self) -> impl Iterator<Item = ArenaKey<T>> + '_ {
        self.iter().map(|(key, _)| key)
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.slots.iter().filter_map(|slot| slot.value.as_ref())
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.slots.iter_mut().filter_map(|slot| slot.value.as_mut())
    }
}

impl<T> core::ops::Index<ArenaKey<T>> for Arena<T> {
    type Output = T;

    fn index(&self, key: ArenaKey<T>) -> &Self::Output {
        self.get(key).expect("Invalid arena key")
    }
}

impl<T> core::ops::IndexMut<ArenaKey<T>> for Arena<T> {
    fn index_mut(&mut self, key: ArenaKey<T>) -> &mut Self::Output {
        self.get_mut(key).expect("Invalid arena key")
    }
}
