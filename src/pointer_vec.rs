//! Amortized-growth dense array with swap-delete.
//!
//! Backs both of the runtime's scheduling pools and every port's writer
//! queue (§4.1). Generalizes xv6's fixed-capacity ring
//! buffer (`queue.rs`) into a growable dense array, since procs and writer
//! queues have no fixed upper bound the way a kernel's syscall argument
//! ring does.
//!
//! `Vec::swap_remove` already implements the swap-delete primitive,
//! so `PointerVec<T>` wraps a `Vec<T>` and adds the two things `Vec` alone
//! doesn't give us: an explicit capacity floor/doubling policy instead of
//! `Vec`'s unspecified amortized growth, and a callback hook so that types
//! which record their own position (`Proc::idx`, `Channel::idx`) can be kept
//! in sync across a swap-delete.

use crate::config::POINTER_VEC_MIN_CAPACITY;

/// A dense, swap-delete, doubling-growth array.
///
/// `capacity()` is tracked explicitly rather than read back from the
/// allocator, so it always reflects the policy in §4.1 (starts at 8, doubles
/// on overflow, halves on `trim` when occupancy drops to at most a quarter
/// and the halved capacity would still be at least 8).
#[derive(Debug, Default)]
pub struct PointerVec<T> {
    items: Vec<T>,
    capacity: usize,
}

impl<T> PointerVec<T> {
    /// Initialize a pointer-vector, pre-allocating [`POINTER_VEC_MIN_CAPACITY`] slots.
    pub fn new() -> Self {
        PointerVec {
            items: Vec::with_capacity(POINTER_VEC_MIN_CAPACITY),
            capacity: POINTER_VEC_MIN_CAPACITY,
        }
    }

    /// Finalize the pointer-vector.
    ///
    /// # Panics
    /// Panics if the vector is not empty, per §4.1 — freeing a pointer-vector
    /// with live elements would leak or double-free whatever it points to.
    pub fn finalize(self) {
        assert!(self.items.is_empty(), "finalize called on non-empty PointerVec");
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The vector's tracked capacity (not necessarily the allocator's idea of it).
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.items.get_mut(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.items.iter_mut()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    /// Push a value, doubling capacity first if the vector is full.
    ///
    /// Returns the index the value was stored at.
    pub fn push(&mut self, value: T) -> usize {
        if self.items.len() == self.capacity {
            self.capacity *= 2;
            self.items.reserve_exact(self.capacity - self.items.len());
        }
        self.items.push(value);
        self.items.len() - 1
    }

    /// Swap-delete the element at `index`: move the last element into the
    /// hole and shrink the length by one.
    ///
    /// If an element was moved into `index` (i.e. `index` was not already
    /// the last element), `fix_idx` is invoked with the moved element and
    /// its new index, so the caller can update a stored position field.
    ///
    /// # Panics
    /// Panics if the vector is empty or `index` is out of bounds, per §4.1's
    /// "swap-delete must never be called on an empty vector".
    pub fn swap_remove(&mut self, index: usize, mut fix_idx: impl FnMut(&mut T, usize)) -> T {
        assert!(!self.items.is_empty(), "swap_remove on empty PointerVec");
        let removed = self.items.swap_remove(index);
        if let Some(moved) = self.items.get_mut(index) {
            fix_idx(moved, index);
        }
        removed
    }

    /// Halve capacity if occupancy has dropped to at most a quarter of it,
    /// and the halved capacity would remain at least [`POINTER_VEC_MIN_CAPACITY`].
    ///
    /// This is a distinct step from `swap_remove`, not an automatic
    /// consequence of it: §4.5's proc-pool transitions never trim, while
    /// §4.8's writer-queue removal explicitly does.
    pub fn trim(&mut self) {
        let half = self.capacity / 2;
        if half >= POINTER_VEC_MIN_CAPACITY && self.items.len() <= self.capacity / 4 {
            self.capacity = half;
            self.items.shrink_to(half);
        }
    }
}
