//! Circular index bookkeeping over a fixed run of slots.
//!
//! A [Ring] never owns the slots it manages. It addresses them through a [Window], a three-word
//! header (pointer, length, capacity) bound to the inline storage of the block that embeds the
//! ring. Keeping the arithmetic behind a window means it is compiled once per element type rather
//! than once per block capacity.
//!
//! Logical position `i` (counted from the front) lives in physical slot `(head + i) % capacity`.
//! Slot primitives do not check their preconditions outside of debug builds: callers must not
//! allocate into a full ring or remove from an empty one.

use std::{mem::MaybeUninit, ptr::NonNull};

/// A view over a contiguous run of possibly uninitialized slots.
pub(crate) struct Window<T> {
    ptr: NonNull<MaybeUninit<T>>,
    len: usize,
    cap: usize,
}

impl<T> Window<T> {
    /// A window that addresses no storage.
    pub(crate) const fn unbound() -> Self {
        Self {
            ptr: NonNull::dangling(),
            len: 0,
            cap: 0,
        }
    }

    /// Creates a window over every slot of `slots`.
    pub(crate) fn over<const N: usize>(slots: NonNull<[MaybeUninit<T>; N]>) -> Self {
        Self {
            ptr: slots.cast(),
            len: N,
            cap: N,
        }
    }

    /// Number of addressable slots.
    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    /// Returns whether the window covers exactly the array at `slots`.
    pub(crate) fn addresses<const N: usize>(&self, slots: *const [MaybeUninit<T>; N]) -> bool {
        self.ptr.as_ptr().cast_const().cast::<[MaybeUninit<T>; N]>() == slots
            && self.len == N
            && self.cap == N
    }

    /// # Safety
    ///
    /// `index` must be below [Window::len] and the bound storage must be live.
    unsafe fn slot(&self, index: usize) -> &MaybeUninit<T> {
        debug_assert!(index < self.len, "slot {index} outside window of {}", self.len);
        // SAFETY: the caller guarantees `index` is within the live storage.
        unsafe { &*self.ptr.as_ptr().add(index) }
    }

    /// # Safety
    ///
    /// `index` must be below [Window::len] and the bound storage must be live.
    unsafe fn slot_mut(&mut self, index: usize) -> &mut MaybeUninit<T> {
        debug_assert!(index < self.len, "slot {index} outside window of {}", self.len);
        // SAFETY: the caller guarantees `index` is within the live storage.
        unsafe { &mut *self.ptr.as_ptr().add(index) }
    }
}

/// Front/length bookkeeping for a fixed-capacity circular buffer.
pub(crate) struct Ring<T> {
    head: usize,
    len: usize,
    window: Window<T>,
}

impl<T> Ring<T> {
    /// Creates an empty ring over `window`.
    pub(crate) const fn new(window: Window<T>) -> Self {
        Self {
            head: 0,
            len: 0,
            window,
        }
    }

    pub(crate) const fn capacity(&self) -> usize {
        self.window.len()
    }

    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    pub(crate) const fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) const fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    pub(crate) const fn window(&self) -> &Window<T> {
        &self.window
    }

    /// Replaces the window of an empty ring and moves the front back to slot zero.
    pub(crate) fn rebind(&mut self, window: Window<T>) {
        debug_assert!(self.is_empty(), "rebinding a ring that holds elements");
        self.window = window;
        self.head = 0;
    }

    /// Maps a logical position (below capacity) to its physical slot.
    const fn physical(&self, logical: usize) -> usize {
        // Both terms are below capacity, so one subtraction is enough to wrap.
        let index = self.head + logical;
        if index >= self.capacity() {
            index - self.capacity()
        } else {
            index
        }
    }

    /// Reserves a slot in front of the current front and returns it.
    ///
    /// # Safety
    ///
    /// The ring must not be full and its window must be bound to live storage. The returned slot
    /// is counted as occupied and must be written before the ring is read or dropped.
    pub(crate) unsafe fn alloc_front(&mut self) -> &mut MaybeUninit<T> {
        debug_assert!(!self.is_full(), "alloc_front on a full ring");
        self.head = if self.head == 0 {
            self.capacity() - 1
        } else {
            self.head - 1
        };
        self.len += 1;
        // SAFETY: `head` is below capacity and the caller guarantees the storage is live.
        unsafe { self.window.slot_mut(self.head) }
    }

    /// Reserves a slot behind the current back and returns it.
    ///
    /// # Safety
    ///
    /// Same contract as [Ring::alloc_front].
    pub(crate) unsafe fn alloc_back(&mut self) -> &mut MaybeUninit<T> {
        debug_assert!(!self.is_full(), "alloc_back on a full ring");
        let index = self.physical(self.len);
        self.len += 1;
        // SAFETY: `index` is below capacity and the caller guarantees the storage is live.
        unsafe { self.window.slot_mut(index) }
    }

    /// Moves the front element out, leaving its slot uninitialized.
    ///
    /// # Safety
    ///
    /// The ring must not be empty and its window must be bound to live storage.
    pub(crate) unsafe fn remove_front(&mut self) -> T {
        debug_assert!(!self.is_empty(), "remove_front on an empty ring");
        let index = self.head;
        self.head = self.physical(1);
        self.len -= 1;
        // SAFETY: the front slot was initialized and is no longer counted as occupied.
        unsafe { self.window.slot_mut(index).assume_init_read() }
    }

    /// Moves the back element out, leaving its slot uninitialized.
    ///
    /// # Safety
    ///
    /// Same contract as [Ring::remove_front].
    pub(crate) unsafe fn remove_back(&mut self) -> T {
        debug_assert!(!self.is_empty(), "remove_back on an empty ring");
        self.len -= 1;
        let index = self.physical(self.len);
        // SAFETY: the back slot was initialized and is no longer counted as occupied.
        unsafe { self.window.slot_mut(index).assume_init_read() }
    }

    /// Returns the element at logical position `index`, if occupied.
    pub(crate) fn get(&self, index: usize) -> Option<&T> {
        if index >= self.len {
            return None;
        }
        // SAFETY: occupied slots are initialized and lie within the window.
        Some(unsafe { self.window.slot(self.physical(index)).assume_init_ref() })
    }

    /// Returns the element at logical position `index` mutably, if occupied.
    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        if index >= self.len {
            return None;
        }
        let physical = self.physical(index);
        // SAFETY: occupied slots are initialized and lie within the window.
        Some(unsafe { self.window.slot_mut(physical).assume_init_mut() })
    }

    pub(crate) fn front(&self) -> Option<&T> {
        self.get(0)
    }

    pub(crate) fn front_mut(&mut self) -> Option<&mut T> {
        self.get_mut(0)
    }

    pub(crate) fn back(&self) -> Option<&T> {
        self.get(self.len.checked_sub(1)?)
    }

    pub(crate) fn back_mut(&mut self) -> Option<&mut T> {
        self.get_mut(self.len.checked_sub(1)?)
    }

    /// Drops every element (front to back) and moves the front back to slot zero.
    pub(crate) fn clear(&mut self) {
        while !self.is_empty() {
            // SAFETY: the ring is not empty.
            drop(unsafe { self.remove_front() });
        }
        self.head = 0;
    }
}
