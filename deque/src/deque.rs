//! A double-ended queue stored in a chain of recycled ring-buffer blocks.

use crate::{node::Node, pool::Pool};
use std::{fmt, iter::FusedIterator, marker::PhantomData, mem::size_of, ptr::NonNull};

/// A double-ended queue of `T` stored in blocks of `N` elements.
///
/// Elements are packed inline in each block. Blocks are linked into a chain, acquired from a
/// shared [Pool] when the block at either end fills up, and released back to it as soon as
/// popping empties them.
///
/// Every operation is `O(1)` (amortized when a block boundary is crossed). A [Deque] is not
/// synchronized internally: all mutation goes through `&mut self`.
pub struct Deque<T, const N: usize> {
    head: Option<NonNull<Node<T, N>>>,
    tail: Option<NonNull<Node<T, N>>>,
    len: usize,
    pool: Pool<T, N>,
    marker: PhantomData<Box<Node<T, N>>>,
}

// SAFETY: a deque exclusively owns its blocks (and the elements they hold), like `Box<T>` does.
unsafe impl<T: Send, const N: usize> Send for Deque<T, N> {}

// SAFETY: shared access only reads elements and clones the (thread-safe) pool handle.
unsafe impl<T: Send + Sync, const N: usize> Sync for Deque<T, N> {}

impl<T, const N: usize> Deque<T, N> {
    /// Size in bytes of one block, including its links, bookkeeping, and inline storage.
    ///
    /// Equal to `7 * size_of::<usize>() + N * size_of::<T>()` for word-aligned `T`.
    pub const BLOCK_SIZE: usize = size_of::<Node<T, N>>();

    /// Creates an empty deque that draws its blocks from `pool`.
    ///
    /// No block is acquired until the first element is inserted.
    pub fn new(pool: Pool<T, N>) -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
            pool,
            marker: PhantomData,
        }
    }

    /// Returns the pool blocks are drawn from.
    pub fn pool(&self) -> &Pool<T, N> {
        &self.pool
    }

    /// Returns the number of elements.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the number of blocks currently linked.
    pub fn blocks(&self) -> usize {
        let mut blocks = 0;
        let mut cursor = self.head;
        while let Some(node) = cursor {
            blocks += 1;
            // SAFETY: linked blocks are live while `self` is borrowed.
            cursor = unsafe { (*node.as_ptr()).next };
        }
        blocks
    }

    /// Returns a head block with at least one free slot, linking a new one if needed.
    fn reserve_front(&mut self) -> NonNull<Node<T, N>> {
        let Some(head) = self.head else {
            let node = self.pool.acquire();
            self.head = Some(node);
            self.tail = Some(node);
            return node;
        };
        // SAFETY: the head block is live and exclusively ours.
        unsafe {
            if !(*head.as_ptr()).ring.is_full() {
                return head;
            }
            let node = self.pool.acquire();
            (*node.as_ptr()).next = Some(head);
            (*head.as_ptr()).prev = Some(node);
            self.head = Some(node);
            node
        }
    }

    /// Returns a tail block with at least one free slot, linking a new one if needed.
    fn reserve_back(&mut self) -> NonNull<Node<T, N>> {
        let Some(tail) = self.tail else {
            let node = self.pool.acquire();
            self.head = Some(node);
            self.tail = Some(node);
            return node;
        };
        // SAFETY: the tail block is live and exclusively ours.
        unsafe {
            if !(*tail.as_ptr()).ring.is_full() {
                return tail;
            }
            let node = self.pool.acquire();
            (*node.as_ptr()).prev = Some(tail);
            (*tail.as_ptr()).next = Some(node);
            self.tail = Some(node);
            node
        }
    }

    /// Places `value` in front of the first element and returns a reference to it.
    ///
    /// Acquires a block from the pool when the deque is empty or its head block is full.
    pub fn alloc_front(&mut self, value: T) -> &mut T {
        let node = self.reserve_front();
        self.len += 1;
        // SAFETY: `reserve_front` returned a linked block with a free slot. The reference borrows
        // `self`, so the block cannot be retired while the reference is live.
        unsafe { (*node.as_ptr()).ring.alloc_front().write(value) }
    }

    /// Places `value` behind the last element and returns a reference to it.
    ///
    /// Acquires a block from the pool when the deque is empty or its tail block is full.
    pub fn alloc_back(&mut self, value: T) -> &mut T {
        let node = self.reserve_back();
        self.len += 1;
        // SAFETY: see `alloc_front`.
        unsafe { (*node.as_ptr()).ring.alloc_back().write(value) }
    }

    pub fn push_front(&mut self, value: T) {
        self.alloc_front(value);
    }

    pub fn push_back(&mut self, value: T) {
        self.alloc_back(value);
    }

    /// Removes and returns the first element, or `None` if the deque is empty.
    ///
    /// Releases the head block to the pool once it no longer holds any element.
    pub fn pop_front(&mut self) -> Option<T> {
        let head = self.head?;
        self.len -= 1;
        // SAFETY: every linked block holds at least one element and is exclusively ours. A block
        // that becomes empty is unlinked before it is released.
        unsafe {
            let value = (*head.as_ptr()).ring.remove_front();
            if (*head.as_ptr()).ring.is_empty() {
                self.head = (*head.as_ptr()).next.take();
                match self.head {
                    Some(next) => (*next.as_ptr()).prev = None,
                    None => self.tail = None,
                }
                self.pool.release(head);
            }
            Some(value)
        }
    }

    /// Removes and returns the last element, or `None` if the deque is empty.
    ///
    /// Releases the tail block to the pool once it no longer holds any element.
    pub fn pop_back(&mut self) -> Option<T> {
        let tail = self.tail?;
        self.len -= 1;
        // SAFETY: see `pop_front`.
        unsafe {
            let value = (*tail.as_ptr()).ring.remove_back();
            if (*tail.as_ptr()).ring.is_empty() {
                self.tail = (*tail.as_ptr()).prev.take();
                match self.tail {
                    Some(prev) => (*prev.as_ptr()).next = None,
                    None => self.head = None,
                }
                self.pool.release(tail);
            }
            Some(value)
        }
    }

    pub fn front(&self) -> Option<&T> {
        // SAFETY: linked blocks are live while `self` is borrowed.
        self.head.and_then(|node| unsafe { (*node.as_ptr()).ring.front() })
    }

    pub fn front_mut(&mut self) -> Option<&mut T> {
        // SAFETY: linked blocks are live and exclusively ours while `self` is mutably borrowed.
        self.head.and_then(|node| unsafe { (*node.as_ptr()).ring.front_mut() })
    }

    pub fn back(&self) -> Option<&T> {
        // SAFETY: linked blocks are live while `self` is borrowed.
        self.tail.and_then(|node| unsafe { (*node.as_ptr()).ring.back() })
    }

    pub fn back_mut(&mut self) -> Option<&mut T> {
        // SAFETY: linked blocks are live and exclusively ours while `self` is mutably borrowed.
        self.tail.and_then(|node| unsafe { (*node.as_ptr()).ring.back_mut() })
    }

    /// Returns a front-to-back iterator over the elements.
    pub fn iter(&self) -> Iter<'_, T, N> {
        Iter {
            head: self.head,
            head_index: 0,
            tail: self.tail,
            // SAFETY: linked blocks are live while `self` is borrowed.
            tail_index: self
                .tail
                .map_or(0, |node| unsafe { (*node.as_ptr()).ring.len() }),
            remaining: self.len,
            marker: PhantomData,
        }
    }

    /// Drops every element and returns every block to the pool.
    pub fn clear(&mut self) {
        let mut cursor = self.head.take();
        self.tail = None;
        self.len = 0;
        while let Some(node) = cursor {
            // SAFETY: the chain was detached from `self` above, so each block is visited once and
            // released only after it has been unlinked and emptied.
            unsafe {
                cursor = (*node.as_ptr()).next.take();
                (*node.as_ptr()).prev = None;
                (*node.as_ptr()).ring.clear();
                self.pool.release(node);
            }
        }
    }
}

impl<T, const N: usize> Drop for Deque<T, N> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<T, const N: usize> Extend<T> for Deque<T, N> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for value in iter {
            self.push_back(value);
        }
    }
}

impl<T: fmt::Debug, const N: usize> fmt::Debug for Deque<T, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<'a, T, const N: usize> IntoIterator for &'a Deque<T, N> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T, N>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T, const N: usize> IntoIterator for Deque<T, N> {
    type Item = T;
    type IntoIter = IntoIter<T, N>;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter { deque: self }
    }
}

/// Borrowing iterator over a [Deque], created by [Deque::iter].
pub struct Iter<'a, T, const N: usize> {
    head: Option<NonNull<Node<T, N>>>,
    /// Logical index of the next element in `head`.
    head_index: usize,
    tail: Option<NonNull<Node<T, N>>>,
    /// Logical index one past the next element in `tail`.
    tail_index: usize,
    remaining: usize,
    marker: PhantomData<&'a Node<T, N>>,
}

// SAFETY: an iterator only hands out shared references to elements.
unsafe impl<T: Sync, const N: usize> Send for Iter<'_, T, N> {}
// SAFETY: see above.
unsafe impl<T: Sync, const N: usize> Sync for Iter<'_, T, N> {}

impl<T, const N: usize> Clone for Iter<'_, T, N> {
    fn clone(&self) -> Self {
        Self {
            head: self.head,
            head_index: self.head_index,
            tail: self.tail,
            tail_index: self.tail_index,
            remaining: self.remaining,
            marker: PhantomData,
        }
    }
}

impl<'a, T, const N: usize> Iterator for Iter<'a, T, N> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let node = self.head?;
        // SAFETY: `remaining` elements lie between the two cursors, all in blocks that outlive
        // the borrow of the deque.
        unsafe {
            let ring = &(*node.as_ptr()).ring;
            let item = ring.get(self.head_index)?;
            self.head_index += 1;
            if self.head_index == ring.len() {
                self.head = (*node.as_ptr()).next;
                self.head_index = 0;
            }
            self.remaining -= 1;
            Some(item)
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T, const N: usize> DoubleEndedIterator for Iter<'_, T, N> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let mut node = self.tail?;
        // SAFETY: see `next`.
        unsafe {
            if self.tail_index == 0 {
                node = (*node.as_ptr()).prev?;
                self.tail = Some(node);
                self.tail_index = (*node.as_ptr()).ring.len();
            }
            self.tail_index -= 1;
            let item = (*node.as_ptr()).ring.get(self.tail_index)?;
            self.remaining -= 1;
            Some(item)
        }
    }
}

impl<T, const N: usize> ExactSizeIterator for Iter<'_, T, N> {}

impl<T, const N: usize> FusedIterator for Iter<'_, T, N> {}

/// Owning iterator over a [Deque], created by [IntoIterator::into_iter].
///
/// Blocks are returned to the pool as they are drained.
pub struct IntoIter<T, const N: usize> {
    deque: Deque<T, N>,
}

impl<T, const N: usize> Iterator for IntoIter<T, N> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.deque.pop_front()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.deque.len(), Some(self.deque.len()))
    }
}

impl<T, const N: usize> DoubleEndedIterator for IntoIter<T, N> {
    fn next_back(&mut self) -> Option<T> {
        self.deque.pop_back()
    }
}

impl<T, const N: usize> ExactSizeIterator for IntoIter<T, N> {}

impl<T, const N: usize> FusedIterator for IntoIter<T, N> {}
