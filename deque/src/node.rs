//! A block of inline storage that can be linked into a chain.

use crate::ring::{Ring, Window};
use std::{
    mem::MaybeUninit,
    ptr::{self, NonNull},
};

/// One fixed-capacity block: links to its neighbors, the ring bookkeeping, and the slots the ring
/// indexes into.
///
/// Links are non-owning. Whoever holds the chain owns every node reachable from it.
pub(crate) struct Node<T, const N: usize> {
    pub(crate) prev: Option<NonNull<Node<T, N>>>,
    pub(crate) next: Option<NonNull<Node<T, N>>>,
    pub(crate) ring: Ring<T>,
    slots: [MaybeUninit<T>; N],
}

impl<T, const N: usize> Node<T, N> {
    /// Allocates an unlinked, empty node with an unbound window.
    ///
    /// The node is built in place so large blocks never pass through the stack.
    pub(crate) fn boxed() -> Box<Self> {
        let mut node = Box::<Self>::new_uninit();
        let raw = node.as_mut_ptr();
        // SAFETY: `raw` points to an allocation sized for `Self`. Every field other than `slots` is
        // written, and `slots` is an array of `MaybeUninit` which needs no initialization.
        unsafe {
            ptr::addr_of_mut!((*raw).prev).write(None);
            ptr::addr_of_mut!((*raw).next).write(None);
            ptr::addr_of_mut!((*raw).ring).write(Ring::new(Window::unbound()));
            node.assume_init()
        }
    }

    /// Points the window of `node` at the node's own slots.
    ///
    /// Must be called every time a node leaves its box: a window bound before the node was boxed,
    /// moved, or recycled must never be trusted.
    ///
    /// # Safety
    ///
    /// `node` must point to a live node that holds no elements and is not borrowed.
    pub(crate) unsafe fn bind(node: NonNull<Self>) {
        let node = node.as_ptr();
        // SAFETY: the caller guarantees `node` is live and unborrowed. The slot pointer is derived
        // from `node` itself so it stays valid for as long as the node is only reached through it.
        unsafe {
            let slots = NonNull::new_unchecked(ptr::addr_of_mut!((*node).slots));
            (*node).ring.rebind(Window::over(slots));
        }
    }

    /// Returns whether the window addresses this node's own slots.
    pub(crate) fn is_bound(&self) -> bool {
        self.ring.window().addresses(ptr::addr_of!(self.slots))
    }

    pub(crate) const fn is_detached(&self) -> bool {
        self.prev.is_none() && self.next.is_none()
    }

    /// Returns the node to its freshly allocated state: unlinked, empty, and unbound.
    pub(crate) fn reset(&mut self) {
        self.prev = None;
        self.next = None;
        self.ring.clear();
        self.ring.rebind(Window::unbound());
    }
}
