//! Store elements in a double-ended queue of recycled, fixed-capacity blocks.
//!
//! [Deque] keeps its elements in a doubly-linked chain of blocks. Each block is a ring buffer of
//! `N` slots stored inline, so elements are packed contiguously rather than boxed one by one.
//! Blocks are drawn from a [Pool] shared by every deque of the same shape (element type and
//! capacity) and returned to it as soon as they empty, so steady push/pop traffic allocates
//! nothing.
//!
//! # Memory Overhead
//!
//! Each block costs `2` words of links, `2` words of ring bookkeeping (front index and length) and
//! `3` words for the window (pointer, length, capacity) the ring indexes through, on top of its
//! `N` inline slots. For word-aligned `T` this is exactly `7 * size_of::<usize>() + N *
//! size_of::<T>()` bytes, exposed as [Deque::BLOCK_SIZE].
//!
//! # Concurrency
//!
//! A [Deque] is not synchronized and requires `&mut self` to mutate. A [Pool] may be cloned and
//! shared by deques on any number of threads.
//!
//! # Status
//!
//! `commonware-deque` is **ALPHA** software and is not yet recommended for production use.
//! Developers should expect breaking changes and occasional instability.
//!
//! # Example
//!
//! ```rust
//! use commonware_deque::{Config, Deque, Pool};
//! use prometheus_client::registry::Registry;
//!
//! // Create a pool for blocks of 16 `u64`s
//! let mut registry = Registry::default();
//! let pool = Pool::<u64, 16>::new(Config::default(), &mut registry).unwrap();
//!
//! // Deques sharing the pool recycle each other's blocks
//! let mut deque = Deque::new(pool.clone());
//! deque.push_back(2);
//! deque.push_front(1);
//! *deque.alloc_back(3) += 1;
//! assert_eq!(deque.len(), 3);
//!
//! assert_eq!(deque.pop_front(), Some(1));
//! assert_eq!(deque.pop_back(), Some(4));
//! assert_eq!(deque.pop_back(), Some(2));
//! assert_eq!(deque.pop_back(), None);
//!
//! // The emptied block is waiting for the next deque
//! assert_eq!(pool.retained(), 1);
//! ```

#![doc(
    html_logo_url = "https://commonware.xyz/imgs/rustdoc_logo.svg",
    html_favicon_url = "https://commonware.xyz/favicon.ico"
)]

use thiserror::Error;

mod deque;
pub use deque::{Deque, IntoIter, Iter};
mod node;
pub mod pool;
pub use pool::{Config, Pool};
mod ring;

/// Errors that can occur when configuring a [Pool].
#[derive(Debug, Error)]
pub enum Error {
    #[error("block capacity must be non-zero")]
    ZeroCapacity,
    #[error("prefill ({prefill}) exceeds max retained ({max_retained})")]
    PrefillExceedsRetained { prefill: usize, max_retained: usize },
}
