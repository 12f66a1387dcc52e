//! Recycle retired blocks across every [crate::Deque] of the same shape.
//!
//! A [Pool] serves exactly one block shape: element type `T` stored in blocks of `N` slots. The
//! shape is part of the pool's type, so a block can never be handed to a deque of a different
//! shape and no runtime type lookup is needed to find the right freelist.
//!
//! # Thread Safety
//!
//! [Pool] is a cheaply cloneable handle (`Send + Sync` when `T: Send`). Every clone shares the same
//! freelist, a lock-free bounded queue ([crossbeam_queue::ArrayQueue]), so deques living on
//! different threads can acquire and release blocks concurrently. A block is never handed to two
//! callers, but no reuse order (FIFO or LIFO) is promised.
//!
//! # Binding
//!
//! Each block indexes its slots through a window into its own inline storage. The window is
//! rebound every time a block is acquired, whether the block is fresh or recycled, so a block's
//! window can only ever address that block's slots.
//!
//! # Retention
//!
//! At most [Config::max_retained] retired blocks are kept for reuse. Blocks released beyond that
//! limit are deallocated. When the freelist is empty, [Pool] allocates a fresh block.

use crate::{node::Node, Error};
use crossbeam_queue::ArrayQueue;
use prometheus_client::{
    metrics::{counter::Counter, gauge::Gauge},
    registry::Registry,
};
use std::{num::NonZeroUsize, ptr::NonNull, sync::Arc};
use tracing::{debug, trace};

/// Default for [Config::max_retained].
const DEFAULT_MAX_RETAINED: NonZeroUsize = match NonZeroUsize::new(1024) {
    Some(max) => max,
    None => unreachable!(),
};

/// Configuration for a [Pool].
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum number of retired blocks held for reuse.
    pub max_retained: NonZeroUsize,

    /// Number of blocks to allocate when the pool is created. Must not exceed `max_retained`.
    pub prefill: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_retained: DEFAULT_MAX_RETAINED,
            prefill: 0,
        }
    }
}

/// Metrics for a [Pool].
struct Metrics {
    /// Blocks allocated because no retired block was available.
    created: Counter,
    /// Blocks handed out from the freelist.
    reused: Counter,
    /// Blocks returned by a deque.
    released: Counter,
    /// Released blocks deallocated because the freelist was full.
    discarded: Counter,
    /// Blocks waiting in the freelist.
    retained: Gauge,
    /// Blocks currently linked into a deque.
    outstanding: Gauge,
}

impl Metrics {
    fn init(registry: &mut Registry) -> Self {
        let metrics = Self {
            created: Counter::default(),
            reused: Counter::default(),
            released: Counter::default(),
            discarded: Counter::default(),
            retained: Gauge::default(),
            outstanding: Gauge::default(),
        };
        registry.register(
            "blocks_created",
            "Number of blocks allocated because none were retained",
            metrics.created.clone(),
        );
        registry.register(
            "blocks_reused",
            "Number of retained blocks handed back out",
            metrics.reused.clone(),
        );
        registry.register(
            "blocks_released",
            "Number of blocks returned to the pool",
            metrics.released.clone(),
        );
        registry.register(
            "blocks_discarded",
            "Number of returned blocks deallocated because the pool was full",
            metrics.discarded.clone(),
        );
        registry.register(
            "blocks_retained",
            "Number of blocks available for reuse",
            metrics.retained.clone(),
        );
        registry.register(
            "blocks_outstanding",
            "Number of blocks currently held by a deque",
            metrics.outstanding.clone(),
        );
        metrics
    }
}

/// A block waiting in the freelist.
struct Retired<T, const N: usize>(Box<Node<T, N>>);

// SAFETY: retired blocks are unlinked and hold no elements, so moving one between threads moves
// neither a `T` nor a reference to another block.
unsafe impl<T: Send, const N: usize> Send for Retired<T, N> {}

struct Inner<T, const N: usize> {
    config: Config,
    freelist: ArrayQueue<Retired<T, N>>,
    metrics: Metrics,
}

/// A shared pool of blocks holding `N` elements of type `T`.
pub struct Pool<T, const N: usize> {
    inner: Arc<Inner<T, N>>,
}

impl<T, const N: usize> Clone for Pool<T, N> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T, const N: usize> std::fmt::Debug for Pool<T, N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("capacity", &N)
            .field("config", &self.inner.config)
            .field("retained", &self.retained())
            .finish()
    }
}

impl<T, const N: usize> Pool<T, N> {
    /// Creates a pool for blocks of `N` slots and registers its metrics.
    ///
    /// # Errors
    ///
    /// - [Error::ZeroCapacity]: `N` is zero, so no block could ever hold an element
    /// - [Error::PrefillExceedsRetained]: `config.prefill` exceeds `config.max_retained`
    pub fn new(config: Config, registry: &mut Registry) -> Result<Self, Error> {
        if N == 0 {
            return Err(Error::ZeroCapacity);
        }
        if config.prefill > config.max_retained.get() {
            return Err(Error::PrefillExceedsRetained {
                prefill: config.prefill,
                max_retained: config.max_retained.get(),
            });
        }

        let metrics = Metrics::init(registry);
        let freelist = ArrayQueue::new(config.max_retained.get());
        for _ in 0..config.prefill {
            let _ = freelist.push(Retired(Node::boxed()));
        }
        metrics.created.inc_by(config.prefill as u64);
        metrics.retained.set(config.prefill as i64);
        debug!(
            capacity = N,
            max_retained = config.max_retained.get(),
            prefill = config.prefill,
            "initialized block pool"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                freelist,
                metrics,
            }),
        })
    }

    /// Returns the pool configuration.
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Returns the number of blocks currently available for reuse.
    pub fn retained(&self) -> usize {
        self.inner.freelist.len()
    }

    /// Hands out an unlinked, empty block whose window addresses its own slots.
    ///
    /// Ownership of the block passes to the caller, who must eventually give it back through
    /// [Pool::release].
    pub(crate) fn acquire(&self) -> NonNull<Node<T, N>> {
        let node = match self.inner.freelist.pop() {
            Some(Retired(node)) => {
                self.inner.metrics.reused.inc();
                self.inner.metrics.retained.dec();
                node
            }
            None => {
                self.inner.metrics.created.inc();
                Node::boxed()
            }
        };
        self.inner.metrics.outstanding.inc();

        let node = NonNull::from(Box::leak(node));
        // SAFETY: the node was just leaked from its box, holds no elements, and is not borrowed.
        unsafe { Node::bind(node) };
        node
    }

    /// Takes back a block previously handed out by [Pool::acquire].
    ///
    /// # Safety
    ///
    /// `node` must come from [Pool::acquire] on this pool (or one of its clones), must be unlinked
    /// and empty, and must not be used again by the caller.
    pub(crate) unsafe fn release(&self, node: NonNull<Node<T, N>>) {
        // SAFETY: the caller hands back the allocation leaked by `acquire`.
        let mut node = unsafe { Box::from_raw(node.as_ptr()) };
        debug_assert!(node.is_detached(), "released block is still linked");
        debug_assert!(node.ring.is_empty(), "released block still holds elements");
        node.reset();

        self.inner.metrics.released.inc();
        self.inner.metrics.outstanding.dec();
        match self.inner.freelist.push(Retired(node)) {
            Ok(()) => {
                self.inner.metrics.retained.inc();
            }
            Err(_) => {
                self.inner.metrics.discarded.inc();
                trace!(capacity = N, "block pool full, deallocating block");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus_client::encoding::text::encode;
    use std::{collections::HashSet, thread};

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::TRACE)
            .try_init();
    }

    fn metrics(registry: &Registry) -> String {
        let mut buffer = String::new();
        encode(&mut buffer, registry).unwrap();
        buffer
    }

    fn config(max_retained: usize, prefill: usize) -> Config {
        Config {
            max_retained: NonZeroUsize::new(max_retained).unwrap(),
            prefill,
        }
    }

    #[test]
    fn test_zero_capacity() {
        let mut registry = Registry::default();
        let result = Pool::<u64, 0>::new(Config::default(), &mut registry);
        assert!(matches!(result, Err(Error::ZeroCapacity)));
    }

    #[test]
    fn test_prefill_exceeds_retained() {
        let mut registry = Registry::default();
        let result = Pool::<u64, 4>::new(config(2, 3), &mut registry);
        assert!(matches!(
            result,
            Err(Error::PrefillExceedsRetained {
                prefill: 3,
                max_retained: 2
            })
        ));
    }

    #[test]
    fn test_acquire_binds_own_storage() {
        let mut registry = Registry::default();
        let pool = Pool::<u64, 8>::new(Config::default(), &mut registry).unwrap();

        let first = pool.acquire();
        let second = pool.acquire();
        assert_ne!(first, second);
        unsafe {
            for node in [first, second] {
                assert!((*node.as_ptr()).is_bound());
                assert!((*node.as_ptr()).is_detached());
                assert_eq!((*node.as_ptr()).ring.capacity(), 8);
            }
            pool.release(first);
            pool.release(second);
        }
        assert_eq!(pool.retained(), 2);

        // Recycled blocks are rebound to their own slots
        let mut seen = HashSet::new();
        for _ in 0..2 {
            let node = pool.acquire();
            assert!(seen.insert(node));
            assert!([first, second].contains(&node));
            unsafe { assert!((*node.as_ptr()).is_bound()) };
        }
        for node in seen {
            unsafe { pool.release(node) };
        }

        let buffer = metrics(&registry);
        assert!(buffer.contains("blocks_created_total 2"));
        assert!(buffer.contains("blocks_reused_total 2"));
        assert!(buffer.contains("blocks_released_total 4"));
        assert!(buffer.contains("blocks_retained 2"));
        assert!(buffer.contains("blocks_outstanding 0"));
    }

    #[test]
    fn test_release_resets_block() {
        let mut registry = Registry::default();
        let pool = Pool::<u64, 4>::new(config(1, 0), &mut registry).unwrap();

        let node = pool.acquire();
        unsafe {
            let ring = &mut (*node.as_ptr()).ring;
            ring.alloc_back().write(1);
            ring.alloc_back().write(2);
            ring.remove_front();
            ring.remove_front();
            pool.release(node);
        }

        let node = pool.acquire();
        unsafe {
            let ring = &mut (*node.as_ptr()).ring;
            assert!(ring.is_empty());
            assert_eq!(ring.front(), None);
            ring.alloc_front().write(9);
            assert_eq!(ring.back(), Some(&9));
            ring.clear();
            pool.release(node);
        }
    }

    #[test]
    fn test_retention_limit() {
        init_tracing();
        let mut registry = Registry::default();
        let pool = Pool::<u64, 4>::new(config(2, 0), &mut registry).unwrap();

        let nodes: Vec<_> = (0..3).map(|_| pool.acquire()).collect();
        for node in nodes {
            unsafe { pool.release(node) };
        }
        assert_eq!(pool.retained(), 2);

        let buffer = metrics(&registry);
        assert!(buffer.contains("blocks_created_total 3"));
        assert!(buffer.contains("blocks_discarded_total 1"));
        assert!(buffer.contains("blocks_retained 2"));
    }

    #[test]
    fn test_prefill() {
        let mut registry = Registry::default();
        let pool = Pool::<u64, 4>::new(config(8, 4), &mut registry).unwrap();
        assert_eq!(pool.retained(), 4);

        let node = pool.acquire();
        assert_eq!(pool.retained(), 3);
        unsafe {
            assert!((*node.as_ptr()).is_bound());
            pool.release(node);
        }

        let buffer = metrics(&registry);
        assert!(buffer.contains("blocks_created_total 4"));
        assert!(buffer.contains("blocks_reused_total 1"));
        assert!(buffer.contains("blocks_retained 4"));
    }

    #[test]
    fn test_clones_share_freelist() {
        let mut registry = Registry::default();
        let pool = Pool::<u64, 4>::new(Config::default(), &mut registry).unwrap();
        let other = pool.clone();

        let node = pool.acquire();
        unsafe { other.release(node) };
        assert_eq!(pool.retained(), 1);
        assert_eq!(other.retained(), 1);
        assert_eq!(other.acquire(), node);
        unsafe { pool.release(node) };
    }

    #[test]
    fn test_concurrent_acquire_release() {
        const THREADS: u64 = 8;
        const ROUNDS: usize = 500;

        let mut registry = Registry::default();
        let pool = Pool::<u64, 16>::new(config(4, 0), &mut registry).unwrap();

        let handles: Vec<_> = (0..THREADS)
            .map(|id| {
                let pool = pool.clone();
                thread::spawn(move || {
                    for _ in 0..ROUNDS {
                        let node = pool.acquire();
                        unsafe {
                            let ring = &mut (*node.as_ptr()).ring;
                            while !ring.is_full() {
                                ring.alloc_back().write(id);
                            }
                            // No other thread may observe or modify this block
                            thread::yield_now();
                            while !ring.is_empty() {
                                assert_eq!(ring.remove_front(), id);
                            }
                            pool.release(node);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(pool.retained() <= 4);
        let buffer = metrics(&registry);
        assert!(buffer.contains("blocks_outstanding 0"));
        assert!(buffer.contains(&format!(
            "blocks_released_total {}",
            THREADS as usize * ROUNDS
        )));
    }
}
