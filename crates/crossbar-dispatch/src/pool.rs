//! Bounded typed object pool.
//!
//! Backed by a lock-free MPMC ring, so acquisition and return never take a
//! lock. The pool is strictly bounded: `get` allocates fresh instances when
//! the ring is empty, and `put` silently drops the instance when the ring
//! is full — returns are best-effort by contract.

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::BytesMut;
use crossbeam_queue::ArrayQueue;

/// Types that can be recycled through an [`ObjectPool`].
///
/// `reset_for_pool` must erase all request-scoped state; an instance coming
/// out of the pool is indistinguishable from a fresh one except for
/// retained capacity.
pub trait Poolable: Send {
    /// Clear state before the instance re-enters the pool.
    fn reset_for_pool(&mut self);
}

impl Poolable for BytesMut {
    fn reset_for_pool(&mut self) {
        self.clear();
    }
}

impl Poolable for Vec<u8> {
    fn reset_for_pool(&mut self) {
        self.clear();
    }
}

/// Bounded pool of reusable `T` instances.
pub struct ObjectPool<T: Poolable> {
    slots: ArrayQueue<T>,
    factory: Box<dyn Fn() -> T + Send + Sync>,
    created: AtomicU64,
    reused: AtomicU64,
}

impl<T: Poolable> ObjectPool<T> {
    /// Pool holding at most `capacity` idle instances, creating new ones
    /// with `factory`.
    pub fn new(capacity: usize, factory: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Self {
            slots: ArrayQueue::new(capacity.max(1)),
            factory: Box::new(factory),
            created: AtomicU64::new(0),
            reused: AtomicU64::new(0),
        }
    }

    /// Take an instance: reused when one is idle, freshly created otherwise.
    pub fn get(&self) -> T {
        match self.slots.pop() {
            Some(instance) => {
                self.reused.fetch_add(1, Ordering::Relaxed);
                instance
            },
            None => {
                self.created.fetch_add(1, Ordering::Relaxed);
                (self.factory)()
            },
        }
    }

    /// Return an instance. Resets it first; drops it if the pool is full.
    pub fn put(&self, mut instance: T) {
        instance.reset_for_pool();
        // Best-effort: a full pool just lets the instance drop
        let _ = self.slots.push(instance);
    }

    /// Idle instances currently pooled.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// No idle instances are pooled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Maximum idle instances the pool retains.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.capacity()
    }

    /// `(created, reused)` counters since construction.
    #[must_use]
    pub fn stats(&self) -> (u64, u64) {
        (self.created.load(Ordering::Relaxed), self.reused.load(Ordering::Relaxed))
    }
}

impl<T: Poolable> std::fmt::Debug for ObjectPool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectPool")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}

/// Shared scratch-buffer pool used by encode/decode paths.
pub type BufferPool = ObjectPool<BytesMut>;

/// Buffer pool with `capacity` slots of `buffer_size` initial capacity.
#[must_use]
pub fn buffer_pool(capacity: usize, buffer_size: usize) -> BufferPool {
    ObjectPool::new(capacity, move || BytesMut::with_capacity(buffer_size))
}
