//! Multi-priority bounded ingress channel.
//!
//! Five lanes, one per [`Priority`], each a bounded FIFO. Consumers always
//! drain the highest non-empty lane (strict priority; an optional fairness
//! knob caps consecutive dequeues from one lane). Producers hitting a full
//! lane get the configured [`DropPolicy`].
//!
//! Lanes are mutex-guarded deques rather than lock-free rings because the
//! expiration sweep and the `Coalesce` policy both need in-place traversal;
//! every lock section is short and never held across an await.

use std::{
    collections::VecDeque,
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use crossbar_proto::{Packet, Priority};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::{
    config::{ChannelConfig, DropPolicy},
    metrics::{ChannelMetrics, LaneCounters},
};

/// Items a [`PriorityChannel`] can carry.
pub trait Prioritized: Send {
    /// Lane this item queues in.
    fn priority(&self) -> Priority;

    /// Key the `Coalesce` policy groups replaceable items by.
    fn coalesce_key(&self) -> u64;

    /// Item has outlived `ttl` and should be swept.
    fn is_expired(&self, ttl: Duration) -> bool;
}

impl Prioritized for Packet {
    fn priority(&self) -> Priority {
        self.priority()
    }

    fn coalesce_key(&self) -> u64 {
        u64::from(self.opcode())
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.is_expired(ttl)
    }
}

/// Why an enqueue did not take effect.
#[derive(Debug, PartialEq, Eq)]
pub enum EnqueueError<T> {
    /// Lane full; the item is handed back
    Rejected(T),
    /// Channel closed; the item is handed back
    Closed(T),
}

/// How an accepted item entered its lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Appended to the lane tail
    Enqueued,
    /// Replaced a queued item with the same coalescing key
    Coalesced,
    /// The lane's oldest item was evicted to make room
    EvictedOldest,
}

/// Why a dequeue returned no item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DequeueError {
    /// Caller's cancellation token fired
    Canceled,
    /// Channel closed and fully drained
    Closed,
}

struct Lane<T> {
    queue: Mutex<VecDeque<T>>,
    capacity: usize,
    space_wake: Notify,
    counters: LaneCounters,
}

impl<T> Lane<T> {
    fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
            space_wake: Notify::new(),
            counters: LaneCounters::default(),
        }
    }
}

#[derive(Default)]
struct FairState {
    last_lane: usize,
    run_len: u32,
}

/// Bounded multi-priority MPMC channel.
pub struct PriorityChannel<T: Prioritized> {
    lanes: [Lane<T>; Priority::LANES],
    policy: DropPolicy,
    fairness: Option<u32>,
    fair_state: Mutex<FairState>,
    consumer_wake: Notify,
    closed: AtomicBool,
    metrics_enabled: bool,
}

impl<T: Prioritized> PriorityChannel<T> {
    /// Channel with the given lane capacities and drop policy.
    #[must_use]
    pub fn new(config: &ChannelConfig) -> Self {
        Self {
            lanes: std::array::from_fn(|i| Lane::new(config.capacity_per_lane[i])),
            policy: config.drop_policy,
            fairness: config.max_consecutive_per_lane,
            fair_state: Mutex::new(FairState::default()),
            consumer_wake: Notify::new(),
            closed: AtomicBool::new(false),
            metrics_enabled: config.enable_metrics,
        }
    }

    /// Place an item in the lane for its priority.
    ///
    /// Suspends only under [`DropPolicy::Block`] on a full lane; every other
    /// policy resolves synchronously. Cancellation under `Block` is the
    /// caller's: drop the future (it holds no lock while suspended).
    ///
    /// # Errors
    ///
    /// [`EnqueueError::Rejected`] under `DropNewest` (or `Coalesce` with no
    /// key match) on a full lane; [`EnqueueError::Closed`] after
    /// [`Self::close`]. Both hand the item back.
    pub async fn enqueue(&self, item: T) -> Result<EnqueueOutcome, EnqueueError<T>> {
        if self.is_closed() {
            return Err(EnqueueError::Closed(item));
        }

        let lane_index = item.priority().lane();
        match self.policy {
            DropPolicy::DropNewest => self.push_or_reject(lane_index, item),
            DropPolicy::DropOldest => Ok(self.push_evicting(lane_index, item)),
            DropPolicy::Coalesce => self.push_coalescing(lane_index, item),
            DropPolicy::Block => self.push_blocking(lane_index, item).await,
        }
    }

    fn push_or_reject(&self, lane_index: usize, item: T) -> Result<EnqueueOutcome, EnqueueError<T>> {
        let lane = &self.lanes[lane_index];
        {
            let mut queue = lane.queue.lock();
            if queue.len() >= lane.capacity {
                drop(queue);
                self.count(lane_index, |c| &c.dropped);
                return Err(EnqueueError::Rejected(item));
            }
            queue.push_back(item);
        }
        self.accepted(lane_index);
        Ok(EnqueueOutcome::Enqueued)
    }

    fn push_evicting(&self, lane_index: usize, item: T) -> EnqueueOutcome {
        let lane = &self.lanes[lane_index];
        let evicted = {
            let mut queue = lane.queue.lock();
            let evicted = if queue.len() >= lane.capacity { queue.pop_front() } else { None };
            queue.push_back(item);
            evicted
        };

        self.accepted(lane_index);
        if evicted.is_some() {
            self.count(lane_index, |c| &c.dropped);
            EnqueueOutcome::EvictedOldest
        } else {
            EnqueueOutcome::Enqueued
        }
    }

    fn push_coalescing(
        &self,
        lane_index: usize,
        item: T,
    ) -> Result<EnqueueOutcome, EnqueueError<T>> {
        let lane = &self.lanes[lane_index];
        let key = item.coalesce_key();
        {
            let mut queue = lane.queue.lock();
            if let Some(slot) = queue.iter_mut().find(|queued| queued.coalesce_key() == key) {
                // Displace in place: lane order is preserved, the newer
                // item takes the older one's slot
                *slot = item;
                drop(queue);
                self.count(lane_index, |c| &c.dropped);
                self.count(lane_index, |c| &c.enqueued);
                return Ok(EnqueueOutcome::Coalesced);
            }
            if queue.len() >= lane.capacity {
                drop(queue);
                self.count(lane_index, |c| &c.dropped);
                return Err(EnqueueError::Rejected(item));
            }
            queue.push_back(item);
        }
        self.accepted(lane_index);
        Ok(EnqueueOutcome::Enqueued)
    }

    async fn push_blocking(
        &self,
        lane_index: usize,
        item: T,
    ) -> Result<EnqueueOutcome, EnqueueError<T>> {
        let lane = &self.lanes[lane_index];
        loop {
            // Arm the waiter before the capacity check so a slot freed in
            // between still wakes us
            let space = lane.space_wake.notified();
            tokio::pin!(space);
            space.as_mut().enable();

            if self.is_closed() {
                return Err(EnqueueError::Closed(item));
            }

            {
                let mut queue = lane.queue.lock();
                if queue.len() < lane.capacity {
                    queue.push_back(item);
                    drop(queue);
                    self.accepted(lane_index);
                    return Ok(EnqueueOutcome::Enqueued);
                }
            }

            // Re-check after waking: another producer may race us to the slot
            space.await;
        }
    }

    /// Take the next item without waiting: highest non-empty lane, FIFO
    /// within a lane, subject to the fairness knob.
    pub fn try_dequeue(&self) -> Option<T> {
        let mut fair = self.fair_state.lock();

        let preferred = self.pick_lane(&fair)?;
        let item = {
            let mut queue = self.lanes[preferred].queue.lock();
            queue.pop_front()
        }?;

        if fair.last_lane == preferred {
            fair.run_len += 1;
        } else {
            fair.last_lane = preferred;
            fair.run_len = 1;
        }
        drop(fair);

        self.count(preferred, |c| &c.dequeued);
        self.lanes[preferred].space_wake.notify_one();
        Some(item)
    }

    /// Lane to serve next, or `None` when everything is empty.
    fn pick_lane(&self, fair: &FairState) -> Option<usize> {
        let strict = Priority::DESCENDING
            .iter()
            .map(|p| p.lane())
            .find(|&lane| !self.lanes[lane].queue.lock().is_empty())?;

        if let Some(limit) = self.fairness {
            if strict == fair.last_lane && fair.run_len >= limit {
                // Give one turn to the next non-empty lane, if any
                let other = Priority::DESCENDING
                    .iter()
                    .map(|p| p.lane())
                    .find(|&lane| lane != strict && !self.lanes[lane].queue.lock().is_empty());
                return Some(other.unwrap_or(strict));
            }
        }
        Some(strict)
    }

    /// Take the next item, waiting until one arrives, the token cancels, or
    /// the channel closes empty.
    ///
    /// Strict-priority guarantee: any item at a higher priority present
    /// before this call starts is returned before lower-priority items.
    pub async fn dequeue(&self, cancel: &CancellationToken) -> Result<T, DequeueError> {
        loop {
            let wake = self.consumer_wake.notified();
            tokio::pin!(wake);
            wake.as_mut().enable();

            if let Some(item) = self.try_dequeue() {
                return Ok(item);
            }
            if self.is_closed() {
                return Err(DequeueError::Closed);
            }

            tokio::select! {
                () = &mut wake => {},
                () = cancel.cancelled() => return Err(DequeueError::Canceled),
            }
        }
    }

    /// Drop every queued item older than `ttl`.
    ///
    /// Order within the surviving items is preserved. Returns the number
    /// swept. Safe to run concurrently with producers and consumers; each
    /// lane is locked briefly in turn.
    pub fn sweep_expired(&self, ttl: Duration) -> u64 {
        let mut swept = 0u64;
        for (lane_index, lane) in self.lanes.iter().enumerate() {
            let removed = {
                let mut queue = lane.queue.lock();
                let before = queue.len();
                queue.retain(|item| !item.is_expired(ttl));
                before - queue.len()
            };

            if removed > 0 {
                if self.metrics_enabled {
                    self.lanes[lane_index]
                        .counters
                        .expired
                        .fetch_add(removed as u64, Ordering::Relaxed);
                }
                for _ in 0..removed {
                    lane.space_wake.notify_one();
                }
                swept += removed as u64;
            }
        }
        swept
    }

    /// Drop everything in one lane, or in all lanes.
    pub fn flush(&self, lane: Option<Priority>) -> u64 {
        let mut flushed = 0u64;
        for (lane_index, target) in self.lanes.iter().enumerate() {
            if let Some(priority) = lane {
                if priority.lane() != lane_index {
                    continue;
                }
            }
            let removed = {
                let mut queue = target.queue.lock();
                let count = queue.len();
                queue.clear();
                count
            };
            if self.metrics_enabled {
                target.counters.dropped.fetch_add(removed as u64, Ordering::Relaxed);
            }
            for _ in 0..removed {
                target.space_wake.notify_one();
            }
            flushed += removed as u64;
        }
        flushed
    }

    /// Stop accepting items and wake every waiter. Queued items remain
    /// dequeueable until drained.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.consumer_wake.notify_waiters();
        for lane in &self.lanes {
            lane.space_wake.notify_waiters();
        }
    }

    /// Channel no longer accepts items.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Items waiting across all lanes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lanes.iter().map(|lane| lane.queue.lock().len()).sum()
    }

    /// No items waiting in any lane.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lanes.iter().all(|lane| lane.queue.lock().is_empty())
    }

    /// Items waiting in one lane.
    #[must_use]
    pub fn lane_len(&self, priority: Priority) -> usize {
        self.lanes[priority.lane()].queue.lock().len()
    }

    /// Current counters and depths.
    #[must_use]
    pub fn metrics(&self) -> ChannelMetrics {
        ChannelMetrics {
            lanes: std::array::from_fn(|i| {
                self.lanes[i].counters.snapshot(self.lanes[i].queue.lock().len())
            }),
        }
    }

    fn accepted(&self, lane_index: usize) {
        self.count(lane_index, |c| &c.enqueued);
        self.consumer_wake.notify_one();
    }

    fn count(
        &self,
        lane_index: usize,
        counter: impl Fn(&LaneCounters) -> &std::sync::atomic::AtomicU64,
    ) {
        if self.metrics_enabled {
            counter(&self.lanes[lane_index].counters).fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl<T: Prioritized> std::fmt::Debug for PriorityChannel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriorityChannel")
            .field("depth", &self.len())
            .field("policy", &self.policy)
            .field("closed", &self.is_closed())
            .finish()
    }
}
