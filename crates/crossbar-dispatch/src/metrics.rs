//! Channel metrics.
//!
//! Per-lane atomic counters, sampled into plain snapshots. Counters are
//! monotonic; `depth` is read from the lane at snapshot time.

use std::sync::atomic::{AtomicU64, Ordering};

use crossbar_proto::Priority;

/// Live counters for one lane.
#[derive(Debug, Default)]
pub(crate) struct LaneCounters {
    pub(crate) enqueued: AtomicU64,
    pub(crate) dequeued: AtomicU64,
    pub(crate) dropped: AtomicU64,
    pub(crate) expired: AtomicU64,
}

impl LaneCounters {
    pub(crate) fn snapshot(&self, depth: usize) -> LaneSnapshot {
        LaneSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dequeued: self.dequeued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            depth,
        }
    }
}

/// Point-in-time view of one lane.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LaneSnapshot {
    /// Packets accepted into the lane
    pub enqueued: u64,
    /// Packets handed to consumers
    pub dequeued: u64,
    /// Packets shed by the drop policy (including coalesce displacements)
    pub dropped: u64,
    /// Packets removed by the expiration sweep
    pub expired: u64,
    /// Packets waiting right now
    pub depth: usize,
}

/// Point-in-time view of the whole channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelMetrics {
    /// One snapshot per lane, indexed by [`Priority::lane`]
    pub lanes: [LaneSnapshot; Priority::LANES],
}

impl ChannelMetrics {
    /// Snapshot for one priority's lane.
    #[must_use]
    pub fn lane(&self, priority: Priority) -> &LaneSnapshot {
        &self.lanes[priority.lane()]
    }

    /// Packets waiting across all lanes.
    #[must_use]
    pub fn total_depth(&self) -> usize {
        self.lanes.iter().map(|lane| lane.depth).sum()
    }

    /// Packets shed across all lanes.
    #[must_use]
    pub fn total_dropped(&self) -> u64 {
        self.lanes.iter().map(|lane| lane.dropped).sum()
    }

    /// Packets expired across all lanes.
    #[must_use]
    pub fn total_expired(&self) -> u64 {
        self.lanes.iter().map(|lane| lane.expired).sum()
    }
}
