//! Dispatcher configuration.

use std::time::Duration;

use crossbar_proto::Priority;

/// How a full lane treats a new packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DropPolicy {
    /// Reject the incoming packet
    #[default]
    DropNewest,
    /// Evict the oldest packet in the same lane, then enqueue
    DropOldest,
    /// Suspend the producer until a slot frees or cancellation fires
    Block,
    /// Replace a queued packet with the same coalescing key; reject if none
    Coalesce,
}

/// Priority channel tuning.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Capacity of each lane, indexed by [`Priority::lane`]
    pub capacity_per_lane: [usize; Priority::LANES],
    /// Behavior when the target lane is full
    pub drop_policy: DropPolicy,
    /// Fairness knob: after this many consecutive dequeues from one lane,
    /// give one slot to the next non-empty lane. `None` = strict priority.
    pub max_consecutive_per_lane: Option<u32>,
    /// Per-lane atomic counters maintained when set
    pub enable_metrics: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            capacity_per_lane: [1024; Priority::LANES],
            drop_policy: DropPolicy::default(),
            max_consecutive_per_lane: None,
            enable_metrics: true,
        }
    }
}

/// Rate limiter housekeeping bounds.
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Hard cap on tracked `(endpoint, group)` keys; a sweep runs at the cap
    pub max_entries: usize,
    /// Keys idle longer than this are evicted by the sweep
    pub idle_ttl: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self { max_entries: 64 * 1024, idle_ttl: Duration::from_secs(300) }
    }
}

/// Top-level dispatcher configuration.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Worker task count; defaults to the CPU count
    pub workers: usize,
    /// Ingress channel tuning
    pub channel: ChannelConfig,
    /// Applied to handlers without an explicit timeout. `None` = unlimited.
    pub default_timeout: Option<Duration>,
    /// Payloads above twice this size are compressed on TCP replies
    pub compression_threshold: usize,
    /// Rate limiter housekeeping
    pub rate_limiter: RateLimiterConfig,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism().map_or(4, std::num::NonZeroUsize::get),
            channel: ChannelConfig::default(),
            default_timeout: None,
            compression_threshold: 1024,
            rate_limiter: RateLimiterConfig::default(),
        }
    }
}
