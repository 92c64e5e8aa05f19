//! Sliding-window rate limiter.
//!
//! One concurrent map keyed by `(remote IP, rate group)`. Each entry keeps
//! a timestamp log of recent hits; a hit is admitted when fewer than `max`
//! hits fall inside the window. Keys are the *IP*, not the full socket
//! address, so a peer cannot reset its budget by reconnecting from a new
//! source port.
//!
//! State is bounded two ways: idle keys are evicted by a TTL sweep, and
//! reaching the capacity cap forces a sweep before any new key is admitted.

use std::{
    collections::VecDeque,
    net::IpAddr,
    sync::Arc,
    time::{Duration, Instant},
};

use dashmap::DashMap;

use crate::config::RateLimiterConfig;

/// What a rate group is keyed by.
///
/// Handlers with an explicit group name share one budget across opcodes;
/// handlers without one get a per-opcode budget.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RateScope {
    /// Shared named budget
    Group(Arc<str>),
    /// Per-opcode budget
    Opcode(u16),
}

/// Limiter key: one budget per `(peer IP, scope)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateKey {
    /// Peer IP (port deliberately excluded)
    pub ip: IpAddr,
    /// Budget scope
    pub scope: RateScope,
}

/// Outcome of a limiter check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// Under budget; the hit was recorded
    Allowed,
    /// Over budget; the hit was not recorded
    Limited,
}

#[derive(Debug)]
struct Window {
    hits: VecDeque<Instant>,
    last_hit: Instant,
}

/// Concurrent sliding-window limiter.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    windows: DashMap<RateKey, Window>,
    config: RateLimiterConfig,
}

impl SlidingWindowLimiter {
    /// Limiter with the given housekeeping bounds.
    #[must_use]
    pub fn new(config: RateLimiterConfig) -> Self {
        Self { windows: DashMap::new(), config }
    }

    /// Record a hit for `key` if it fits within `max` hits per `window`.
    pub fn check(&self, key: RateKey, max: u32, window: Duration) -> RateDecision {
        let now = Instant::now();

        if self.windows.len() >= self.config.max_entries && !self.windows.contains_key(&key) {
            self.sweep();
        }

        let mut entry = self.windows.entry(key).or_insert_with(|| Window {
            hits: VecDeque::new(),
            last_hit: now,
        });

        // Slide the window: forget hits older than `window`
        while let Some(&oldest) = entry.hits.front() {
            if now.duration_since(oldest) >= window {
                entry.hits.pop_front();
            } else {
                break;
            }
        }

        entry.last_hit = now;
        if entry.hits.len() < max as usize {
            entry.hits.push_back(now);
            RateDecision::Allowed
        } else {
            RateDecision::Limited
        }
    }

    /// Evict keys idle longer than the configured TTL. Returns evictions.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let ttl = self.config.idle_ttl;
        let before = self.windows.len();
        self.windows.retain(|_, window| now.duration_since(window.last_hit) < ttl);
        before.saturating_sub(self.windows.len())
    }

    /// Tracked keys right now.
    #[must_use]
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }
}
