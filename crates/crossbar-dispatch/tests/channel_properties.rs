//! Property tests for the priority channel.
//!
//! Uses a synthetic item type with controllable expiry so the sweep
//! properties don't depend on wall-clock aging.

use std::time::Duration;

use crossbar_dispatch::{ChannelConfig, DropPolicy, PriorityChannel, Prioritized};
use crossbar_proto::Priority;
use proptest::prelude::*;

#[derive(Debug, Clone, PartialEq, Eq)]
struct TestItem {
    priority: Priority,
    seq: u32,
    expired: bool,
}

impl Prioritized for TestItem {
    fn priority(&self) -> Priority {
        self.priority
    }

    fn coalesce_key(&self) -> u64 {
        u64::from(self.seq % 8)
    }

    fn is_expired(&self, _ttl: Duration) -> bool {
        self.expired
    }
}

fn arbitrary_priority() -> impl Strategy<Value = Priority> {
    (0u8..5).prop_map(|p| Priority::try_from(p).expect("in range"))
}

fn arbitrary_items(max: usize) -> impl Strategy<Value = Vec<TestItem>> {
    prop::collection::vec((arbitrary_priority(), any::<bool>()), 0..max).prop_map(|entries| {
        entries
            .into_iter()
            .enumerate()
            .map(|(seq, (priority, expired))| TestItem { priority, seq: seq as u32, expired })
            .collect()
    })
}

fn channel(policy: DropPolicy, capacity: usize) -> PriorityChannel<TestItem> {
    PriorityChannel::new(&ChannelConfig {
        capacity_per_lane: [capacity; Priority::LANES],
        drop_policy: policy,
        max_consecutive_per_lane: None,
        enable_metrics: true,
    })
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime builds")
        .block_on(future)
}

proptest! {
    /// Strict priority: in the dequeue sequence, once an item of priority P
    /// is returned, no later item has higher priority (everything higher
    /// was already drained), and items within one lane come out FIFO.
    #[test]
    fn dequeue_is_strict_priority_and_lane_fifo(items in arbitrary_items(64)) {
        let channel = channel(DropPolicy::DropNewest, 64);

        block_on(async {
            for item in &items {
                channel.enqueue(item.clone()).await.expect("capacity covers the batch");
            }
        });

        let drained: Vec<TestItem> = std::iter::from_fn(|| channel.try_dequeue()).collect();
        prop_assert_eq!(drained.len(), items.len());

        // No later item outranks an earlier one
        for window in drained.windows(2) {
            prop_assert!(window[0].priority >= window[1].priority);
        }

        // FIFO within each lane
        for priority in Priority::DESCENDING {
            let lane_seqs: Vec<u32> =
                drained.iter().filter(|i| i.priority == priority).map(|i| i.seq).collect();
            let mut sorted = lane_seqs.clone();
            sorted.sort_unstable();
            prop_assert_eq!(lane_seqs, sorted);
        }
    }

    /// Any higher-priority item present before a dequeue starts is
    /// returned before any lower-priority item.
    #[test]
    fn higher_priority_always_preempts(
        low_count in 1usize..20,
        hi in arbitrary_priority().prop_filter("must outrank Low", |p| *p > Priority::Low),
    ) {
        let channel = channel(DropPolicy::DropNewest, 32);

        block_on(async {
            for seq in 0..low_count {
                channel
                    .enqueue(TestItem { priority: Priority::Low, seq: seq as u32, expired: false })
                    .await
                    .expect("capacity");
            }
            channel
                .enqueue(TestItem { priority: hi, seq: 999, expired: false })
                .await
                .expect("capacity");
        });

        let first = channel.try_dequeue().expect("channel is non-empty");
        prop_assert_eq!(first.seq, 999);
    }

    /// After a sweep no expired item remains, and the relative order of
    /// survivors is untouched.
    #[test]
    fn sweep_removes_exactly_the_expired(items in arbitrary_items(64)) {
        let channel = channel(DropPolicy::DropNewest, 64);

        block_on(async {
            for item in &items {
                channel.enqueue(item.clone()).await.expect("capacity");
            }
        });

        let expired_count = items.iter().filter(|i| i.expired).count() as u64;
        let swept = channel.sweep_expired(Duration::from_secs(1));
        prop_assert_eq!(swept, expired_count);

        let survivors: Vec<TestItem> = std::iter::from_fn(|| channel.try_dequeue()).collect();
        prop_assert!(survivors.iter().all(|i| !i.expired));

        // Survivor order per lane matches the enqueue order filtered
        for priority in Priority::DESCENDING {
            let expected: Vec<u32> = items
                .iter()
                .filter(|i| i.priority == priority && !i.expired)
                .map(|i| i.seq)
                .collect();
            let actual: Vec<u32> = survivors
                .iter()
                .filter(|i| i.priority == priority)
                .map(|i| i.seq)
                .collect();
            prop_assert_eq!(actual, expected);
        }
    }

    /// DropOldest never rejects and never exceeds lane capacity; the
    /// survivors are the newest items of each lane.
    #[test]
    fn drop_oldest_keeps_the_newest(items in arbitrary_items(48), capacity in 1usize..8) {
        let channel = channel(DropPolicy::DropOldest, capacity);

        block_on(async {
            for item in &items {
                channel.enqueue(item.clone()).await.expect("drop-oldest never rejects");
            }
        });

        for priority in Priority::DESCENDING {
            let lane: Vec<u32> = items
                .iter()
                .filter(|i| i.priority == priority)
                .map(|i| i.seq)
                .collect();
            let expected: Vec<u32> =
                lane.iter().rev().take(capacity).rev().copied().collect();

            let mut actual = Vec::new();
            while channel.lane_len(priority) > 0 {
                if let Some(item) = channel.try_dequeue() {
                    if item.priority == priority {
                        actual.push(item.seq);
                    }
                }
            }
            prop_assert_eq!(actual, expected);
        }
    }

    /// Coalesce holds at most one item per key per lane.
    #[test]
    fn coalesce_keeps_one_item_per_key(items in arbitrary_items(64)) {
        let channel = channel(DropPolicy::Coalesce, 64);

        block_on(async {
            for item in &items {
                let _ = channel.enqueue(item.clone()).await;
            }
        });

        let drained: Vec<TestItem> = std::iter::from_fn(|| channel.try_dequeue()).collect();
        for priority in Priority::DESCENDING {
            let mut keys: Vec<u64> = drained
                .iter()
                .filter(|i| i.priority == priority)
                .map(Prioritized::coalesce_key)
                .collect();
            let before = keys.len();
            keys.sort_unstable();
            keys.dedup();
            prop_assert_eq!(keys.len(), before, "duplicate coalesce key survived in a lane");
        }
    }
}
