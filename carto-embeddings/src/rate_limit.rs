//! Interval token bucket shared by every embedding request of a run.
//!
//! The bucket holds `capacity` tokens and is refilled in full once a whole
//! interval has passed since the previous refill. A caller that finds it
//! empty takes a place in the wait queue and sleeps until the next refill,
//! plus one more interval for every `capacity` callers ahead of it, then
//! tries again. Nobody is ever turned away.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Calls allowed per interval by the default quota.
pub const DEFAULT_CALLS_PER_INTERVAL: u32 = 2200;

/// Length of the default quota interval.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct BucketState {
    tokens: u32,
    last_refill: Instant,
}

#[derive(Debug)]
pub struct TokenBucket {
    capacity: u32,
    interval: Duration,
    state: Mutex<BucketState>,
    waiting: AtomicU64,
}

/// Leaves the wait queue when dropped, including on cancellation.
struct QueueSlot<'a>(&'a AtomicU64);

impl Drop for QueueSlot<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl TokenBucket {
    /// A bucket that starts full. `capacity` is clamped to at least one.
    pub fn new(capacity: u32, interval: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            interval,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
            waiting: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Callers currently sleeping for a refill.
    pub fn waiting(&self) -> u64 {
        self.waiting.load(Ordering::SeqCst)
    }

    /// Take one token, waiting for refills as long as necessary.
    pub async fn acquire(&self) {
        loop {
            let (wait, slot) = {
                let mut state = self.state.lock().await;
                let now = Instant::now();

                if now.duration_since(state.last_refill) >= self.interval {
                    state.tokens = self.capacity;
                    state.last_refill = now;
                }

                if state.tokens > 0 {
                    state.tokens -= 1;
                    return;
                }

                let position = self.waiting.fetch_add(1, Ordering::SeqCst) + 1;
                let until_refill = self
                    .interval
                    .saturating_sub(now.duration_since(state.last_refill));
                let extra_intervals = ((position - 1) / u64::from(self.capacity)) as u32;
                (
                    until_refill + self.interval * extra_intervals,
                    QueueSlot(&self.waiting),
                )
            };

            tracing::debug!("Embedding quota exhausted, waiting {:?}", wait);
            tokio::time::sleep(wait).await;
            drop(slot);
        }
    }
}
