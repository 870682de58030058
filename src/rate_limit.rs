//! Sliding-window rate limiting
//!
//! Each key owns a queue of admission timestamps covering the trailing
//! window. Buckets live in a [`DashMap`], so the prune, check and append
//! steps for one key run under that key's shard lock and two concurrent
//! callers can never both squeeze into the last free slot.
//!
//! Keys are opaque to the limiter. Deriving them from caller identity is the
//! job of [`crate::middleware::rate_limit`].

use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Result of an admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    /// Denied; `retry_after` is always the full window length
    Denied { retry_after: Duration },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed)
    }
}

/// Per-key sliding-window limiter
///
/// Capacity `C` over window `W`: a key is admitted while it has fewer than
/// `C` admissions recorded in the last `W`. Denied attempts are not
/// recorded.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    window: Duration,
    capacity: usize,
    sweep_interval: Duration,
    buckets: DashMap<String, VecDeque<Instant>>,
    last_sweep: Mutex<Instant>,
}

impl SlidingWindowLimiter {
    /// Create a limiter
    ///
    /// `sweep_interval` bounds how often idle buckets are scanned and
    /// dropped. The first sweep happens no earlier than one interval after
    /// construction.
    pub fn new(window: Duration, capacity: usize, sweep_interval: Duration) -> Self {
        Self {
            window,
            capacity,
            sweep_interval,
            buckets: DashMap::new(),
            last_sweep: Mutex::new(Instant::now()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of keys currently holding a bucket
    pub fn tracked_keys(&self) -> usize {
        self.buckets.len()
    }

    /// Decide whether `key` may proceed at `now`
    pub fn admit(&self, key: &str, now: Instant) -> Admission {
        // Must run before the entry guard below is taken: retain() locks
        // every shard.
        self.maybe_sweep(now);

        let cutoff = now.checked_sub(self.window);

        let mut bucket = match self.buckets.get_mut(key) {
            Some(bucket) => bucket,
            None => self.buckets.entry(key.to_owned()).or_default(),
        };

        if let Some(cutoff) = cutoff {
            prune(&mut bucket, cutoff);
        }

        if bucket.len() >= self.capacity {
            tracing::debug!(
                key_len = key.len(),
                in_window = bucket.len(),
                capacity = self.capacity,
                "Rate limit exceeded"
            );
            return Admission::Denied {
                retry_after: self.window,
            };
        }

        bucket.push_back(now);
        Admission::Allowed
    }

    /// Prune every bucket and drop the empty ones, at most once per interval
    ///
    /// Only one caller sweeps at a time; others skip rather than wait.
    fn maybe_sweep(&self, now: Instant) {
        let Ok(mut last_sweep) = self.last_sweep.try_lock() else {
            return;
        };

        if now.saturating_duration_since(*last_sweep) < self.sweep_interval {
            return;
        }
        *last_sweep = now;

        let before = self.buckets.len();
        match now.checked_sub(self.window) {
            Some(cutoff) => self.buckets.retain(|_, bucket| {
                prune(bucket, cutoff);
                !bucket.is_empty()
            }),
            None => self.buckets.retain(|_, bucket| !bucket.is_empty()),
        }

        let removed = before.saturating_sub(self.buckets.len());
        if removed > 0 {
            tracing::debug!(removed, remaining = self.buckets.len(), "Swept idle rate-limit buckets");
        }
    }
}

/// Drop timestamps strictly older than `cutoff` (queue is in insertion order)
fn prune(bucket: &mut VecDeque<Instant>, cutoff: Instant) {
    while bucket.front().is_some_and(|t| *t < cutoff) {
        bucket.pop_front();
    }
}
