use moka::future::Cache;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Sliding-window limiter keyed by user.
///
/// Each user holds at most `limit` timestamps. Users that stay idle for
/// `idle` are evicted, and the total number of tracked users is capped.
#[derive(Clone)]
pub struct RateLimiter {
    limit: usize,
    window: Duration,
    windows: Cache<Uuid, Arc<Mutex<VecDeque<Instant>>>>,
}

impl RateLimiter {
    pub fn new(limit: usize, window: Duration, idle: Duration, max_users: u64) -> Self {
        let windows = Cache::builder()
            .max_capacity(max_users)
            .time_to_idle(idle.max(window))
            .build();
        Self {
            limit,
            window,
            windows,
        }
    }

    /// Record an attempt for `key` now. Returns false when the window is
    /// exhausted; denied attempts are not recorded.
    pub async fn check(&self, key: Uuid) -> bool {
        self.check_at(key, Instant::now()).await
    }

    pub async fn check_at(&self, key: Uuid, now: Instant) -> bool {
        let limit = self.limit;
        let slot = self
            .windows
            .get_with(key, async move {
                Arc::new(Mutex::new(VecDeque::with_capacity(limit)))
            })
            .await;

        let mut hits = slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        while let Some(&oldest) = hits.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                hits.pop_front();
            } else {
                break;
            }
        }

        if hits.len() >= self.limit {
            return false;
        }
        hits.push_back(now);
        true
    }
}
