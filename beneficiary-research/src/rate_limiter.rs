//! Minimum-spacing rate limiter shared by every search round
//!
//! Concurrent callers each reserve a distinct time slot while holding the
//! lock, then sleep outside it, so requests never fire in bursts.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// 250ms between search calls, max 4 req/sec
pub const SEARCH_MIN_REQUEST_INTERVAL_MS: u64 = 250;

#[derive(Debug)]
pub struct RateLimiter {
    /// Next free slot, in ms since `epoch`
    next_available_ms: Mutex<u64>,
    epoch: Instant,
    min_interval: Duration,
    name: String,
    total_requests: AtomicU64,
    waited_requests: AtomicU64,
}

impl RateLimiter {
    pub fn new(min_interval_ms: u64, name: &str) -> Self {
        Self {
            next_available_ms: Mutex::new(0),
            epoch: Instant::now(),
            min_interval: Duration::from_millis(min_interval_ms),
            name: name.to_string(),
            total_requests: AtomicU64::new(0),
            waited_requests: AtomicU64::new(0),
        }
    }

    pub fn for_search() -> Arc<Self> {
        Arc::new(Self::new(SEARCH_MIN_REQUEST_INTERVAL_MS, "search"))
    }

    /// Wait until this caller's reserved slot comes up
    pub async fn acquire(&self) {
        let request_num = self.total_requests.fetch_add(1, Ordering::Relaxed) + 1;
        let now_ms = self.epoch.elapsed().as_millis() as u64;
        let interval_ms = self.min_interval.as_millis() as u64;

        let wait_until = {
            let mut next_available = self.next_available_ms.lock().await;
            if now_ms >= *next_available {
                *next_available = now_ms + interval_ms;
                None
            } else {
                let slot = *next_available;
                *next_available = slot + interval_ms;
                self.waited_requests.fetch_add(1, Ordering::Relaxed);
                Some(self.epoch + Duration::from_millis(slot))
            }
        };

        if let Some(target) = wait_until {
            let wait = target.saturating_duration_since(Instant::now());
            debug!(limiter = %self.name, request = request_num, ?wait, "rate limited, queued");
            if !wait.is_zero() {
                tokio::time::sleep(wait).await;
            }
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn stats(&self) -> RateLimiterStats {
        RateLimiterStats {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            waited_requests: self.waited_requests.load(Ordering::Relaxed),
            min_interval_ms: self.min_interval.as_millis() as u64,
            name: self.name.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RateLimiterStats {
    pub total_requests: u64,
    pub waited_requests: u64,
    pub min_interval_ms: u64,
    pub name: String,
}
