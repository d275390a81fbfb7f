use log::{debug, warn};
use reqwest::header::HeaderMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

pub const LIMIT_HEADER: &str = "x-rate-limit";
pub const REMAINING_HEADER: &str = "x-rate-limit-remaining";
pub const RESET_HEADER: &str = "x-rate-limit-reset";

#[derive(Debug, Clone, Copy)]
struct Budget {
    limit: u64,
    remaining: u64,
    reset_at: Instant,
}

/// Tracks the server-reported request budget for one client instance.
///
/// The three rate headers are applied all-or-nothing: if any of them is
/// missing or non-numeric the previous snapshot is kept. Stale state only
/// ever causes an unnecessary wait, never a dropped request.
#[derive(Debug, Default)]
pub struct RateLimitTracker {
    budget: Mutex<Option<Budget>>,
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
}

impl RateLimitTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the budget from response headers. No partial updates.
    pub fn update_from_headers(&self, headers: &HeaderMap) {
        let limit = header_u64(headers, LIMIT_HEADER);
        let remaining = header_u64(headers, REMAINING_HEADER);
        let reset_secs = header_u64(headers, RESET_HEADER);
        let (Some(limit), Some(remaining), Some(reset_secs)) = (limit, remaining, reset_secs)
        else {
            return;
        };
        let budget = Budget {
            limit,
            remaining,
            reset_at: Instant::now() + Duration::from_secs(reset_secs),
        };
        debug!(
            "rate budget updated: {}/{} remaining, resets in {}s",
            remaining, limit, reset_secs
        );
        *self.lock() = Some(budget);
    }

    /// Suspend until the window resets when the remaining budget has dropped
    /// to the reserve. Returns immediately when no budget has been observed
    /// yet or the budget is comfortable. Never fails.
    pub async fn check_and_wait(&self, reserve: u64) {
        let wait = {
            let guard = self.lock();
            match *guard {
                None => return,
                Some(b) if b.remaining > reserve => return,
                Some(b) => b.reset_at.saturating_duration_since(Instant::now()),
            }
        };
        if wait >= Duration::from_millis(1) {
            warn!(
                "rate budget at reserve, waiting {}ms for window reset",
                wait.as_millis()
            );
            tokio::time::sleep(wait).await;
        }
    }

    /// Current `(limit, remaining)` snapshot, if any budget has been seen.
    pub fn snapshot(&self) -> Option<(u64, u64)> {
        (*self.lock()).map(|b| (b.limit, b.remaining))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Budget>> {
        self.budget.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    fn set_budget(&self, limit: u64, remaining: u64, reset_in: Duration) {
        *self.lock() = Some(Budget {
            limit,
            remaining,
            reset_at: Instant::now() + reset_in,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn rate_headers(limit: &str, remaining: &str, reset: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(LIMIT_HEADER, HeaderValue::from_str(limit).unwrap());
        h.insert(REMAINING_HEADER, HeaderValue::from_str(remaining).unwrap());
        h.insert(RESET_HEADER, HeaderValue::from_str(reset).unwrap());
        h
    }

    #[tokio::test]
    async fn unset_budget_returns_immediately() {
        let tracker = RateLimitTracker::new();
        let started = Instant::now();
        tracker.check_and_wait(50).await;
        assert!(started.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn comfortable_budget_returns_immediately() {
        let tracker = RateLimitTracker::new();
        tracker.set_budget(700, 1000, Duration::from_secs(60));
        let started = Instant::now();
        tracker.check_and_wait(50).await;
        assert!(started.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn depleted_budget_waits_for_reset() {
        let tracker = RateLimitTracker::new();
        tracker.set_budget(700, 5, Duration::from_millis(150));
        let started = Instant::now();
        tracker.check_and_wait(50).await;
        assert!(started.elapsed() >= Duration::from_millis(140));
    }

    #[tokio::test]
    async fn elapsed_reset_does_not_wait() {
        let tracker = RateLimitTracker::new();
        tracker.set_budget(700, 5, Duration::from_millis(0));
        let started = Instant::now();
        tracker.check_and_wait(50).await;
        assert!(started.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn full_header_set_overwrites() {
        let tracker = RateLimitTracker::new();
        tracker.update_from_headers(&rate_headers("700", "699", "60"));
        assert_eq!(tracker.snapshot(), Some((700, 699)));
    }

    #[test]
    fn partial_header_set_is_ignored() {
        let tracker = RateLimitTracker::new();
        tracker.update_from_headers(&rate_headers("700", "699", "60"));

        let mut partial = HeaderMap::new();
        partial.insert(LIMIT_HEADER, HeaderValue::from_static("700"));
        partial.insert(REMAINING_HEADER, HeaderValue::from_static("5"));
        tracker.update_from_headers(&partial);
        assert_eq!(tracker.snapshot(), Some((700, 699)));
    }

    #[test]
    fn non_numeric_header_is_ignored() {
        let tracker = RateLimitTracker::new();
        tracker.update_from_headers(&rate_headers("700", "699", "60"));
        tracker.update_from_headers(&rate_headers("700", "banana", "60"));
        assert_eq!(tracker.snapshot(), Some((700, 699)));
    }
}
