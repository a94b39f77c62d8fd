//! Fixed-window request limiter keyed by client identity.
//!
//! State is process-local: several server instances each enforce the limit
//! independently.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, HeaderName, HeaderValue, header::RETRY_AFTER};
use dashmap::DashMap;
use metrics::counter;
use time::OffsetDateTime;
use tokio::time::Instant;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

#[derive(Debug, Clone, Copy)]
struct Window {
    started_at: Instant,
    count: u32,
}

/// Outcome of a single [`FixedWindowRateLimiter::check_limit`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Unix timestamp (seconds) at which the current window ends.
    pub reset_at: i64,
    /// Whole seconds until the window ends; set only when denied.
    pub retry_after: Option<u64>,
}

impl RateLimitDecision {
    /// Response headers describing the quota. Pure function of the decision.
    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::with_capacity(4);
        headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(self.limit));
        headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(self.remaining));
        headers.insert(X_RATELIMIT_RESET, HeaderValue::from(self.reset_at));
        if let Some(retry_after) = self.retry_after {
            headers.insert(RETRY_AFTER, HeaderValue::from(retry_after));
        }
        headers
    }
}

#[derive(Debug, Clone)]
pub struct FixedWindowRateLimiter {
    scope: &'static str,
    window: Duration,
    max_requests: u32,
    windows: Arc<DashMap<String, Window>>,
}

impl FixedWindowRateLimiter {
    pub fn new(scope: &'static str, window: Duration, max_requests: u32) -> Self {
        Self {
            scope,
            window,
            max_requests,
            windows: Arc::new(DashMap::new()),
        }
    }

    pub fn check_limit(&self, key: &str) -> RateLimitDecision {
        self.check_limit_at(key, Instant::now())
    }

    /// Count one request for `key` at `now`.
    ///
    /// The entry's shard lock is held for the whole read-modify-write, so
    /// concurrent requests for the same key never lose an increment.
    pub fn check_limit_at(&self, key: &str, now: Instant) -> RateLimitDecision {
        let mut entry = self.windows.entry(key.to_owned()).or_insert(Window {
            started_at: now,
            count: 0,
        });

        if now.saturating_duration_since(entry.started_at) >= self.window {
            entry.started_at = now;
            entry.count = 0;
        }
        entry.count = entry.count.saturating_add(1);

        let elapsed = now.saturating_duration_since(entry.started_at);
        let reset_after = self.window.saturating_sub(elapsed);
        let reset_at = OffsetDateTime::now_utc().unix_timestamp() + ceil_secs(reset_after) as i64;
        let count = entry.count;
        drop(entry);

        if count > self.max_requests {
            counter!("farmgate_rate_limit_rejected_total", "scope" => self.scope).increment(1);
            return RateLimitDecision {
                allowed: false,
                limit: self.max_requests,
                remaining: 0,
                reset_at,
                retry_after: Some(ceil_secs(reset_after).max(1)),
            };
        }

        RateLimitDecision {
            allowed: true,
            limit: self.max_requests,
            remaining: self.max_requests - count,
            reset_at,
            retry_after: None,
        }
    }

    /// Drop windows that have rolled over. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    pub fn purge_expired_at(&self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows
            .retain(|_, window| now.saturating_duration_since(window.started_at) < self.window);
        before.saturating_sub(self.windows.len())
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }

    pub fn limit(&self) -> u32 {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

impl From<&crate::config::RateLimitSettings> for FixedWindowRateLimiter {
    fn from(settings: &crate::config::RateLimitSettings) -> Self {
        Self::new("visitors", settings.window, settings.max_requests.get())
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> FixedWindowRateLimiter {
        FixedWindowRateLimiter::new("test", Duration::from_secs(60), 10)
    }

    #[test]
    fn eleventh_request_in_window_is_denied() {
        let limiter = limiter();
        let now = Instant::now();

        for call in 1..=10 {
            let decision = limiter.check_limit_at("1.2.3.4", now);
            assert!(decision.allowed, "call {call} should be allowed");
            assert_eq!(decision.remaining, 10 - call);
            assert_eq!(decision.retry_after, None);
        }

        let denied = limiter.check_limit_at("1.2.3.4", now);
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert_eq!(denied.retry_after, Some(60));
    }

    #[test]
    fn retry_after_counts_down_within_window() {
        let limiter = FixedWindowRateLimiter::new("test", Duration::from_secs(60), 1);
        let start = Instant::now();
        assert!(limiter.check_limit_at("k", start).allowed);

        let denied = limiter.check_limit_at("k", start + Duration::from_millis(45_500));
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after, Some(15));
    }

    #[test]
    fn window_rollover_resets_count() {
        let limiter = limiter();
        let start = Instant::now();
        for _ in 0..12 {
            limiter.check_limit_at("1.2.3.4", start);
        }

        let next = limiter.check_limit_at("1.2.3.4", start + Duration::from_secs(60));
        assert!(next.allowed);
        assert_eq!(next.remaining, 9);
    }

    #[test]
    fn keys_are_isolated() {
        let limiter = limiter();
        let now = Instant::now();
        for _ in 0..11 {
            limiter.check_limit_at("10.0.0.1", now);
        }

        assert!(!limiter.check_limit_at("10.0.0.1", now).allowed);
        let other = limiter.check_limit_at("10.0.0.2", now);
        assert!(other.allowed);
        assert_eq!(other.remaining, 9);
    }

    #[test]
    fn concurrent_requests_for_one_key_never_lose_an_increment() {
        let limiter = limiter();
        let barrier = std::sync::Barrier::new(64);

        let decisions: Vec<RateLimitDecision> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..64)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        limiter.check_limit("203.0.113.9")
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().expect("limiter thread panicked"))
                .collect()
        });

        let allowed = decisions.iter().filter(|decision| decision.allowed).count();
        assert_eq!(allowed, 10);
        assert_eq!(decisions.len() - allowed, 54);

        let mut remaining: Vec<u32> = decisions
            .iter()
            .filter(|decision| decision.allowed)
            .map(|decision| decision.remaining)
            .collect();
        remaining.sort_unstable();
        assert_eq!(remaining, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn purge_drops_only_rolled_over_windows() {
        let limiter = limiter();
        let start = Instant::now();
        limiter.check_limit_at("old", start);
        limiter.check_limit_at("new", start + Duration::from_secs(30));

        let removed = limiter.purge_expired_at(start + Duration::from_secs(61));
        assert_eq!(removed, 1);
        assert_eq!(limiter.tracked_keys(), 1);
    }

    #[test]
    fn headers_reflect_decision() {
        let decision = RateLimitDecision {
            allowed: false,
            limit: 10,
            remaining: 0,
            reset_at: 1_700_000_060,
            retry_after: Some(42),
        };
        let headers = decision.headers();
        assert_eq!(headers[&X_RATELIMIT_LIMIT], "10");
        assert_eq!(headers[&X_RATELIMIT_REMAINING], "0");
        assert_eq!(headers[&X_RATELIMIT_RESET], "1700000060");
        assert_eq!(headers[RETRY_AFTER], "42");

        let allowed = RateLimitDecision {
            allowed: true,
            remaining: 3,
            retry_after: None,
            ..decision
        };
        assert!(allowed.headers().get(RETRY_AFTER).is_none());
    }

    #[test]
    fn ceil_secs_rounds_partial_seconds_up() {
        assert_eq!(ceil_secs(Duration::from_secs(5)), 5);
        assert_eq!(ceil_secs(Duration::from_millis(4_001)), 5);
        assert_eq!(ceil_secs(Duration::ZERO), 0);
    }
}
