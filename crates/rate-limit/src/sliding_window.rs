use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use serde::Serialize;

/// Outcome of a single admission check.
///
/// For rejections, `retry_after` carries the number of seconds the caller
/// must wait; for admissions it is `None`. All timestamps are unix seconds.
#[derive(Debug, Clone, Serialize)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    pub window_secs: u64,
    pub reset_time: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl RateDecision {
    fn admitted(limit: u64, remaining: u64, window_secs: u64, reset_time: u64) -> Self {
        Self {
            allowed: true,
            limit,
            remaining,
            window_secs,
            reset_time,
            retry_after: None,
        }
    }

    fn rejected(limit: u64, window_secs: u64, reset_time: u64, retry_after: u64) -> Self {
        Self {
            allowed: false,
            limit,
            remaining: 0,
            window_secs,
            reset_time,
            retry_after: Some(retry_after),
        }
    }
}

/// A concurrent sliding window rate limiter with post-violation cool-down.
///
/// Each key owns a deque of recent request timestamps, pruned to the trailing
/// window on every check. A caller that exceeds its budget is placed in a
/// block entry for a full window, so a violator cannot probe its way back in
/// at the window boundary regardless of retry pattern.
///
/// Budgets are resolved per call rather than fixed at construction, since
/// different endpoints map the same key to different limits.
pub struct SlidingWindowLimiter {
    windows: DashMap<String, VecDeque<u64>>,
    blocked: DashMap<String, u64>,
}

impl SlidingWindowLimiter {
    pub fn new() -> Self {
        Self {
            windows: DashMap::new(),
            blocked: DashMap::new(),
        }
    }

    /// Check whether a request identified by `key` is allowed under a budget
    /// of `max_requests` per trailing `window_secs` seconds.
    pub fn check(&self, key: &str, max_requests: u64, window_secs: u64) -> RateDecision {
        self.check_at(key, max_requests, window_secs, unix_now())
    }

    /// Deterministic admission check against an explicit clock reading.
    ///
    /// `check` delegates here with the current wall clock; tests drive this
    /// directly to simulate elapsed time.
    pub fn check_at(
        &self,
        key: &str,
        max_requests: u64,
        window_secs: u64,
        now: u64,
    ) -> RateDecision {
        // Active cool-down: reject with the remaining wait, clear if expired.
        if let Some(entry) = self.blocked.get(key) {
            let unblock_at = *entry;
            drop(entry);
            if now < unblock_at {
                return RateDecision::rejected(
                    max_requests,
                    window_secs,
                    unblock_at,
                    unblock_at - now,
                );
            }
            self.blocked.remove_if(key, |_, at| *at <= now);
        }

        // The entry lock serializes concurrent checks for the same key, so
        // two callers cannot both observe "under budget" and both append.
        let mut entry = self
            .windows
            .entry(key.to_string())
            .or_insert_with(VecDeque::new);
        let times = entry.value_mut();

        let horizon = now.saturating_sub(window_secs);
        while times.front().is_some_and(|&t| t < horizon) {
            times.pop_front();
        }

        if times.len() as u64 >= max_requests {
            let unblock_at = now + window_secs;
            drop(entry);
            self.blocked.insert(key.to_string(), unblock_at);
            tracing::debug!(key, max_requests, window_secs, "rate limit exceeded, blocking");
            return RateDecision::rejected(max_requests, window_secs, unblock_at, window_secs);
        }

        times.push_back(now);
        let remaining = max_requests - times.len() as u64;
        RateDecision::admitted(max_requests, remaining, window_secs, now + window_secs)
    }

    /// Number of keys with at least one tracked request timestamp.
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }

    /// Number of keys currently in a cool-down period.
    pub fn blocked_keys(&self) -> usize {
        let now = unix_now();
        self.blocked.iter().filter(|e| *e.value() > now).count()
    }

    /// Keys currently blocked, with the seconds remaining on each cool-down.
    pub fn currently_blocked(&self) -> Vec<(String, u64)> {
        let now = unix_now();
        self.blocked
            .iter()
            .filter(|e| *e.value() > now)
            .map(|e| (e.key().clone(), *e.value() - now))
            .collect()
    }

    /// Evict windows whose newest timestamp is older than `max_idle_secs`,
    /// plus any expired block entries.
    ///
    /// Windows are otherwise only pruned when their key is checked again, so
    /// one-off client keys would accumulate without a periodic sweep.
    pub fn cleanup(&self, max_idle_secs: u64) {
        let now = unix_now();
        self.windows
            .retain(|_key, times| times.back().is_some_and(|&t| t + max_idle_secs > now));
        self.blocked.retain(|_key, unblock_at| *unblock_at > now);

        tracing::debug!(
            remaining = self.windows.len(),
            blocked = self.blocked.len(),
            "sliding window cleanup complete"
        );
    }
}

impl Default for SlidingWindowLimiter {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_exhaustion_then_recovery() {
        let limiter = SlidingWindowLimiter::new();
        let key = "user:alice";

        let d1 = limiter.check_at(key, 2, 60, 1000);
        assert!(d1.allowed);
        assert_eq!(d1.remaining, 1);
        assert_eq!(d1.reset_time, 1060);

        let d2 = limiter.check_at(key, 2, 60, 1000);
        assert!(d2.allowed);
        assert_eq!(d2.remaining, 0);

        let d3 = limiter.check_at(key, 2, 60, 1000);
        assert!(!d3.allowed);
        assert_eq!(d3.retry_after, Some(60));

        // Full cool-down window must elapse before readmission.
        let d4 = limiter.check_at(key, 2, 60, 1061);
        assert!(d4.allowed, "should re-admit after the cool-down expires");
    }

    #[test]
    fn cool_down_rejects_for_full_window() {
        let limiter = SlidingWindowLimiter::new();
        let key = "user:bob";

        limiter.check_at(key, 1, 60, 1000);
        let violation = limiter.check_at(key, 1, 60, 1010);
        assert!(!violation.allowed);
        assert_eq!(violation.retry_after, Some(60));

        // Probing mid-block reports the remaining wait, not a fresh window.
        let probe = limiter.check_at(key, 1, 60, 1040);
        assert!(!probe.allowed);
        assert_eq!(probe.retry_after, Some(30));

        // Probing does not extend the block.
        let after = limiter.check_at(key, 1, 60, 1071);
        assert!(after.allowed);
    }

    #[test]
    fn old_timestamps_are_pruned() {
        let limiter = SlidingWindowLimiter::new();
        let key = "user:carol";

        assert!(limiter.check_at(key, 2, 60, 1000).allowed);
        assert!(limiter.check_at(key, 2, 60, 1030).allowed);

        // At t=1061 the first timestamp has left the window.
        let d = limiter.check_at(key, 2, 60, 1061);
        assert!(d.allowed);
        assert_eq!(d.remaining, 0);
    }

    #[test]
    fn independent_keys_do_not_interfere() {
        let limiter = SlidingWindowLimiter::new();

        assert!(limiter.check_at("a", 1, 60, 1000).allowed);
        assert!(!limiter.check_at("a", 1, 60, 1000).allowed);

        assert!(limiter.check_at("b", 1, 60, 1000).allowed);
    }

    #[test]
    fn zero_budget_always_rejects() {
        let limiter = SlidingWindowLimiter::new();
        let d = limiter.check_at("anyone", 0, 60, 1000);
        assert!(!d.allowed);
        assert_eq!(d.retry_after, Some(60));
    }

    #[test]
    fn occupancy_counts() {
        let limiter = SlidingWindowLimiter::new();
        // currently_blocked compares against the wall clock, so drive the
        // checks with it too.
        let now = unix_now();
        limiter.check_at("a", 5, 60, now);
        limiter.check_at("b", 1, 60, now);
        limiter.check_at("b", 1, 60, now); // violation -> blocked

        assert_eq!(limiter.tracked_keys(), 2);
        assert_eq!(limiter.blocked_keys(), 1);
        let blocked = limiter.currently_blocked();
        assert_eq!(blocked.len(), 1);
        assert_eq!(blocked[0].0, "b");
    }

    #[test]
    fn concurrent_checks_never_admit_above_budget() {
        use std::sync::Arc;

        let limiter = Arc::new(SlidingWindowLimiter::new());
        let now = unix_now();

        // 8 threads race 50 checks each on one key with a budget of 25. The
        // entry lock must serialize check-then-append, so exactly 25 are
        // admitted no matter how the threads interleave.
        let mut handles = vec![];
        for _ in 0..8 {
            let limiter = Arc::clone(&limiter);
            handles.push(std::thread::spawn(move || {
                (0..50)
                    .filter(|_| limiter.check_at("shared", 25, 60, now).allowed)
                    .count()
            }));
        }

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 25);
    }

    #[test]
    fn cleanup_evicts_idle_windows_and_expired_blocks() {
        let limiter = SlidingWindowLimiter::new();
        let now = unix_now();

        limiter.check_at("fresh", 5, 60, now);
        limiter.check_at("stale", 5, 60, now.saturating_sub(7200));
        limiter.blocked.insert("expired-block".to_string(), now.saturating_sub(10));

        limiter.cleanup(3600);

        assert!(limiter.windows.contains_key("fresh"));
        assert!(!limiter.windows.contains_key("stale"));
        assert!(!limiter.blocked.contains_key("expired-block"));
    }
}
