use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use serde::Serialize;

use crate::client_key::is_anonymous;

/// Per-endpoint admission counters.
#[derive(Debug, Default, Clone, Serialize)]
pub struct EndpointStats {
    pub total: u64,
    pub blocked: u64,
}

/// Per-identified-user admission counters with a nested endpoint breakdown.
#[derive(Debug, Default, Clone, Serialize)]
pub struct UserStats {
    pub total: u64,
    pub blocked: u64,
    pub endpoints: HashMap<String, u64>,
}

/// Read-time view of one hour bucket; the distinct-user set is converted to
/// a count so raw keys never leave the aggregator.
#[derive(Debug, Clone, Serialize)]
pub struct HourlyStats {
    pub total: u64,
    pub blocked: u64,
    pub unique_users: usize,
}

#[derive(Debug, Default)]
struct HourlyBucket {
    total: u64,
    blocked: u64,
    users: HashSet<String>,
}

/// Headline numbers for the diagnostics endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsSummary {
    pub total_requests: u64,
    pub blocked_requests: u64,
    pub block_rate_percent: f64,
    pub endpoints_tracked: usize,
    pub users_tracked: usize,
}

/// Full read-only snapshot of all aggregates.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsSnapshot {
    pub summary: AnalyticsSummary,
    pub endpoint_stats: HashMap<String, EndpointStats>,
    pub user_stats: HashMap<String, UserStats>,
    pub hourly_stats: HashMap<String, HourlyStats>,
}

#[derive(Default)]
struct AnalyticsInner {
    total_requests: u64,
    blocked_requests: u64,
    endpoints: HashMap<String, EndpointStats>,
    users: HashMap<String, UserStats>,
    hourly: HashMap<String, HourlyBucket>,
}

/// Accumulates admission outcomes for observability.
///
/// This is a diagnostics sink, never a source of control decisions: `record`
/// is infallible, takes one short lock, and is safe to call unconditionally
/// after every limiter decision. Aggregates grow for the lifetime of the
/// process and reset on restart.
pub struct RateAnalytics {
    inner: RwLock<AnalyticsInner>,
}

impl RateAnalytics {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(AnalyticsInner::default()),
        }
    }

    /// Record one admission decision. Anonymous keys are skipped in the
    /// per-user breakdown but still counted in totals and hour buckets.
    pub fn record(&self, endpoint: &str, client_key: Option<&str>, blocked: bool) {
        let hour = chrono::Local::now().format("%Y-%m-%d %H:00").to_string();
        self.record_with_hour(endpoint, client_key, blocked, &hour);
    }

    fn record_with_hour(
        &self,
        endpoint: &str,
        client_key: Option<&str>,
        blocked: bool,
        hour: &str,
    ) {
        let mut inner = self.inner.write().expect("analytics lock poisoned");

        inner.total_requests += 1;
        if blocked {
            inner.blocked_requests += 1;
        }

        let endpoint_entry = inner.endpoints.entry(endpoint.to_string()).or_default();
        endpoint_entry.total += 1;
        if blocked {
            endpoint_entry.blocked += 1;
        }

        if let Some(key) = client_key {
            if !is_anonymous(key) {
                let user = inner.users.entry(key.to_string()).or_default();
                user.total += 1;
                if blocked {
                    user.blocked += 1;
                }
                *user.endpoints.entry(endpoint.to_string()).or_default() += 1;
            }
        }

        let bucket = inner.hourly.entry(hour.to_string()).or_default();
        bucket.total += 1;
        if blocked {
            bucket.blocked += 1;
        }
        if let Some(key) = client_key {
            bucket.users.insert(key.to_string());
        }
    }

    pub fn summary(&self) -> AnalyticsSummary {
        let inner = self.inner.read().expect("analytics lock poisoned");
        AnalyticsSummary {
            total_requests: inner.total_requests,
            blocked_requests: inner.blocked_requests,
            block_rate_percent: if inner.total_requests > 0 {
                inner.blocked_requests as f64 / inner.total_requests as f64 * 100.0
            } else {
                0.0
            },
            endpoints_tracked: inner.endpoints.len(),
            users_tracked: inner.users.len(),
        }
    }

    pub fn snapshot(&self) -> AnalyticsSnapshot {
        let summary = self.summary();
        let inner = self.inner.read().expect("analytics lock poisoned");
        AnalyticsSnapshot {
            summary,
            endpoint_stats: inner.endpoints.clone(),
            user_stats: inner.users.clone(),
            hourly_stats: inner
                .hourly
                .iter()
                .map(|(hour, bucket)| {
                    (
                        hour.clone(),
                        HourlyStats {
                            total: bucket.total,
                            blocked: bucket.blocked,
                            unique_users: bucket.users.len(),
                        },
                    )
                })
                .collect(),
        }
    }
}

impl Default for RateAnalytics {
    fn default() -> Self {
        Self::new()
    }
}

/// Collapse dynamic path segments so endpoints group cleanly in breakdowns,
/// e.g. `/sessions/3f2a.../photos` becomes `/sessions/{session_id}/photos`.
pub fn normalize_path(path: &str) -> String {
    let parts: Vec<&str> = path.split('/').collect();

    if path.starts_with("/sessions/") && parts.len() >= 3 && !parts[2].is_empty() {
        let mut parts: Vec<String> = parts.iter().map(|s| s.to_string()).collect();
        parts[2] = "{session_id}".to_string();
        if parts.len() >= 5 && parts[3] == "photos" && !parts[4].is_empty() {
            parts[4] = "{photo_id}".to_string();
        }
        return parts.join("/");
    }

    if path.starts_with("/admin/sessions/") && parts.len() >= 4 && !parts[3].is_empty() {
        let mut parts: Vec<String> = parts.iter().map(|s| s.to_string()).collect();
        parts[3] = "{session_id}".to_string();
        return parts.join("/");
    }

    path.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_totals_and_blocked() {
        let analytics = RateAnalytics::new();
        analytics.record("GET /sessions/{session_id}", Some("user:u1"), false);
        analytics.record("GET /sessions/{session_id}", Some("user:u1"), false);
        analytics.record("GET /sessions/{session_id}", Some("user:u1"), true);

        let summary = analytics.summary();
        assert_eq!(summary.total_requests, 3);
        assert_eq!(summary.blocked_requests, 1);
        assert!((summary.block_rate_percent - 33.333).abs() < 0.01);
    }

    #[test]
    fn empty_summary_has_zero_block_rate() {
        let analytics = RateAnalytics::new();
        assert_eq!(analytics.summary().block_rate_percent, 0.0);
    }

    #[test]
    fn anonymous_keys_skip_user_breakdown() {
        let analytics = RateAnalytics::new();
        analytics.record("POST /sessions", Some("anon:deadbeefdeadbeef"), false);
        analytics.record("POST /sessions", Some("user:u1"), false);

        let snapshot = analytics.snapshot();
        assert_eq!(snapshot.user_stats.len(), 1);
        assert!(snapshot.user_stats.contains_key("user:u1"));
        assert_eq!(snapshot.summary.total_requests, 2);
    }

    #[test]
    fn per_user_endpoint_breakdown() {
        let analytics = RateAnalytics::new();
        analytics.record("POST /sessions", Some("user:u1"), false);
        analytics.record("POST /sessions", Some("user:u1"), false);
        analytics.record("GET /auth/me", Some("user:u1"), false);

        let snapshot = analytics.snapshot();
        let user = &snapshot.user_stats["user:u1"];
        assert_eq!(user.total, 3);
        assert_eq!(user.endpoints["POST /sessions"], 2);
        assert_eq!(user.endpoints["GET /auth/me"], 1);
    }

    #[test]
    fn hourly_buckets_track_distinct_users() {
        let analytics = RateAnalytics::new();
        analytics.record_with_hour("POST /sessions", Some("user:u1"), false, "2026-08-27 14:00");
        analytics.record_with_hour("POST /sessions", Some("user:u1"), true, "2026-08-27 14:00");
        analytics.record_with_hour("POST /sessions", Some("anon:abcd"), false, "2026-08-27 14:00");
        analytics.record_with_hour("POST /sessions", Some("user:u2"), false, "2026-08-27 15:00");

        let snapshot = analytics.snapshot();
        let h14 = &snapshot.hourly_stats["2026-08-27 14:00"];
        assert_eq!(h14.total, 3);
        assert_eq!(h14.blocked, 1);
        assert_eq!(h14.unique_users, 2);

        let h15 = &snapshot.hourly_stats["2026-08-27 15:00"];
        assert_eq!(h15.total, 1);
        assert_eq!(h15.unique_users, 1);
    }

    #[test]
    fn normalizes_session_and_photo_ids() {
        assert_eq!(
            normalize_path("/sessions/3f2a17aa-1/photos"),
            "/sessions/{session_id}/photos"
        );
        assert_eq!(
            normalize_path("/sessions/3f2a17aa-1/photos/abc123"),
            "/sessions/{session_id}/photos/{photo_id}"
        );
        assert_eq!(
            normalize_path("/admin/sessions/3f2a17aa-1"),
            "/admin/sessions/{session_id}"
        );
        assert_eq!(normalize_path("/sessions"), "/sessions");
        assert_eq!(normalize_path("/auth/me"), "/auth/me");
    }
}
