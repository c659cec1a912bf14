//! Request governance for the snapgate gateway.
//!
//! Every inbound request flows through [`RateLimitService::check_request`]:
//! the caller is reduced to a [`ClientKeyer`] partition key, the endpoint is
//! resolved to a budget by [`EndpointPolicy`], the [`SlidingWindowLimiter`]
//! makes the admit/reject decision, and [`RateAnalytics`] records the outcome
//! regardless of which way it went.
//!
//! All state is in-memory and process-local by design; the service is cheaply
//! cloneable (backed by `Arc`) and safe to share across tasks and threads.

pub mod analytics;
pub mod client_key;
pub mod policy;
pub mod sliding_window;

use std::sync::Arc;

use serde::Serialize;

pub use analytics::{AnalyticsSnapshot, AnalyticsSummary, RateAnalytics};
pub use client_key::{is_anonymous, ClientKeyer};
pub use policy::{EndpointBudget, EndpointPolicy};
pub use sliding_window::{RateDecision, SlidingWindowLimiter};

use analytics::normalize_path;
use snapgate_common::{Environment, RateLimitConfig};

/// A key currently serving a cool-down period.
#[derive(Debug, Clone, Serialize)]
pub struct BlockedKey {
    pub key: String,
    pub retry_after: u64,
}

/// Diagnostics payload exposed to the stats endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticsReport {
    pub summary: AnalyticsSummary,
    pub endpoint_stats: std::collections::HashMap<String, analytics::EndpointStats>,
    pub user_stats: std::collections::HashMap<String, analytics::UserStats>,
    pub hourly_stats: std::collections::HashMap<String, analytics::HourlyStats>,
    pub current_active_limits: usize,
    pub currently_blocked: Vec<BlockedKey>,
}

/// Facade wiring fingerprinting, policy, limiting, and analytics together.
#[derive(Clone)]
pub struct RateLimitService {
    inner: Arc<ServiceInner>,
}

struct ServiceInner {
    limiter: SlidingWindowLimiter,
    policy: EndpointPolicy,
    analytics: RateAnalytics,
    keyer: ClientKeyer,
    enabled: bool,
    max_idle_secs: u64,
}

impl RateLimitService {
    pub fn new(config: &RateLimitConfig, environment: Environment) -> Self {
        tracing::info!(
            enabled = config.enabled,
            auth_multiplier = config.auth_multiplier,
            dev_multiplier = config.dev_multiplier,
            ?environment,
            "creating rate limit service"
        );
        Self {
            inner: Arc::new(ServiceInner {
                limiter: SlidingWindowLimiter::new(),
                policy: EndpointPolicy::new(
                    environment,
                    config.auth_multiplier,
                    config.dev_multiplier,
                ),
                analytics: RateAnalytics::new(),
                keyer: ClientKeyer::new(&config.anon_salt),
                enabled: config.enabled,
                max_idle_secs: config.max_idle_secs,
            }),
        }
    }

    /// Run the full admission pipeline for one request.
    ///
    /// The analytics record is written for admitted and rejected requests
    /// alike, so the breakdowns reflect offered load rather than only
    /// admitted traffic.
    pub fn check_request(
        &self,
        path: &str,
        method: &str,
        user_id: Option<&str>,
        ip: &str,
        user_agent: &str,
    ) -> RateDecision {
        let budget = self.inner.policy.limits_for(path, method, user_id.is_some());

        if !self.inner.enabled {
            return RateDecision {
                allowed: true,
                limit: budget.max_requests,
                remaining: budget.max_requests,
                window_secs: budget.window_secs,
                reset_time: sliding_window::unix_now() + budget.window_secs,
                retry_after: None,
            };
        }

        let key = self.inner.keyer.key_for(user_id, ip, user_agent);
        let decision = self
            .inner
            .limiter
            .check(&key, budget.max_requests, budget.window_secs);

        let endpoint = format!("{} {}", method, normalize_path(path));
        self.inner
            .analytics
            .record(&endpoint, Some(&key), !decision.allowed);

        if !decision.allowed {
            tracing::debug!(%endpoint, key = %key, "request rejected by rate limiter");
        }

        decision
    }

    /// Derive the partition key for a caller without running a check.
    pub fn client_key(&self, user_id: Option<&str>, ip: &str, user_agent: &str) -> String {
        self.inner.keyer.key_for(user_id, ip, user_agent)
    }

    pub fn diagnostics(&self) -> DiagnosticsReport {
        let snapshot = self.inner.analytics.snapshot();
        DiagnosticsReport {
            summary: snapshot.summary,
            endpoint_stats: snapshot.endpoint_stats,
            user_stats: snapshot.user_stats,
            hourly_stats: snapshot.hourly_stats,
            current_active_limits: self.inner.limiter.tracked_keys(),
            currently_blocked: self
                .inner
                .limiter
                .currently_blocked()
                .into_iter()
                .map(|(key, retry_after)| BlockedKey { key, retry_after })
                .collect(),
        }
    }

    /// Spawn a background thread that periodically evicts idle limiter keys
    /// and expired block entries. Runs until the process exits.
    pub fn start_cleanup_task(&self) {
        let inner = Arc::clone(&self.inner);

        std::thread::Builder::new()
            .name("rate-limit-cleanup".into())
            .spawn(move || loop {
                std::thread::sleep(std::time::Duration::from_secs(60));
                inner.limiter.cleanup(inner.max_idle_secs);
            })
            .expect("failed to spawn rate-limit cleanup thread");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(environment: Environment) -> RateLimitService {
        let config = RateLimitConfig {
            enabled: true,
            anon_salt: "test".to_string(),
            auth_multiplier: 2,
            dev_multiplier: 3,
            max_idle_secs: 3600,
        };
        RateLimitService::new(&config, environment)
    }

    #[test]
    fn anonymous_upload_budget_enforced_through_pipeline() {
        let svc = service(Environment::Production);
        let path = "/sessions/abc/photos";

        for i in 0..10 {
            let d = svc.check_request(path, "POST", None, "10.0.0.1", "Mozilla/5.0");
            assert!(d.allowed, "upload {i} should be admitted");
        }
        let rejected = svc.check_request(path, "POST", None, "10.0.0.1", "Mozilla/5.0");
        assert!(!rejected.allowed);
        assert_eq!(rejected.retry_after, Some(600));

        // A different anonymous caller is unaffected.
        let other = svc.check_request(path, "POST", None, "10.0.0.2", "Mozilla/5.0");
        assert!(other.allowed);
    }

    #[test]
    fn decisions_are_recorded_in_analytics() {
        let svc = service(Environment::Production);
        svc.check_request("/sessions/abc", "GET", Some("u1"), "10.0.0.1", "x");
        svc.check_request("/sessions/def", "GET", Some("u1"), "10.0.0.1", "x");

        let report = svc.diagnostics();
        assert_eq!(report.summary.total_requests, 2);
        assert_eq!(
            report.endpoint_stats["GET /sessions/{session_id}"].total,
            2
        );
        assert_eq!(report.user_stats["user:u1"].total, 2);
        assert_eq!(report.current_active_limits, 1);
        assert!(report.currently_blocked.is_empty());
    }

    #[test]
    fn blocked_keys_surface_in_diagnostics() {
        let svc = service(Environment::Production);
        // Anonymous admin budget is 2 per hour.
        for _ in 0..3 {
            svc.check_request("/admin/sessions", "GET", None, "10.0.0.9", "curl");
        }

        let report = svc.diagnostics();
        assert_eq!(report.currently_blocked.len(), 1);
        assert!(report.summary.blocked_requests >= 1);
    }

    #[test]
    fn disabled_service_admits_everything() {
        let config = RateLimitConfig {
            enabled: false,
            ..RateLimitConfig::default()
        };
        let svc = RateLimitService::new(&config, Environment::Production);
        for _ in 0..50 {
            assert!(svc
                .check_request("/admin/sessions", "GET", None, "10.0.0.1", "curl")
                .allowed);
        }
    }
}
