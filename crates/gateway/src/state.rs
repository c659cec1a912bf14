use std::sync::Arc;

use prometheus::{IntCounter, Opts, Registry};
use snapgate_common::AppConfig;
use snapgate_rate_limit::RateLimitService;
use snapgate_realtime::RealtimeHub;

/// Shared state type alias used across all route handlers.
pub type SharedState = Arc<AppState>;

/// Central application state: configuration, the governance and realtime
/// services, and Prometheus metrics. Built once at startup and injected into
/// handlers; tests construct as many isolated instances as they need.
pub struct AppState {
    pub config: AppConfig,
    pub rate_limit: RateLimitService,
    pub realtime: RealtimeHub,
    pub metrics: GatewayMetrics,
    pub start_time: std::time::Instant,
}

/// Prometheus metrics collected by the gateway.
pub struct GatewayMetrics {
    pub registry: Registry,
    pub requests_total: IntCounter,
    pub rate_limited_total: IntCounter,
    pub ws_connections_total: IntCounter,
    pub notifications_sent: IntCounter,
    pub notifications_failed: IntCounter,
}

impl GatewayMetrics {
    /// Create all counters registered against a fresh Prometheus registry.
    pub fn new() -> Self {
        let registry = Registry::new();

        let requests_total = IntCounter::with_opts(Opts::new(
            "snapgate_requests_total",
            "Total number of requests processed",
        ))
        .expect("failed to create requests_total counter");

        let rate_limited_total = IntCounter::with_opts(Opts::new(
            "snapgate_rate_limited_total",
            "Total number of requests rejected by the rate limiter",
        ))
        .expect("failed to create rate_limited_total counter");

        let ws_connections_total = IntCounter::with_opts(Opts::new(
            "snapgate_ws_connections_total",
            "Total number of accepted realtime connections",
        ))
        .expect("failed to create ws_connections_total counter");

        let notifications_sent = IntCounter::with_opts(Opts::new(
            "snapgate_notifications_sent",
            "Total number of notifications delivered to session owners",
        ))
        .expect("failed to create notifications_sent counter");

        let notifications_failed = IntCounter::with_opts(Opts::new(
            "snapgate_notifications_failed",
            "Total number of notification sends that failed",
        ))
        .expect("failed to create notifications_failed counter");

        registry
            .register(Box::new(requests_total.clone()))
            .expect("failed to register requests_total");
        registry
            .register(Box::new(rate_limited_total.clone()))
            .expect("failed to register rate_limited_total");
        registry
            .register(Box::new(ws_connections_total.clone()))
            .expect("failed to register ws_connections_total");
        registry
            .register(Box::new(notifications_sent.clone()))
            .expect("failed to register notifications_sent");
        registry
            .register(Box::new(notifications_failed.clone()))
            .expect("failed to register notifications_failed");

        Self {
            registry,
            requests_total,
            rate_limited_total,
            ws_connections_total,
            notifications_sent,
            notifications_failed,
        }
    }
}

impl Default for GatewayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    /// Create a new AppState from the given configuration.
    pub fn new(config: AppConfig) -> Self {
        let rate_limit = RateLimitService::new(&config.rate_limit, config.environment);
        let realtime = RealtimeHub::new(&config.realtime);
        Self {
            config,
            rate_limit,
            realtime,
            metrics: GatewayMetrics::new(),
            start_time: std::time::Instant::now(),
        }
    }
}
