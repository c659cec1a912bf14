//! HTTP/WebSocket gateway wiring the rate-limit and realtime subsystems
//! into an axum application.

pub mod auth;
pub mod middleware;
pub mod routes;
pub mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use snapgate_common::AppConfig;
use tower_http::cors::{Any, CorsLayer};

pub use state::{AppState, GatewayMetrics, SharedState};

/// Build the axum router with all gateway routes and middleware.
pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut router = Router::new()
        // Health check
        .route("/api/health", get(routes::health::health_check))
        // Prometheus metrics
        .route("/api/metrics", get(routes::metrics::get_metrics))
        // Realtime
        .route("/ws/{session_id}", get(routes::ws::ws_handler))
        .route(
            "/api/sessions/{session_id}/notify",
            post(routes::notify::notify_owner),
        );

    // Limiter internals stay private in production.
    if state.config.environment.is_development() {
        router = router.route(
            "/api/rate-limit/stats",
            get(routes::diagnostics::rate_limit_stats),
        );
    }

    router
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit,
        ))
        .with_state(state)
        .layer(cors)
}

/// Start the gateway server on the configured address.
///
/// This function will block until the server is shut down.
pub async fn run_server(state: SharedState, listen_addr: &str) -> anyhow::Result<()> {
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    tracing::info!("gateway listening on {}", listen_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Convenience function to create a SharedState from an AppConfig.
pub fn new_shared_state(config: AppConfig) -> SharedState {
    Arc::new(AppState::new(config))
}
