use axum::extract::State;
use axum::Json;
use snapgate_rate_limit::DiagnosticsReport;

use crate::state::SharedState;

/// GET /api/rate-limit/stats
///
/// Full rate-limiter diagnostics: traffic summary, per-endpoint and per-user
/// breakdowns, hourly buckets, and the keys currently in cool-down. Only
/// mounted outside production.
pub async fn rate_limit_stats(State(state): State<SharedState>) -> Json<DiagnosticsReport> {
    Json(state.rate_limit.diagnostics())
}
