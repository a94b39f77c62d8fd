use axum::Json;
use axum::extract::State;
use axum::response::IntoResponse;
use serde::Serialize;
use time::OffsetDateTime;

use crate::cache::CacheInfo;
use crate::infra::http::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    timestamp: OffsetDateTime,
    uptime_seconds: i64,
    version: &'static str,
    settings_cache: CacheInfo,
    rate_limiter: RateLimiterHealth,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RateLimiterHealth {
    tracked_keys: usize,
    limit: u32,
    window_ms: u64,
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = OffsetDateTime::now_utc();
    let limiter = &state.visitor_limiter;

    Json(HealthResponse {
        status: "ok",
        timestamp: now,
        uptime_seconds: (now - state.started_at).whole_seconds().max(0),
        version: env!("CARGO_PKG_VERSION"),
        settings_cache: state.settings_cache.info(),
        rate_limiter: RateLimiterHealth {
            tracked_keys: limiter.tracked_keys(),
            limit: limiter.limit(),
            window_ms: limiter.window().as_millis() as u64,
        },
    })
}
