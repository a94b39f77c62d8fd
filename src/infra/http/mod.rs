//! HTTP surface: routing, middleware, and handlers.

mod error;
mod handlers;
mod middleware;
pub mod rate_limit;
mod state;

pub use error::{ApiError, ApiErrorBody, ApiErrorMessage, codes};
pub use middleware::{ClientIp, RequestContext, client_ip};
pub use rate_limit::{FixedWindowRateLimiter, RateLimitDecision};
pub use state::AppState;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

use middleware::{log_responses, set_request_context, visitor_rate_limit};

/// Assemble the public router with its shared state applied.
pub fn build_router(state: AppState) -> Router {
    let visitors = Router::new()
        .route(
            "/api/visitors",
            get(handlers::list_visitors).post(handlers::create_visitor),
        )
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            visitor_rate_limit,
        ));

    Router::new()
        .route(
            "/api/settings",
            get(handlers::get_settings).patch(handlers::patch_settings),
        )
        .route("/api/settings/cache", get(handlers::get_cache_info))
        .route(
            "/api/settings/cache/invalidate",
            post(handlers::invalidate_cache),
        )
        .route("/api/push/vapid", get(handlers::get_vapid_key))
        .route("/api/health", get(handlers::health))
        .merge(visitors)
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}
