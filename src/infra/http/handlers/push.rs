use axum::Json;
use axum::extract::State;
use axum::response::IntoResponse;
use serde::Serialize;

use crate::infra::http::error::ApiError;
use crate::infra::http::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VapidKeyResponse {
    public_key: String,
}

/// Public VAPID key for push subscriptions: stored setting first, then config.
pub async fn get_vapid_key(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let stored = state
        .settings_cache
        .get_setting(|settings| settings.vapid_public_key.clone())
        .await
        .filter(|key| !key.trim().is_empty());

    let public_key = stored
        .or_else(|| state.vapid_fallback.clone())
        .ok_or_else(|| {
            ApiError::not_found("VAPID public key is not configured")
                .with_source("infra::http::push")
        })?;

    Ok(Json(VapidKeyResponse { public_key }))
}
