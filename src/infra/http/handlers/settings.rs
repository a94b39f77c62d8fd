//! Settings handlers

use axum::Json;
use axum::extract::State;
use axum::response::IntoResponse;
use serde::Serialize;

use crate::cache::CacheInfo;
use crate::domain::settings::SettingsPatch;
use crate::infra::http::error::ApiError;
use crate::infra::http::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InvalidateResponse {
    invalidated: bool,
    cache: CacheInfo,
}

pub async fn get_settings(State(state): State<AppState>) -> impl IntoResponse {
    let settings = state.settings.current().await;
    Json(settings.as_ref().clone())
}

pub async fn patch_settings(
    State(state): State<AppState>,
    Json(patch): Json<SettingsPatch>,
) -> Result<impl IntoResponse, ApiError> {
    let updated = state.settings.update(patch).await?;
    Ok(Json(updated))
}

pub async fn get_cache_info(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.settings_cache.info())
}

pub async fn invalidate_cache(State(state): State<AppState>) -> impl IntoResponse {
    state.settings_cache.invalidate();
    Json(InvalidateResponse {
        invalidated: true,
        cache: state.settings_cache.info(),
    })
}
