//! Visitor handlers. Both routes sit behind the visitor rate limit.

use axum::Json;
use axum::extract::{Extension, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use crate::domain::visitors::NewVisitorEntry;
use crate::infra::http::error::ApiError;
use crate::infra::http::middleware::ClientIp;
use crate::infra::http::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct VisitorListQuery {
    #[serde(alias = "farmId")]
    pub farm_id: Option<Uuid>,
}

pub async fn list_visitors(
    State(state): State<AppState>,
    Query(query): Query<VisitorListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let visitors = state.visitors.list(query.farm_id).await?;
    Ok(Json(visitors))
}

pub async fn create_visitor(
    State(state): State<AppState>,
    Extension(ClientIp(client_ip)): Extension<ClientIp>,
    Json(entry): Json<NewVisitorEntry>,
) -> Result<impl IntoResponse, ApiError> {
    debug!(
        target = "farmgate::http::visitors",
        client_ip = %client_ip,
        farm_id = %entry.farm_id,
        "visitor registration received"
    );
    let stored = state.visitors.register(entry).await?;
    Ok((StatusCode::CREATED, Json(stored)))
}
