use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;
use std::sync::Arc;

use super::{ApiError, ApiResponse, AppState};
use crate::constants::limits::{DEFAULT_AUDIT_LIMIT, MAX_AUDIT_LIMIT};
use crate::entities::audit_log;

#[derive(Deserialize)]
pub struct AuditQuery {
    #[serde(default)]
    pub limit: Option<u64>,
}

/// GET /api/admin/audit
/// Most recent entries first; `limit` is clamped to a sane ceiling.
pub async fn recent(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<ApiResponse<Vec<audit_log::Model>>>, ApiError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_AUDIT_LIMIT)
        .clamp(1, MAX_AUDIT_LIMIT);

    let entries = state
        .store()
        .recent_audit(limit)
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

    Ok(Json(ApiResponse::success(entries)))
}
