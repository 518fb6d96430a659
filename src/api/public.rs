//! Anonymous read API. Everything here is filtered to visible rows; hidden
//! content is indistinguishable from absent content.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use std::sync::Arc;

use super::{AlbumDto, ApiError, ApiResponse, AppState, ContentDto, PhotoDto};
use crate::constants::limits::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::models::content::ContentKind;

#[derive(Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub page: Option<u64>,
    #[serde(default)]
    pub per_page: Option<u64>,
}

impl ListQuery {
    pub fn limit_offset(&self) -> (u64, u64) {
        let per_page = self
            .per_page
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let page = self.page.unwrap_or(1).max(1);
        (per_page, (page - 1) * per_page)
    }
}

fn parse_kind(segment: &str) -> Result<ContentKind, ApiError> {
    segment
        .parse()
        .map_err(|()| ApiError::NotFound(format!("No such content type: {segment}")))
}

/// GET /api/public/{kind}
pub async fn list_content(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<Vec<ContentDto>>>, ApiError> {
    let kind = parse_kind(&kind)?;
    let (limit, offset) = query.limit_offset();

    let rows = state
        .store()
        .list_public_content(kind, limit, offset)
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

    let items = rows
        .into_iter()
        .map(|row| ContentDto::from_model(row, kind))
        .collect();

    Ok(Json(ApiResponse::success(items)))
}

/// GET /api/public/{kind}/categories
pub async fn list_categories(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
) -> Result<Json<ApiResponse<Vec<String>>>, ApiError> {
    let kind = parse_kind(&kind)?;

    let categories = state
        .store()
        .content_categories(kind)
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

    Ok(Json(ApiResponse::success(categories)))
}

/// GET /api/public/{kind}/{id}
/// Single-item read; this is the only path that bumps the view counter.
pub async fn get_content(
    State(state): State<Arc<AppState>>,
    Path((kind, id)): Path<(String, i32)>,
) -> Result<Json<ApiResponse<ContentDto>>, ApiError> {
    let kind = parse_kind(&kind)?;

    let row = state
        .store()
        .get_visible_content(id)
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?
        .filter(|row| row.kind == kind.as_str())
        .ok_or_else(|| ApiError::not_found("Item", id))?;

    state
        .store()
        .increment_content_views(id)
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

    let mut dto = ContentDto::from_model(row, kind);
    dto.views += 1;

    Ok(Json(ApiResponse::success(dto)))
}

/// GET /api/public/albums
pub async fn list_albums(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<AlbumDto>>>, ApiError> {
    let rows = state
        .store()
        .list_public_albums()
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

    Ok(Json(ApiResponse::success(
        rows.into_iter().map(AlbumDto::from).collect(),
    )))
}

/// GET /api/public/albums/{id}
pub async fn get_album(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<AlbumDto>>, ApiError> {
    let album = state
        .store()
        .get_visible_album(id)
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?
        .ok_or_else(|| ApiError::not_found("Album", id))?;

    Ok(Json(ApiResponse::success(AlbumDto::from(album))))
}

/// GET /api/public/albums/{id}/photos
pub async fn list_album_photos(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<Vec<PhotoDto>>>, ApiError> {
    state
        .store()
        .get_visible_album(id)
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?
        .ok_or_else(|| ApiError::not_found("Album", id))?;

    let photos = state
        .store()
        .photos_of_album(id)
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

    Ok(Json(ApiResponse::success(
        photos.into_iter().map(PhotoDto::from).collect(),
    )))
}
