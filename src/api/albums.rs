//! Admin management of photo albums and their gallery photos.

use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::HeaderMap,
};
use serde::Deserialize;
use std::sync::Arc;

use super::auth::{ClientIp, CurrentUser, user_agent};
use super::{AlbumDto, ApiError, ApiResponse, AppState, PhotoDto};
use crate::constants::uploads::GALLERY_DIR;
use crate::db::AlbumInput;
use crate::services::{AuditContext, UploadError, UploadField};

#[derive(Deserialize)]
pub struct AlbumForm {
    pub title: String,
    pub description: String,
    pub category: String,
    #[serde(default = "default_visible")]
    pub visible: bool,
}

const fn default_visible() -> bool {
    true
}

#[derive(Deserialize)]
pub struct ReorderRequest {
    pub photo_ids: Vec<i32>,
}

#[derive(Deserialize)]
pub struct CoverRequest {
    pub filename: Option<String>,
}

fn audit_ctx(current: &CurrentUser, ip: &str, headers: &HeaderMap) -> AuditContext {
    AuditContext {
        actor: Some(current.username.clone()),
        ip: ip.to_string(),
        user_agent: user_agent(headers),
    }
}

fn validate_album(form: &AlbumForm) -> Result<(), ApiError> {
    if form.title.trim().is_empty() {
        return Err(ApiError::validation("Title is required"));
    }
    if form.category.trim().is_empty() {
        return Err(ApiError::validation("Category is required"));
    }
    Ok(())
}

// ============================================================================
// Albums
// ============================================================================

/// GET /api/admin/albums
pub async fn list_albums(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<AlbumDto>>>, ApiError> {
    let rows = state
        .store()
        .list_admin_albums()
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

    Ok(Json(ApiResponse::success(
        rows.into_iter().map(AlbumDto::from).collect(),
    )))
}

/// POST /api/admin/albums
pub async fn create_album(
    State(state): State<Arc<AppState>>,
    ClientIp(peer): ClientIp,
    headers: HeaderMap,
    axum::Extension(current): axum::Extension<CurrentUser>,
    Json(form): Json<AlbumForm>,
) -> Result<Json<ApiResponse<AlbumDto>>, ApiError> {
    validate_album(&form)?;

    let album = state
        .store()
        .create_album(AlbumInput {
            title: form.title.clone(),
            description: form.description,
            category: form.category,
            visible: form.visible,
        })
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

    state
        .audit()
        .record(
            &audit_ctx(&current, &peer, &headers),
            "create_album",
            "albums",
            Some(i64::from(album.id)),
            Some(form.title),
        )
        .await;

    Ok(Json(ApiResponse::success(AlbumDto::from(album))))
}

/// PUT /api/admin/albums/{id}
pub async fn update_album(
    State(state): State<Arc<AppState>>,
    ClientIp(peer): ClientIp,
    headers: HeaderMap,
    axum::Extension(current): axum::Extension<CurrentUser>,
    Path(id): Path<i32>,
    Json(form): Json<AlbumForm>,
) -> Result<Json<ApiResponse<AlbumDto>>, ApiError> {
    validate_album(&form)?;

    let album = state
        .store()
        .update_album(
            id,
            AlbumInput {
                title: form.title.clone(),
                description: form.description,
                category: form.category,
                visible: form.visible,
            },
        )
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?
        .ok_or_else(|| ApiError::not_found("Album", id))?;

    state
        .audit()
        .record(
            &audit_ctx(&current, &peer, &headers),
            "update_album",
            "albums",
            Some(i64::from(id)),
            Some(form.title),
        )
        .await;

    Ok(Json(ApiResponse::success(AlbumDto::from(album))))
}

/// DELETE /api/admin/albums/{id}
///
/// Cascades: every child photo's backing file and row goes first, then the
/// album row itself.
pub async fn delete_album(
    State(state): State<Arc<AppState>>,
    ClientIp(peer): ClientIp,
    headers: HeaderMap,
    axum::Extension(current): axum::Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<AlbumDto>>, ApiError> {
    state
        .store()
        .get_album(id)
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?
        .ok_or_else(|| ApiError::not_found("Album", id))?;

    let photos = state
        .store()
        .photos_of_album(id)
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

    for photo in &photos {
        if let Err(err) = state.uploads().delete(GALLERY_DIR, &photo.filename).await {
            tracing::warn!("Failed to remove photo file {}: {err}", photo.filename);
        }
    }

    let (album, _) = state
        .store()
        .delete_album_cascade(id)
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?
        .ok_or_else(|| ApiError::not_found("Album", id))?;

    state
        .audit()
        .record(
            &audit_ctx(&current, &peer, &headers),
            "delete_album",
            "albums",
            Some(i64::from(id)),
            Some(format!("{} ({} photos)", album.title, photos.len())),
        )
        .await;

    Ok(Json(ApiResponse::success(AlbumDto::from(album))))
}

// ============================================================================
// Photos
// ============================================================================

/// GET /api/admin/albums/{id}/photos
pub async fn list_photos(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<Vec<PhotoDto>>>, ApiError> {
    state
        .store()
        .get_album(id)
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

/// POST /api/admin/albums/{id}/photos
/// Multipart upload; every `photo` part becomes one gallery photo. The
/// album's first photo also becomes its cover.
pub async fn upload_photos(
    State(state): State<Arc<AppState>>,
    ClientIp(peer): ClientIp,
    headers: HeaderMap,
    axum::Extension(current): axum::Extension<CurrentUser>,
    Path(id): Path<i32>,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<Vec<PhotoDto>>>, ApiError> {
    let album = state
        .store()
        .get_album(id)
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?
        .ok_or_else(|| ApiError::not_found("Album", id))?;

    let mut uploads = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Upload(UploadError::Transport(e.to_string())))?
    {
        if field.name() != Some("photo") {
            let _ = field.bytes().await;
            continue;
        }

        let original = field.file_name().unwrap_or_default().to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::Upload(UploadError::Transport(e.to_string())))?
            .to_vec();

        uploads.push((original, data));
    }

    if uploads.is_empty() {
        return Err(ApiError::Upload(UploadError::Transport(
            "no photo attached".to_string(),
        )));
    }

    let mut created = Vec::new();
    for (original, data) in uploads {
        let stored = state
            .uploads()
            .store(UploadField::Photo, GALLERY_DIR, &original, data)
            .await?;

        let photo = match state.store().add_photo(id, &stored.filename).await {
            Ok(photo) => photo,
            Err(err) => {
                if let Err(cleanup) = state.uploads().delete(GALLERY_DIR, &stored.filename).await {
                    tracing::warn!(
                        "Failed to clean up orphaned photo {}: {cleanup}",
                        stored.filename
                    );
                }
                return Err(ApiError::DatabaseError(err.to_string()));
            }
        };

        created.push(photo);
    }

    if album.cover_photo.is_none()
        && let Some(first) = created.first()
    {
        state
            .store()
            .set_album_cover(id, Some(&first.filename))
            .await
            .map_err(|e| ApiError::DatabaseError(e.to_string()))?;
    }

    state
        .audit()
        .record(
            &audit_ctx(&current, &peer, &headers),
            "upload_photos",
            "photos",
            Some(i64::from(id)),
            Some(format!("{} photos added to '{}'", created.len(), album.title)),
        )
        .await;

    Ok(Json(ApiResponse::success(
        created.into_iter().map(PhotoDto::from).collect(),
    )))
}

/// DELETE /api/admin/photos/{id}
///
/// Row first, file second; if the deleted photo was the album cover the
/// cover moves to another photo of the album (or null when none remain).
pub async fn delete_photo(
    State(state): State<Arc<AppState>>,
    ClientIp(peer): ClientIp,
    headers: HeaderMap,
    axum::Extension(current): axum::Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<PhotoDto>>, ApiError> {
    let photo = state
        .store()
        .delete_photo(id)
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?
        .ok_or_else(|| ApiError::not_found("Photo", id))?;

    if let Err(err) = state.uploads().delete(GALLERY_DIR, &photo.filename).await {
        tracing::warn!("Failed to remove photo file {}: {err}", photo.filename);
    }

    state
        .store()
        .reassign_cover_after_delete(photo.album_id, &photo.filename)
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

    state
        .audit()
        .record(
            &audit_ctx(&current, &peer, &headers),
            "delete_photo",
            "photos",
            Some(i64::from(id)),
            Some(photo.filename.clone()),
        )
        .await;

    Ok(Json(ApiResponse::success(PhotoDto::from(photo))))
}

/// PUT /api/admin/albums/{id}/photos/order
pub async fn reorder_photos(
    State(state): State<Arc<AppState>>,
    ClientIp(peer): ClientIp,
    headers: HeaderMap,
    axum::Extension(current): axum::Extension<CurrentUser>,
    Path(id): Path<i32>,
    Json(request): Json<ReorderRequest>,
) -> Result<Json<ApiResponse<Vec<PhotoDto>>>, ApiError> {
    state
        .store()
        .get_album(id)
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?
        .ok_or_else(|| ApiError::not_found("Album", id))?;

    state
        .store()
        .reorder_photos(id, &request.photo_ids)
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

    let photos = state
        .store()
        .photos_of_album(id)
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

    state
        .audit()
        .record(
            &audit_ctx(&current, &peer, &headers),
            "reorder_photos",
            "photos",
            Some(i64::from(id)),
            None,
        )
        .await;

    Ok(Json(ApiResponse::success(
        photos.into_iter().map(PhotoDto::from).collect(),
    )))
}

/// PUT /api/admin/albums/{id}/cover
/// The cover must name a photo of this album, or be null.
pub async fn set_cover(
    State(state): State<Arc<AppState>>,
    ClientIp(peer): ClientIp,
    headers: HeaderMap,
    axum::Extension(current): axum::Extension<CurrentUser>,
    Path(id): Path<i32>,
    Json(request): Json<CoverRequest>,
) -> Result<Json<ApiResponse<AlbumDto>>, ApiError> {
    state
        .store()
        .get_album(id)
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?
        .ok_or_else(|| ApiError::not_found("Album", id))?;

    if let Some(filename) = request.filename.as_deref() {
        let belongs = state
            .store()
            .photo_in_album(id, filename)
            .await
            .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

        if !belongs {
            return Err(ApiError::validation(
                "Cover must be a photo of this album",
            ));
        }
    }

    state
        .store()
        .set_album_cover(id, request.filename.as_deref())
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

    let album = state
        .store()
        .get_album(id)
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?
        .ok_or_else(|| ApiError::not_found("Album", id))?;

    state
        .audit()
        .record(
            &audit_ctx(&current, &peer, &headers),
            "set_album_cover",
            "albums",
            Some(i64::from(id)),
            request.filename,
        )
        .await;

    Ok(Json(ApiResponse::success(AlbumDto::from(album))))
}
