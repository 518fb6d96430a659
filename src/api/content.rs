//! Admin CRUD for the four content families. Create and update accept
//! multipart forms so a document and/or an illustration can ride along.

use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
    http::HeaderMap,
};
use std::sync::Arc;

use super::auth::{ClientIp, CurrentUser, user_agent};
use super::public::ListQuery;
use super::{ApiError, ApiResponse, AppState, ContentDto, Paged};
use crate::db::{ContentUpdate, NewContent};
use crate::models::content::ContentKind;
use crate::services::{AuditContext, StoredFile, UploadError, UploadField};

fn parse_kind(segment: &str) -> Result<ContentKind, ApiError> {
    segment
        .parse()
        .map_err(|()| ApiError::NotFound(format!("No such content type: {segment}")))
}

fn audit_ctx(current: &CurrentUser, ip: &str, headers: &HeaderMap) -> AuditContext {
    AuditContext {
        actor: Some(current.username.clone()),
        ip: ip.to_string(),
        user_agent: user_agent(headers),
    }
}

// ============================================================================
// Multipart form
// ============================================================================

struct ContentForm {
    title: String,
    category: String,
    publish_date: String,
    body: String,
    summary: Option<String>,
    visible: bool,
    priority: bool,
    document: Option<(String, Vec<u8>)>,
    image: Option<(String, Vec<u8>)>,
}

impl Default for ContentForm {
    fn default() -> Self {
        Self {
            title: String::new(),
            category: String::new(),
            publish_date: String::new(),
            body: String::new(),
            summary: None,
            visible: true,
            priority: false,
            document: None,
            image: None,
        }
    }
}

fn transport(err: axum::extract::multipart::MultipartError) -> ApiError {
    ApiError::Upload(UploadError::Transport(err.to_string()))
}

fn parse_bool(text: &str) -> bool {
    matches!(text, "1" | "true" | "on" | "yes")
}

async fn read_content_form(mut multipart: Multipart) -> Result<ContentForm, ApiError> {
    let mut form = ContentForm::default();

    while let Some(field) = multipart.next_field().await.map_err(transport)? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        match name.as_str() {
            "title" => form.title = field.text().await.map_err(transport)?,
            "category" => form.category = field.text().await.map_err(transport)?,
            "publish_date" => form.publish_date = field.text().await.map_err(transport)?,
            "body" => form.body = field.text().await.map_err(transport)?,
            "summary" => {
                let text = field.text().await.map_err(transport)?;
                form.summary = (!text.is_empty()).then_some(text);
            }
            "visible" => form.visible = parse_bool(&field.text().await.map_err(transport)?),
            "priority" => form.priority = parse_bool(&field.text().await.map_err(transport)?),
            "document" | "image" => {
                let original = field.file_name().unwrap_or_default().to_string();
                let data = field.bytes().await.map_err(transport)?.to_vec();

                // An empty file input on the form is not an upload.
                if original.is_empty() && data.is_empty() {
                    continue;
                }

                if name == "document" {
                    form.document = Some((original, data));
                } else {
                    form.image = Some((original, data));
                }
            }
            _ => {
                let _ = field.bytes().await;
            }
        }
    }

    Ok(form)
}

fn validate_form(form: &ContentForm) -> Result<(), ApiError> {
    if form.title.trim().is_empty() {
        return Err(ApiError::validation("Title is required"));
    }
    if form.category.trim().is_empty() {
        return Err(ApiError::validation("Category is required"));
    }
    if chrono::NaiveDate::parse_from_str(&form.publish_date, "%Y-%m-%d").is_err() {
        return Err(ApiError::validation(
            "Publish date must be a valid date (YYYY-MM-DD)",
        ));
    }
    Ok(())
}

/// Store the optional document and image parts, cleaning up the first if
/// the second fails validation.
async fn store_attachments(
    state: &AppState,
    kind: ContentKind,
    form: &mut ContentForm,
) -> Result<(Option<StoredFile>, Option<StoredFile>), ApiError> {
    let document = match form.document.take() {
        Some((name, data)) => Some(
            state
                .uploads()
                .store(UploadField::Document, kind.upload_dir(), &name, data)
                .await?,
        ),
        None => None,
    };

    let image = match form.image.take() {
        Some((name, data)) => {
            match state
                .uploads()
                .store(UploadField::Image, kind.upload_dir(), &name, data)
                .await
            {
                Ok(stored) => Some(stored),
                Err(err) => {
                    discard(state, kind, document.as_ref()).await;
                    return Err(err.into());
                }
            }
        }
        None => None,
    };

    Ok((document, image))
}

/// Best-effort unlink of a freshly stored file whose database write never
/// happened.
async fn discard(state: &AppState, kind: ContentKind, stored: Option<&StoredFile>) {
    if let Some(file) = stored
        && let Err(err) = state.uploads().delete(kind.upload_dir(), &file.filename).await
    {
        tracing::warn!("Failed to clean up orphaned upload {}: {err}", file.filename);
    }
}

/// Unlink a replaced or deleted file; failure is logged, not surfaced — the
/// database is already consistent at this point.
async fn unlink(state: &AppState, kind: ContentKind, filename: &str) {
    if let Err(err) = state.uploads().delete(kind.upload_dir(), filename).await {
        tracing::warn!("Failed to remove stored file {filename}: {err}");
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/admin/content/{kind}
pub async fn list_content(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<Paged<ContentDto>>>, ApiError> {
    let kind = parse_kind(&kind)?;
    let (limit, offset) = query.limit_offset();

    let (rows, total) = state
        .store()
        .list_admin_content(kind, limit, offset)
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

    Ok(Json(ApiResponse::success(Paged {
        items: rows
            .into_iter()
            .map(|row| ContentDto::from_model(row, kind))
            .collect(),
        total,
    })))
}

/// GET /api/admin/content/{kind}/{id}
pub async fn get_content(
    State(state): State<Arc<AppState>>,
    Path((kind, id)): Path<(String, i32)>,
) -> Result<Json<ApiResponse<ContentDto>>, ApiError> {
    let kind = parse_kind(&kind)?;

    let row = state
        .store()
        .get_content(id)
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?
        .filter(|row| row.kind == kind.as_str())
        .ok_or_else(|| ApiError::not_found("Item", id))?;

    Ok(Json(ApiResponse::success(ContentDto::from_model(row, kind))))
}

/// POST /api/admin/content/{kind}
pub async fn create_content(
    State(state): State<Arc<AppState>>,
    ClientIp(peer): ClientIp,
    headers: HeaderMap,
    axum::Extension(current): axum::Extension<CurrentUser>,
    Path(kind): Path<String>,
    multipart: Multipart,
) -> Result<Json<ApiResponse<ContentDto>>, ApiError> {
    let kind = parse_kind(&kind)?;

    let mut form = read_content_form(multipart).await?;
    validate_form(&form)?;

    let (document, image) = store_attachments(&state, kind, &mut form).await?;

    let input = NewContent {
        kind,
        title: form.title.clone(),
        category: form.category,
        publish_date: form.publish_date,
        body: form.body,
        summary: form.summary,
        document_file: document.as_ref().map(|f| f.filename.clone()),
        image_file: image.as_ref().map(|f| f.filename.clone()),
        visible: form.visible,
        priority: form.priority,
        created_by: current.username.clone(),
    };

    let row = match state.store().create_content(input).await {
        Ok(row) => row,
        Err(err) => {
            discard(&state, kind, document.as_ref()).await;
            discard(&state, kind, image.as_ref()).await;
            return Err(ApiError::DatabaseError(err.to_string()));
        }
    };

    state
        .audit()
        .record(
            &audit_ctx(&current, &peer, &headers),
            &format!("create_{kind}"),
            "content_items",
            Some(i64::from(row.id)),
            Some(form.title),
        )
        .await;

    Ok(Json(ApiResponse::success(ContentDto::from_model(row, kind))))
}

/// PUT /api/admin/content/{kind}/{id}
///
/// When a new file replaces an old one the database write happens first and
/// only then is the old file unlinked; a failed update must not orphan a
/// still-referenced file.
pub async fn update_content(
    State(state): State<Arc<AppState>>,
    ClientIp(peer): ClientIp,
    headers: HeaderMap,
    axum::Extension(current): axum::Extension<CurrentUser>,
    Path((kind, id)): Path<(String, i32)>,
    multipart: Multipart,
) -> Result<Json<ApiResponse<ContentDto>>, ApiError> {
    let kind = parse_kind(&kind)?;

    let existing = state
        .store()
        .get_content(id)
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?
        .filter(|row| row.kind == kind.as_str())
        .ok_or_else(|| ApiError::not_found("Item", id))?;

    let mut form = read_content_form(multipart).await?;
    validate_form(&form)?;

    let (document, image) = store_attachments(&state, kind, &mut form).await?;

    let update = ContentUpdate {
        title: form.title.clone(),
        category: form.category,
        publish_date: form.publish_date,
        body: form.body,
        summary: form.summary,
        document_file: document.as_ref().map(|f| f.filename.clone()),
        image_file: image.as_ref().map(|f| f.filename.clone()),
        visible: form.visible,
        priority: form.priority,
    };

    let updated = match state.store().update_content(id, update).await {
        Ok(Some(row)) => row,
        Ok(None) => {
            discard(&state, kind, document.as_ref()).await;
            discard(&state, kind, image.as_ref()).await;
            return Err(ApiError::not_found("Item", id));
        }
        Err(err) => {
            discard(&state, kind, document.as_ref()).await;
            discard(&state, kind, image.as_ref()).await;
            return Err(ApiError::DatabaseError(err.to_string()));
        }
    };

    // Replaced files are removed only now that the row points elsewhere.
    if document.is_some()
        && let Some(old) = existing.document_file.as_deref()
    {
        unlink(&state, kind, old).await;
    }
    if image.is_some()
        && let Some(old) = existing.image_file.as_deref()
    {
        unlink(&state, kind, old).await;
    }

    state
        .audit()
        .record(
            &audit_ctx(&current, &peer, &headers),
            &format!("update_{kind}"),
            "content_items",
            Some(i64::from(id)),
            Some(form.title),
        )
        .await;

    Ok(Json(ApiResponse::success(ContentDto::from_model(
        updated, kind,
    ))))
}

/// DELETE /api/admin/content/{kind}/{id}
pub async fn delete_content(
    State(state): State<Arc<AppState>>,
    ClientIp(peer): ClientIp,
    headers: HeaderMap,
    axum::Extension(current): axum::Extension<CurrentUser>,
    Path((kind, id)): Path<(String, i32)>,
) -> Result<Json<ApiResponse<ContentDto>>, ApiError> {
    let kind = parse_kind(&kind)?;

    let row = state
        .store()
        .get_content(id)
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?
        .filter(|row| row.kind == kind.as_str())
        .ok_or_else(|| ApiError::not_found("Item", id))?;

    let row = state
        .store()
        .delete_content(row.id)
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?
        .ok_or_else(|| ApiError::not_found("Item", id))?;

    if let Some(document) = row.document_file.as_deref() {
        unlink(&state, kind, document).await;
    }
    if let Some(image) = row.image_file.as_deref() {
        unlink(&state, kind, image).await;
    }

    state
        .audit()
        .record(
            &audit_ctx(&current, &peer, &headers),
            &format!("delete_{kind}"),
            "content_items",
            Some(i64::from(id)),
            Some(row.title.clone()),
        )
        .await;

    Ok(Json(ApiResponse::success(ContentDto::from_model(row, kind))))
}
