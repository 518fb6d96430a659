use serde::Serialize;

use crate::constants::uploads::{GALLERY_DIR, PUBLIC_PREFIX};
use crate::db::StaffUser;
use crate::entities::{albums, content_items, photos};
use crate::models::content::ContentKind;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub const fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UserSummary {
    pub username: String,
    pub full_name: String,
    pub role: String,
    pub last_login: Option<String>,
}

impl From<StaffUser> for UserSummary {
    fn from(user: StaffUser) -> Self {
        Self {
            username: user.username,
            full_name: user.full_name,
            role: user.role,
            last_login: user.last_login,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ContentDto {
    pub id: i32,
    pub kind: String,
    pub title: String,
    pub category: String,
    pub publish_date: String,
    pub summary: Option<String>,
    pub body: String,
    pub document_url: Option<String>,
    pub image_url: Option<String>,
    pub visible: bool,
    pub priority: bool,
    pub views: i64,
    pub created_by: String,
    pub created_at: String,
    pub updated_at: String,
}

impl ContentDto {
    pub fn from_model(model: content_items::Model, kind: ContentKind) -> Self {
        let dir = kind.upload_dir();
        Self {
            id: model.id,
            kind: model.kind,
            title: model.title,
            category: model.category,
            publish_date: model.publish_date,
            summary: model.summary,
            body: model.body,
            document_url: model
                .document_file
                .map(|f| format!("{PUBLIC_PREFIX}/{dir}/{f}")),
            image_url: model.image_file.map(|f| format!("{PUBLIC_PREFIX}/{dir}/{f}")),
            visible: model.visible,
            priority: model.priority,
            views: model.views,
            created_by: model.created_by,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AlbumDto {
    pub id: i32,
    pub title: String,
    pub description: String,
    pub category: String,
    pub cover_url: Option<String>,
    pub visible: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<albums::Model> for AlbumDto {
    fn from(model: albums::Model) -> Self {
        Self {
            id: model.id,
            title: model.title,
            description: model.description,
            category: model.category,
            cover_url: model
                .cover_photo
                .map(|f| format!("{PUBLIC_PREFIX}/{GALLERY_DIR}/{f}")),
            visible: model.visible,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PhotoDto {
    pub id: i32,
    pub album_id: i32,
    pub filename: String,
    pub url: String,
    pub position: i32,
}

impl From<photos::Model> for PhotoDto {
    fn from(model: photos::Model) -> Self {
        Self {
            id: model.id,
            album_id: model.album_id,
            url: format!("{PUBLIC_PREFIX}/{GALLERY_DIR}/{}", model.filename),
            filename: model.filename,
            position: model.position,
        }
    }
}

/// Admin listings carry the total row count for pagination.
#[derive(Debug, Serialize)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub total: u64,
}
