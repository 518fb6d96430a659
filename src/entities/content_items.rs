use sea_orm::entity::prelude::*;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "content_items")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// One of: announcement, decision, disposition, project_document.
    pub kind: String,

    pub title: String,

    pub category: String,

    /// ISO date (YYYY-MM-DD); public ordering key.
    pub publish_date: String,

    #[sea_orm(column_type = "Text")]
    pub body: String,

    pub summary: Option<String>,

    /// Server-generated filename under the per-kind document root.
    pub document_file: Option<String>,

    /// Server-generated filename under the per-kind image root.
    pub image_file: Option<String>,

    pub visible: bool,

    pub priority: bool,

    /// Incremented only by public single-item reads.
    pub views: i64,

    pub created_by: String,

    pub created_at: String,

    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
