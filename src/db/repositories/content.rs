use anyhow::Result;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};

use crate::entities::{content_items, prelude::*};
use crate::models::content::ContentKind;

/// Fields accepted when creating a content item.
#[derive(Debug, Clone)]
pub struct NewContent {
    pub kind: ContentKind,
    pub title: String,
    pub category: String,
    pub publish_date: String,
    pub body: String,
    pub summary: Option<String>,
    pub document_file: Option<String>,
    pub image_file: Option<String>,
    pub visible: bool,
    pub priority: bool,
    pub created_by: String,
}

/// Full-replacement edit; `document_file`/`image_file` are `None` to keep
/// the stored filename, `Some(name)` when a new upload replaces it.
#[derive(Debug, Clone)]
pub struct ContentUpdate {
    pub title: String,
    pub category: String,
    pub publish_date: String,
    pub body: String,
    pub summary: Option<String>,
    pub document_file: Option<String>,
    pub image_file: Option<String>,
    pub visible: bool,
    pub priority: bool,
}

pub struct ContentRepository {
    conn: DatabaseConnection,
}

impl ContentRepository {
    pub fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn create(&self, input: NewContent) -> Result<content_items::Model> {
        let now = chrono::Utc::now().to_rfc3339();

        let active = content_items::ActiveModel {
            kind: Set(input.kind.as_str().to_string()),
            title: Set(input.title),
            category: Set(input.category),
            publish_date: Set(input.publish_date),
            body: Set(input.body),
            summary: Set(input.summary),
            document_file: Set(input.document_file),
            image_file: Set(input.image_file),
            visible: Set(input.visible),
            priority: Set(input.priority),
            views: Set(0),
            created_by: Set(input.created_by),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        };

        Ok(active.insert(&self.conn).await?)
    }

    pub async fn get(&self, id: i32) -> Result<Option<content_items::Model>> {
        Ok(ContentItems::find_by_id(id).one(&self.conn).await?)
    }

    /// Public single-item read: hidden rows are indistinguishable from
    /// missing ones.
    pub async fn get_visible(&self, id: i32) -> Result<Option<content_items::Model>> {
        Ok(ContentItems::find_by_id(id)
            .filter(content_items::Column::Visible.eq(true))
            .one(&self.conn)
            .await?)
    }

    /// Publish-date descending, id descending as tie-break. Category never
    /// affects ordering.
    pub async fn list_public(
        &self,
        kind: ContentKind,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<content_items::Model>> {
        let rows = ContentItems::find()
            .filter(content_items::Column::Kind.eq(kind.as_str()))
            .filter(content_items::Column::Visible.eq(true))
            .order_by_desc(content_items::Column::PublishDate)
            .order_by_desc(content_items::Column::Id)
            .limit(limit)
            .offset(offset)
            .all(&self.conn)
            .await?;

        Ok(rows)
    }

    pub async fn list_admin(
        &self,
        kind: ContentKind,
        limit: u64,
        offset: u64,
    ) -> Result<(Vec<content_items::Model>, u64)> {
        let base = ContentItems::find().filter(content_items::Column::Kind.eq(kind.as_str()));

        let total = base.clone().count(&self.conn).await?;

        let rows = base
            .order_by_desc(content_items::Column::PublishDate)
            .order_by_desc(content_items::Column::Id)
            .limit(limit)
            .offset(offset)
            .all(&self.conn)
            .await?;

        Ok((rows, total))
    }

    pub async fn update(
        &self,
        id: i32,
        input: ContentUpdate,
    ) -> Result<Option<content_items::Model>> {
        let Some(existing) = ContentItems::find_by_id(id).one(&self.conn).await? else {
            return Ok(None);
        };

        let mut active: content_items::ActiveModel = existing.into();
        active.title = Set(input.title);
        active.category = Set(input.category);
        active.publish_date = Set(input.publish_date);
        active.body = Set(input.body);
        active.summary = Set(input.summary);
        if let Some(document) = input.document_file {
            active.document_file = Set(Some(document));
        }
        if let Some(image) = input.image_file {
            active.image_file = Set(Some(image));
        }
        active.visible = Set(input.visible);
        active.priority = Set(input.priority);
        active.updated_at = Set(chrono::Utc::now().to_rfc3339());

        Ok(Some(active.update(&self.conn).await?))
    }

    /// Delete and return the removed row so the caller can unlink attached
    /// files and write the audit entry.
    pub async fn delete(&self, id: i32) -> Result<Option<content_items::Model>> {
        let Some(existing) = ContentItems::find_by_id(id).one(&self.conn).await? else {
            return Ok(None);
        };

        ContentItems::delete_by_id(id).exec(&self.conn).await?;
        Ok(Some(existing))
    }

    /// Atomic UPDATE; concurrent public reads must not lose increments.
    pub async fn increment_views(&self, id: i32) -> Result<()> {
        ContentItems::update_many()
            .col_expr(
                content_items::Column::Views,
                Expr::col(content_items::Column::Views).add(1),
            )
            .filter(content_items::Column::Id.eq(id))
            .exec(&self.conn)
            .await?;

        Ok(())
    }

    pub async fn categories(&self, kind: ContentKind) -> Result<Vec<String>> {
        let rows: Vec<String> = ContentItems::find()
            .select_only()
            .column(content_items::Column::Category)
            .distinct()
            .filter(content_items::Column::Kind.eq(kind.as_str()))
            .filter(content_items::Column::Visible.eq(true))
            .order_by_asc(content_items::Column::Category)
            .into_tuple()
            .all(&self.conn)
            .await?;

        Ok(rows)
    }
}
