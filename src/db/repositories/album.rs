use anyhow::Result;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};

use crate::entities::{albums, photos, prelude::*};

#[derive(Debug, Clone)]
pub struct AlbumInput {
    pub title: String,
    pub description: String,
    pub category: String,
    pub visible: bool,
}

pub struct AlbumRepository {
    conn: DatabaseConnection,
}

impl AlbumRepository {
    pub fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    // ========================================================================
    // Albums
    // ========================================================================

    pub async fn create(&self, input: AlbumInput) -> Result<albums::Model> {
        let now = chrono::Utc::now().to_rfc3339();

        let active = albums::ActiveModel {
            title: Set(input.title),
            description: Set(input.description),
            category: Set(input.category),
            cover_photo: Set(None),
            visible: Set(input.visible),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        };

        Ok(active.insert(&self.conn).await?)
    }

    pub async fn get(&self, id: i32) -> Result<Option<albums::Model>> {
        Ok(Albums::find_by_id(id).one(&self.conn).await?)
    }

    pub async fn get_visible(&self, id: i32) -> Result<Option<albums::Model>> {
        Ok(Albums::find_by_id(id)
            .filter(albums::Column::Visible.eq(true))
            .one(&self.conn)
            .await?)
    }

    pub async fn list_public(&self) -> Result<Vec<albums::Model>> {
        Ok(Albums::find()
            .filter(albums::Column::Visible.eq(true))
            .order_by_desc(albums::Column::Id)
            .all(&self.conn)
            .await?)
    }

    pub async fn list_admin(&self) -> Result<Vec<albums::Model>> {
        Ok(Albums::find()
            .order_by_desc(albums::Column::Id)
            .all(&self.conn)
            .await?)
    }

    pub async fn update(&self, id: i32, input: AlbumInput) -> Result<Option<albums::Model>> {
        let Some(existing) = Albums::find_by_id(id).one(&self.conn).await? else {
            return Ok(None);
        };

        let mut active: albums::ActiveModel = existing.into();
        active.title = Set(input.title);
        active.description = Set(input.description);
        active.category = Set(input.category);
        active.visible = Set(input.visible);
        active.updated_at = Set(chrono::Utc::now().to_rfc3339());

        Ok(Some(active.update(&self.conn).await?))
    }

    pub async fn set_cover(&self, album_id: i32, cover: Option<&str>) -> Result<()> {
        Albums::update_many()
            .col_expr(
                albums::Column::CoverPhoto,
                Expr::value(cover.map(str::to_string)),
            )
            .col_expr(
                albums::Column::UpdatedAt,
                Expr::value(chrono::Utc::now().to_rfc3339()),
            )
            .filter(albums::Column::Id.eq(album_id))
            .exec(&self.conn)
            .await?;

        Ok(())
    }

    /// Remove the album row and all child photo rows, returning both so the
    /// caller can unlink the backing files. Photo rows go first.
    pub async fn delete_cascade(
        &self,
        id: i32,
    ) -> Result<Option<(albums::Model, Vec<photos::Model>)>> {
        let Some(album) = Albums::find_by_id(id).one(&self.conn).await? else {
            return Ok(None);
        };

        let children = self.photos_of(id).await?;

        Photos::delete_many()
            .filter(photos::Column::AlbumId.eq(id))
            .exec(&self.conn)
            .await?;

        Albums::delete_by_id(id).exec(&self.conn).await?;

        Ok(Some((album, children)))
    }

    // ========================================================================
    // Photos
    // ========================================================================

    pub async fn photos_of(&self, album_id: i32) -> Result<Vec<photos::Model>> {
        Ok(Photos::find()
            .filter(photos::Column::AlbumId.eq(album_id))
            .order_by_asc(photos::Column::Position)
            .order_by_asc(photos::Column::Id)
            .all(&self.conn)
            .await?)
    }

    pub async fn get_photo(&self, id: i32) -> Result<Option<photos::Model>> {
        Ok(Photos::find_by_id(id).one(&self.conn).await?)
    }

    /// Appends at the end of the album's ordering.
    pub async fn add_photo(&self, album_id: i32, filename: &str) -> Result<photos::Model> {
        let last = Photos::find()
            .filter(photos::Column::AlbumId.eq(album_id))
            .order_by_desc(photos::Column::Position)
            .limit(1)
            .one(&self.conn)
            .await?;

        let position = last.map_or(1, |p| p.position + 1);

        let active = photos::ActiveModel {
            album_id: Set(album_id),
            filename: Set(filename.to_string()),
            position: Set(position),
            created_at: Set(chrono::Utc::now().to_rfc3339()),
            ..Default::default()
        };

        Ok(active.insert(&self.conn).await?)
    }

    pub async fn delete_photo(&self, id: i32) -> Result<Option<photos::Model>> {
        let Some(existing) = Photos::find_by_id(id).one(&self.conn).await? else {
            return Ok(None);
        };

        Photos::delete_by_id(id).exec(&self.conn).await?;
        Ok(Some(existing))
    }

    /// Rewrite positions to match the given id order. Ids not belonging to
    /// the album are ignored by the filter.
    pub async fn reorder_photos(&self, album_id: i32, ordered_ids: &[i32]) -> Result<()> {
        for (index, photo_id) in ordered_ids.iter().enumerate() {
            Photos::update_many()
                .col_expr(photos::Column::Position, Expr::value(index as i32 + 1))
                .filter(photos::Column::Id.eq(*photo_id))
                .filter(photos::Column::AlbumId.eq(album_id))
                .exec(&self.conn)
                .await?;
        }

        Ok(())
    }

    /// True iff the filename belongs to a photo of this album.
    pub async fn photo_in_album(&self, album_id: i32, filename: &str) -> Result<bool> {
        let found = Photos::find()
            .filter(photos::Column::AlbumId.eq(album_id))
            .filter(photos::Column::Filename.eq(filename))
            .one(&self.conn)
            .await?;

        Ok(found.is_some())
    }

    /// After a photo is removed, keep the album's cover invariant: if the
    /// cover named the deleted file, point it at the first remaining photo,
    /// or clear it when the album is now empty.
    pub async fn reassign_cover_after_delete(
        &self,
        album_id: i32,
        deleted_filename: &str,
    ) -> Result<()> {
        let Some(album) = Albums::find_by_id(album_id).one(&self.conn).await? else {
            return Ok(());
        };

        if album.cover_photo.as_deref() != Some(deleted_filename) {
            return Ok(());
        }

        let remaining = self.photos_of(album_id).await?;
        let replacement = remaining.first().map(|p| p.filename.clone());
        self.set_cover(album_id, replacement.as_deref()).await
    }
}
