use crate::entities::prelude::*;
use crate::entities::{audit_log, content_items, photos};
use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Public listings sort by publish_date desc, id desc within a kind.
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_content_kind_publish")
                    .table(ContentItems)
                    .col(content_items::Column::Kind)
                    .col(content_items::Column::PublishDate)
                    .col(content_items::Column::Id)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_photos_album_position")
                    .table(Photos)
                    .col(photos::Column::AlbumId)
                    .col(photos::Column::Position)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_audit_log_created_at")
                    .table(AuditLog)
                    .col(audit_log::Column::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_audit_log_created_at").to_owned())
            .await?;
        manager
            .drop_index(Index::drop().name("idx_photos_album_position").to_owned())
            .await?;
        manager
            .drop_index(Index::drop().name("idx_content_kind_publish").to_owned())
            .await?;

        Ok(())
    }
}
