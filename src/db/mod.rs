use anyhow::Result;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::config::SecurityConfig;
use crate::entities::{albums, audit_log, content_items, photos};
use crate::models::content::ContentKind;

pub mod migrator;
pub mod repositories;

pub use repositories::album::AlbumInput;
pub use repositories::content::{ContentUpdate, NewContent};
pub use repositories::user::StaffUser;

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        if !db_url.starts_with(":memory:") && !db_url.contains("::memory:") {
            let path_str = db_url.trim_start_matches("sqlite:");
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    fn user_repo(&self) -> repositories::user::UserRepository {
        repositories::user::UserRepository::new(self.conn.clone())
    }

    fn content_repo(&self) -> repositories::content::ContentRepository {
        repositories::content::ContentRepository::new(self.conn.clone())
    }

    fn album_repo(&self) -> repositories::album::AlbumRepository {
        repositories::album::AlbumRepository::new(self.conn.clone())
    }

    fn audit_repo(&self) -> repositories::audit::AuditRepository {
        repositories::audit::AuditRepository::new(self.conn.clone())
    }

    // ========================================================================
    // Users
    // ========================================================================

    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<StaffUser>> {
        self.user_repo().get_by_username(username).await
    }

    pub async fn get_user_with_password(
        &self,
        username: &str,
    ) -> Result<Option<(StaffUser, String)>> {
        self.user_repo()
            .get_by_username_with_password(username)
            .await
    }

    pub async fn get_user_by_id(&self, id: i32) -> Result<Option<StaffUser>> {
        self.user_repo().get_by_id(id).await
    }

    pub async fn increment_failed_attempts(&self, user_id: i32) -> Result<i32> {
        self.user_repo().increment_failed_attempts(user_id).await
    }

    pub async fn set_lockout(&self, user_id: i32, until: &str) -> Result<()> {
        self.user_repo().set_lockout(user_id, until).await
    }

    pub async fn clear_login_failures(&self, user_id: i32, now: &str) -> Result<()> {
        self.user_repo().clear_failures(user_id, now).await
    }

    pub async fn verify_user_password(&self, username: &str, password: &str) -> Result<bool> {
        self.user_repo().verify_password(username, password).await
    }

    pub async fn update_user_password(
        &self,
        username: &str,
        new_password: &str,
        config: &SecurityConfig,
    ) -> Result<()> {
        self.user_repo()
            .update_password(username, new_password, config)
            .await
    }

    // ========================================================================
    // Content items
    // ========================================================================

    pub async fn create_content(&self, input: NewContent) -> Result<content_items::Model> {
        self.content_repo().create(input).await
    }

    pub async fn get_content(&self, id: i32) -> Result<Option<content_items::Model>> {
        self.content_repo().get(id).await
    }

    pub async fn get_visible_content(&self, id: i32) -> Result<Option<content_items::Model>> {
        self.content_repo().get_visible(id).await
    }

    pub async fn list_public_content(
        &self,
        kind: ContentKind,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<content_items::Model>> {
        self.content_repo().list_public(kind, limit, offset).await
    }

    pub async fn list_admin_content(
        &self,
        kind: ContentKind,
        limit: u64,
        offset: u64,
    ) -> Result<(Vec<content_items::Model>, u64)> {
        self.content_repo().list_admin(kind, limit, offset).await
    }

    pub async fn update_content(
        &self,
        id: i32,
        input: ContentUpdate,
    ) -> Result<Option<content_items::Model>> {
        self.content_repo().update(id, input).await
    }

    pub async fn delete_content(&self, id: i32) -> Result<Option<content_items::Model>> {
        self.content_repo().delete(id).await
    }

    pub async fn increment_content_views(&self, id: i32) -> Result<()> {
        self.content_repo().increment_views(id).await
    }

    pub async fn content_categories(&self, kind: ContentKind) -> Result<Vec<String>> {
        self.content_repo().categories(kind).await
    }

    // ========================================================================
    // Albums & photos
    // ========================================================================

    pub async fn create_album(&self, input: AlbumInput) -> Result<albums::Model> {
        self.album_repo().create(input).await
    }

    pub async fn get_album(&self, id: i32) -> Result<Option<albums::Model>> {
        self.album_repo().get(id).await
    }

    pub async fn get_visible_album(&self, id: i32) -> Result<Option<albums::Model>> {
        self.album_repo().get_visible(id).await
    }

    pub async fn list_public_albums(&self) -> Result<Vec<albums::Model>> {
        self.album_repo().list_public().await
    }

    pub async fn list_admin_albums(&self) -> Result<Vec<albums::Model>> {
        self.album_repo().list_admin().await
    }

    pub async fn update_album(&self, id: i32, input: AlbumInput) -> Result<Option<albums::Model>> {
        self.album_repo().update(id, input).await
    }

    pub async fn set_album_cover(&self, album_id: i32, cover: Option<&str>) -> Result<()> {
        self.album_repo().set_cover(album_id, cover).await
    }

    pub async fn delete_album_cascade(
        &self,
        id: i32,
    ) -> Result<Option<(albums::Model, Vec<photos::Model>)>> {
        self.album_repo().delete_cascade(id).await
    }

    pub async fn photos_of_album(&self, album_id: i32) -> Result<Vec<photos::Model>> {
        self.album_repo().photos_of(album_id).await
    }

    pub async fn get_photo(&self, id: i32) -> Result<Option<photos::Model>> {
        self.album_repo().get_photo(id).await
    }

    pub async fn add_photo(&self, album_id: i32, filename: &str) -> Result<photos::Model> {
        self.album_repo().add_photo(album_id, filename).await
    }

    pub async fn delete_photo(&self, id: i32) -> Result<Option<photos::Model>> {
        self.album_repo().delete_photo(id).await
    }

    pub async fn reorder_photos(&self, album_id: i32, ordered_ids: &[i32]) -> Result<()> {
        self.album_repo().reorder_photos(album_id, ordered_ids).await
    }

    pub async fn photo_in_album(&self, album_id: i32, filename: &str) -> Result<bool> {
        self.album_repo().photo_in_album(album_id, filename).await
    }

    pub async fn reassign_cover_after_delete(
        &self,
        album_id: i32,
        deleted_filename: &str,
    ) -> Result<()> {
        self.album_repo()
            .reassign_cover_after_delete(album_id, deleted_filename)
            .await
    }

    // ========================================================================
    // Audit trail
    // ========================================================================

    #[allow(clippy::too_many_arguments)]
    pub async fn append_audit(
        &self,
        actor: Option<&str>,
        action: &str,
        table_name: &str,
        record_id: Option<i64>,
        details: Option<String>,
        ip: &str,
        user_agent: &str,
    ) -> Result<()> {
        self.audit_repo()
            .append(actor, action, table_name, record_id, details, ip, user_agent)
            .await
    }

    pub async fn recent_audit(&self, limit: u64) -> Result<Vec<audit_log::Model>> {
        self.audit_repo().recent(limit).await
    }

    pub async fn prune_audit(&self, older_than_days: i64) -> Result<u64> {
        self.audit_repo().prune(older_than_days).await
    }
}
