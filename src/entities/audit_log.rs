use sea_orm::entity::prelude::*;
use serde::Serialize;

/// Append-only; rows are never updated once written.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "audit_log")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// Username of the acting staff member; null for anonymous or failed
    /// authentication attempts.
    pub actor: Option<String>,

    pub action: String,

    pub table_name: String,

    pub record_id: Option<i64>,

    /// Minimal payload (a title, a count) — never a full record.
    pub details: Option<String>,

    pub ip: String,

    pub user_agent: String,

    pub created_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
