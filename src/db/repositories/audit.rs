use anyhow::Result;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};

use crate::entities::{audit_log, prelude::*};

pub struct AuditRepository {
    conn: DatabaseConnection,
}

impl AuditRepository {
    pub fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn append(
        &self,
        actor: Option<&str>,
        action: &str,
        table_name: &str,
        record_id: Option<i64>,
        details: Option<String>,
        ip: &str,
        user_agent: &str,
    ) -> Result<()> {
        let active = audit_log::ActiveModel {
            actor: Set(actor.map(str::to_string)),
            action: Set(action.to_string()),
            table_name: Set(table_name.to_string()),
            record_id: Set(record_id),
            details: Set(details),
            ip: Set(ip.to_string()),
            user_agent: Set(user_agent.to_string()),
            created_at: Set(chrono::Utc::now().to_rfc3339()),
            ..Default::default()
        };

        AuditLog::insert(active).exec(&self.conn).await?;
        Ok(())
    }

    pub async fn recent(&self, limit: u64) -> Result<Vec<audit_log::Model>> {
        Ok(AuditLog::find()
            .order_by_desc(audit_log::Column::Id)
            .limit(limit)
            .all(&self.conn)
            .await?)
    }

    /// Retention sweep; entries are immutable but not kept forever.
    pub async fn prune(&self, older_than_days: i64) -> Result<u64> {
        let cutoff = (chrono::Utc::now() - chrono::Duration::days(older_than_days)).to_rfc3339();

        let result = AuditLog::delete_many()
            .filter(audit_log::Column::CreatedAt.lt(cutoff))
            .exec(&self.conn)
            .await?;

        Ok(result.rows_affected)
    }
}
