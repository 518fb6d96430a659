//! Append-only audit trail of every state-changing action.

use tracing::error;

use crate::db::Store;

/// Who did what from where; threaded from the request into every audit
/// write. `actor` is `None` for anonymous or failed authentication attempts.
#[derive(Debug, Clone)]
pub struct AuditContext {
    pub actor: Option<String>,
    pub ip: String,
    pub user_agent: String,
}

impl AuditContext {
    #[must_use]
    pub fn anonymous(ip: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            actor: None,
            ip: ip.into(),
            user_agent: user_agent.into(),
        }
    }

    #[must_use]
    pub fn with_actor(&self, actor: &str) -> Self {
        Self {
            actor: Some(actor.to_string()),
            ip: self.ip.clone(),
            user_agent: self.user_agent.clone(),
        }
    }
}

pub struct AuditService {
    store: Store,
}

impl AuditService {
    #[must_use]
    pub const fn new(store: Store) -> Self {
        Self { store }
    }

    /// Write one audit entry. A failed write is logged but never fails the
    /// request that triggered it; the mutation itself already happened.
    pub async fn record(
        &self,
        ctx: &AuditContext,
        action: &str,
        table_name: &str,
        record_id: Option<i64>,
        details: Option<String>,
    ) {
        if let Err(e) = self
            .store
            .append_audit(
                ctx.actor.as_deref(),
                action,
                table_name,
                record_id,
                details,
                &ctx.ip,
                &ctx.user_agent,
            )
            .await
        {
            error!("Failed to write audit entry for {action} on {table_name}: {e}");
        }
    }
}
