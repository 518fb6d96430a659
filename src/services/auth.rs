//! Login orchestration: lockout check, credential verification, failure
//! bookkeeping, audit trail.

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tokio::task;

use crate::config::SecurityConfig;
use crate::db::repositories::user::verify_password_hash;
use crate::db::{StaffUser, Store};
use crate::services::audit::{AuditContext, AuditService};
use std::sync::Arc;

/// Authentication failure taxonomy. The `Display` strings are user-safe;
/// unknown-user and wrong-password both surface as [`AuthError::BadCredentials`]
/// so the response never reveals whether a username exists.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Not logged in")]
    NotLoggedIn,

    #[error("Session expired, please log in again")]
    SessionExpired,

    #[error("Session rejected")]
    SecurityViolation,

    #[error("Account temporarily locked, try again later")]
    AccountLocked,

    #[error("Account is inactive")]
    AccountInactive,

    #[error("Invalid username or password")]
    BadCredentials,

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sea_orm::DbErr> for AuthError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

/// True iff a lockout window exists and has not yet elapsed.
pub fn lockout_active(lockout_until: Option<&str>, now: DateTime<Utc>) -> bool {
    lockout_until
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .is_some_and(|until| until.with_timezone(&Utc) > now)
}

pub struct AuthService {
    store: Store,
    audit: Arc<AuditService>,
    security: SecurityConfig,
}

impl AuthService {
    pub fn new(store: Store, audit: Arc<AuditService>, security: SecurityConfig) -> Self {
        Self {
            store,
            audit,
            security,
        }
    }

    /// Login flow ordering: lockout check, then credential verification,
    /// then failure/success bookkeeping. Every outcome lands in the audit
    /// trail, including the ones that produce an error response.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        meta: &AuditContext,
    ) -> Result<StaffUser, AuthError> {
        let now = Utc::now();

        let Some((user, password_hash)) = self.store.get_user_with_password(username).await? else {
            self.audit
                .record(meta, "login_failed", "users", None, Some("unknown username".to_string()))
                .await;
            return Err(AuthError::BadCredentials);
        };

        if lockout_active(user.lockout_until.as_deref(), now) {
            self.audit
                .record(
                    meta,
                    "login_rejected_locked",
                    "users",
                    Some(i64::from(user.id)),
                    None,
                )
                .await;
            return Err(AuthError::AccountLocked);
        }

        if !user.active {
            self.audit
                .record(
                    meta,
                    "login_rejected_inactive",
                    "users",
                    Some(i64::from(user.id)),
                    None,
                )
                .await;
            return Err(AuthError::AccountInactive);
        }

        let candidate = password.to_string();
        let is_valid = task::spawn_blocking(move || verify_password_hash(&password_hash, &candidate))
            .await
            .map_err(|e| AuthError::Internal(format!("Password verification task panicked: {e}")))??;

        if !is_valid {
            return Err(self.record_failure(&user, now, meta).await?);
        }

        self.store
            .clear_login_failures(user.id, &now.to_rfc3339())
            .await?;

        self.audit
            .record(
                &meta.with_actor(&user.username),
                "login",
                "users",
                Some(i64::from(user.id)),
                None,
            )
            .await;

        self.store
            .get_user_by_id(user.id)
            .await?
            .ok_or_else(|| AuthError::Internal("User vanished during login".to_string()))
    }

    /// Failed attempt: atomic increment, re-read, lockout once the threshold
    /// is crossed. The remaining-attempt count goes into the audit detail
    /// only; the HTTP response stays identical to the unknown-user case.
    async fn record_failure(
        &self,
        user: &StaffUser,
        now: DateTime<Utc>,
        meta: &AuditContext,
    ) -> Result<AuthError, AuthError> {
        let attempts = self.store.increment_failed_attempts(user.id).await?;
        let max_attempts = i32::try_from(self.security.lockout.max_attempts).unwrap_or(i32::MAX);

        if attempts >= max_attempts {
            let until = now + Duration::minutes(self.security.lockout.lockout_minutes);
            self.store.set_lockout(user.id, &until.to_rfc3339()).await?;
            self.audit
                .record(
                    meta,
                    "account_locked",
                    "users",
                    Some(i64::from(user.id)),
                    Some(format!("{attempts} consecutive failures")),
                )
                .await;
        } else {
            self.audit
                .record(
                    meta,
                    "login_failed",
                    "users",
                    Some(i64::from(user.id)),
                    Some(format!(
                        "{} attempts remaining before lockout",
                        max_attempts - attempts
                    )),
                )
                .await;
        }

        Ok(AuthError::BadCredentials)
    }

    pub async fn change_password(
        &self,
        username: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        if new_password.len() < 8 {
            return Err(AuthError::Validation(
                "New password must be at least 8 characters".to_string(),
            ));
        }

        if current_password == new_password {
            return Err(AuthError::Validation(
                "New password must be different from current password".to_string(),
            ));
        }

        let is_valid = self
            .store
            .verify_user_password(username, current_password)
            .await?;

        if !is_valid {
            return Err(AuthError::Validation(
                "Current password is incorrect".to_string(),
            ));
        }

        self.store
            .update_user_password(username, new_password, &self.security)
            .await?;

        tracing::info!("Password changed for user: {username}");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lockout_inactive_when_unset() {
        assert!(!lockout_active(None, Utc::now()));
    }

    #[test]
    fn lockout_active_while_window_open() {
        let until = (Utc::now() + Duration::minutes(5)).to_rfc3339();
        assert!(lockout_active(Some(&until), Utc::now()));
    }

    #[test]
    fn lockout_expires_after_window() {
        let until = (Utc::now() - Duration::seconds(1)).to_rfc3339();
        assert!(!lockout_active(Some(&until), Utc::now()));
    }

    #[test]
    fn unparseable_lockout_is_treated_as_unlocked() {
        assert!(!lockout_active(Some("not-a-timestamp"), Utc::now()));
    }
}
