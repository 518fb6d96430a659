//! Session lifecycle on top of the `tower-sessions` layer: inactivity
//! timeout, remote-address binding, periodic identifier rotation.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tower_sessions::{Expiry, Session};

use crate::config::SessionConfig;
use crate::db::StaffUser;
use crate::services::auth::AuthError;

/// Key the staff record is stored under inside the tower session.
pub const SESSION_RECORD_KEY: &str = "staff";

/// Server-side record of an authenticated client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub user_id: i32,
    pub username: String,
    pub role: String,
    pub login_time: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    /// Remote address captured at login; requests from a different address
    /// invalidate the session. Conservative anti-hijacking check: behind
    /// proxies or NAT pools that rotate client IPs per request this will
    /// false-positive and force a re-login. Known limitation, kept on
    /// purpose rather than silently disabled.
    pub remote_addr: String,
    pub rotation_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
pub struct SessionPolicy {
    pub inactivity: Duration,
    pub rotation: Duration,
    pub remember_me_days: i64,
}

impl SessionPolicy {
    #[must_use]
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            inactivity: Duration::minutes(config.inactivity_minutes),
            rotation: Duration::minutes(config.rotation_minutes),
            remember_me_days: config.remember_me_days,
        }
    }
}

/// Verdict over a stored record; pure so the state machine is testable
/// without a running session layer. `Ok(true)` means the identifier is due
/// for rotation.
pub fn evaluate(
    record: &SessionRecord,
    now: DateTime<Utc>,
    peer: &str,
    policy: &SessionPolicy,
) -> Result<bool, AuthError> {
    if now - record.last_activity > policy.inactivity {
        return Err(AuthError::SessionExpired);
    }

    if record.remote_addr != peer {
        return Err(AuthError::SecurityViolation);
    }

    Ok(now - record.rotation_time > policy.rotation)
}

/// Validate the session attached to a request and refresh its activity
/// stamp. Expired or hijack-suspect sessions are fully invalidated before
/// the error is returned, never just rejected.
pub async fn authenticate(
    session: &Session,
    policy: &SessionPolicy,
    peer: &str,
) -> Result<SessionRecord, AuthError> {
    let record: Option<SessionRecord> = session
        .get(SESSION_RECORD_KEY)
        .await
        .map_err(|e| AuthError::Internal(format!("Session load failed: {e}")))?;

    let Some(mut record) = record else {
        return Err(AuthError::NotLoggedIn);
    };

    let now = Utc::now();

    match evaluate(&record, now, peer, policy) {
        Err(err) => {
            let _ = session.flush().await;
            Err(err)
        }
        Ok(rotate) => {
            record.last_activity = now;

            if rotate {
                // Fresh identifier, same contents: limits the blast radius
                // of a leaked session id.
                session
                    .cycle_id()
                    .await
                    .map_err(|e| AuthError::Internal(format!("Session rotation failed: {e}")))?;
                record.rotation_time = now;
            }

            session
                .insert(SESSION_RECORD_KEY, &record)
                .await
                .map_err(|e| AuthError::Internal(format!("Session update failed: {e}")))?;

            Ok(record)
        }
    }
}

/// Establish a session for a freshly authenticated user. The identifier is
/// always newly issued, never reused from the anonymous session that
/// carried the login request.
pub async fn establish(
    session: &Session,
    user: &StaffUser,
    remember: bool,
    peer: &str,
    policy: &SessionPolicy,
) -> Result<SessionRecord, AuthError> {
    session
        .cycle_id()
        .await
        .map_err(|e| AuthError::Internal(format!("Session issue failed: {e}")))?;

    let now = Utc::now();
    let record = SessionRecord {
        user_id: user.id,
        username: user.username.clone(),
        role: user.role.clone(),
        login_time: now,
        last_activity: now,
        remote_addr: peer.to_string(),
        rotation_time: now,
    };

    session
        .insert(SESSION_RECORD_KEY, &record)
        .await
        .map_err(|e| AuthError::Internal(format!("Session write failed: {e}")))?;

    let expiry = if remember {
        Expiry::AtDateTime(OffsetDateTime::now_utc() + time::Duration::days(policy.remember_me_days))
    } else {
        Expiry::OnSessionEnd
    };
    session.set_expiry(Some(expiry));

    Ok(record)
}

/// Clear all server-side state and invalidate the client's cookie.
pub async fn destroy(session: &Session) {
    let _ = session.flush().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> SessionPolicy {
        SessionPolicy {
            inactivity: Duration::minutes(30),
            rotation: Duration::minutes(15),
            remember_me_days: 30,
        }
    }

    fn record(last_activity_ago: Duration, rotation_ago: Duration) -> SessionRecord {
        let now = Utc::now();
        SessionRecord {
            user_id: 1,
            username: "admin".to_string(),
            role: "admin".to_string(),
            login_time: now - Duration::hours(2),
            last_activity: now - last_activity_ago,
            remote_addr: "10.0.0.7".to_string(),
            rotation_time: now - rotation_ago,
        }
    }

    #[test]
    fn fresh_session_passes_without_rotation() {
        let r = record(Duration::minutes(1), Duration::minutes(1));
        assert!(matches!(
            evaluate(&r, Utc::now(), "10.0.0.7", &policy()),
            Ok(false)
        ));
    }

    #[test]
    fn idle_session_expires_after_inactivity_timeout() {
        let r = record(Duration::minutes(31), Duration::minutes(1));
        assert!(matches!(
            evaluate(&r, Utc::now(), "10.0.0.7", &policy()),
            Err(AuthError::SessionExpired)
        ));
    }

    #[test]
    fn changed_remote_address_is_a_security_violation() {
        let r = record(Duration::minutes(1), Duration::minutes(1));
        assert!(matches!(
            evaluate(&r, Utc::now(), "10.0.0.99", &policy()),
            Err(AuthError::SecurityViolation)
        ));
    }

    #[test]
    fn rotation_is_due_after_the_interval() {
        let r = record(Duration::minutes(1), Duration::minutes(16));
        assert!(matches!(
            evaluate(&r, Utc::now(), "10.0.0.7", &policy()),
            Ok(true)
        ));
    }

    #[test]
    fn expiry_wins_over_fingerprint_mismatch() {
        let r = record(Duration::minutes(45), Duration::minutes(1));
        assert!(matches!(
            evaluate(&r, Utc::now(), "10.0.0.99", &policy()),
            Err(AuthError::SessionExpired)
        ));
    }
}
