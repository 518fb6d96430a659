//! Anti-forgery tokens bound 1:1 to sessions.
//!
//! Single-use policy: a token is consumed by its first successful
//! validation. The store is process-local keyed state; on a horizontally
//! scaled deployment it would have to move to a shared store.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

use crate::constants::csrf::{SWEEP_THRESHOLD, TOKEN_BYTES, TOKEN_TTL_MINUTES};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CsrfError {
    #[error("Missing anti-forgery token")]
    Missing,

    #[error("Anti-forgery token expired")]
    Expired,

    #[error("Anti-forgery token does not match")]
    Mismatch,
}

struct TokenEntry {
    token: String,
    issued_at: DateTime<Utc>,
}

/// Token store keyed by session id (a session has at most one live token).
pub struct CsrfStore {
    inner: Mutex<HashMap<String, TokenEntry>>,
    ttl: Duration,
}

impl Default for CsrfStore {
    fn default() -> Self {
        Self::new(TOKEN_TTL_MINUTES)
    }
}

impl CsrfStore {
    #[must_use]
    pub fn new(ttl_minutes: i64) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            ttl: Duration::minutes(ttl_minutes),
        }
    }

    /// Return the session's existing unexpired token, or mint a fresh one.
    pub fn issue(&self, session_id: &str) -> String {
        self.issue_at(session_id, Utc::now())
    }

    fn issue_at(&self, session_id: &str, now: DateTime<Utc>) -> String {
        let mut map = self.lock();

        if map.len() > SWEEP_THRESHOLD {
            map.retain(|_, entry| now - entry.issued_at <= self.ttl);
        }

        if let Some(entry) = map.get(session_id)
            && now - entry.issued_at <= self.ttl
        {
            return entry.token.clone();
        }

        let token = mint_token();
        map.insert(
            session_id.to_string(),
            TokenEntry {
                token: token.clone(),
                issued_at: now,
            },
        );
        token
    }

    /// Fails closed: absent, expired and wrong-session tokens are all
    /// rejected. A successful validation consumes the token.
    pub fn validate(&self, session_id: &str, presented: &str) -> Result<(), CsrfError> {
        self.validate_at(session_id, presented, Utc::now())
    }

    fn validate_at(
        &self,
        session_id: &str,
        presented: &str,
        now: DateTime<Utc>,
    ) -> Result<(), CsrfError> {
        let mut map = self.lock();

        let Some(entry) = map.get(session_id) else {
            return Err(CsrfError::Missing);
        };

        if now - entry.issued_at > self.ttl {
            map.remove(session_id);
            return Err(CsrfError::Expired);
        }

        if !constant_time_eq(&entry.token, presented) {
            return Err(CsrfError::Mismatch);
        }

        map.remove(session_id);
        Ok(())
    }

    /// Drop every expired entry; called opportunistically so the map stays
    /// bounded.
    pub fn sweep_expired(&self) {
        let now = Utc::now();
        let mut map = self.lock();
        map.retain(|_, entry| now - entry.issued_at <= self.ttl);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, TokenEntry>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// 256 bits of entropy, hex-encoded.
fn mint_token() -> String {
    use rand::RngCore;

    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);

    bytes.iter().fold(
        String::with_capacity(TOKEN_BYTES * 2),
        |mut acc, b| {
            use std::fmt::Write;
            let _ = write!(acc, "{b:02x}");
            acc
        },
    )
}

/// Equality without an early exit on the first differing byte.
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.bytes()
        .zip(b.bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_valid_exactly_once() {
        let store = CsrfStore::default();
        let token = store.issue("sess-a");

        assert_eq!(store.validate("sess-a", &token), Ok(()));
        assert_eq!(store.validate("sess-a", &token), Err(CsrfError::Missing));
    }

    #[test]
    fn token_is_bound_to_its_session() {
        let store = CsrfStore::default();
        let token_a = store.issue("sess-a");
        let _token_b = store.issue("sess-b");

        assert_eq!(store.validate("sess-b", &token_a), Err(CsrfError::Mismatch));
        // The failed cross-session attempt must not consume session A's token.
        assert_eq!(store.validate("sess-a", &token_a), Ok(()));
    }

    #[test]
    fn expired_token_is_rejected_and_dropped() {
        let store = CsrfStore::default();
        let token = store.issue("sess-a");

        let later = Utc::now() + Duration::minutes(TOKEN_TTL_MINUTES + 1);
        assert_eq!(
            store.validate_at("sess-a", &token, later),
            Err(CsrfError::Expired)
        );
        assert!(store.is_empty());
    }

    #[test]
    fn issue_reuses_the_unexpired_token() {
        let store = CsrfStore::default();
        assert_eq!(store.issue("sess-a"), store.issue("sess-a"));
    }

    #[test]
    fn issue_replaces_an_expired_token() {
        let store = CsrfStore::default();
        let first = store.issue_at("sess-a", Utc::now() - Duration::minutes(TOKEN_TTL_MINUTES + 5));
        let second = store.issue("sess-a");
        assert_ne!(first, second);
    }

    #[test]
    fn sweep_drops_only_expired_entries() {
        let store = CsrfStore::default();
        store.issue_at("old", Utc::now() - Duration::minutes(TOKEN_TTL_MINUTES + 5));
        store.issue("fresh");

        store.sweep_expired();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn constant_time_eq_basics() {
        assert!(constant_time_eq("abc123", "abc123"));
        assert!(!constant_time_eq("abc123", "abc124"));
        assert!(!constant_time_eq("abc", "abc123"));
        assert!(constant_time_eq("", ""));
    }

    #[test]
    fn minted_tokens_are_distinct_and_hex() {
        let a = mint_token();
        let b = mint_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), TOKEN_BYTES * 2);
        assert!(a.bytes().all(|c| c.is_ascii_hexdigit()));
    }
}
