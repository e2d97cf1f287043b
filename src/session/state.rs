//! Session state machine (Active → Idle → Expired → Revoked terminal),
//! per-user active-session cap eviction, and refresh/rotation logic.
//!
//! Session records carry user status preconditions, idle/expiry
//! timestamps, and a per-user session cap, as an in-process `Session`
//! the caller persists however it likes rather than an ORM-backed
//! model.

use super::blacklist::TokenBlacklist;
use super::token::{TokenClaims, TokenService, TokenType};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Active,
    Idle,
    Expired,
    Revoked,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session is not active (status: {0:?})")]
    NotActive(SessionStatus),
    #[error("token revoked")]
    TokenRevoked,
    #[error("device fingerprint mismatch")]
    DeviceMismatch,
    #[error("user account is locked")]
    UserLocked,
    #[error(transparent)]
    Token(#[from] super::token::TokenError),
    #[error(transparent)]
    Store(#[from] crate::store::StoreError),
}

#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub device_fingerprint: Option<String>,
    pub created_at: f64,
    pub last_activity: f64,
    pub expires_at: f64,
    pub idle_timeout_secs: f64,
    pub status: SessionStatus,
    pub access_jti: String,
    pub refresh_jti: String,
}

impl Session {
    /// Derive the effective status given the current clock; `Revoked` is
    /// sticky and never recomputed from timestamps.
    #[must_use]
    pub fn effective_status(&self, now: f64) -> SessionStatus {
        if self.status == SessionStatus::Revoked {
            return SessionStatus::Revoked;
        }
        if now >= self.expires_at {
            return SessionStatus::Expired;
        }
        if now - self.last_activity > self.idle_timeout_secs {
            return SessionStatus::Idle;
        }
        SessionStatus::Active
    }
}

fn now() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64()
}

pub struct SessionManager {
    tokens: TokenService,
    blacklist: TokenBlacklist,
    max_sessions_per_user: usize,
    default_session_ttl_secs: f64,
    idle_timeout_secs: f64,
}

impl SessionManager {
    #[must_use]
    pub fn new(tokens: TokenService, blacklist: TokenBlacklist, max_sessions_per_user: usize) -> Self {
        Self {
            tokens,
            blacklist,
            max_sessions_per_user,
            default_session_ttl_secs: 14.0 * 24.0 * 3600.0,
            idle_timeout_secs: 30.0 * 60.0,
        }
    }

    /// Enforce the per-user active-session cap by revoking the oldest
    /// active sessions beyond the cap, reason "cap".
    #[must_use]
    pub fn sessions_to_evict<'a>(&self, mut active_sessions: Vec<&'a Session>) -> Vec<&'a Session> {
        if active_sessions.len() <= self.max_sessions_per_user {
            return Vec::new();
        }
        active_sessions.sort_by(|a, b| a.created_at.partial_cmp(&b.created_at).unwrap());
        let overflow = active_sessions.len() - self.max_sessions_per_user;
        active_sessions.into_iter().take(overflow).collect()
    }

    pub fn create_session(
        &self,
        user_id: &str,
        device_fingerprint: Option<String>,
    ) -> Result<(Session, String, String), SessionError> {
        let session_id = uuid::Uuid::new_v4().to_string();
        let (access_token, access_claims) = self.tokens.create_token(
            user_id,
            TokenType::Access,
            Some(session_id.clone()),
            device_fingerprint.clone(),
            vec![],
        )?;
        let (refresh_token, refresh_claims) = self.tokens.create_token(
            user_id,
            TokenType::Refresh,
            Some(session_id.clone()),
            device_fingerprint.clone(),
            vec![],
        )?;
        let created_at = now();
        let session = Session {
            id: session_id,
            user_id: user_id.to_string(),
            device_fingerprint,
            created_at,
            last_activity: created_at,
            expires_at: created_at + self.default_session_ttl_secs,
            idle_timeout_secs: self.idle_timeout_secs,
            status: SessionStatus::Active,
            access_jti: access_claims.jti,
            refresh_jti: refresh_claims.jti,
        };
        Ok((session, access_token, refresh_token))
    }

    /// `refresh(refresh_token)`: verify type, check session active, always
    /// rotate access, rotate refresh only past half the session TTL.
    pub async fn refresh(
        &self,
        session: &mut Session,
        refresh_token: &str,
    ) -> Result<(String, Option<String>), SessionError> {
        if self.blacklist.is_revoked(&session.refresh_jti).await? {
            return Err(SessionError::TokenRevoked);
        }
        let claims = self.tokens.verify(refresh_token, TokenType::Refresh)?;
        if claims.jti != session.refresh_jti {
            return Err(SessionError::TokenRevoked);
        }
        let current = now();
        if session.effective_status(current) != SessionStatus::Active {
            return Err(SessionError::NotActive(session.effective_status(current)));
        }

        session.last_activity = current;

        let (new_access, new_access_claims) = self.tokens.create_token(
            &session.user_id,
            TokenType::Access,
            Some(session.id.clone()),
            session.device_fingerprint.clone(),
            vec![],
        )?;
        let old_access_jti = std::mem::replace(&mut session.access_jti, new_access_claims.jti);
        self.blacklist.revoke(&old_access_jti, TokenType::Access.default_lifetime().as_secs()).await?;

        let age = current - session.created_at;
        let new_refresh = if age > self.default_session_ttl_secs / 2.0 {
            let (new_refresh_token, new_refresh_claims) = self.tokens.create_token(
                &session.user_id,
                TokenType::Refresh,
                Some(session.id.clone()),
                session.device_fingerprint.clone(),
                vec![],
            )?;
            let old_refresh_jti = std::mem::replace(&mut session.refresh_jti, new_refresh_claims.jti);
            self.blacklist.revoke(&old_refresh_jti, self.default_session_ttl_secs as u64).await?;
            Some(new_refresh_token)
        } else {
            None
        };

        Ok((new_access, new_refresh))
    }

    /// `revoke(session)`: mark Revoked, blacklist both jtis with TTL equal
    /// to their remaining lifetime.
    pub async fn revoke(&self, session: &mut Session) -> Result<(), SessionError> {
        let current = now();
        session.status = SessionStatus::Revoked;
        let access_remaining = (session.last_activity + TokenType::Access.default_lifetime().as_secs() as f64 - current).max(1.0);
        let refresh_remaining = (session.expires_at - current).max(1.0);
        self.blacklist.revoke(&session.access_jti, access_remaining as u64).await?;
        self.blacklist.revoke(&session.refresh_jti, refresh_remaining as u64).await?;
        Ok(())
    }

    /// Every access path must consult the blacklist first; a hit maps to
    /// `TokenRevoked` regardless of what the token payload itself claims.
    pub async fn check_access(&self, claims: &TokenClaims) -> Result<(), SessionError> {
        if self.blacklist.is_revoked(&claims.jti).await? {
            return Err(SessionError::TokenRevoked);
        }
        Ok(())
    }

    /// Flag and reject on a device fingerprint mismatch for the same
    /// session; the session itself stays Active for audit, leaving
    /// revocation to downstream policy.
    #[must_use]
    pub fn check_device(session: &Session, presented_fingerprint: Option<&str>) -> Result<(), SessionError> {
        match (&session.device_fingerprint, presented_fingerprint) {
            (Some(expected), Some(presented)) if expected != presented => Err(SessionError::DeviceMismatch),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active_session(id: &str, created_at: f64) -> Session {
        Session {
            id: id.to_string(),
            user_id: "u1".to_string(),
            device_fingerprint: None,
            created_at,
            last_activity: created_at,
            expires_at: created_at + 1_000_000.0,
            idle_timeout_secs: 1800.0,
            status: SessionStatus::Active,
            access_jti: "a".to_string(),
            refresh_jti: "r".to_string(),
        }
    }

    #[test]
    fn expired_beats_idle_and_active() {
        let session = Session { expires_at: 100.0, ..active_session("s1", 0.0) };
        assert_eq!(session.effective_status(200.0), SessionStatus::Expired);
    }

    #[test]
    fn idle_after_inactivity_window() {
        let mut session = active_session("s1", 0.0);
        session.last_activity = 0.0;
        session.idle_timeout_secs = 60.0;
        assert_eq!(session.effective_status(500.0), SessionStatus::Idle);
    }

    #[test]
    fn revoked_is_sticky() {
        let mut session = active_session("s1", 0.0);
        session.status = SessionStatus::Revoked;
        assert_eq!(session.effective_status(1.0), SessionStatus::Revoked);
    }

    #[test]
    fn device_mismatch_is_rejected() {
        let mut session = active_session("s1", 0.0);
        session.device_fingerprint = Some("fp-a".to_string());
        assert!(matches!(
            SessionManager::check_device(&session, Some("fp-b")),
            Err(SessionError::DeviceMismatch)
        ));
        assert!(SessionManager::check_device(&session, Some("fp-a")).is_ok());
    }
}
