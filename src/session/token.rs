//! JWT-family token service: per-type default lifetimes, `jti`
//! embedding for revocation, and an API-key display-key/hash split. The
//! original signs via `jose`; here `jsonwebtoken` plays the same role
//! (HMAC-SHA256 by default), already the standard crate for this in the
//! Rust ecosystem.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
    EmailVerification,
    PasswordReset,
    Mfa,
}

impl TokenType {
    /// Default lifetime by token type: access short (minutes), refresh
    /// days, email-verification days, password-reset hours, mfa ~5 min.
    #[must_use]
    pub fn default_lifetime(self) -> Duration {
        match self {
            TokenType::Access => Duration::from_secs(15 * 60),
            TokenType::Refresh => Duration::from_secs(14 * 24 * 60 * 60),
            TokenType::EmailVerification => Duration::from_secs(3 * 24 * 60 * 60),
            TokenType::PasswordReset => Duration::from_secs(60 * 60),
            TokenType::Mfa => Duration::from_secs(5 * 60),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    pub jti: String,
    pub iat: u64,
    pub exp: u64,
    #[serde(default)]
    pub scopes: Vec<String>,
    pub session_id: Option<String>,
    pub device_fingerprint: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("token signature invalid")]
    Signature,
    #[error("token type mismatch: expected {expected:?}, found {found:?}")]
    TypeMismatch { expected: TokenType, found: TokenType },
    #[error("token malformed: {0}")]
    Malformed(String),
}

pub struct TokenService {
    secret: String,
}

impl TokenService {
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self { secret: secret.into() }
    }

    pub fn create_token(
        &self,
        subject: &str,
        token_type: TokenType,
        session_id: Option<String>,
        device_fingerprint: Option<String>,
        scopes: Vec<String>,
    ) -> Result<(String, TokenClaims), TokenError> {
        let now = now_secs();
        let lifetime = token_type.default_lifetime();
        let claims = TokenClaims {
            sub: subject.to_string(),
            token_type,
            jti: Uuid::new_v4().to_string(),
            iat: now,
            exp: now + lifetime.as_secs(),
            scopes,
            session_id,
            device_fingerprint,
            metadata: HashMap::new(),
        };
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(self.secret.as_bytes()))
            .map_err(|e| TokenError::Malformed(e.to_string()))?;
        Ok((token, claims))
    }

    /// Verify a token against an expected type. Signature and expiry
    /// checks are delegated to `jsonwebtoken`'s constant-time HMAC
    /// comparison and validation pipeline.
    pub fn verify(&self, token: &str, expected_type: TokenType) -> Result<TokenClaims, TokenError> {
        let mut validation = Validation::default();
        validation.validate_exp = true;
        let data = decode::<TokenClaims>(token, &DecodingKey::from_secret(self.secret.as_bytes()), &validation)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
                jsonwebtoken::errors::ErrorKind::InvalidSignature => TokenError::Signature,
                _ => TokenError::Malformed(e.to_string()),
            })?;
        if data.claims.token_type != expected_type {
            return Err(TokenError::TypeMismatch { expected: expected_type, found: data.claims.token_type });
        }
        Ok(data.claims)
    }

    /// Returns a display key plus an irreversible hash; only the hash is
    /// ever persisted.
    #[must_use]
    pub fn generate_api_key() -> (String, String) {
        let mut raw = [0u8; 32];
        rand::rng().fill_bytes(&mut raw);
        let display_key = format!("sk_{}", hex::encode(raw));
        let mut hasher = Sha256::new();
        hasher.update(display_key.as_bytes());
        let hash = hex::encode(hasher.finalize());
        (display_key, hash)
    }
}

fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_claims() {
        let service = TokenService::new("test-secret");
        let (token, _) = service
            .create_token("user-1", TokenType::Access, Some("sess-1".to_string()), None, vec!["read".to_string()])
            .unwrap();
        let claims = service.verify(&token, TokenType::Access).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.session_id.as_deref(), Some("sess-1"));
    }

    #[test]
    fn wrong_type_is_rejected() {
        let service = TokenService::new("test-secret");
        let (token, _) = service.create_token("user-1", TokenType::Refresh, None, None, vec![]).unwrap();
        assert_eq!(service.verify(&token, TokenType::Access), Err(TokenError::TypeMismatch {
            expected: TokenType::Access,
            found: TokenType::Refresh,
        }));
    }

    #[test]
    fn tampered_token_fails_signature_check() {
        let service = TokenService::new("test-secret");
        let (token, _) = service.create_token("user-1", TokenType::Access, None, None, vec![]).unwrap();
        let other_service = TokenService::new("different-secret");
        assert!(matches!(other_service.verify(&token, TokenType::Access), Err(TokenError::Signature)));
    }

    #[test]
    fn api_key_hash_does_not_reveal_display_key() {
        let (display, hash) = TokenService::generate_api_key();
        assert_ne!(display, hash);
        assert!(display.starts_with("sk_"));
    }
}
