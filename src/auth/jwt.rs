//! Session JWT handling (HS256).

use crate::auth::models::Claims;
use anyhow::{bail, Context, Result};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use tracing::debug;
use uuid::Uuid;

pub struct JwtHandler {
    secret: String,
    expiration_hours: i64,
}

impl JwtHandler {
    pub fn new(secret: String, expiration_hours: i64) -> Self {
        Self {
            secret,
            expiration_hours,
        }
    }

    /// Issue a session token for `sub` with a fresh session id.
    pub fn issue_session(&self, sub: &str) -> Result<String> {
        let now = Utc::now();
        let expiration = now
            .checked_add_signed(chrono::Duration::hours(self.expiration_hours))
            .context("Invalid timestamp")?
            .timestamp() as usize;

        let claims = Claims {
            sub: sub.to_string(),
            session_id: Uuid::new_v4().to_string(),
            iat: now.timestamp() as usize,
            exp: expiration,
        };

        debug!(sub = %sub, hours = self.expiration_hours, "issuing session token");

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .context("Failed to generate JWT")
    }

    /// Verify signature and expiry, and require both `sub` and `session_id`.
    pub fn validate_token(&self, token: &str) -> Result<Claims> {
        let decoded = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .context("Invalid or expired token")?;

        let claims = decoded.claims;
        if claims.sub.is_empty() {
            bail!("token has no subject");
        }
        if claims.session_id.is_empty() {
            bail!("token has no session id");
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sign(secret: &str, claims: serde_json::Value) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_issue_and_validate() {
        let handler = JwtHandler::new("test-secret-key-12345".to_string(), 24);
        let token = handler.issue_session("user-42").unwrap();
        let claims = handler.validate_token(&token).unwrap();
        assert_eq!(claims.sub, "user-42");
        assert!(!claims.session_id.is_empty());
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_different_secrets_reject() {
        let a = JwtHandler::new("secret1".to_string(), 24);
        let b = JwtHandler::new("secret2".to_string(), 24);
        let token = a.issue_session("u").unwrap();
        assert!(b.validate_token(&token).is_err());
        assert!(a.validate_token("invalid.token.here").is_err());
    }

    #[test]
    fn test_missing_session_id_rejected() {
        let handler = JwtHandler::new("s".to_string(), 24);
        let exp = Utc::now().timestamp() + 3600;
        let token = sign("s", json!({"sub": "u", "iat": 0, "exp": exp}));
        assert!(handler.validate_token(&token).is_err());

        let token = sign("s", json!({"session_id": "x", "iat": 0, "exp": exp}));
        assert!(handler.validate_token(&token).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let handler = JwtHandler::new("s".to_string(), 24);
        let exp = Utc::now().timestamp() - 3600;
        let token = sign("s", json!({"sub": "u", "session_id": "x", "iat": 0, "exp": exp}));
        assert!(handler.validate_token(&token).is_err());
    }
}
