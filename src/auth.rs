//! Password hashing and JWT access/refresh tokens.

use crate::errors::{AppError, TokenError};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl TokenType {
    fn as_str(self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Claims {
    /// User id, as a string per RFC 7519.
    pub sub: String,
    pub token_type: TokenType,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// HS256 signing keys plus token lifetimes.
#[derive(Clone)]
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenKeys {
    pub fn new(secret: &[u8], access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn issue(&self, user_id: i64, token_type: TokenType) -> Result<String, TokenError> {
        let now = Utc::now();
        let ttl = match token_type {
            TokenType::Access => self.access_ttl,
            TokenType::Refresh => self.refresh_ttl,
        };
        let claims = Claims {
            sub: user_id.to_string(),
            token_type,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            jti: Uuid::new_v4().to_string(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(TokenError::Signing)
    }

    pub fn issue_pair(&self, user_id: i64) -> Result<TokenPair, TokenError> {
        Ok(TokenPair {
            access: self.issue(user_id, TokenType::Access)?,
            refresh: self.issue(user_id, TokenType::Refresh)?,
        })
    }

    /// Checks signature, expiry and token type; returns the user id.
    pub fn verify(&self, token: &str, expected: TokenType) -> Result<i64, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &validation)?;

        if data.claims.token_type != expected {
            return Err(TokenError::WrongType {
                expected: expected.as_str(),
            });
        }
        data.claims.sub.parse::<i64>().map_err(|_| TokenError::BadSubject)
    }
}

/// Hashes a password with bcrypt on the blocking pool.
pub async fn hash_password(password: String, cost: u32) -> Result<String, AppError> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| AppError::InternalServerError(format!("password hashing task failed: {}", e)))?
        .map_err(|e| AppError::InternalServerError(format!("password hashing failed: {}", e)))
}

/// Verifies a password against a stored bcrypt hash.
/// A malformed stored hash counts as a mismatch.
pub async fn verify_password(password: String, hash: String) -> Result<bool, AppError> {
    let verified = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| AppError::InternalServerError(format!("password verification task failed: {}", e)))?;

    match verified {
        Ok(matches) => Ok(matches),
        Err(e) => {
            tracing::warn!(error = %e, "Stored password hash could not be parsed");
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> TokenKeys {
        TokenKeys::new(b"test-secret", Duration::minutes(5), Duration::days(1))
    }

    #[test]
    fn access_token_round_trips_user_id() {
        let keys = keys();
        let token = keys.issue(42, TokenType::Access).unwrap();
        assert_eq!(keys.verify(&token, TokenType::Access).unwrap(), 42);
    }

    #[test]
    fn refresh_token_is_not_an_access_token() {
        let keys = keys();
        let pair = keys.issue_pair(7).unwrap();
        assert!(matches!(
            keys.verify(&pair.refresh, TokenType::Access),
            Err(TokenError::WrongType { expected: "access" })
        ));
        assert_eq!(keys.verify(&pair.refresh, TokenType::Refresh).unwrap(), 7);
    }

    #[test]
    fn expired_token_is_rejected() {
        let keys = TokenKeys::new(b"test-secret", Duration::seconds(-30), Duration::days(1));
        let token = keys.issue(1, TokenType::Access).unwrap();
        assert!(matches!(keys.verify(&token, TokenType::Access), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let other = TokenKeys::new(b"another-secret", Duration::minutes(5), Duration::days(1));
        let token = other.issue(1, TokenType::Access).unwrap();
        assert!(keys().verify(&token, TokenType::Access).is_err());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(keys().verify("wrong", TokenType::Refresh), Err(TokenError::Invalid(_))));
    }

    #[tokio::test]
    async fn password_hash_verifies_only_the_original_password() {
        let hash = hash_password("hunter2".to_string(), 4).await.unwrap();
        assert_ne!(hash, "hunter2");
        assert!(verify_password("hunter2".to_string(), hash.clone()).await.unwrap());
        assert!(!verify_password("hunter3".to_string(), hash).await.unwrap());
    }

    #[tokio::test]
    async fn malformed_hash_never_verifies() {
        assert!(!verify_password("anything".to_string(), "not-a-hash".to_string()).await.unwrap());
    }
}
