//! JWT issuing and validation

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tipline_shared::Role;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("Token encoding failed: {0}")]
    Encode(jsonwebtoken::errors::Error),
    #[error("Token expiry is out of range")]
    ExpiryOutOfRange,
    #[error("Invalid or expired token")]
    Invalid(jsonwebtoken::errors::Error),
}

/// Access token claims. `sub` is the account id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiry: Duration,
}

impl JwtManager {
    /// Hours beyond what `Duration` can hold saturate; token issuing then
    /// fails with [`JwtError::ExpiryOutOfRange`].
    pub fn new(secret: &str, expiry_hours: i64) -> Self {
        let expiry = expiry_hours
            .checked_mul(3600)
            .map(Duration::seconds)
            .unwrap_or(Duration::MAX);
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expiry,
        }
    }

    pub fn generate_access_token(
        &self,
        account_id: Uuid,
        role: Role,
        now: OffsetDateTime,
    ) -> Result<String, JwtError> {
        if self.expiry <= Duration::ZERO {
            return Err(JwtError::ExpiryOutOfRange);
        }
        let expires_at = now
            .checked_add(self.expiry)
            .ok_or(JwtError::ExpiryOutOfRange)?;
        let claims = Claims {
            sub: account_id,
            role,
            iat: now.unix_timestamp(),
            exp: expires_at.unix_timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding_key).map_err(JwtError::Encode)
    }

    /// Checks signature and `exp` against the wall clock
    pub fn validate_access_token(&self, token: &str) -> Result<Claims, JwtError> {
        decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(JwtError::Invalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-jwt-secret-key-for-testing-only";

    #[test]
    fn test_token_round_trip_carries_role() {
        let manager = JwtManager::new(SECRET, 168);
        let id = Uuid::new_v4();
        let token = manager
            .generate_access_token(id, Role::Admin, OffsetDateTime::now_utc())
            .unwrap();

        let claims = manager.validate_access_token(&token).unwrap();
        assert_eq!(claims.sub, id);
        assert_eq!(claims.role, Role::Admin);
        assert_eq!(claims.exp - claims.iat, 7 * 24 * 3600);
    }

    #[test]
    fn test_expired_token_rejected() {
        let manager = JwtManager::new(SECRET, 1);
        let token = manager
            .generate_access_token(
                Uuid::new_v4(),
                Role::User,
                OffsetDateTime::now_utc() - Duration::days(2),
            )
            .unwrap();
        assert!(matches!(
            manager.validate_access_token(&token),
            Err(JwtError::Invalid(_))
        ));
    }

    #[test]
    fn test_unusable_expiry_is_an_error() {
        for hours in [1_000_000_000, i64::MAX, 0, -5] {
            let manager = JwtManager::new(SECRET, hours);
            assert!(
                matches!(
                    manager.generate_access_token(
                        Uuid::new_v4(),
                        Role::User,
                        OffsetDateTime::now_utc()
                    ),
                    Err(JwtError::ExpiryOutOfRange)
                ),
                "expiry of {hours} hours should be refused"
            );
        }
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = JwtManager::new(SECRET, 1)
            .generate_access_token(Uuid::new_v4(), Role::User, OffsetDateTime::now_utc())
            .unwrap();
        let other = JwtManager::new("another-secret-that-is-long-enough!!", 1);
        assert!(other.validate_access_token(&token).is_err());
    }
}
