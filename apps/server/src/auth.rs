//! JWT authentication.
//!
//! `POST /auth/login` checks the argon2 hash stored by the seed tool and
//! issues a bearer token. Handlers take [`CurrentUser`] to require one.

use argon2::password_hash::{PasswordHash, PasswordVerifier};
use argon2::Argon2;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use chrono::{Duration, Utc};
use duka_core::UserRole;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// JWT claims structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id)
    pub sub: String,

    pub role: UserRole,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration (Unix timestamp)
    pub exp: i64,

    /// JWT ID
    pub jti: String,
}

pub struct JwtManager {
    secret: String,
    lifetime_secs: i64,
}

impl JwtManager {
    pub fn new(secret: impl Into<String>, lifetime_secs: i64) -> Self {
        JwtManager {
            secret: secret.into(),
            lifetime_secs,
        }
    }

    pub fn lifetime_secs(&self) -> i64 {
        self.lifetime_secs
    }

    pub fn issue(&self, user_id: &str, role: UserRole) -> Result<String, ApiError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            role,
            iat: now.timestamp(),
            exp: (now + Duration::seconds(self.lifetime_secs)).timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| ApiError::internal(format!("Failed to generate token: {}", e)))
    }

    pub fn validate(&self, token: &str) -> Result<Claims, ApiError> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|e| ApiError::unauthorized(format!("Invalid token: {}", e)))
    }
}

/// Extract bearer token from authorization header.
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Checks `password` against a PHC-format argon2 hash.
///
/// An unparseable stored hash counts as a mismatch.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

// =============================================================================
// Extractor
// =============================================================================

/// The authenticated caller, from the bearer token.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: String,
    pub role: UserRole,
}

impl CurrentUser {
    /// Fails with 403 unless the caller is an admin or manager.
    pub fn require_privileged(&self) -> Result<(), ApiError> {
        if self.role.is_privileged() {
            Ok(())
        } else {
            Err(ApiError::forbidden("Admin or manager role required"))
        }
    }
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<CurrentUser>() {
            return Ok(user.clone());
        }

        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ApiError::unauthorized("Missing authorization header"))?;

        let token = extract_bearer_token(header)
            .ok_or_else(|| ApiError::unauthorized("Expected a bearer token"))?;

        let claims = state.jwt.validate(token)?;
        let user = CurrentUser {
            id: claims.sub,
            role: claims.role,
        };

        parts.extensions.insert(user.clone());
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use argon2::password_hash::{rand_core::OsRng, SaltString};
    use argon2::PasswordHasher;

    #[test]
    fn test_jwt_roundtrip() {
        let manager = JwtManager::new("test-secret", 3600);
        let token = manager.issue("user-001", UserRole::Manager).unwrap();

        let claims = manager.validate(&token).unwrap();
        assert_eq!(claims.sub, "user-001");
        assert_eq!(claims.role, UserRole::Manager);
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn test_token_from_other_secret_is_rejected() {
        let token = JwtManager::new("one", 3600).issue("u", UserRole::Admin).unwrap();
        let err = JwtManager::new("two", 3600).validate(&token).unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let token = JwtManager::new("s", -3600).issue("u", UserRole::Admin).unwrap();
        assert!(JwtManager::new("s", 3600).validate(&token).is_err());
    }

    #[test]
    fn test_extract_bearer_token() {
        assert_eq!(extract_bearer_token("Bearer abc.def"), Some("abc.def"));
        assert_eq!(extract_bearer_token("Basic abc"), None);
        assert_eq!(extract_bearer_token("Bearer "), None);
    }

    #[test]
    fn test_verify_password() {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(b"tusker-baridi", &salt)
            .unwrap()
            .to_string();

        assert!(verify_password("tusker-baridi", &hash));
        assert!(!verify_password("tusker-moto", &hash));
        assert!(!verify_password("tusker-baridi", "not-a-hash"));
    }

    #[test]
    fn test_require_privileged() {
        let cashier = CurrentUser {
            id: "c".into(),
            role: UserRole::Employee,
        };
        assert!(cashier.require_privileged().is_err());

        let manager = CurrentUser {
            id: "m".into(),
            role: UserRole::Manager,
        };
        assert!(manager.require_privileged().is_ok());
    }
}
