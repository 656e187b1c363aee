//! Bearer-token validation against the identity provider.
//!
//! The API never mints tokens. It verifies HS256 JWTs issued by the fixed
//! issuer configured at startup and trusts the `sub` claim as the user id.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::AppState;
use crate::utils::error::AppError;

pub const SERVICE_KEY_HEADER: &str = "x-service-key";

const ADMIN_ROLE: &str = "admin";

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iss: String,
    pub exp: usize,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

pub fn decode_claims(token: &str, secret: &str, issuer: &str) -> Result<Claims, AppError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[issuer]);

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| AppError::AuthError(format!("Invalid token: {}", e)))
}

fn bearer_token(parts: &Parts) -> Result<&str, AppError> {
    let header_value = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::AuthError("Missing authorization header".to_string()))?;

    let token = header_value.strip_prefix("Bearer ").ok_or_else(|| {
        AppError::AuthError("Invalid authorization format. Expected 'Bearer <token>'".to_string())
    })?;

    if token.is_empty() {
        return Err(AppError::AuthError("Empty bearer token".to_string()));
    }

    Ok(token)
}

/// Authenticated caller. Use as a handler parameter to require a valid token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: Option<String>,
    pub email: Option<String>,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role.as_deref() == Some(ADMIN_ROLE)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        let claims = decode_claims(token, &state.config.jwt_secret, &state.config.jwt_issuer)?;

        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| AppError::AuthError("Token subject is not a valid user id".to_string()))?;

        Ok(Self {
            user_id,
            role: claims.role,
            email: claims.email,
        })
    }
}

/// Authenticated caller with the admin role. Returns 403 otherwise.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthUser);

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(AppError::Forbidden(
                "This operation requires the admin role".to_string(),
            ));
        }
        Ok(Self(user))
    }
}

/// The periodic external trigger (escrow release) authenticates with a shared
/// service key instead of a user token.
#[derive(Debug, Clone)]
pub struct ServiceTrigger;

#[async_trait]
impl FromRequestParts<AppState> for ServiceTrigger {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let presented = parts
            .headers
            .get(SERVICE_KEY_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::AuthError("Missing service key".to_string()))?;

        if presented != state.config.service_key {
            return Err(AppError::AuthError("Invalid service key".to_string()));
        }

        Ok(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test-secret";
    const ISSUER: &str = "https://auth.gatepass.app";

    fn make_token(sub: &str, iss: &str, role: Option<&str>, ttl: Duration) -> String {
        let claims = Claims {
            sub: sub.to_string(),
            iss: iss.to_string(),
            exp: (Utc::now() + ttl).timestamp() as usize,
            role: role.map(|r| r.to_string()),
            email: None,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_ref()),
        )
        .unwrap()
    }

    #[test]
    fn test_valid_token_roundtrip() {
        let sub = Uuid::new_v4().to_string();
        let token = make_token(&sub, ISSUER, Some("admin"), Duration::hours(1));

        let claims = decode_claims(&token, SECRET, ISSUER).unwrap();
        assert_eq!(claims.sub, sub);
        assert_eq!(claims.role.as_deref(), Some("admin"));
    }

    #[test]
    fn test_wrong_issuer_rejected() {
        let token = make_token(
            &Uuid::new_v4().to_string(),
            "https://evil.example.com",
            None,
            Duration::hours(1),
        );
        assert!(decode_claims(&token, SECRET, ISSUER).is_err());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = make_token(&Uuid::new_v4().to_string(), ISSUER, None, Duration::hours(1));
        assert!(decode_claims(&token, "another-secret", ISSUER).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let token = make_token(
            &Uuid::new_v4().to_string(),
            ISSUER,
            None,
            Duration::hours(-2),
        );
        assert!(decode_claims(&token, SECRET, ISSUER).is_err());
    }

    #[test]
    fn test_admin_role_check() {
        let admin = AuthUser {
            user_id: Uuid::new_v4(),
            role: Some("admin".to_string()),
            email: None,
        };
        let buyer = AuthUser {
            user_id: Uuid::new_v4(),
            role: None,
            email: None,
        };
        assert!(admin.is_admin());
        assert!(!buyer.is_admin());
    }
}
