use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{config::AppConfig, errors::ServiceError, AppState};

/// JWT claims carried by storefront access tokens. Token issuance
/// lives in the identity service; this API only verifies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    pub email: Option<String>,
    /// Issued at time
    pub iat: i64,
    /// Expiration time
    pub exp: i64,
    /// Issuer
    pub iss: String,
    /// Audience
    pub aud: String,
}

/// Authenticated caller extracted from the Authorization header.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub email: Option<String>,
}

/// Verifies a bearer token and returns its claims.
pub fn verify_token(token: &str, config: &AppConfig) -> Result<Claims, ServiceError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[&config.auth_issuer]);
    validation.set_audience(&[&config.auth_audience]);

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &validation,
    )
    .map_err(|e| ServiceError::Unauthorized(format!("invalid token: {}", e)))?;

    Ok(data.claims)
}

/// Issues a signed token for a user. The production flow gets tokens
/// from the identity service; this exists for tooling and tests.
pub fn issue_token(
    user_id: Uuid,
    email: Option<String>,
    config: &AppConfig,
) -> Result<String, ServiceError> {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: user_id.to_string(),
        email,
        iat: now,
        exp: now + config.jwt_expiration as i64,
        iss: config.auth_issuer.clone(),
        aud: config.auth_audience.clone(),
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| ServiceError::InternalError(format!("failed to sign token: {}", e)))
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);

        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ServiceError::Unauthorized("missing authorization header".into()))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ServiceError::Unauthorized("expected bearer token".into()))?;

        let claims = verify_token(token, &app_state.config)?;

        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| ServiceError::Unauthorized("invalid subject claim".into()))?;

        Ok(AuthenticatedUser {
            user_id,
            email: claims.email,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> AppConfig {
        let raw = serde_json::json!({
            "database_url": "sqlite::memory:",
            "jwt_secret": "4f8e2b9c1a7d6e5f3b2a9c8d7e6f5a4b3c2d1e0f9a8b7c6d5e4f3a2b1c0d9e8f",
            "jwt_expiration": 3600,
            "host": "127.0.0.1",
            "port": 8080,
            "environment": "development",
            "payment_gateway_secret_key": "sk_test_123"
        });
        serde_json::from_value(raw).unwrap()
    }

    #[test]
    fn issued_token_round_trips() {
        let config = test_config();
        let user_id = Uuid::new_v4();
        let token = issue_token(user_id, Some("a@b.com".into()), &config).unwrap();
        let claims = verify_token(&token, &config).unwrap();
        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.email.as_deref(), Some("a@b.com"));
    }

    #[test]
    fn garbage_token_rejected() {
        let config = test_config();
        assert!(matches!(
            verify_token("not-a-token", &config),
            Err(ServiceError::Unauthorized(_))
        ));
    }

    #[test]
    fn wrong_issuer_rejected() {
        let config = test_config();
        let mut other = test_config();
        other.auth_issuer = "someone-else".into();

        let token = issue_token(Uuid::new_v4(), None, &other).unwrap();
        assert!(verify_token(&token, &config).is_err());
    }
}
