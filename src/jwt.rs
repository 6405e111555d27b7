use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};

use crate::app::AppState;
use crate::authz::AuthUserId;
use crate::errors::AppError;

/// Verifies bearer tokens issued for the external auth provider's users.
/// `sub` carries the auth user id the session context resolves.
#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: Arc<Vec<u8>>,
    pub exp_hours: i64,
}

impl JwtConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let secret = std::env::var("JWT_SECRET").map_err(|_| AppError::configuration("JWT_SECRET not set"))?;
        let exp_hours = std::env::var("JWT_EXP_HOURS")
            .map(|val| val.parse::<i64>())
            .unwrap_or(Ok(24))
            .map_err(|_| AppError::configuration("JWT_EXP_HOURS must be a valid integer"))?;

        Ok(Self::new(secret.into_bytes(), exp_hours))
    }

    pub fn new(secret: impl Into<Vec<u8>>, exp_hours: i64) -> Self {
        Self {
            secret: Arc::new(secret.into()),
            exp_hours,
        }
    }

    /// Mints a token for `auth_user_id`. Used by the CLI and tests; production
    /// tokens come from the auth provider.
    pub fn encode(&self, auth_user_id: AuthUserId) -> Result<String, AppError> {
        use chrono::{Duration, Utc};

        let now = Utc::now();
        let exp = now + Duration::hours(self.exp_hours);

        let claims = Claims {
            sub: auth_user_id,
            exp: exp.timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        jsonwebtoken::encode(&Header::default(), &claims, &EncodingKey::from_secret(&self.secret))
            .map_err(|err| AppError::token(err.to_string()))
    }

    pub fn decode(&self, token: &str) -> Result<Claims, AppError> {
        let mut validation = Validation::default();
        validation.validate_exp = true;

        jsonwebtoken::decode::<Claims>(token, &DecodingKey::from_secret(&self.secret), &validation)
            .map(|data| data.claims)
            .map_err(|err| AppError::token(err.to_string()))
    }

    /// Subject of a correctly signed token that is past its expiry.
    pub fn expired_subject(&self, token: &str) -> Option<AuthUserId> {
        let mut validation = Validation::default();
        validation.validate_exp = false;

        let claims = jsonwebtoken::decode::<Claims>(token, &DecodingKey::from_secret(&self.secret), &validation)
            .ok()?
            .claims;
        let expired = (claims.exp as u64).saturating_add(validation.leeway) < jsonwebtoken::get_current_timestamp();
        expired.then_some(claims.sub)
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Claims {
    pub sub: AuthUserId,
    pub exp: usize,
    pub iat: usize,
}

/// The authenticated identity, before any organization lookup.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub auth_user_id: AuthUserId,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| AppError::unauthorized("Authorization header missing"))?;

        let claims = match state.jwt.decode(token) {
            Ok(claims) => claims,
            Err(err) => {
                // Expiry ends the session the same way sign-out does.
                if let Some(auth_user_id) = state.jwt.expired_subject(token) {
                    tracing::info!(%auth_user_id, "token expired");
                    state.sessions.sign_out(auth_user_id);
                }
                return Err(err);
            }
        };

        Ok(AuthUser {
            auth_user_id: claims.sub,
        })
    }
}
