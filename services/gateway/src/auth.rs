use crate::error::AppError;
use crate::state::AppState;
use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use types::ids::UserId;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// The user id
    pub sub: String,
    pub exp: usize,
}

/// HS256 bearer token verification
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    pub fn verify(&self, token: &str) -> Result<UserId, AppError> {
        let token_data = decode::<Claims>(token, &self.key, &self.validation)
            .map_err(|e| AppError::Unauthorized(format!("Invalid token: {}", e)))?;

        let sub = token_data.claims.sub.trim();
        if sub.is_empty() {
            return Err(AppError::Unauthorized("Token has no subject".into()));
        }
        Ok(UserId::new(sub))
    }
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Caller identity, from `Authorization: Bearer` or a `token` query parameter
///
/// Browsers cannot set headers on a WebSocket handshake, hence the query
/// fallback.
pub struct AuthenticatedUser {
    pub user_id: UserId,
}

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(auth_header) = parts.headers.get("Authorization") {
            let auth_str = auth_header
                .to_str()
                .map_err(|_| AppError::Unauthorized("Invalid header string".into()))?;
            let Some(token) = auth_str.strip_prefix("Bearer ") else {
                return Err(AppError::Unauthorized("Unsupported authorization scheme".into()));
            };
            return Ok(AuthenticatedUser {
                user_id: state.tokens.verify(token)?,
            });
        }

        if let Ok(Query(TokenQuery { token: Some(token) })) = Query::<TokenQuery>::try_from_uri(&parts.uri) {
            return Ok(AuthenticatedUser {
                user_id: state.tokens.verify(&token)?,
            });
        }

        Err(AppError::Unauthorized("Missing authentication credentials".to_string()))
    }
}
