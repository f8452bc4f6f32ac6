/// Request authentication
///
/// Resolves an `Authorization: Bearer <access token>` header into an
/// [`AuthContext`]. A token is accepted only while the session it names is
/// still present and unexpired, so sign-out and password resets take effect
/// immediately rather than at token expiry.
///
/// # Example
///
/// ```
/// use axum::Extension;
/// use foundry_shared::auth::middleware::AuthContext;
///
/// async fn handler(Extension(auth): Extension<AuthContext>) -> String {
///     format!("User: {}, session: {}", auth.user_id, auth.session_id)
/// }
/// ```

use axum::http::{header, HeaderMap};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use super::jwt::{validate_token, JwtError};
use crate::models::session::Session;

/// Authentication context inserted into request extensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    /// Authenticated user
    pub user_id: Uuid,

    /// Session backing the access token
    pub session_id: Uuid,
}

impl AuthContext {
    pub fn new(user_id: Uuid, session_id: Uuid) -> Self {
        Self { user_id, session_id }
    }
}

/// Error type for request authentication
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Missing authorization header
    #[error("Missing credentials")]
    MissingCredentials,

    /// Authorization header is not a bearer token
    #[error("{0}")]
    InvalidFormat(String),

    /// Token validation failed
    #[error("{0}")]
    InvalidToken(String),

    /// Session was revoked or has expired
    #[error("Session expired or revoked")]
    SessionRevoked,

    /// Database error
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<JwtError> for AuthError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Expired => AuthError::InvalidToken("Token expired".to_string()),
            JwtError::InvalidIssuer => AuthError::InvalidToken("Invalid issuer".to_string()),
            other => AuthError::InvalidToken(format!("Invalid token: {}", other)),
        }
    }
}

/// Pulls the bearer token out of the `Authorization` header
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingCredentials)?;

    let token = value
        .strip_prefix("Bearer ")
        .ok_or_else(|| AuthError::InvalidFormat("Expected Bearer token".to_string()))?
        .trim();

    if token.is_empty() {
        return Err(AuthError::MissingCredentials);
    }

    Ok(token)
}

/// Validates an access token and confirms its session is still active
pub async fn authenticate(pool: &PgPool, secret: &str, token: &str) -> Result<AuthContext, AuthError> {
    let claims = validate_token(token, secret)?;

    let session = Session::find_active_by_id(pool, claims.sid)
        .await
        .map_err(|e| AuthError::DatabaseError(e.to_string()))?
        .ok_or(AuthError::SessionRevoked)?;

    if session.user_id != claims.sub {
        tracing::warn!(
            session_id = %session.id,
            token_user = %claims.sub,
            "Access token subject does not match session owner"
        );
        return Err(AuthError::SessionRevoked);
    }

    Ok(AuthContext::new(claims.sub, claims.sid))
}
