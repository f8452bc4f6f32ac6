/// Access token signing and validation
///
/// Access tokens are HS256 JWTs that name a user (`sub`) and the session they
/// were minted for (`sid`). They are short-lived; the long-lived credential
/// is the opaque refresh token held by the session row (see
/// [`crate::models::session`]). Because every access token names its session,
/// revoking the session revokes the token.
///
/// The generic [`sign`] / [`verify`] pair is reused for other claim shapes
/// (OAuth `state`), each with its own audience so tokens cannot be swapped
/// between uses.
///
/// # Example
///
/// ```
/// use chrono::Duration;
/// use foundry_shared::auth::jwt::{create_token, validate_token, Claims};
/// use uuid::Uuid;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let user_id = Uuid::new_v4();
/// let claims = Claims::new(user_id, Uuid::new_v4(), Duration::minutes(15));
/// let token = create_token(&claims, "your-secret-key-at-least-32-bytes")?;
///
/// let validated = validate_token(&token, "your-secret-key-at-least-32-bytes")?;
/// assert_eq!(validated.sub, user_id);
/// # Ok(())
/// # }
/// ```

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

/// Issuer written into every token
pub const ISSUER: &str = "foundry";

/// Audience of access tokens
pub const ACCESS_AUDIENCE: &str = "foundry-api";

/// Error type for JWT operations
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    /// Failed to create token
    #[error("Failed to create token: {0}")]
    CreateError(String),

    /// Failed to validate token
    #[error("Failed to validate token: {0}")]
    ValidationError(String),

    /// Token has expired
    #[error("Token has expired")]
    Expired,

    /// Token was issued for another purpose
    #[error("Invalid audience: expected {expected}")]
    InvalidAudience { expected: String },

    /// Token was not issued by this service
    #[error("Invalid issuer")]
    InvalidIssuer,
}

/// Access token claims
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject - user ID
    pub sub: Uuid,

    /// Session the token belongs to
    pub sid: Uuid,

    /// Issuer - always [`ISSUER`]
    pub iss: String,

    /// Audience - always [`ACCESS_AUDIENCE`]
    pub aud: String,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Not before (Unix timestamp)
    pub nbf: i64,

    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

impl Claims {
    /// Creates claims for `user_id` / `session_id` expiring after `ttl`
    pub fn new(user_id: Uuid, session_id: Uuid, ttl: Duration) -> Self {
        let now = Utc::now();

        Self {
            sub: user_id,
            sid: session_id,
            iss: ISSUER.to_string(),
            aud: ACCESS_AUDIENCE.to_string(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: (now + ttl).timestamp(),
        }
    }

    /// Checks if the token has expired
    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() >= self.exp
    }

    /// Time left before expiry, `None` once expired
    pub fn time_until_expiration(&self) -> Option<Duration> {
        let now = Utc::now().timestamp();
        (self.exp > now).then(|| Duration::seconds(self.exp - now))
    }
}

/// Signs any claim set with HS256
pub fn sign<T: Serialize>(claims: &T, secret: &str) -> Result<String, JwtError> {
    let key = EncodingKey::from_secret(secret.as_bytes());

    encode(&Header::new(Algorithm::HS256), claims, &key)
        .map_err(|e| JwtError::CreateError(format!("Token encoding failed: {}", e)))
}

/// Verifies signature, issuer, audience, `exp` and `nbf`, returning the claims
pub fn verify<T: DeserializeOwned>(token: &str, secret: &str, audience: &str) -> Result<T, JwtError> {
    let key = DecodingKey::from_secret(secret.as_bytes());

    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[ISSUER]);
    validation.set_audience(&[audience]);
    validation.validate_exp = true;
    validation.validate_nbf = true;

    decode::<T>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::Expired,
            jsonwebtoken::errors::ErrorKind::InvalidIssuer => JwtError::InvalidIssuer,
            jsonwebtoken::errors::ErrorKind::InvalidAudience => JwtError::InvalidAudience {
                expected: audience.to_string(),
            },
            _ => JwtError::ValidationError(format!("Token validation failed: {}", e)),
        })
}

/// Creates a signed access token
pub fn create_token(claims: &Claims, secret: &str) -> Result<String, JwtError> {
    sign(claims, secret)
}

/// Validates an access token and returns its claims
pub fn validate_token(token: &str, secret: &str) -> Result<Claims, JwtError> {
    verify(token, secret, ACCESS_AUDIENCE)
}
