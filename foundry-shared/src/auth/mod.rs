/// Authentication and authorization utilities
///
/// # Modules
///
/// - [`password`]: Argon2id password hashing and strength policy
/// - [`jwt`]: Short-lived access tokens bound to a session
/// - [`token`]: Opaque random tokens (refresh sessions, verification links)
/// - [`middleware`]: Request authentication context
/// - [`authorization`]: Role checks backed by user preferences
/// - [`oauth`]: Authorization-code sign-in with external providers
///
/// # Example
///
/// ```no_run
/// use foundry_shared::auth::password::{hash_password, verify_password};
/// use foundry_shared::auth::jwt::{create_token, validate_token, Claims};
/// use chrono::Duration;
/// use uuid::Uuid;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let hash = hash_password("user_password")?;
/// assert!(verify_password("user_password", &hash)?);
///
/// let claims = Claims::new(Uuid::new_v4(), Uuid::new_v4(), Duration::minutes(15));
/// let token = create_token(&claims, "secret-key-at-least-32-bytes-long!!")?;
/// # Ok(())
/// # }
/// ```

pub mod authorization;
pub mod jwt;
pub mod middleware;
pub mod oauth;
pub mod password;
pub mod token;
