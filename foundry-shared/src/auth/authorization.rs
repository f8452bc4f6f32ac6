/// Role-based authorization
///
/// Roles live on the user's preference record (`user_preferences.role`).
/// A user without a record is treated as [`Role::User`].
///
/// # Example
///
/// ```no_run
/// use foundry_shared::auth::authorization::require_admin;
/// use foundry_shared::auth::middleware::AuthContext;
/// use sqlx::PgPool;
///
/// async fn delete_everything(pool: &PgPool, auth: &AuthContext) -> Result<(), Box<dyn std::error::Error>> {
///     require_admin(pool, auth).await?;
///     Ok(())
/// }
/// ```

use sqlx::PgPool;
use uuid::Uuid;

use super::middleware::AuthContext;
use crate::models::preference::{Role, UserPreference};

/// Error type for authorization checks
#[derive(Debug, thiserror::Error)]
pub enum AuthzError {
    /// User's role is below the required one
    #[error("Insufficient permissions: requires {required:?}, has {actual:?}")]
    InsufficientRole { required: Role, actual: Role },

    /// User may not access another user's resource
    #[error("Not authorized to access this resource")]
    NotAuthorized,

    /// Database error
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

/// Pure role comparison used by the database-backed checks
pub fn check_role(actual: Role, required: Role) -> Result<(), AuthzError> {
    if actual.has_permission(&required) {
        Ok(())
    } else {
        Err(AuthzError::InsufficientRole { required, actual })
    }
}

/// Requires `user_id` to hold `required` or a higher role; returns the actual role
pub async fn require_role(pool: &PgPool, user_id: Uuid, required: Role) -> Result<Role, AuthzError> {
    let actual = UserPreference::get_role(pool, user_id).await?;
    check_role(actual, required)?;
    Ok(actual)
}

/// Requires the authenticated user to be an admin
pub async fn require_admin(pool: &PgPool, auth: &AuthContext) -> Result<(), AuthzError> {
    require_role(pool, auth.user_id, Role::Admin).await.map(|_| ())
}

/// Allows access to a user's own resources, or to anyone's for admins
pub async fn require_self_or_admin(
    pool: &PgPool,
    auth: &AuthContext,
    owner_id: Uuid,
) -> Result<(), AuthzError> {
    if auth.user_id == owner_id {
        return Ok(());
    }

    match require_admin(pool, auth).await {
        Err(AuthzError::InsufficientRole { .. }) => Err(AuthzError::NotAuthorized),
        other => other,
    }
}
