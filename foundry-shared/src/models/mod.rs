/// Database models and their queries
///
/// # Models
///
/// - `user`: User identities
/// - `account`: Sign-in methods (email/password credential or OAuth provider)
/// - `session`: Refresh sessions backing access tokens
/// - `verification`: Single-use email verification and password reset tokens
/// - `preference`: Per-user settings, including the authorization role
/// - `audit_log`: Append-only audit trail
/// - `change`: Change requests submitted from the dev-mode overlay
///
/// # Example
///
/// ```no_run
/// use foundry_shared::models::user::{CreateUser, User};
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool) -> Result<(), sqlx::Error> {
/// let user = User::create(&pool, CreateUser {
///     email: "ada@example.com".to_string(),
///     name: "Ada".to_string(),
///     email_verified: false,
///     image: None,
/// }).await?;
/// # Ok(())
/// # }
/// ```

use serde::Serialize;

pub mod account;
pub mod audit_log;
pub mod change;
pub mod preference;
pub mod session;
pub mod user;
pub mod verification;

/// Default page size for list queries
pub const DEFAULT_PAGE_LIMIT: i64 = 50;

/// Largest page size a caller may request
pub const MAX_PAGE_LIMIT: i64 = 100;

/// One page of a list query
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,

    /// Rows matching the filter, ignoring `limit`/`offset`
    pub total: i64,

    pub limit: i64,
    pub offset: i64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: i64, limit: i64, offset: i64) -> Self {
        Self {
            items,
            total,
            limit,
            offset,
        }
    }

    /// Whether rows remain past this page
    pub fn has_more(&self) -> bool {
        self.offset + (self.items.len() as i64) < self.total
    }
}

/// Clamps `limit` into `1..=MAX_PAGE_LIMIT` (default when absent) and `offset` to `>= 0`
pub fn clamp_page(limit: Option<i64>, offset: Option<i64>) -> (i64, i64) {
    let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT);
    let offset = offset.unwrap_or(0).max(0);
    (limit, offset)
}

/// Canonical form used for storing and comparing email addresses
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Name of the unique constraint an error violated, if any
pub fn unique_violation(err: &sqlx::Error) -> Option<&str> {
    match err {
        sqlx::Error::Database(db) if db.is_unique_violation() => db.constraint(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_page() {
        assert_eq!(clamp_page(None, None), (50, 0));
        assert_eq!(clamp_page(Some(0), Some(-5)), (1, 0));
        assert_eq!(clamp_page(Some(1000), Some(20)), (100, 20));
        assert_eq!(clamp_page(Some(25), None), (25, 0));
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Ada@Example.COM "), "ada@example.com");
    }

    #[test]
    fn test_page_has_more() {
        let page = Page::new(vec![1, 2], 5, 2, 0);
        assert!(page.has_more());

        let last = Page::new(vec![5], 5, 2, 4);
        assert!(!last.has_more());
    }

    #[test]
    fn test_unique_violation_ignores_other_errors() {
        assert!(unique_violation(&sqlx::Error::RowNotFound).is_none());
    }
}
