/// User model and database operations
///
/// A user is an identity; how they sign in lives in [`super::account`].
/// Emails are stored lowercase (see [`super::normalize_email`]) so lookups
/// are case-insensitive.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE users (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     email VARCHAR(255) NOT NULL UNIQUE,
///     name VARCHAR(255) NOT NULL,
///     email_verified BOOLEAN NOT NULL DEFAULT FALSE,
///     image VARCHAR(1024),
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     last_login_at TIMESTAMPTZ
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use super::normalize_email;
use super::preference::Role;

/// Name of the unique constraint on `users.email`
pub const EMAIL_UNIQUE_CONSTRAINT: &str = "users_email_key";

/// User identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,

    /// Lowercased email address, unique across users
    pub email: String,

    /// Display name
    pub name: String,

    /// Set once the user follows a verification link or signs in through a
    /// provider that vouches for the address
    pub email_verified: bool,

    /// Avatar URL
    pub image: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

/// Input for creating a user
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUser {
    pub email: String,
    pub name: String,
    pub email_verified: bool,
    pub image: Option<String>,
}

/// Profile changes; `None` fields are left untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateUser {
    pub name: Option<String>,

    /// `Some(None)` clears the image
    pub image: Option<Option<String>>,
}

/// User joined with the role from their preference record
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct UserWithRole {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub user: User,

    pub role: Role,
}

fn search_pattern(search: Option<&str>) -> Option<String> {
    search
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            let escaped = s
                .replace('\\', "\\\\")
                .replace('%', "\\%")
                .replace('_', "\\_");
            format!("%{}%", escaped)
        })
}

impl User {
    /// Inserts a user
    ///
    /// Accepts any executor so sign-up can create the user, its account and
    /// its preferences in one transaction.
    ///
    /// # Errors
    ///
    /// Fails with a unique violation on [`EMAIL_UNIQUE_CONSTRAINT`] when the
    /// email is taken.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use foundry_shared::models::user::{CreateUser, User};
    /// # use sqlx::PgPool;
    /// # async fn example(pool: PgPool) -> Result<(), sqlx::Error> {
    /// let mut tx = pool.begin().await?;
    /// let user = User::create(&mut *tx, CreateUser {
    ///     email: "Ada@Example.com".to_string(),
    ///     name: "Ada".to_string(),
    ///     email_verified: false,
    ///     image: None,
    /// }).await?;
    /// tx.commit().await?;
    /// assert_eq!(user.email, "ada@example.com");
    /// # Ok(())
    /// # }
    /// ```
    pub async fn create<'e, E>(executor: E, data: CreateUser) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, name, email_verified, image)
            VALUES ($1, $2, $3, $4)
            RETURNING id, email, name, email_verified, image,
                      created_at, updated_at, last_login_at
            "#,
        )
        .bind(normalize_email(&data.email))
        .bind(data.name.trim())
        .bind(data.email_verified)
        .bind(data.image)
        .fetch_one(executor)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, name, email_verified, image,
                   created_at, updated_at, last_login_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Case-insensitive lookup by email
    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, name, email_verified, image,
                   created_at, updated_at, last_login_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(normalize_email(email))
        .fetch_optional(pool)
        .await
    }

    /// Applies profile changes, returning `None` if the user does not exist
    pub async fn update(pool: &PgPool, id: Uuid, data: UpdateUser) -> Result<Option<Self>, sqlx::Error> {
        let (set_image, image) = match data.image {
            Some(image) => (true, image),
            None => (false, None),
        };

        sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET name = COALESCE($2, name),
                image = CASE WHEN $3 THEN $4 ELSE image END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, email, name, email_verified, image,
                      created_at, updated_at, last_login_at
            "#,
        )
        .bind(id)
        .bind(data.name.as_deref().map(str::trim))
        .bind(set_image)
        .bind(image)
        .fetch_optional(pool)
        .await
    }

    /// Marks the email verified; returns false if the user does not exist
    pub async fn mark_email_verified(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET email_verified = TRUE, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn update_last_login(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Lists users with their roles, newest first
    ///
    /// `search` matches a substring of the email or name, case-insensitively.
    pub async fn list_with_roles(
        pool: &PgPool,
        search: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<UserWithRole>, sqlx::Error> {
        sqlx::query_as::<_, UserWithRole>(
            r#"
            SELECT u.id, u.email, u.name, u.email_verified, u.image,
                   u.created_at, u.updated_at, u.last_login_at,
                   COALESCE(p.role, 'user'::user_role) AS role
            FROM users u
            LEFT JOIN user_preferences p ON p.user_id = u.id
            WHERE ($1::text IS NULL OR u.email ILIKE $1 OR u.name ILIKE $1)
            ORDER BY u.created_at DESC, u.id
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(search_pattern(search))
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
    }

    /// Counts users matching `search` (see [`User::list_with_roles`])
    pub async fn count(pool: &PgPool, search: Option<&str>) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM users u
            WHERE ($1::text IS NULL OR u.email ILIKE $1 OR u.name ILIKE $1)
            "#,
        )
        .bind(search_pattern(search))
        .fetch_one(pool)
        .await
    }
}
