/// Sign-in methods linked to a user
///
/// A user has at most one credential account (`provider_id = "credential"`,
/// `account_id` = user id, Argon2id `password`) and any number of OAuth
/// accounts (`provider_id` = configured provider id, `account_id` = the
/// provider's user id). `(provider_id, account_id)` is unique.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

/// Provider id of email/password accounts
pub const CREDENTIAL_PROVIDER: &str = "credential";

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: Uuid,
    pub user_id: Uuid,
    pub provider_id: String,
    pub account_id: String,

    /// Argon2id hash; only set on credential accounts and never serialized
    #[serde(skip_serializing, default)]
    pub password: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateAccount {
    pub user_id: Uuid,
    pub provider_id: String,
    pub account_id: String,
    pub password: Option<String>,
}

impl CreateAccount {
    /// Email/password account for `user_id` with an already hashed password
    pub fn credential(user_id: Uuid, password_hash: String) -> Self {
        Self {
            user_id,
            provider_id: CREDENTIAL_PROVIDER.to_string(),
            account_id: user_id.to_string(),
            password: Some(password_hash),
        }
    }

    pub fn oauth(user_id: Uuid, provider_id: &str, provider_account_id: &str) -> Self {
        Self {
            user_id,
            provider_id: provider_id.to_string(),
            account_id: provider_account_id.to_string(),
            password: None,
        }
    }
}

impl Account {
    pub fn is_credential(&self) -> bool {
        self.provider_id == CREDENTIAL_PROVIDER
    }

    pub async fn create<'e, E>(executor: E, data: CreateAccount) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Account>(
            r#"
            INSERT INTO accounts (user_id, provider_id, account_id, password)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, provider_id, account_id, password, created_at, updated_at
            "#,
        )
        .bind(data.user_id)
        .bind(data.provider_id)
        .bind(data.account_id)
        .bind(data.password)
        .fetch_one(executor)
        .await
    }

    /// Finds the account a provider knows as `account_id`
    pub async fn find_by_provider(
        pool: &PgPool,
        provider_id: &str,
        account_id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Account>(
            r#"
            SELECT id, user_id, provider_id, account_id, password, created_at, updated_at
            FROM accounts
            WHERE provider_id = $1 AND account_id = $2
            "#,
        )
        .bind(provider_id)
        .bind(account_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_credential(pool: &PgPool, user_id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Account>(
            r#"
            SELECT id, user_id, provider_id, account_id, password, created_at, updated_at
            FROM accounts
            WHERE user_id = $1 AND provider_id = $2
            "#,
        )
        .bind(user_id)
        .bind(CREDENTIAL_PROVIDER)
        .fetch_optional(pool)
        .await
    }

    pub async fn list_by_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Account>(
            r#"
            SELECT id, user_id, provider_id, account_id, password, created_at, updated_at
            FROM accounts
            WHERE user_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    /// Replaces the password hash on the user's credential account
    ///
    /// Returns false when the user has no credential account.
    pub async fn update_password<'e, E>(
        executor: E,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET password = $3, updated_at = NOW()
            WHERE user_id = $1 AND provider_id = $2
            "#,
        )
        .bind(user_id)
        .bind(CREDENTIAL_PROVIDER)
        .bind(password_hash)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
