/// Refresh sessions
///
/// Each sign-in opens a session holding the SHA-256 hash of an opaque
/// refresh token (`fds_...`). Access tokens name their session, and the auth
/// middleware rejects tokens whose session is gone or expired. Refreshing
/// rotates the token: the previous refresh token stops working.
///
/// # Example
///
/// ```no_run
/// use chrono::Duration;
/// use foundry_shared::models::session::{CreateSession, Session};
/// use sqlx::PgPool;
/// use uuid::Uuid;
///
/// # async fn example(pool: PgPool, user_id: Uuid) -> Result<(), sqlx::Error> {
/// let (session, refresh_token) = Session::create(&pool, CreateSession {
///     user_id,
///     ttl: Duration::days(30),
///     ip_address: None,
///     user_agent: None,
/// }).await?;
///
/// let found = Session::find_active_by_token(&pool, &refresh_token).await?;
/// assert_eq!(found.map(|s| s.id), Some(session.id));
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use crate::auth::token::{generate_token, hash_token, validate_token_format, SESSION_PREFIX};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,

    #[serde(skip_serializing)]
    pub token_hash: String,

    pub expires_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateSession {
    pub user_id: Uuid,
    pub ttl: Duration,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }

    /// Opens a session, returning it with the plaintext refresh token
    ///
    /// The plaintext is not stored; hand it to the client now or never.
    pub async fn create<'e, E>(executor: E, data: CreateSession) -> Result<(Self, String), sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let (token, token_hash) = generate_token(SESSION_PREFIX);

        let session = sqlx::query_as::<_, Session>(
            r#"
            INSERT INTO sessions (user_id, token_hash, expires_at, ip_address, user_agent)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, user_id, token_hash, expires_at, ip_address, user_agent,
                      created_at, updated_at
            "#,
        )
        .bind(data.user_id)
        .bind(token_hash)
        .bind(Utc::now() + data.ttl)
        .bind(data.ip_address)
        .bind(data.user_agent)
        .fetch_one(executor)
        .await?;

        Ok((session, token))
    }

    pub async fn find_active_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Session>(
            r#"
            SELECT id, user_id, token_hash, expires_at, ip_address, user_agent,
                   created_at, updated_at
            FROM sessions
            WHERE id = $1 AND expires_at > NOW()
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Looks a session up by its plaintext refresh token
    pub async fn find_active_by_token(pool: &PgPool, token: &str) -> Result<Option<Self>, sqlx::Error> {
        if !validate_token_format(token, SESSION_PREFIX) {
            return Ok(None);
        }

        sqlx::query_as::<_, Session>(
            r#"
            SELECT id, user_id, token_hash, expires_at, ip_address, user_agent,
                   created_at, updated_at
            FROM sessions
            WHERE token_hash = $1 AND expires_at > NOW()
            "#,
        )
        .bind(hash_token(token))
        .fetch_optional(pool)
        .await
    }

    /// Issues a new refresh token for an active session and extends it by `ttl`
    ///
    /// Returns `None` if the session no longer exists or has expired.
    pub async fn rotate(pool: &PgPool, id: Uuid, ttl: Duration) -> Result<Option<(Self, String)>, sqlx::Error> {
        let (token, token_hash) = generate_token(SESSION_PREFIX);

        let session = sqlx::query_as::<_, Session>(
            r#"
            UPDATE sessions
            SET token_hash = $2, expires_at = $3, updated_at = NOW()
            WHERE id = $1 AND expires_at > NOW()
            RETURNING id, user_id, token_hash, expires_at, ip_address, user_agent,
                      created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(token_hash)
        .bind(Utc::now() + ttl)
        .fetch_optional(pool)
        .await?;

        Ok(session.map(|s| (s, token)))
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Revokes every session of a user; returns how many were removed
    pub async fn delete_for_user<'e, E>(executor: E, user_id: Uuid) -> Result<u64, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query("DELETE FROM sessions WHERE user_id = $1")
            .bind(user_id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected())
    }

    /// Revokes all of a user's sessions except `keep`
    pub async fn delete_for_user_except(pool: &PgPool, user_id: Uuid, keep: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sessions WHERE user_id = $1 AND id <> $2")
            .bind(user_id)
            .bind(keep)
            .execute(pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Removes expired rows
    pub async fn purge_expired(pool: &PgPool) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= NOW()")
            .execute(pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(expires_at: DateTime<Utc>) -> Session {
        Session {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            token_hash: hash_token("fds_x"),
            expires_at,
            ip_address: Some("127.0.0.1".to_string()),
            user_agent: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_is_expired() {
        assert!(!session(Utc::now() + Duration::days(1)).is_expired());
        assert!(session(Utc::now() - Duration::seconds(1)).is_expired());
    }

    #[test]
    fn test_token_hash_is_not_serialized() {
        let json = serde_json::to_value(session(Utc::now())).unwrap();
        assert!(json.get("tokenHash").is_none());
        assert!(json.get("token_hash").is_none());
        assert_eq!(json["ipAddress"], "127.0.0.1");
    }
}
