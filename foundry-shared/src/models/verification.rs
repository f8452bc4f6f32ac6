/// Single-use verification tokens
///
/// Used for email verification and password reset links. Issuing a token
/// replaces any earlier token of the same purpose for the user, and
/// consuming one deletes it whether or not it has expired.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::token::{generate_token, hash_token, validate_token_format, VERIFICATION_PREFIX};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "verification_purpose", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum VerificationPurpose {
    EmailVerification,
    PasswordReset,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Verification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub purpose: VerificationPurpose,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Verification {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }

    /// Issues a token for `user_id`, returning the plaintext
    ///
    /// Earlier tokens of the same purpose are revoked in the same transaction.
    pub async fn issue(
        pool: &PgPool,
        user_id: Uuid,
        purpose: VerificationPurpose,
        ttl: Duration,
    ) -> Result<String, sqlx::Error> {
        let (token, token_hash) = generate_token(VERIFICATION_PREFIX);

        let mut tx = pool.begin().await?;

        sqlx::query("DELETE FROM verifications WHERE user_id = $1 AND purpose = $2")
            .bind(user_id)
            .bind(purpose)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO verifications (user_id, purpose, token_hash, expires_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(user_id)
        .bind(purpose)
        .bind(token_hash)
        .bind(Utc::now() + ttl)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(token)
    }

    /// Redeems a token
    ///
    /// Returns the record only if the token exists, matches `purpose` and has
    /// not expired. A matching token is deleted either way.
    pub async fn consume(
        pool: &PgPool,
        token: &str,
        purpose: VerificationPurpose,
    ) -> Result<Option<Self>, sqlx::Error> {
        if !validate_token_format(token, VERIFICATION_PREFIX) {
            return Ok(None);
        }

        let record = sqlx::query_as::<_, Verification>(
            r#"
            DELETE FROM verifications
            WHERE token_hash = $1 AND purpose = $2
            RETURNING id, user_id, purpose, token_hash, expires_at, created_at
            "#,
        )
        .bind(hash_token(token))
        .bind(purpose)
        .fetch_optional(pool)
        .await?;

        Ok(record.filter(|r| !r.is_expired()))
    }

    pub async fn purge_expired(pool: &PgPool) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM verifications WHERE expires_at <= NOW()")
            .execute(pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_expired() {
        let mut record = Verification {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            purpose: VerificationPurpose::PasswordReset,
            token_hash: hash_token("fdv_x"),
            expires_at: Utc::now() + Duration::minutes(30),
            created_at: Utc::now(),
        };
        assert!(!record.is_expired());

        record.expires_at = Utc::now() - Duration::minutes(1);
        assert!(record.is_expired());
    }

    #[test]
    fn test_purpose_serialization() {
        assert_eq!(
            serde_json::to_string(&VerificationPurpose::EmailVerification).unwrap(),
            "\"email_verification\""
        );
    }
}
