/// Append-only audit trail
///
/// Security-relevant events (sign-ins, password changes, role changes, ...)
/// are recorded with the acting user, a JSON `details` object, a success
/// flag and the client's IP address and user agent. Entries are never
/// updated or deleted by the application.
///
/// # Example
///
/// ```no_run
/// use foundry_shared::models::audit_log::{AuditAction, AuditLog, AuditLogFilter, NewAuditLog};
/// use serde_json::json;
/// use sqlx::PgPool;
/// use uuid::Uuid;
///
/// # async fn example(pool: PgPool, user_id: Uuid) -> Result<(), Box<dyn std::error::Error>> {
/// AuditLog::record(
///     &pool,
///     NewAuditLog::new(AuditAction::SignIn)
///         .user(user_id)
///         .details(json!({ "method": "email" })),
/// )
/// .await?;
///
/// let query = AuditLogFilter { user_id: Some(user_id), ..Default::default() }.normalize()?;
/// let entries = AuditLog::query(&pool, &query).await?;
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::{fmt, str::FromStr};
use uuid::Uuid;

use super::clamp_page;

/// Recorded event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditAction {
    SignUp,
    SignIn,
    SignOut,
    OAuthSignIn,
    SessionRefresh,
    PasswordChange,
    PasswordResetRequest,
    PasswordReset,
    EmailVerify,
    PreferenceUpdate,
    RoleUpdate,
    ChangeCreate,
    ChangeStatusUpdate,
    ChangeDelete,
}

impl AuditAction {
    pub const ALL: [AuditAction; 14] = [
        AuditAction::SignUp,
        AuditAction::SignIn,
        AuditAction::SignOut,
        AuditAction::OAuthSignIn,
        AuditAction::SessionRefresh,
        AuditAction::PasswordChange,
        AuditAction::PasswordResetRequest,
        AuditAction::PasswordReset,
        AuditAction::EmailVerify,
        AuditAction::PreferenceUpdate,
        AuditAction::RoleUpdate,
        AuditAction::ChangeCreate,
        AuditAction::ChangeStatusUpdate,
        AuditAction::ChangeDelete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::SignUp => "user.sign_up",
            AuditAction::SignIn => "user.sign_in",
            AuditAction::SignOut => "user.sign_out",
            AuditAction::OAuthSignIn => "user.oauth_sign_in",
            AuditAction::SessionRefresh => "session.refresh",
            AuditAction::PasswordChange => "password.change",
            AuditAction::PasswordResetRequest => "password.reset_request",
            AuditAction::PasswordReset => "password.reset",
            AuditAction::EmailVerify => "email.verify",
            AuditAction::PreferenceUpdate => "preference.update",
            AuditAction::RoleUpdate => "role.update",
            AuditAction::ChangeCreate => "change.create",
            AuditAction::ChangeStatusUpdate => "change.status_update",
            AuditAction::ChangeDelete => "change.delete",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = AuditQueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AuditAction::ALL
            .iter()
            .copied()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| AuditQueryError::UnknownAction(s.to_string()))
    }
}

impl Serialize for AuditAction {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for AuditAction {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Error type for audit log queries
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuditQueryError {
    #[error("Unknown audit action: {0}")]
    UnknownAction(String),

    #[error("`since` must not be later than `until`")]
    InvalidRange,
}

/// Stored audit entry
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AuditLog {
    pub id: Uuid,

    /// Acting user; `None` for anonymous attempts or deleted users
    pub user_id: Option<Uuid>,

    /// Dotted action name, see [`AuditAction::as_str`]
    pub action: String,

    pub details: Value,
    pub success: bool,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Entry to append
#[derive(Debug, Clone)]
pub struct NewAuditLog {
    pub user_id: Option<Uuid>,
    pub action: AuditAction,
    pub details: Value,
    pub success: bool,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl NewAuditLog {
    /// Successful, anonymous entry with empty details
    pub fn new(action: AuditAction) -> Self {
        Self {
            user_id: None,
            action,
            details: Value::Object(Default::default()),
            success: true,
            ip_address: None,
            user_agent: None,
        }
    }

    pub fn user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    pub fn success(mut self, success: bool) -> Self {
        self.success = success;
        self
    }

    pub fn client(mut self, ip_address: Option<String>, user_agent: Option<String>) -> Self {
        self.ip_address = ip_address;
        self.user_agent = user_agent;
        self
    }
}

/// Filter as supplied by callers
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogFilter {
    pub user_id: Option<Uuid>,
    pub action: Option<AuditAction>,
    pub success: Option<bool>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Validated filter with concrete paging
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditLogQuery {
    pub user_id: Option<Uuid>,
    pub action: Option<AuditAction>,
    pub success: Option<bool>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

impl AuditLogFilter {
    /// Applies paging defaults and rejects an inverted time range
    pub fn normalize(self) -> Result<AuditLogQuery, AuditQueryError> {
        if let (Some(since), Some(until)) = (self.since, self.until) {
            if since > until {
                return Err(AuditQueryError::InvalidRange);
            }
        }

        let (limit, offset) = clamp_page(self.limit, self.offset);

        Ok(AuditLogQuery {
            user_id: self.user_id,
            action: self.action,
            success: self.success,
            since: self.since,
            until: self.until,
            limit,
            offset,
        })
    }
}

fn push_conditions(builder: &mut QueryBuilder<'_, Postgres>, query: &AuditLogQuery) {
    builder.push(" WHERE TRUE");

    if let Some(user_id) = query.user_id {
        builder.push(" AND user_id = ").push_bind(user_id);
    }
    if let Some(action) = query.action {
        builder.push(" AND action = ").push_bind(action.as_str());
    }
    if let Some(success) = query.success {
        builder.push(" AND success = ").push_bind(success);
    }
    if let Some(since) = query.since {
        builder.push(" AND created_at >= ").push_bind(since);
    }
    if let Some(until) = query.until {
        builder.push(" AND created_at <= ").push_bind(until);
    }
}

impl AuditLog {
    /// Appends an entry
    pub async fn record(pool: &PgPool, entry: NewAuditLog) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, AuditLog>(
            r#"
            INSERT INTO audit_logs (user_id, action, details, success, ip_address, user_agent)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, user_id, action, details, success, ip_address, user_agent, created_at
            "#,
        )
        .bind(entry.user_id)
        .bind(entry.action.as_str())
        .bind(entry.details)
        .bind(entry.success)
        .bind(entry.ip_address)
        .bind(entry.user_agent)
        .fetch_one(pool)
        .await
    }

    /// Entries matching `query`, newest first
    pub async fn query(pool: &PgPool, query: &AuditLogQuery) -> Result<Vec<Self>, sqlx::Error> {
        let mut builder = QueryBuilder::<Postgres>::new(
            "SELECT id, user_id, action, details, success, ip_address, user_agent, created_at FROM audit_logs",
        );
        push_conditions(&mut builder, query);
        builder
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(query.limit)
            .push(" OFFSET ")
            .push_bind(query.offset);

        builder.build_query_as::<AuditLog>().fetch_all(pool).await
    }

    /// Number of entries matching `query`, ignoring paging
    pub async fn count(pool: &PgPool, query: &AuditLogQuery) -> Result<i64, sqlx::Error> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM audit_logs");
        push_conditions(&mut builder, query);

        builder.build_query_scalar::<i64>().fetch_one(pool).await
    }
}
