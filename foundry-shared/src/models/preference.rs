/// Per-user preferences
///
/// Besides UI settings the record carries the user's authorization [`Role`].
/// Users without a record get [`UserPreference::default_for`].
///
/// # Schema
///
/// ```sql
/// CREATE TABLE user_preferences (
///     user_id UUID PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
///     role user_role NOT NULL DEFAULT 'user',
///     theme ui_theme NOT NULL DEFAULT 'system',
///     email_notifications BOOLEAN NOT NULL DEFAULT TRUE,
///     language VARCHAR(16) NOT NULL DEFAULT 'en',
///     timezone VARCHAR(64) NOT NULL DEFAULT 'UTC',
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

/// Authorization roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Manages users, roles and change requests
    Admin,

    #[default]
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }

    /// Checks if this role has the permission level of `required`
    ///
    /// Hierarchy: Admin > User
    pub fn has_permission(&self, required: &Role) -> bool {
        self.level() >= required.level()
    }

    fn level(&self) -> u8 {
        match self {
            Role::Admin => 2,
            Role::User => 1,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// UI color scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "ui_theme", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    System,
}

pub const DEFAULT_LANGUAGE: &str = "en";
pub const DEFAULT_TIMEZONE: &str = "UTC";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UserPreference {
    pub user_id: Uuid,
    pub role: Role,
    pub theme: Theme,
    pub email_notifications: bool,

    /// BCP 47 language tag
    pub language: String,

    /// IANA zone name
    pub timezone: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial update; the role is changed only through [`UserPreference::set_role`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePreference {
    pub theme: Option<Theme>,
    pub email_notifications: Option<bool>,
    pub language: Option<String>,
    pub timezone: Option<String>,
}

impl UpdatePreference {
    pub fn is_empty(&self) -> bool {
        self.theme.is_none()
            && self.email_notifications.is_none()
            && self.language.is_none()
            && self.timezone.is_none()
    }
}

impl UserPreference {
    /// In-memory defaults for a user without a stored record
    pub fn default_for(user_id: Uuid) -> Self {
        let now = Utc::now();

        Self {
            user_id,
            role: Role::default(),
            theme: Theme::default(),
            email_notifications: true,
            language: DEFAULT_LANGUAGE.to_string(),
            timezone: DEFAULT_TIMEZONE.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Inserts the default record with the given role
    pub async fn create_default<'e, E>(executor: E, user_id: Uuid, role: Role) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, UserPreference>(
            r#"
            INSERT INTO user_preferences (user_id, role)
            VALUES ($1, $2)
            RETURNING user_id, role, theme, email_notifications, language, timezone,
                      created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(role)
        .fetch_one(executor)
        .await
    }

    pub async fn find_by_user(pool: &PgPool, user_id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, UserPreference>(
            r#"
            SELECT user_id, role, theme, email_notifications, language, timezone,
                   created_at, updated_at
            FROM user_preferences
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    /// Stored record, or [`UserPreference::default_for`] when there is none
    pub async fn get_or_default(pool: &PgPool, user_id: Uuid) -> Result<Self, sqlx::Error> {
        Ok(Self::find_by_user(pool, user_id)
            .await?
            .unwrap_or_else(|| Self::default_for(user_id)))
    }

    /// Applies `data`, creating the record from defaults if needed
    pub async fn update(pool: &PgPool, user_id: Uuid, data: UpdatePreference) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, UserPreference>(
            r#"
            INSERT INTO user_preferences (user_id, theme, email_notifications, language, timezone)
            VALUES (
                $1,
                COALESCE($2, 'system'::ui_theme),
                COALESCE($3, TRUE),
                COALESCE($4, 'en'),
                COALESCE($5, 'UTC')
            )
            ON CONFLICT (user_id) DO UPDATE
            SET theme = COALESCE($2, user_preferences.theme),
                email_notifications = COALESCE($3, user_preferences.email_notifications),
                language = COALESCE($4, user_preferences.language),
                timezone = COALESCE($5, user_preferences.timezone),
                updated_at = NOW()
            RETURNING user_id, role, theme, email_notifications, language, timezone,
                      created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(data.theme)
        .bind(data.email_notifications)
        .bind(data.language)
        .bind(data.timezone)
        .fetch_one(pool)
        .await
    }

    /// Role of `user_id`, [`Role::User`] when no record exists
    pub async fn get_role(pool: &PgPool, user_id: Uuid) -> Result<Role, sqlx::Error> {
        let role: Option<Role> =
            sqlx::query_scalar("SELECT role FROM user_preferences WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(pool)
                .await?;

        Ok(role.unwrap_or_default())
    }

    /// Sets the role, creating the record from defaults if needed
    pub async fn set_role(pool: &PgPool, user_id: Uuid, role: Role) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, UserPreference>(
            r#"
            INSERT INTO user_preferences (user_id, role)
            VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE
            SET role = EXCLUDED.role, updated_at = NOW()
            RETURNING user_id, role, theme, email_notifications, language, timezone,
                      created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(role)
        .fetch_one(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_hierarchy() {
        assert!(Role::Admin.has_permission(&Role::User));
        assert!(Role::Admin.has_permission(&Role::Admin));
        assert!(Role::User.has_permission(&Role::User));
        assert!(!Role::User.has_permission(&Role::Admin));
    }

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"admin\"");
        assert_eq!(serde_json::from_str::<Role>("\"user\"").unwrap(), Role::User);
        assert!(serde_json::from_str::<Role>("\"owner\"").is_err());
        assert_eq!(Role::Admin.to_string(), "admin");
    }

    #[test]
    fn test_default_preferences() {
        let user_id = Uuid::new_v4();
        let prefs = UserPreference::default_for(user_id);

        assert_eq!(prefs.user_id, user_id);
        assert_eq!(prefs.role, Role::User);
        assert_eq!(prefs.theme, Theme::System);
        assert!(prefs.email_notifications);
        assert_eq!(prefs.language, "en");
        assert_eq!(prefs.timezone, "UTC");
    }

    #[test]
    fn test_preferences_serialize_camel_case() {
        let json = serde_json::to_value(UserPreference::default_for(Uuid::new_v4())).unwrap();
        assert_eq!(json["emailNotifications"], true);
        assert_eq!(json["theme"], "system");
        assert!(json.get("userId").is_some());
    }

    #[test]
    fn test_update_is_empty() {
        assert!(UpdatePreference::default().is_empty());
        assert!(!UpdatePreference {
            theme: Some(Theme::Dark),
            ..Default::default()
        }
        .is_empty());
    }
}
