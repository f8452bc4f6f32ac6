/// Current-user endpoints
///
/// # Endpoints
///
/// - `GET /v1/me` - Profile
/// - `PATCH /v1/me` - Update name and avatar
/// - `GET /v1/me/preferences`
/// - `PATCH /v1/me/preferences` - Partial update
/// - `GET /v1/me/audit-logs` - Own audit trail, newest first

use crate::{
    app::AppState,
    audit,
    error::{ApiError, ApiResult},
    extract::{ApiJson, ApiQuery, RequestMeta, ValidatedJson},
};
use axum::{extract::State, Extension, Json};
use foundry_shared::{
    auth::middleware::AuthContext,
    models::{
        audit_log::{AuditAction, AuditLog, AuditLogFilter},
        preference::{UpdatePreference, UserPreference},
        user::{UpdateUser, User},
        Page,
    },
};
use reqwest::Url;
use serde::{Deserialize, Deserializer};
use serde_json::json;
use validator::Validate;

// Column widths in the users and user_preferences tables
const MAX_IMAGE_URL_LENGTH: usize = 1024;
const MAX_LANGUAGE_LENGTH: usize = 16;
const MAX_TIMEZONE_LENGTH: usize = 64;

/// Distinguishes an absent field from an explicit `null`
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: Option<String>,

    /// `null` removes the avatar
    #[serde(default, deserialize_with = "nullable")]
    pub image: Option<Option<String>>,
}

pub async fn get_profile(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<User>> {
    let user = User::find_by_id(&state.db, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    Ok(Json(user))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ValidatedJson(req): ValidatedJson<UpdateProfileRequest>,
) -> ApiResult<Json<User>> {
    let name = match req.name {
        Some(name) if name.trim().is_empty() => {
            return Err(ApiError::invalid_field("name", "Name must not be blank"));
        }
        other => other.map(|name| name.trim().to_string()),
    };

    if let Some(Some(image)) = &req.image {
        validate_image_url(image)?;
    }

    let user = User::update(
        &state.db,
        auth.user_id,
        UpdateUser {
            name,
            image: req.image,
        },
    )
    .await?
    .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    Ok(Json(user))
}

fn validate_image_url(image: &str) -> ApiResult<()> {
    if image.chars().count() > MAX_IMAGE_URL_LENGTH {
        return Err(ApiError::invalid_field(
            "image",
            format!("Image URL must be at most {} characters", MAX_IMAGE_URL_LENGTH),
        ));
    }

    Url::parse(image).map_err(|_| ApiError::invalid_field("image", "Image must be a URL"))?;
    Ok(())
}

pub async fn get_preferences(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<UserPreference>> {
    Ok(Json(UserPreference::get_or_default(&state.db, auth.user_id).await?))
}

fn validate_preferences(update: &UpdatePreference) -> ApiResult<()> {
    if let Some(language) = &update.language {
        if language.trim().is_empty() || language.chars().count() > MAX_LANGUAGE_LENGTH {
            return Err(ApiError::invalid_field(
                "language",
                format!("Language must be 1-{} characters", MAX_LANGUAGE_LENGTH),
            ));
        }
    }

    if let Some(timezone) = &update.timezone {
        if timezone.trim().is_empty() || timezone.chars().count() > MAX_TIMEZONE_LENGTH {
            return Err(ApiError::invalid_field(
                "timezone",
                format!("Timezone must be 1-{} characters", MAX_TIMEZONE_LENGTH),
            ));
        }
    }

    Ok(())
}

/// Partial update; fields left out keep their value
///
/// The role cannot be changed here.
pub async fn update_preferences(
    State(state): State<AppState>,
    meta: RequestMeta,
    Extension(auth): Extension<AuthContext>,
    ApiJson(update): ApiJson<UpdatePreference>,
) -> ApiResult<Json<UserPreference>> {
    validate_preferences(&update)?;

    if update.is_empty() {
        return Ok(Json(UserPreference::get_or_default(&state.db, auth.user_id).await?));
    }

    let changes = serde_json::to_value(&update)
        .map_err(|e| ApiError::InternalError(format!("Failed to encode preferences: {}", e)))?;
    let preferences = UserPreference::update(&state.db, auth.user_id, update).await?;

    audit::record(
        &state.db,
        audit::entry(AuditAction::PreferenceUpdate, &meta)
            .user(auth.user_id)
            .details(json!({ "changes": changes })),
    )
    .await;

    Ok(Json(preferences))
}

/// Own audit entries; `userId` in the query is ignored
pub async fn list_audit_logs(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiQuery(filter): ApiQuery<AuditLogFilter>,
) -> ApiResult<Json<Page<AuditLog>>> {
    let query = AuditLogFilter {
        user_id: Some(auth.user_id),
        ..filter
    }
    .normalize()?;

    let items = AuditLog::query(&state.db, &query).await?;
    let total = AuditLog::count(&state.db, &query).await?;

    Ok(Json(Page::new(items, total, query.limit, query.offset)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_null_vs_absent() {
        let req: UpdateProfileRequest = serde_json::from_value(json!({ "name": "Ada" })).unwrap();
        assert_eq!(req.image, None);

        let req: UpdateProfileRequest = serde_json::from_value(json!({ "image": null })).unwrap();
        assert_eq!(req.image, Some(None));

        let req: UpdateProfileRequest =
            serde_json::from_value(json!({ "image": "https://example.com/a.png" })).unwrap();
        assert_eq!(req.image, Some(Some("https://example.com/a.png".to_string())));
    }

    #[test]
    fn test_preference_validation() {
        let ok = UpdatePreference {
            language: Some("en-GB".to_string()),
            timezone: Some("Europe/London".to_string()),
            ..Default::default()
        };
        assert!(validate_preferences(&ok).is_ok());

        let blank = UpdatePreference {
            language: Some(" ".to_string()),
            ..Default::default()
        };
        assert!(validate_preferences(&blank).is_err());

        let long = UpdatePreference {
            timezone: Some("x".repeat(65)),
            ..Default::default()
        };
        assert!(validate_preferences(&long).is_err());

        let longest = UpdatePreference {
            language: Some("x".repeat(16)),
            ..Default::default()
        };
        assert!(validate_preferences(&longest).is_ok());

        let too_long = UpdatePreference {
            language: Some("x".repeat(17)),
            ..Default::default()
        };
        match validate_preferences(&too_long) {
            Err(ApiError::ValidationError(details)) => assert_eq!(details[0].field, "language"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_image_url_length() {
        let longest = format!("https://example.com/{}", "a".repeat(1024 - 20));
        assert_eq!(longest.len(), 1024);
        assert!(validate_image_url(&longest).is_ok());

        let too_long = format!("https://example.com/{}", "a".repeat(1005));
        assert_eq!(too_long.len(), 1025);
        match validate_image_url(&too_long) {
            Err(ApiError::ValidationError(details)) => assert_eq!(details[0].field, "image"),
            other => panic!("unexpected result: {:?}", other),
        }

        assert!(validate_image_url("not a url").is_err());
    }

    #[test]
    fn test_preference_update_is_camel_case() {
        let update: UpdatePreference =
            serde_json::from_value(json!({ "emailNotifications": false, "theme": "dark" })).unwrap();
        assert_eq!(update.email_notifications, Some(false));
        assert!(!update.is_empty());
    }
}
