/// OAuth sign-in
///
/// # Endpoints
///
/// - `GET /v1/auth/oauth/:provider` - Redirect (303) to the provider's consent page
/// - `GET /v1/auth/oauth/:provider/callback?code&state` - Finish sign-in
///
/// The `state` parameter is a short-lived signed token naming the provider,
/// so no server-side storage is needed between the two requests.
///
/// On callback the provider account is looked up first. Failing that, an
/// existing user with the same email is linked, but only when the provider
/// vouches for the address. Otherwise a new user is created.

use crate::{
    app::AppState,
    audit,
    error::{ApiError, ApiResult},
    extract::{ApiPath, ApiQuery, RequestMeta},
    routes::auth::{open_session, AuthResponse},
};
use axum::{
    extract::State,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use foundry_shared::{
    auth::oauth::{create_state, verify_state, OAuthError, OAuthProfile},
    models::{
        account::{Account, CreateAccount},
        audit_log::AuditAction,
        normalize_email,
        preference::{Role, UserPreference},
        user::{CreateUser, User},
    },
};
use reqwest::Url;
use serde::Deserialize;
use serde_json::json;

/// Query parameters sent back by the provider
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Start the authorization-code flow
pub async fn authorize(
    State(state): State<AppState>,
    ApiPath(provider_id): ApiPath<String>,
) -> ApiResult<Redirect> {
    let provider = state.oauth_provider(&provider_id)?;
    let oauth_state = create_state(&provider_id, state.jwt_secret())?;
    let url = provider.authorization_url(&oauth_state)?;

    tracing::debug!(provider = %provider_id, "Redirecting to OAuth provider");

    Ok(Redirect::to(url.as_str()))
}

/// Finish the authorization-code flow and open a session
///
/// Answers with the same body as email sign-in, or redirects to
/// `oauth.success_redirect` with the tokens in the URL fragment when that
/// is configured.
pub async fn callback(
    State(state): State<AppState>,
    meta: RequestMeta,
    ApiPath(provider_id): ApiPath<String>,
    ApiQuery(query): ApiQuery<CallbackQuery>,
) -> ApiResult<Response> {
    let provider = state.oauth_provider(&provider_id)?;

    if let Some(error) = query.error {
        let description = query.error_description.unwrap_or_default();
        tracing::info!(provider = %provider_id, error = %error, "OAuth provider reported an error");
        return Err(ApiError::BadRequest(format!(
            "Authorization failed: {} {}",
            error, description
        )
        .trim_end()
        .to_string()));
    }

    let code = query
        .code
        .ok_or_else(|| ApiError::BadRequest("Missing authorization code".to_string()))?;
    let oauth_state = query
        .state
        .ok_or_else(|| OAuthError::InvalidState("missing".to_string()))?;

    verify_state(&oauth_state, &provider_id, state.jwt_secret())?;

    let access_token = provider.exchange_code(&state.http, &code).await?;
    let profile = provider.fetch_profile(&state.http, &access_token).await?;

    let (user, created) = link_or_create_user(&state, &provider_id, profile).await?;
    let user_id = user.id;
    let response = open_session(&state, user, &meta).await?;

    audit::record(
        &state.db,
        audit::entry(AuditAction::OAuthSignIn, &meta)
            .user(user_id)
            .details(json!({ "provider": provider_id, "newUser": created })),
    )
    .await;

    tracing::info!(user_id = %user_id, provider = %provider_id, created, "OAuth sign-in");

    match &state.config.oauth.success_redirect {
        Some(target) => {
            let url = success_redirect_url(target, &response)?;
            Ok(Redirect::to(url.as_str()).into_response())
        }
        None => Ok(Json(response).into_response()),
    }
}

/// Appends the tokens to `target` as a URL fragment
fn success_redirect_url(target: &str, response: &AuthResponse) -> ApiResult<Url> {
    let mut url = Url::parse(target)
        .map_err(|e| ApiError::InternalError(format!("Invalid oauth.success_redirect: {}", e)))?;

    // Reuse the query serializer to form-encode the fragment
    let mut encoder = url.clone();
    encoder.query_pairs_mut().clear().extend_pairs([
        ("accessToken", response.access_token.as_str()),
        ("refreshToken", response.refresh_token.as_str()),
        ("expiresAt", response.expires_at.to_rfc3339().as_str()),
    ]);
    let fragment = encoder.query().unwrap_or_default().to_string();

    url.set_fragment(Some(&fragment));
    Ok(url)
}

// Same bounds as profile updates
const MAX_NAME_LENGTH: usize = 100;
const MAX_IMAGE_URL_LENGTH: usize = 1024;

/// Name and avatar for a new user, fitted to the profile limits
fn display_fields(profile: &OAuthProfile, email: &str) -> (String, Option<String>) {
    let name = profile
        .name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| email.split('@').next().unwrap_or_default())
        .chars()
        .take(MAX_NAME_LENGTH)
        .collect();

    let image = profile
        .image
        .clone()
        .filter(|url| url.chars().count() <= MAX_IMAGE_URL_LENGTH);

    (name, image)
}

/// Finds or creates the user behind an OAuth profile; `true` when created
async fn link_or_create_user(
    state: &AppState,
    provider_id: &str,
    profile: OAuthProfile,
) -> ApiResult<(User, bool)> {
    if let Some(account) =
        Account::find_by_provider(&state.db, provider_id, &profile.provider_account_id).await?
    {
        let user = User::find_by_id(&state.db, account.user_id)
            .await?
            .ok_or_else(|| ApiError::InternalError(format!("Account {} has no user", account.id)))?;
        return Ok((user, false));
    }

    let email = profile
        .email
        .as_deref()
        .map(normalize_email)
        .ok_or(OAuthError::MissingEmail)?;

    if let Some(mut existing) = User::find_by_email(&state.db, &email).await? {
        if !profile.email_verified {
            return Err(ApiError::Conflict(
                "An account with this email already exists; sign in to it first".to_string(),
            ));
        }

        Account::create(
            &state.db,
            CreateAccount::oauth(existing.id, provider_id, &profile.provider_account_id),
        )
        .await?;

        if !existing.email_verified {
            User::mark_email_verified(&state.db, existing.id).await?;
            existing.email_verified = true;
        }

        tracing::info!(user_id = %existing.id, provider = %provider_id, "Linked OAuth account to existing user");
        return Ok((existing, false));
    }

    let (name, image) = display_fields(&profile, &email);

    // An unverified address could belong to someone else
    let role = if profile.email_verified && state.config.auth.is_admin_email(&email) {
        Role::Admin
    } else {
        Role::User
    };

    let mut tx = state.db.begin().await?;

    let user = User::create(
        &mut *tx,
        CreateUser {
            email,
            name,
            email_verified: profile.email_verified,
            image,
        },
    )
    .await?;
    Account::create(
        &mut *tx,
        CreateAccount::oauth(user.id, provider_id, &profile.provider_account_id),
    )
    .await?;
    UserPreference::create_default(&mut *tx, user.id, role).await?;

    tx.commit().await?;

    Ok((user, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    #[test]
    fn test_success_redirect_carries_tokens_in_fragment() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 15, 0).unwrap();
        let response = AuthResponse {
            user: User {
                id: Uuid::new_v4(),
                email: "ada@example.com".to_string(),
                name: "Ada".to_string(),
                email_verified: true,
                image: None,
                created_at: now,
                updated_at: now,
                last_login_at: None,
            },
            access_token: "a.b.c".to_string(),
            refresh_token: "fds_xyz".to_string(),
            expires_at: now,
        };

        let url = success_redirect_url("https://app.example.com/auth/callback?next=%2Fhome", &response).unwrap();
        assert_eq!(url.query(), Some("next=%2Fhome"));
        assert_eq!(
            url.fragment(),
            Some("accessToken=a.b.c&refreshToken=fds_xyz&expiresAt=2025-01-01T00%3A15%3A00%2B00%3A00")
        );

        assert!(success_redirect_url("not a url", &response).is_err());
    }

    #[test]
    fn test_display_fields_fit_profile_limits() {
        let mut profile = OAuthProfile {
            provider_account_id: "42".to_string(),
            email: Some("ada@example.com".to_string()),
            email_verified: true,
            name: Some(format!("  {}  ", "n".repeat(150))),
            image: Some(format!("https://example.com/{}", "a".repeat(1100))),
        };

        let (name, image) = display_fields(&profile, "ada@example.com");
        assert_eq!(name.chars().count(), 100);
        assert_eq!(image, None);

        profile.name = Some("   ".to_string());
        profile.image = Some("https://example.com/ada.png".to_string());
        let (name, image) = display_fields(&profile, "ada@example.com");
        assert_eq!(name, "ada");
        assert_eq!(image.as_deref(), Some("https://example.com/ada.png"));
    }
}
