/// Authentication endpoints
///
/// # Endpoints
///
/// Public:
/// - `POST /v1/auth/sign-up/email` - Create an account with email and password
/// - `POST /v1/auth/sign-in/email` - Sign in and get tokens
/// - `POST /v1/auth/refresh` - Rotate the refresh token, get a new access token
/// - `POST /v1/auth/forgot-password` - Mail a password reset link
/// - `POST /v1/auth/reset-password` - Set a new password with a reset token
/// - `POST /v1/auth/verify-email` - Confirm an email address
///
/// Authenticated:
/// - `POST /v1/auth/sign-out` - Revoke the current session
/// - `GET /v1/auth/session` - Current user, session and preferences
/// - `POST /v1/auth/change-password`
/// - `POST /v1/auth/send-verification-email`
///
/// Access tokens are short-lived JWTs naming a session. Refresh tokens are
/// opaque, stored hashed, and replaced on every refresh.

use crate::{
    app::AppState,
    audit,
    error::{ApiError, ApiResult},
    extract::{RequestMeta, ValidatedJson},
};
use axum::{extract::State, http::StatusCode, Extension, Json};
use chrono::{DateTime, Duration, Utc};
use foundry_shared::{
    auth::{
        jwt::{self, Claims},
        middleware::AuthContext,
        password::{hash_password, validate_password_strength, verify_password},
    },
    mail::verification_email,
    models::{
        account::{Account, CreateAccount},
        audit_log::AuditAction,
        normalize_email,
        preference::{Role, UserPreference},
        session::{CreateSession, Session},
        user::{CreateUser, User},
        verification::{Verification, VerificationPurpose},
    },
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use validator::Validate;

const INVALID_CREDENTIALS: &str = "Invalid email or password";

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SignUpRequest {
    #[validate(
        email(message = "Invalid email format"),
        length(max = 255, message = "Email must be at most 255 characters")
    )]
    pub email: String,

    /// Checked against the password policy after basic validation
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,

    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SignInRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    #[validate(length(min = 1, message = "Refresh token is required"))]
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ForgotPasswordRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    #[validate(length(min = 1, message = "Token is required"))]
    pub token: String,

    pub new_password: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct VerifyEmailRequest {
    #[validate(length(min = 1, message = "Token is required"))]
    pub token: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,

    pub new_password: String,

    /// Sign out every other session
    #[serde(default)]
    pub revoke_other_sessions: bool,
}

/// Tokens handed out on sign-up, sign-in, refresh and OAuth callback
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub user: User,
    pub access_token: String,
    pub refresh_token: String,

    /// Access token expiry; refresh before this
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub user: User,
    pub session: Session,
    pub preferences: UserPreference,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: &str) -> Json<Self> {
        Json(Self {
            message: message.to_string(),
        })
    }
}

fn check_password_policy(field: &str, password: &str) -> ApiResult<()> {
    validate_password_strength(password).map_err(|e| ApiError::invalid_field(field, e))
}

/// Signs an access token for `session` and bundles it with the refresh token
pub(crate) fn issue_tokens(
    state: &AppState,
    user: User,
    session: &Session,
    refresh_token: String,
) -> ApiResult<AuthResponse> {
    let claims = Claims::new(user.id, session.id, state.access_token_ttl());
    let access_token = jwt::create_token(&claims, state.jwt_secret())?;
    let expires_at = DateTime::<Utc>::from_timestamp(claims.exp, 0)
        .unwrap_or_else(|| Utc::now() + state.access_token_ttl());

    Ok(AuthResponse {
        user,
        access_token,
        refresh_token,
        expires_at,
    })
}

/// Opens a session for `user` and returns its tokens
pub(crate) async fn open_session(state: &AppState, user: User, meta: &RequestMeta) -> ApiResult<AuthResponse> {
    let (session, refresh_token) = Session::create(
        &state.db,
        CreateSession {
            user_id: user.id,
            ttl: state.session_ttl(),
            ip_address: meta.ip_address.clone(),
            user_agent: meta.user_agent.clone(),
        },
    )
    .await?;

    User::update_last_login(&state.db, user.id).await?;
    issue_tokens(state, user, &session, refresh_token)
}

/// Issues an email verification token and mails the link
async fn send_verification(state: &AppState, user: &User) -> ApiResult<()> {
    let ttl_hours = state.config.auth.email_verification_ttl_hours;
    let token = Verification::issue(
        &state.db,
        user.id,
        VerificationPurpose::EmailVerification,
        Duration::hours(ttl_hours),
    )
    .await?;

    let message = verification_email(&user.email, &state.config.api.base_url, &token, ttl_hours);
    state.mailer.send(message).await?;
    Ok(())
}

/// Sign up with email and password
///
/// Creates the user, its credential account and its preference record in
/// one transaction, then opens a session. Addresses listed in
/// `auth.admin_emails` get the admin role.
///
/// # Endpoint
///
/// ```text
/// POST /v1/auth/sign-up/email
/// Content-Type: application/json
///
/// {
///   "email": "ada@example.com",
///   "password": "SecureP@ss123",
///   "name": "Ada Lovelace"
/// }
/// ```
///
/// # Response (201)
///
/// ```json
/// {
///   "user": { "id": "uuid", "email": "ada@example.com", "name": "Ada Lovelace", "emailVerified": false, ... },
///   "accessToken": "eyJ...",
///   "refreshToken": "fds_...",
///   "expiresAt": "2025-01-01T00:15:00Z"
/// }
/// ```
///
/// # Errors
///
/// - `409 Conflict`: Email already registered
/// - `422 Unprocessable Entity`: Validation failed
pub async fn sign_up_email(
    State(state): State<AppState>,
    meta: RequestMeta,
    ValidatedJson(req): ValidatedJson<SignUpRequest>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    check_password_policy("password", &req.password)?;

    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::invalid_field("name", "Name must not be blank"));
    }

    let email = normalize_email(&req.email);
    let role = if state.config.auth.is_admin_email(&email) {
        Role::Admin
    } else {
        Role::User
    };
    let password_hash = hash_password(&req.password)?;

    let mut tx = state.db.begin().await?;

    let user = User::create(
        &mut *tx,
        CreateUser {
            email,
            name,
            email_verified: false,
            image: None,
        },
    )
    .await?;
    Account::create(&mut *tx, CreateAccount::credential(user.id, password_hash)).await?;
    UserPreference::create_default(&mut *tx, user.id, role).await?;

    let (session, refresh_token) = Session::create(
        &mut *tx,
        CreateSession {
            user_id: user.id,
            ttl: state.session_ttl(),
            ip_address: meta.ip_address.clone(),
            user_agent: meta.user_agent.clone(),
        },
    )
    .await?;

    tx.commit().await?;

    if let Err(e) = send_verification(&state, &user).await {
        tracing::warn!(user_id = %user.id, error = %e, "Failed to send verification email");
    }

    audit::record(
        &state.db,
        audit::entry(AuditAction::SignUp, &meta)
            .user(user.id)
            .details(json!({ "method": "email", "role": role })),
    )
    .await;

    tracing::info!(user_id = %user.id, role = %role, "User signed up");

    let response = issue_tokens(&state, user, &session, refresh_token)?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Sign in with email and password
///
/// Unknown emails and wrong passwords get the same 401. When
/// `auth.require_email_verification` is set, unverified users get 403.
pub async fn sign_in_email(
    State(state): State<AppState>,
    meta: RequestMeta,
    ValidatedJson(req): ValidatedJson<SignInRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let email = normalize_email(&req.email);
    let user = User::find_by_email(&state.db, &email).await?;

    let password_hash = match &user {
        Some(user) => Account::find_credential(&state.db, user.id)
            .await?
            .and_then(|account| account.password),
        None => None,
    };

    let password_ok = match &password_hash {
        Some(hash) => verify_password(&req.password, hash)?,
        None => false,
    };

    let user = match user {
        Some(user) if password_ok => user,
        user => {
            let mut entry = audit::entry(AuditAction::SignIn, &meta)
                .success(false)
                .details(json!({ "method": "email", "email": email, "reason": "invalid_credentials" }));
            if let Some(user) = &user {
                entry = entry.user(user.id);
            }
            audit::record(&state.db, entry).await;

            return Err(ApiError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        }
    };

    if state.config.auth.require_email_verification && !user.email_verified {
        audit::record(
            &state.db,
            audit::entry(AuditAction::SignIn, &meta)
                .user(user.id)
                .success(false)
                .details(json!({ "method": "email", "reason": "email_not_verified" })),
        )
        .await;

        return Err(ApiError::Forbidden("Email address is not verified".to_string()));
    }

    let user_id = user.id;
    let response = open_session(&state, user, &meta).await?;

    audit::record(
        &state.db,
        audit::entry(AuditAction::SignIn, &meta)
            .user(user_id)
            .details(json!({ "method": "email" })),
    )
    .await;

    tracing::info!(user_id = %user_id, "User signed in");

    Ok(Json(response))
}

/// Rotate the refresh token
///
/// The old refresh token stops working immediately.
pub async fn refresh(
    State(state): State<AppState>,
    meta: RequestMeta,
    ValidatedJson(req): ValidatedJson<RefreshRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let invalid = || ApiError::Unauthorized("Invalid or expired refresh token".to_string());

    let session = Session::find_active_by_token(&state.db, &req.refresh_token)
        .await?
        .ok_or_else(invalid)?;

    let (session, refresh_token) = Session::rotate(&state.db, session.id, state.session_ttl())
        .await?
        .ok_or_else(invalid)?;

    let user = User::find_by_id(&state.db, session.user_id)
        .await?
        .ok_or_else(invalid)?;

    audit::record(
        &state.db,
        audit::entry(AuditAction::SessionRefresh, &meta)
            .user(user.id)
            .details(json!({ "sessionId": session.id })),
    )
    .await;

    Ok(Json(issue_tokens(&state, user, &session, refresh_token)?))
}

/// Request a password reset link
///
/// Always answers 200 so callers cannot probe which emails are registered.
pub async fn forgot_password(
    State(state): State<AppState>,
    meta: RequestMeta,
    ValidatedJson(req): ValidatedJson<ForgotPasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    let email = normalize_email(&req.email);

    if let Some(user) = User::find_by_email(&state.db, &email).await? {
        if Account::find_credential(&state.db, user.id).await?.is_some() {
            let ttl_minutes = state.config.auth.password_reset_ttl_minutes;
            let token = Verification::issue(
                &state.db,
                user.id,
                VerificationPurpose::PasswordReset,
                Duration::minutes(ttl_minutes),
            )
            .await?;

            let message = foundry_shared::mail::password_reset_email(
                &user.email,
                &state.config.api.base_url,
                &token,
                ttl_minutes,
            );
            if let Err(e) = state.mailer.send(message).await {
                tracing::warn!(user_id = %user.id, error = %e, "Failed to send password reset email");
            }

            audit::record(
                &state.db,
                audit::entry(AuditAction::PasswordResetRequest, &meta).user(user.id),
            )
            .await;
        } else {
            tracing::debug!(user_id = %user.id, "Password reset requested for account without password");
        }
    }

    Ok(MessageResponse::new(
        "If an account exists for that email, a reset link has been sent",
    ))
}

/// Set a new password with a reset token
///
/// Every session of the user is revoked.
pub async fn reset_password(
    State(state): State<AppState>,
    meta: RequestMeta,
    ValidatedJson(req): ValidatedJson<ResetPasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    check_password_policy("newPassword", &req.new_password)?;

    let record = Verification::consume(&state.db, &req.token, VerificationPurpose::PasswordReset)
        .await?
        .ok_or_else(|| ApiError::BadRequest("Invalid or expired reset token".to_string()))?;

    let password_hash = hash_password(&req.new_password)?;

    let mut tx = state.db.begin().await?;
    if !Account::update_password(&mut *tx, record.user_id, &password_hash).await? {
        return Err(ApiError::BadRequest("Invalid or expired reset token".to_string()));
    }
    let revoked = Session::delete_for_user(&mut *tx, record.user_id).await?;
    tx.commit().await?;

    audit::record(
        &state.db,
        audit::entry(AuditAction::PasswordReset, &meta)
            .user(record.user_id)
            .details(json!({ "revokedSessions": revoked })),
    )
    .await;

    tracing::info!(user_id = %record.user_id, revoked, "Password reset");

    Ok(MessageResponse::new("Password has been reset"))
}

/// Confirm an email address with a verification token
pub async fn verify_email(
    State(state): State<AppState>,
    meta: RequestMeta,
    ValidatedJson(req): ValidatedJson<VerifyEmailRequest>,
) -> ApiResult<Json<MessageResponse>> {
    let record = Verification::consume(&state.db, &req.token, VerificationPurpose::EmailVerification)
        .await?
        .ok_or_else(|| ApiError::BadRequest("Invalid or expired verification token".to_string()))?;

    if !User::mark_email_verified(&state.db, record.user_id).await? {
        return Err(ApiError::NotFound("User not found".to_string()));
    }

    audit::record(
        &state.db,
        audit::entry(AuditAction::EmailVerify, &meta).user(record.user_id),
    )
    .await;

    Ok(MessageResponse::new("Email address verified"))
}

/// Revoke the current session
pub async fn sign_out(
    State(state): State<AppState>,
    meta: RequestMeta,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<StatusCode> {
    Session::delete(&state.db, auth.session_id).await?;

    audit::record(
        &state.db,
        audit::entry(AuditAction::SignOut, &meta).user(auth.user_id),
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_session(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<SessionResponse>> {
    let user = User::find_by_id(&state.db, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("User no longer exists".to_string()))?;

    let session = Session::find_active_by_id(&state.db, auth.session_id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Session expired or revoked".to_string()))?;

    let preferences = UserPreference::get_or_default(&state.db, auth.user_id).await?;

    Ok(Json(SessionResponse {
        user,
        session,
        preferences,
    }))
}

/// Change the password of a credential account
pub async fn change_password(
    State(state): State<AppState>,
    meta: RequestMeta,
    Extension(auth): Extension<AuthContext>,
    ValidatedJson(req): ValidatedJson<ChangePasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    check_password_policy("newPassword", &req.new_password)?;

    let current_hash = Account::find_credential(&state.db, auth.user_id)
        .await?
        .and_then(|account| account.password)
        .ok_or_else(|| ApiError::BadRequest("Account has no password set".to_string()))?;

    if !verify_password(&req.current_password, &current_hash)? {
        audit::record(
            &state.db,
            audit::entry(AuditAction::PasswordChange, &meta)
                .user(auth.user_id)
                .success(false),
        )
        .await;

        return Err(ApiError::BadRequest("Current password is incorrect".to_string()));
    }

    let password_hash = hash_password(&req.new_password)?;
    Account::update_password(&state.db, auth.user_id, &password_hash).await?;

    let revoked = if req.revoke_other_sessions {
        Session::delete_for_user_except(&state.db, auth.user_id, auth.session_id).await?
    } else {
        0
    };

    audit::record(
        &state.db,
        audit::entry(AuditAction::PasswordChange, &meta)
            .user(auth.user_id)
            .details(json!({ "revokedSessions": revoked })),
    )
    .await;

    Ok(MessageResponse::new("Password changed"))
}

/// Mail a fresh verification link to the current user
pub async fn send_verification_email(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<MessageResponse>> {
    let user = User::find_by_id(&state.db, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("User no longer exists".to_string()))?;

    if user.email_verified {
        return Err(ApiError::BadRequest("Email address is already verified".to_string()));
    }

    send_verification(&state, &user).await?;

    Ok(MessageResponse::new("Verification email sent"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_up_request_camel_case() {
        let req: SignUpRequest = serde_json::from_value(json!({
            "email": "ada@example.com",
            "password": "SecureP@ss123",
            "name": "Ada"
        }))
        .unwrap();
        assert!(req.validate().is_ok());

        let req: ChangePasswordRequest = serde_json::from_value(json!({
            "currentPassword": "old",
            "newPassword": "SecureP@ss123"
        }))
        .unwrap();
        assert!(!req.revoke_other_sessions);
    }

    #[test]
    fn test_sign_up_validation() {
        let req = SignUpRequest {
            email: "not-an-email".to_string(),
            password: String::new(),
            name: String::new(),
        };

        let errors = req.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("email"));
        assert!(fields.contains_key("password"));
        assert!(fields.contains_key("name"));
    }

    #[test]
    fn test_sign_up_rejects_overlong_email() {
        let req = SignUpRequest {
            email: format!("{}@{}.example.com", "a".repeat(64), "b".repeat(200)),
            password: "SecureP@ss123".to_string(),
            name: "Ada".to_string(),
        };

        let errors = req.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("email"));
    }

    #[test]
    fn test_password_policy_reports_field() {
        match check_password_policy("newPassword", "short") {
            Err(ApiError::ValidationError(details)) => assert_eq!(details[0].field, "newPassword"),
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(check_password_policy("password", "SecureP@ss123").is_ok());
    }
}
