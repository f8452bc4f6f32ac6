/// OAuth 2.0 sign-in (authorization-code flow)
///
/// Providers are configured by id (`google`, `github`, or any generic OIDC
/// provider with explicit endpoints). The flow:
///
/// 1. [`OAuthProvider::authorization_url`] builds the redirect with a signed
///    `state` from [`create_state`] (10 minutes, bound to the provider id).
/// 2. The callback checks `state` with [`verify_state`], trades the `code`
///    with [`OAuthProvider::exchange_code`], then loads the user with
///    [`OAuthProvider::fetch_profile`].
///
/// Linking profiles to local users happens in the API layer.

use chrono::{Duration, Utc};
use reqwest::{header, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::jwt::{self, JwtError};

/// Audience of `state` tokens
pub const STATE_AUDIENCE: &str = "foundry-oauth-state";

/// Lifetime of a `state` token
pub const STATE_TTL_MINUTES: i64 = 10;

const USER_AGENT: &str = concat!("foundry/", env!("CARGO_PKG_VERSION"));

/// Error type for OAuth operations
#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    /// No provider configured under this id
    #[error("Unknown OAuth provider: {0}")]
    UnknownProvider(String),

    /// Provider configuration is incomplete
    #[error("OAuth provider misconfigured: {0}")]
    Misconfigured(String),

    /// `state` failed validation
    #[error("Invalid OAuth state: {0}")]
    InvalidState(String),

    /// `state` was issued for another provider
    #[error("OAuth state was issued for a different provider")]
    StateMismatch,

    /// Transport failure talking to the provider
    #[error("OAuth provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider refused the authorization code
    #[error("OAuth token exchange failed: {0}")]
    TokenExchange(String),

    /// Profile payload lacked required fields
    #[error("Invalid OAuth profile: {0}")]
    InvalidProfile(String),

    /// Provider did not disclose an email address
    #[error("OAuth provider did not return an email address")]
    MissingEmail,
}

/// Built-in provider families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Google,
    Github,
    /// Any OIDC-style provider; endpoints must be configured
    Generic,
}

/// Provider settings as read from configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthProviderConfig {
    /// Inferred from the provider id (`google`, `github`) when absent
    #[serde(default)]
    pub kind: Option<ProviderKind>,

    pub client_id: String,
    pub client_secret: String,

    /// Callback URL registered with the provider
    pub redirect_url: String,

    #[serde(default)]
    pub authorize_url: Option<String>,

    #[serde(default)]
    pub token_url: Option<String>,

    #[serde(default)]
    pub userinfo_url: Option<String>,

    #[serde(default)]
    pub scopes: Option<Vec<String>>,
}

/// Resolved provider with concrete endpoints
#[derive(Debug, Clone)]
pub struct OAuthProvider {
    pub id: String,
    pub kind: ProviderKind,
    client_id: String,
    client_secret: String,
    redirect_url: String,
    authorize_url: String,
    token_url: String,
    userinfo_url: String,
    scopes: Vec<String>,
}

/// Normalised profile returned by any provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthProfile {
    /// Stable user id at the provider
    pub provider_account_id: String,
    pub email: Option<String>,
    pub email_verified: bool,
    pub name: Option<String>,
    pub image: Option<String>,
}

/// Claims carried by the `state` parameter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateClaims {
    pub provider: String,
    pub nonce: String,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GithubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

impl ProviderKind {
    /// Built-in kind matching a provider id, if any
    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "google" => Some(ProviderKind::Google),
            "github" => Some(ProviderKind::Github),
            _ => None,
        }
    }

    fn default_endpoints(&self) -> Option<(&'static str, &'static str, &'static str)> {
        match self {
            ProviderKind::Google => Some((
                "https://accounts.google.com/o/oauth2/v2/auth",
                "https://oauth2.googleapis.com/token",
                "https://openidconnect.googleapis.com/v1/userinfo",
            )),
            ProviderKind::Github => Some((
                "https://github.com/login/oauth/authorize",
                "https://github.com/login/oauth/access_token",
                "https://api.github.com/user",
            )),
            ProviderKind::Generic => None,
        }
    }

    fn default_scopes(&self) -> Vec<String> {
        let scopes: &[&str] = match self {
            ProviderKind::Github => &["read:user", "user:email"],
            ProviderKind::Google | ProviderKind::Generic => &["openid", "email", "profile"],
        };
        scopes.iter().map(|s| s.to_string()).collect()
    }
}

impl OAuthProvider {
    /// Resolves configured endpoints, falling back to the provider defaults
    pub fn from_config(id: &str, config: &OAuthProviderConfig) -> Result<Self, OAuthError> {
        let kind = config
            .kind
            .or_else(|| ProviderKind::from_id(id))
            .unwrap_or(ProviderKind::Generic);
        let defaults = kind.default_endpoints();

        let pick = |configured: &Option<String>, default: Option<&str>, name: &str| {
            configured
                .clone()
                .or_else(|| default.map(str::to_string))
                .ok_or_else(|| OAuthError::Misconfigured(format!("{}: missing {}", id, name)))
        };

        let authorize_url = pick(&config.authorize_url, defaults.map(|d| d.0), "authorize_url")?;
        let token_url = pick(&config.token_url, defaults.map(|d| d.1), "token_url")?;
        let userinfo_url = pick(&config.userinfo_url, defaults.map(|d| d.2), "userinfo_url")?;

        if config.client_id.is_empty() || config.client_secret.is_empty() {
            return Err(OAuthError::Misconfigured(format!("{}: missing client credentials", id)));
        }

        Ok(Self {
            id: id.to_string(),
            kind,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_url: config.redirect_url.clone(),
            authorize_url,
            token_url,
            userinfo_url,
            scopes: config
                .scopes
                .clone()
                .unwrap_or_else(|| kind.default_scopes()),
        })
    }

    /// URL the browser is redirected to for consent
    pub fn authorization_url(&self, state: &str) -> Result<Url, OAuthError> {
        let scope = self.scopes.join(" ");

        Url::parse_with_params(
            &self.authorize_url,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_url.as_str()),
                ("response_type", "code"),
                ("scope", scope.as_str()),
                ("state", state),
            ],
        )
        .map_err(|e| OAuthError::Misconfigured(format!("{}: bad authorize_url: {}", self.id, e)))
    }

    /// Trades an authorization code for a provider access token
    pub async fn exchange_code(&self, http: &reqwest::Client, code: &str) -> Result<String, OAuthError> {
        let response: TokenResponse = http
            .post(&self.token_url)
            .header(header::ACCEPT, "application/json")
            .header(header::USER_AGENT, USER_AGENT)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.redirect_url.as_str()),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await?
            .json()
            .await?;

        // GitHub reports failures with 200 and an `error` field
        if let Some(error) = response.error {
            let description = response.error_description.unwrap_or_default();
            return Err(OAuthError::TokenExchange(format!("{} {}", error, description).trim().to_string()));
        }

        response
            .access_token
            .ok_or_else(|| OAuthError::TokenExchange("response had no access_token".to_string()))
    }

    /// Loads and normalises the signed-in user's profile
    pub async fn fetch_profile(&self, http: &reqwest::Client, access_token: &str) -> Result<OAuthProfile, OAuthError> {
        let payload: Value = http
            .get(&self.userinfo_url)
            .bearer_auth(access_token)
            .header(header::USER_AGENT, USER_AGENT)
            .header(header::ACCEPT, "application/json")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let mut profile = parse_profile(self.kind, &payload)?;

        if self.kind == ProviderKind::Github && !profile.email_verified {
            match self.github_primary_email(http, access_token).await {
                Ok(Some(email)) => {
                    profile.email = Some(email);
                    profile.email_verified = true;
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "Could not load GitHub email addresses"),
            }
        }

        Ok(profile)
    }

    async fn github_primary_email(
        &self,
        http: &reqwest::Client,
        access_token: &str,
    ) -> Result<Option<String>, OAuthError> {
        let emails: Vec<GithubEmail> = http
            .get("https://api.github.com/user/emails")
            .bearer_auth(access_token)
            .header(header::USER_AGENT, USER_AGENT)
            .header(header::ACCEPT, "application/json")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(emails
            .into_iter()
            .find(|e| e.primary && e.verified)
            .map(|e| e.email))
    }
}

/// Maps a provider userinfo payload onto [`OAuthProfile`]
pub fn parse_profile(kind: ProviderKind, payload: &Value) -> Result<OAuthProfile, OAuthError> {
    let text = |key: &str| {
        payload
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    match kind {
        ProviderKind::Github => {
            let id = match payload.get("id") {
                Some(Value::Number(n)) => n.to_string(),
                Some(Value::String(s)) if !s.is_empty() => s.clone(),
                _ => return Err(OAuthError::InvalidProfile("missing id".to_string())),
            };

            Ok(OAuthProfile {
                provider_account_id: id,
                email: text("email"),
                email_verified: false,
                name: text("name").or_else(|| text("login")),
                image: text("avatar_url"),
            })
        }
        ProviderKind::Google | ProviderKind::Generic => {
            let id = text("sub").ok_or_else(|| OAuthError::InvalidProfile("missing sub".to_string()))?;

            let email_verified = match payload.get("email_verified") {
                Some(Value::Bool(b)) => *b,
                Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
                _ => false,
            };

            Ok(OAuthProfile {
                provider_account_id: id,
                email: text("email"),
                email_verified,
                name: text("name"),
                image: text("picture"),
            })
        }
    }
}

/// Creates a signed `state` value for `provider`
pub fn create_state(provider: &str, secret: &str) -> Result<String, JwtError> {
    let (nonce, _) = super::token::generate_token("");
    let now = Utc::now();

    let claims = StateClaims {
        provider: provider.to_string(),
        nonce,
        iss: jwt::ISSUER.to_string(),
        aud: STATE_AUDIENCE.to_string(),
        iat: now.timestamp(),
        exp: (now + Duration::minutes(STATE_TTL_MINUTES)).timestamp(),
    };

    jwt::sign(&claims, secret)
}

/// Validates a `state` value and checks it belongs to `provider`
pub fn verify_state(state: &str, provider: &str, secret: &str) -> Result<StateClaims, OAuthError> {
    let claims: StateClaims = jwt::verify(state, secret, STATE_AUDIENCE)
        .map_err(|e| OAuthError::InvalidState(e.to_string()))?;

    if claims.provider != provider {
        return Err(OAuthError::StateMismatch);
    }

    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SECRET: &str = "test-secret-key-at-least-32-bytes-long";

    fn github_config() -> OAuthProviderConfig {
        OAuthProviderConfig {
            kind: None,
            client_id: "client-123".to_string(),
            client_secret: "shh".to_string(),
            redirect_url: "http://localhost:8080/v1/auth/oauth/github/callback".to_string(),
            authorize_url: None,
            token_url: None,
            userinfo_url: None,
            scopes: None,
        }
    }

    #[test]
    fn test_builtin_defaults_are_used() {
        let provider = OAuthProvider::from_config("github", &github_config()).unwrap();
        assert_eq!(provider.kind, ProviderKind::Github);
        assert_eq!(provider.token_url, "https://github.com/login/oauth/access_token");
        assert_eq!(provider.scopes, vec!["read:user", "user:email"]);
    }

    #[test]
    fn test_generic_provider_requires_endpoints() {
        let mut config = github_config();
        config.kind = Some(ProviderKind::Generic);

        let err = OAuthProvider::from_config("acme", &config).unwrap_err();
        assert!(matches!(err, OAuthError::Misconfigured(msg) if msg.contains("authorize_url")));

        config.authorize_url = Some("https://id.acme.test/authorize".to_string());
        config.token_url = Some("https://id.acme.test/token".to_string());
        config.userinfo_url = Some("https://id.acme.test/userinfo".to_string());
        assert!(OAuthProvider::from_config("acme", &config).is_ok());
    }

    #[test]
    fn test_missing_client_credentials() {
        let mut config = github_config();
        config.client_secret.clear();
        assert!(OAuthProvider::from_config("github", &config).is_err());
    }

    #[test]
    fn test_authorization_url_parameters() {
        let provider = OAuthProvider::from_config("github", &github_config()).unwrap();
        let url = provider.authorization_url("state-value").unwrap();

        assert_eq!(url.host_str(), Some("github.com"));
        let params: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(params["client_id"], "client-123");
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["scope"], "read:user user:email");
        assert_eq!(params["state"], "state-value");
        assert_eq!(
            params["redirect_uri"],
            "http://localhost:8080/v1/auth/oauth/github/callback"
        );
    }

    #[test]
    fn test_state_round_trip() {
        let state = create_state("google", SECRET).unwrap();
        let claims = verify_state(&state, "google", SECRET).unwrap();
        assert_eq!(claims.provider, "google");
        assert_eq!(claims.aud, STATE_AUDIENCE);
    }

    #[test]
    fn test_state_for_other_provider_is_rejected() {
        let state = create_state("google", SECRET).unwrap();
        assert!(matches!(
            verify_state(&state, "github", SECRET),
            Err(OAuthError::StateMismatch)
        ));
        assert!(matches!(
            verify_state(&state, "google", "a-completely-different-secret-value"),
            Err(OAuthError::InvalidState(_))
        ));
    }

    #[test]
    fn test_access_token_is_not_a_valid_state() {
        let claims = jwt::Claims::new(uuid::Uuid::new_v4(), uuid::Uuid::new_v4(), Duration::minutes(5));
        let token = jwt::create_token(&claims, SECRET).unwrap();
        assert!(matches!(
            verify_state(&token, "google", SECRET),
            Err(OAuthError::InvalidState(_))
        ));
    }

    #[test]
    fn test_parse_google_profile() {
        let profile = parse_profile(
            ProviderKind::Google,
            &json!({
                "sub": "1099",
                "email": "ada@example.com",
                "email_verified": true,
                "name": "Ada Lovelace",
                "picture": "https://example.com/ada.png"
            }),
        )
        .unwrap();

        assert_eq!(profile.provider_account_id, "1099");
        assert_eq!(profile.email.as_deref(), Some("ada@example.com"));
        assert!(profile.email_verified);
        assert_eq!(profile.image.as_deref(), Some("https://example.com/ada.png"));
    }

    #[test]
    fn test_parse_github_profile_falls_back_to_login() {
        let profile = parse_profile(
            ProviderKind::Github,
            &json!({ "id": 583231, "login": "octocat", "name": null, "email": null }),
        )
        .unwrap();

        assert_eq!(profile.provider_account_id, "583231");
        assert_eq!(profile.name.as_deref(), Some("octocat"));
        assert!(profile.email.is_none());
        assert!(!profile.email_verified);
    }

    #[test]
    fn test_parse_generic_string_verified_flag() {
        let profile = parse_profile(
            ProviderKind::Generic,
            &json!({ "sub": "u1", "email": "x@example.com", "email_verified": "true" }),
        )
        .unwrap();
        assert!(profile.email_verified);
    }

    #[test]
    fn test_parse_profile_without_id() {
        assert!(parse_profile(ProviderKind::Google, &json!({ "email": "a@b.c" })).is_err());
        assert!(parse_profile(ProviderKind::Github, &json!({ "login": "x" })).is_err());
    }
}
