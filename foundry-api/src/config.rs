/// Configuration management for the API server
///
/// Settings are layered, later sources winning:
///
/// 1. Built-in defaults
/// 2. `foundry.toml` in the working directory (optional; `FOUNDRY_CONFIG`
///    points elsewhere)
/// 3. `FOUNDRY_`-prefixed environment variables, `__` separating sections,
///    e.g. `FOUNDRY_API__PORT=9000` or `FOUNDRY_AUTH__ADMIN_EMAILS=a@x.io,b@x.io`
/// 4. `DATABASE_URL` and `JWT_SECRET`
///
/// A `.env` file is loaded into the environment first when present.
///
/// # Example
///
/// ```no_run
/// use foundry_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::load()?;
/// println!("Server will listen on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use config::{Environment, File, FileFormat};
use foundry_shared::{
    auth::oauth::{OAuthError, OAuthProvider, OAuthProviderConfig},
    db::DatabaseConfig,
};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, env};

/// Minimum JWT secret length
pub const MIN_SECRET_LENGTH: usize = 32;

const DEFAULT_CONFIG_FILE: &str = "foundry.toml";

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub auth: AuthConfig,
    pub oauth: OAuthConfig,
    pub mail: MailConfig,
    pub dev_mode: DevModeConfig,
    pub logging: LoggingConfig,
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,

    /// Allowed origins; `*` allows any origin
    pub cors_origins: Vec<String>,

    /// Enables HSTS
    pub production: bool,

    /// Public URL of the web app, used for links in emails
    pub base_url: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            cors_origins: vec!["http://localhost:3000".to_string()],
            production: false,
            base_url: "http://localhost:3000".to_string(),
        }
    }
}

/// JWT configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JwtConfig {
    /// Secret key for JWT signing
    ///
    /// Must be at least 32 bytes. Generate with: `openssl rand -hex 32`
    pub secret: String,

    pub access_token_ttl_minutes: i64,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            access_token_ttl_minutes: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Lifetime of a refresh session
    pub session_ttl_days: i64,

    /// Reject email/password sign-in until the address is verified
    pub require_email_verification: bool,

    /// Addresses that get the admin role when they sign up
    pub admin_emails: Vec<String>,

    pub password_reset_ttl_minutes: i64,
    pub email_verification_ttl_hours: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_days: 30,
            require_email_verification: false,
            admin_emails: Vec::new(),
            password_reset_ttl_minutes: 60,
            email_verification_ttl_hours: 24,
        }
    }
}

impl AuthConfig {
    pub fn is_admin_email(&self, email: &str) -> bool {
        self.admin_emails
            .iter()
            .any(|admin| admin.trim().eq_ignore_ascii_case(email.trim()))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    /// Providers keyed by the id used in `/v1/auth/oauth/:provider`
    pub providers: HashMap<String, OAuthProviderConfig>,

    /// Where the browser is sent after a successful callback, with the tokens
    /// in the URL fragment. When unset the callback answers with JSON.
    pub success_redirect: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    /// Log message bodies (which contain tokens); development only
    pub log_bodies: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DevModeConfig {
    /// Mounts `/v1/dev/changes`
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directives; `RUST_LOG` takes precedence
    pub filter: String,

    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info,foundry_api=debug,tower_http=debug".to_string(),
            json: false,
        }
    }
}

impl Config {
    /// Loads configuration from `.env`, `foundry.toml` and the environment
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be parsed or the result fails
    /// [`Config::validate`].
    pub fn load() -> anyhow::Result<Self> {
        // Load .env file if present (for development)
        dotenvy::dotenv().ok();

        let path = env::var("FOUNDRY_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());

        let settings = config::Config::builder()
            .add_source(File::new(&path, FileFormat::Toml).required(false))
            .add_source(
                Environment::with_prefix("FOUNDRY")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("api.cors_origins")
                    .with_list_parse_key("auth.admin_emails"),
            )
            .set_override_option("database.url", env::var("DATABASE_URL").ok())?
            .set_override_option("jwt.secret", env::var("JWT_SECRET").ok())?
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parses a TOML document on top of the defaults, without consulting the environment
    pub fn from_toml(toml: &str) -> anyhow::Result<Self> {
        let config: Config = config::Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Checks settings that would otherwise fail at request time
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database.url.trim().is_empty() {
            anyhow::bail!("database.url (or DATABASE_URL) is required");
        }

        if self.jwt.secret.len() < MIN_SECRET_LENGTH {
            anyhow::bail!(
                "jwt.secret (or JWT_SECRET) must be at least {} characters long",
                MIN_SECRET_LENGTH
            );
        }

        if self.jwt.access_token_ttl_minutes <= 0 || self.auth.session_ttl_days <= 0 {
            anyhow::bail!("token lifetimes must be positive");
        }

        if self.auth.password_reset_ttl_minutes <= 0 || self.auth.email_verification_ttl_hours <= 0 {
            anyhow::bail!("verification token lifetimes must be positive");
        }

        Url::parse(&self.api.base_url)
            .map_err(|e| anyhow::anyhow!("api.base_url is not a valid URL: {}", e))?;

        if let Some(redirect) = &self.oauth.success_redirect {
            Url::parse(redirect)
                .map_err(|e| anyhow::anyhow!("oauth.success_redirect is not a valid URL: {}", e))?;
        }

        self.oauth_providers()?;
        Ok(())
    }

    /// Resolves every configured OAuth provider
    pub fn oauth_providers(&self) -> Result<HashMap<String, OAuthProvider>, OAuthError> {
        self.oauth
            .providers
            .iter()
            .map(|(id, settings)| Ok((id.clone(), OAuthProvider::from_config(id, settings)?)))
            .collect()
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [database]
        url = "postgres://localhost/foundry"

        [jwt]
        secret = "test-secret-key-at-least-32-bytes-long"
    "#;

    #[test]
    fn test_defaults_fill_missing_sections() {
        let config = Config::from_toml(MINIMAL).unwrap();

        assert_eq!(config.bind_address(), "0.0.0.0:8080");
        assert_eq!(config.jwt.access_token_ttl_minutes, 15);
        assert_eq!(config.auth.session_ttl_days, 30);
        assert_eq!(config.database.max_connections, 10);
        assert!(!config.dev_mode.enabled);
        assert!(config.oauth.providers.is_empty());
    }

    #[test]
    fn test_rejects_short_secret() {
        let err = Config::from_toml(
            r#"
            [database]
            url = "postgres://localhost/foundry"

            [jwt]
            secret = "short"
            "#,
        )
        .unwrap_err();

        assert!(err.to_string().contains("jwt.secret"));
    }

    #[test]
    fn test_rejects_missing_database_url() {
        let err = Config::from_toml(
            r#"
            [jwt]
            secret = "test-secret-key-at-least-32-bytes-long"
            "#,
        )
        .unwrap_err();

        assert!(err.to_string().contains("database.url"));
    }

    #[test]
    fn test_oauth_providers_resolved() {
        let toml = format!(
            r#"{}
            [oauth.providers.github]
            client_id = "id"
            client_secret = "secret"
            redirect_url = "http://localhost:8080/v1/auth/oauth/github/callback"
            "#,
            MINIMAL
        );
        let config = Config::from_toml(&toml).unwrap();
        let providers = config.oauth_providers().unwrap();
        assert!(providers.contains_key("github"));
    }

    #[test]
    fn test_generic_provider_without_endpoints_rejected() {
        let toml = format!(
            r#"{}
            [oauth.providers.acme]
            client_id = "id"
            client_secret = "secret"
            redirect_url = "http://localhost:8080/v1/auth/oauth/acme/callback"
            "#,
            MINIMAL
        );
        assert!(Config::from_toml(&toml).is_err());
    }

    #[test]
    fn test_admin_emails_case_insensitive() {
        let auth = AuthConfig {
            admin_emails: vec!["Root@Example.com".to_string()],
            ..Default::default()
        };
        assert!(auth.is_admin_email("root@example.com"));
        assert!(!auth.is_admin_email("user@example.com"));
    }
}
