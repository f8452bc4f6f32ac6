/// Outgoing email
///
/// The API only talks to the [`Mailer`] trait. [`LogMailer`] is the built-in
/// implementation: it writes each message through `tracing`, which is enough
/// for development and for deployments that relay logs to a mail pipeline.
///
/// # Example
///
/// ```
/// use foundry_shared::mail::{password_reset_email, LogMailer, Mailer};
///
/// # async fn example() -> Result<(), foundry_shared::mail::MailError> {
/// let mailer = LogMailer::default();
/// let message = password_reset_email("ada@example.com", "http://localhost:3000", "fdv_abc", 30);
/// mailer.send(message).await?;
/// # Ok(())
/// # }
/// ```

use async_trait::async_trait;
use serde::Serialize;

/// Error type for mail delivery
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("Mail delivery failed: {0}")]
    Delivery(String),
}

/// A plain-text message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Delivery seam for transactional email
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: EmailMessage) -> Result<(), MailError>;
}

/// Logs messages instead of delivering them
#[derive(Debug, Clone, Default)]
pub struct LogMailer {
    /// Include the body (which carries tokens) in the log line
    pub include_body: bool,
}

impl LogMailer {
    pub fn new(include_body: bool) -> Self {
        Self { include_body }
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: EmailMessage) -> Result<(), MailError> {
        if !message.to.contains('@') {
            return Err(MailError::InvalidRecipient(message.to));
        }

        if self.include_body {
            tracing::info!(to = %message.to, subject = %message.subject, body = %message.body, "Email sent");
        } else {
            tracing::info!(to = %message.to, subject = %message.subject, "Email sent");
        }

        Ok(())
    }
}

fn link(base_url: &str, path: &str, token: &str) -> String {
    format!("{}/{}?token={}", base_url.trim_end_matches('/'), path, token)
}

/// Password reset message pointing at `{base_url}/reset-password?token=...`
pub fn password_reset_email(to: &str, base_url: &str, token: &str, ttl_minutes: i64) -> EmailMessage {
    EmailMessage {
        to: to.to_string(),
        subject: "Reset your password".to_string(),
        body: format!(
            "Someone asked to reset the password for this account.\n\n\
             Open this link to choose a new password (valid for {} minutes):\n{}\n\n\
             If this wasn't you, ignore this email.",
            ttl_minutes,
            link(base_url, "reset-password", token)
        ),
    }
}

/// Verification message pointing at `{base_url}/verify-email?token=...`
pub fn verification_email(to: &str, base_url: &str, token: &str, ttl_hours: i64) -> EmailMessage {
    EmailMessage {
        to: to.to_string(),
        subject: "Verify your email address".to_string(),
        body: format!(
            "Confirm your email address by opening this link (valid for {} hours):\n{}",
            ttl_hours,
            link(base_url, "verify-email", token)
        ),
    }
}
