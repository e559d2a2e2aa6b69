//! Out-of-band delivery of signup codes.
//!
//! The signup flow hands every freshly issued code to a [`Notifier`]. The
//! passcode core never calls it directly, so a delivery failure cannot leave
//! the code store half-updated; the caller decides what to do with the code.
//!
//! - [`LogNotifier`] logs the message instead of sending it (local dev).
//! - [`HttpNotifier`] posts the message as JSON to a mail relay.

mod http;

pub use http::HttpNotifier;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("mail relay rejected the message: {0}")]
    Rejected(String),
    #[error("mail relay unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid notifier configuration: {0}")]
    InvalidConfig(String),
}

/// A rendered code message.
#[derive(Clone, Debug)]
pub struct CodeMessage {
    pub to: String,
    pub subject: String,
    pub body: SecretString,
}

impl CodeMessage {
    /// Render the signup code email for `to`.
    #[must_use]
    pub fn signup(to: &str, code: &SecretString, validity_minutes: u64) -> Self {
        let body = format!(
            "Your one-time password for the HR Management System is: {}\n\n\
             This code is valid for {validity_minutes} minutes.\n\
             If you didn't request this, please ignore this email.\n",
            code.expose_secret()
        );
        Self {
            to: to.to_string(),
            subject: "Your OTP for HR Management System".to_string(),
            body: SecretString::from(body),
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver `code` to `identity`.
    async fn deliver(&self, identity: &str, code: &SecretString) -> Result<(), DeliveryError>;
}

/// Local dev notifier that logs instead of sending. The code itself is
/// written to the log so a developer can finish the flow.
#[derive(Clone, Debug, Default)]
pub struct LogNotifier {
    validity_minutes: u64,
}

impl LogNotifier {
    #[must_use]
    pub fn new(validity_minutes: u64) -> Self {
        Self { validity_minutes }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, identity: &str, code: &SecretString) -> Result<(), DeliveryError> {
        let message = CodeMessage::signup(identity, code, self.validity_minutes);
        info!(
            to = %message.to,
            subject = %message.subject,
            code = %code.expose_secret(),
            "notifier send stub"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signup_message_mentions_code_and_validity() {
        let code = SecretString::from("314159".to_string());
        let message = CodeMessage::signup("kim@example.com", &code, 10);
        assert_eq!(message.to, "kim@example.com");
        assert!(message.body.expose_secret().contains("314159"));
        assert!(message.body.expose_secret().contains("valid for 10 minutes"));
        assert!(!format!("{message:?}").contains("314159"));
    }

    #[tokio::test]
    async fn log_notifier_always_succeeds() {
        let notifier = LogNotifier::new(10);
        let code = SecretString::from("271828".to_string());
        assert!(notifier.deliver("lee@example.com", &code).await.is_ok());
    }
}
