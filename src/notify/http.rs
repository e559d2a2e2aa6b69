use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, error, instrument};
use url::Url;
use uuid::Uuid;

use super::{CodeMessage, DeliveryError, Notifier};

/// Posts code messages to a mail relay endpoint.
///
/// Payload: `{"message_id", "to", "subject", "body"}`. Any 2xx answer counts
/// as delivered.
#[derive(Debug)]
pub struct HttpNotifier {
    client: Client,
    url: Url,
    token: Option<SecretString>,
    validity_minutes: u64,
}

impl HttpNotifier {
    /// # Errors
    /// Returns an error if the URL is not http(s) or the client cannot be built.
    pub fn new(
        url: &str,
        token: Option<SecretString>,
        validity_minutes: u64,
    ) -> Result<Self, DeliveryError> {
        let url = Url::parse(url)
            .map_err(|err| DeliveryError::InvalidConfig(format!("invalid relay URL: {err}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(DeliveryError::InvalidConfig(format!(
                "unsupported relay URL scheme: {}",
                url.scheme()
            )));
        }

        let client = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            url,
            token,
            validity_minutes,
        })
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    #[instrument(skip(self, code), fields(relay = %self.url))]
    async fn deliver(&self, identity: &str, code: &SecretString) -> Result<(), DeliveryError> {
        let message = CodeMessage::signup(identity, code, self.validity_minutes);
        let message_id = Uuid::new_v4();

        let mut request = self.client.post(self.url.clone()).json(&json!({
            "message_id": message_id.to_string(),
            "to": message.to,
            "subject": message.subject,
            "body": message.body.expose_secret(),
        }));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            debug!(%message_id, "code delivered");
            Ok(())
        } else {
            error!(%message_id, "mail relay answered {status}");
            Err(DeliveryError::Rejected(status.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use axum::{
        extract::Extension,
        http::{HeaderMap, StatusCode},
        routing::post,
        Json, Router,
    };
    use serde_json::Value;
    use std::sync::Arc;
    use tokio::{net::TcpListener, sync::Mutex};

    type Captured = Arc<Mutex<Vec<(Option<String>, Value)>>>;

    async fn relay(status: StatusCode) -> Result<(String, Captured)> {
        let captured: Captured = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route(
                "/send",
                post(
                    move |Extension(captured): Extension<Captured>,
                          headers: HeaderMap,
                          Json(body): Json<Value>| async move {
                        let auth = headers
                            .get("authorization")
                            .and_then(|value| value.to_str().ok())
                            .map(ToString::to_string);
                        captured.lock().await.push((auth, body));
                        status
                    },
                ),
            )
            .layer(Extension(captured.clone()));

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, app.into_make_service()).await;
        });

        Ok((format!("http://{addr}/send"), captured))
    }

    #[test]
    fn rejects_non_http_urls() {
        assert!(matches!(
            HttpNotifier::new("ftp://relay.example.com", None, 10),
            Err(DeliveryError::InvalidConfig(_))
        ));
        assert!(matches!(
            HttpNotifier::new("not a url", None, 10),
            Err(DeliveryError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn posts_message_with_bearer_token() -> Result<()> {
        let (url, captured) = relay(StatusCode::ACCEPTED).await?;
        let notifier = HttpNotifier::new(&url, Some(SecretString::from("s3cret".to_string())), 10)?;

        notifier
            .deliver("mia@example.com", &SecretString::from("123789".to_string()))
            .await?;

        let captured = captured.lock().await;
        assert_eq!(captured.len(), 1);
        let (auth, body) = &captured[0];
        assert_eq!(auth.as_deref(), Some("Bearer s3cret"));
        assert_eq!(body["to"], "mia@example.com");
        assert!(body["body"].as_str().unwrap_or_default().contains("123789"));
        assert!(body["message_id"].as_str().is_some());
        Ok(())
    }

    #[tokio::test]
    async fn non_success_status_is_a_delivery_failure() -> Result<()> {
        let (url, _captured) = relay(StatusCode::SERVICE_UNAVAILABLE).await?;
        let notifier = HttpNotifier::new(&url, None, 10)?;

        let result = notifier
            .deliver("ned@example.com", &SecretString::from("555000".to_string()))
            .await;
        assert!(matches!(result, Err(DeliveryError::Rejected(_))));
        Ok(())
    }
}
