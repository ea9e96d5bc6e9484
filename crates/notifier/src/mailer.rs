//! Mail delivery backends.

use std::time::Duration;

use async_trait::async_trait;

use htb_common::config::MailConfig;
use htb_common::error::WatchError;

use crate::message::Notification;

/// Timeout for a single Mailgun request.
const MAILGUN_TIMEOUT: Duration = Duration::from_secs(10);

/// Trait for mail delivery backends.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Get the name of this backend.
    fn name(&self) -> &'static str;

    /// Deliver one notification.
    async fn send(&self, notification: &Notification) -> Result<(), WatchError>;
}

/// Mailgun HTTP API v3 backend.
pub struct MailgunMailer {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    from: String,
    to: String,
}

impl MailgunMailer {
    /// Build a mailer from config. Fails when the API key or domain is missing.
    pub fn from_config(config: &MailConfig) -> Result<Self, WatchError> {
        let (Some(api_key), Some(domain)) = (&config.api_key, &config.domain) else {
            return Err(WatchError::NotConfigured(
                "MAILGUN_API_KEY or MAILGUN_DOMAIN missing".to_string(),
            ));
        };

        let client = reqwest::Client::builder()
            .timeout(MAILGUN_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/{}/messages", config.api_url, domain),
            api_key: api_key.clone(),
            from: config.from.clone().unwrap_or_default(),
            to: config.to.clone().unwrap_or_default(),
        })
    }
}

#[async_trait]
impl Mailer for MailgunMailer {
    fn name(&self) -> &'static str {
        "mailgun"
    }

    async fn send(&self, notification: &Notification) -> Result<(), WatchError> {
        let form = [
            ("from", self.from.as_str()),
            ("to", self.to.as_str()),
            ("subject", notification.subject.as_str()),
            ("text", notification.body.as_str()),
        ];

        let response = self
            .client
            .post(&self.endpoint)
            .basic_auth("api", Some(&self.api_key))
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WatchError::status(status.as_u16(), &body));
        }

        tracing::info!(status = status.as_u16(), to = %self.to, "Mailgun accepted message");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn mail_config(api_url: &str) -> MailConfig {
        MailConfig {
            api_key: Some("key-123".to_string()),
            domain: Some("mg.example.com".to_string()),
            to: Some("me@example.com".to_string()),
            from: Some("watcher@mg.example.com".to_string()),
            api_url: api_url.to_string(),
        }
    }

    fn notification() -> Notification {
        Notification {
            subject: "HTB CBBH result: Certified".to_string(),
            body: "Exam: CBBH\nStatus: Certified\n".to_string(),
        }
    }

    #[test]
    fn test_requires_key_and_domain() {
        let mut config = mail_config("http://localhost");
        config.domain = None;
        assert!(matches!(
            MailgunMailer::from_config(&config),
            Err(WatchError::NotConfigured(_))
        ));
    }

    #[tokio::test]
    async fn test_send_posts_form_with_basic_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mg.example.com/messages"))
            .and(header("authorization", "Basic YXBpOmtleS0xMjM="))
            .and(body_string_contains("subject=HTB+CBBH+result%3A+Certified"))
            .and(body_string_contains("to=me%40example.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "<20261016.1@mg.example.com>",
                "message": "Queued. Thank you."
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mailer = MailgunMailer::from_config(&mail_config(&server.uri())).unwrap();
        mailer.send(&notification()).await.unwrap();
    }

    #[tokio::test]
    async fn test_send_surfaces_http_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Forbidden"))
            .mount(&server)
            .await;

        let mailer = MailgunMailer::from_config(&mail_config(&server.uri())).unwrap();
        let err = mailer.send(&notification()).await.unwrap_err();
        assert!(matches!(err, WatchError::Status { status: 401, .. }));
    }
}
