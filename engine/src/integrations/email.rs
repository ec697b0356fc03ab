// Transactional email client and its dispatch adapter

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use super::IntegrationError;
use crate::config::EmailConfig;
use crate::workflows::dispatch::{DispatchError, ServiceAdapter};

#[derive(Debug, Serialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html_body: String,
    pub track_opens: bool,
    pub track_clicks: bool,
}

/// Client for the transactional email provider's HTTP API.
#[derive(Clone)]
pub struct EmailClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    from_email: String,
    from_name: String,
}

impl EmailClient {
    pub fn new(config: &EmailConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            from_email: config.from_email.clone(),
            from_name: config.from_name.clone(),
        }
    }

    pub async fn send(&self, message: &EmailMessage) -> Result<Value, IntegrationError> {
        if message.to.is_empty() {
            return Err(IntegrationError::InvalidRequest(
                "recipient address is empty".to_string(),
            ));
        }

        let body = serde_json::json!({
            "from": {"email": self.from_email, "name": self.from_name},
            "to": message.to,
            "subject": message.subject,
            "html_body": message.html_body,
            "track_opens": message.track_opens,
            "track_clicks": message.track_clicks,
        });

        let response = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(IntegrationError::Api {
                status: status.as_u16(),
                message: text,
            });
        }

        info!(to = %message.to, subject = %message.subject, "email accepted by provider");
        Ok(serde_json::from_str(&text).unwrap_or(Value::Null))
    }
}

/// Exposes the email client as the "email" service with a single "send"
/// action.
pub struct EmailAdapter {
    client: EmailClient,
}

impl EmailAdapter {
    pub fn new(client: EmailClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ServiceAdapter for EmailAdapter {
    fn service(&self) -> &str {
        "email"
    }

    async fn call(&self, action: &str, params: &Value) -> Result<Value, DispatchError> {
        if action != "send" {
            return Err(DispatchError::UnknownAction(action.to_string()));
        }

        let field =
            |key: &str| params.get(key).and_then(Value::as_str).map(str::to_string);
        let message = EmailMessage {
            to: field("to")
                .ok_or_else(|| DispatchError::InvalidParams("missing 'to'".to_string()))?,
            subject: field("subject").unwrap_or_default(),
            html_body: field("html_body").unwrap_or_default(),
            track_opens: params
                .get("track_opens")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            track_clicks: params
                .get("track_clicks")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        };

        self.client
            .send(&message)
            .await
            .map_err(|e| DispatchError::Service {
                service: "email".to_string(),
                message: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> EmailClient {
        EmailClient::new(&EmailConfig {
            base_url: server.uri(),
            api_key: "test-key".to_string(),
            from_email: "hello@leadline.test".to_string(),
            from_name: "Leadline Builders".to_string(),
        })
    }

    #[tokio::test]
    async fn send_posts_message_with_tracking_flags() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(json!({
                "to": "sam@example.com",
                "track_opens": true,
                "track_clicks": true,
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "msg-1"})))
            .mount(&server)
            .await;

        let out = client(&server)
            .send(&EmailMessage {
                to: "sam@example.com".to_string(),
                subject: "Welcome".to_string(),
                html_body: "<p>Hi</p>".to_string(),
                track_opens: true,
                track_clicks: true,
            })
            .await
            .unwrap();
        assert_eq!(out["id"], "msg-1");
    }

    #[tokio::test]
    async fn adapter_rejects_missing_recipient() {
        let server = MockServer::start().await;
        let adapter = EmailAdapter::new(client(&server));
        let err = adapter
            .call("send", &json!({"subject": "no recipient"}))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidParams(_)));
    }

    #[tokio::test]
    async fn provider_failure_becomes_service_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(502).set_body_string("upstream down"))
            .mount(&server)
            .await;

        let adapter = EmailAdapter::new(client(&server));
        let err = adapter
            .call("send", &json!({"to": "sam@example.com"}))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Service { .. }));
    }
}
