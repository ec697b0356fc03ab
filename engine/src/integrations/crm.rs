// CRM client and its dispatch adapter

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tracing::info;

use super::IntegrationError;
use crate::config::CrmConfig;
use crate::workflows::dispatch::{DispatchError, ServiceAdapter};

/// REST client for the CRM. Every call is a single request; retries are
/// the caller's concern.
#[derive(Clone)]
pub struct CrmClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl CrmClient {
    pub fn new(config: &CrmConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, IntegrationError> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;
        Self::parse(response).await
    }

    async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Value, IntegrationError> {
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .query(query)
            .send()
            .await?;
        Self::parse(response).await
    }

    async fn parse(response: reqwest::Response) -> Result<Value, IntegrationError> {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(IntegrationError::Api {
                status: status.as_u16(),
                message: body,
            });
        }
        if body.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body).unwrap_or(Value::String(body)))
    }

    pub async fn create_contact(&self, contact: &Value) -> Result<Value, IntegrationError> {
        self.post("/v1/contacts", contact).await
    }

    pub async fn search_contact(&self, email: &str) -> Result<Value, IntegrationError> {
        self.get("/v1/contacts/search", &[("email", email)]).await
    }

    pub async fn add_label(
        &self,
        contact_id: &str,
        label: &str,
    ) -> Result<Value, IntegrationError> {
        self.post(
            &format!("/v1/contacts/{contact_id}/labels"),
            &json!({"label": label}),
        )
        .await
    }

    pub async fn create_task(&self, task: &Value) -> Result<Value, IntegrationError> {
        self.post("/v1/tasks", task).await
    }

    /// Create a label definition, treating "already exists" as success.
    pub async fn ensure_label(&self, name: &str) -> Result<(), IntegrationError> {
        match self.post("/v1/labels", &json!({"name": name})).await {
            Ok(_) => {
                info!(label = name, "label ensured");
                Ok(())
            }
            Err(IntegrationError::Api { status, .. })
                if status == StatusCode::CONFLICT.as_u16() =>
            {
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Create a custom field definition, treating "already exists" as
    /// success.
    pub async fn ensure_custom_field(&self, key: &str, kind: &str) -> Result<(), IntegrationError> {
        match self
            .post("/v1/custom-fields", &json!({"key": key, "kind": kind}))
            .await
        {
            Ok(_) => {
                info!(field = key, "custom field ensured");
                Ok(())
            }
            Err(IntegrationError::Api { status, .. })
                if status == StatusCode::CONFLICT.as_u16() =>
            {
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// Exposes the CRM client as the "crm" service.
pub struct CrmAdapter {
    client: CrmClient,
}

impl CrmAdapter {
    pub fn new(client: CrmClient) -> Self {
        Self { client }
    }
}

fn require_str<'a>(params: &'a Value, key: &str) -> Result<&'a str, DispatchError> {
    params
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| DispatchError::InvalidParams(format!("missing '{key}'")))
}

fn service_error(e: IntegrationError) -> DispatchError {
    DispatchError::Service {
        service: "crm".to_string(),
        message: e.to_string(),
    }
}

#[async_trait]
impl ServiceAdapter for CrmAdapter {
    fn service(&self) -> &str {
        "crm"
    }

    async fn call(&self, action: &str, params: &Value) -> Result<Value, DispatchError> {
        match action {
            "create_contact" => self
                .client
                .create_contact(params)
                .await
                .map_err(service_error),
            "search_contact" => {
                let email = require_str(params, "email")?;
                self.client
                    .search_contact(email)
                    .await
                    .map_err(service_error)
            }
            "add_label" => {
                let contact_id = require_str(params, "contact_id")?;
                let label = require_str(params, "label")?;
                self.client
                    .add_label(contact_id, label)
                    .await
                    .map_err(service_error)
            }
            "create_task" => self
                .client
                .create_task(params)
                .await
                .map_err(service_error),
            other => Err(DispatchError::UnknownAction(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> CrmClient {
        CrmClient::new(&CrmConfig {
            base_url: server.uri(),
            api_key: "test-key".to_string(),
        })
    }

    #[tokio::test]
    async fn create_contact_posts_and_returns_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/contacts"))
            .and(body_json(json!({"name": "Sam", "email": "sam@example.com"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "c-1"})))
            .mount(&server)
            .await;

        let out = client(&server)
            .create_contact(&json!({"name": "Sam", "email": "sam@example.com"}))
            .await
            .unwrap();
        assert_eq!(out["id"], "c-1");
    }

    #[tokio::test]
    async fn ensure_label_treats_conflict_as_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/labels"))
            .respond_with(ResponseTemplate::new(409).set_body_string("exists"))
            .mount(&server)
            .await;

        client(&server).ensure_label("lead-hot").await.unwrap();
    }

    #[tokio::test]
    async fn adapter_maps_unknown_action() {
        let server = MockServer::start().await;
        let adapter = CrmAdapter::new(client(&server));
        let err = adapter
            .call("delete_everything", &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::UnknownAction(_)));
    }

    #[tokio::test]
    async fn adapter_surfaces_api_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/contacts"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let adapter = CrmAdapter::new(client(&server));
        let err = adapter.call("create_contact", &json!({})).await.unwrap_err();
        assert!(matches!(err, DispatchError::Service { .. }));
    }
}
