// Dispatch table - maps (service, action) pairs to outbound adapters

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("unknown action '{0}'")]
    UnknownAction(String),
    #[error("{service} call failed: {message}")]
    Service { service: String, message: String },
    #[error("invalid params: {0}")]
    InvalidParams(String),
}

/// An outbound adapter for one external service. Implementations build the
/// request, make the call, and error on a non-success status; they do not
/// deduplicate side effects across retries.
#[async_trait]
pub trait ServiceAdapter: Send + Sync {
    fn service(&self) -> &str;
    async fn call(&self, action: &str, params: &Value) -> Result<Value, DispatchError>;
}

/// Pluggable registry of adapters keyed by service name.
///
/// Unknown (service, action) pairs degrade to a `{skipped: true}` result
/// instead of an error, so definitions authored with forward-looking steps
/// still run on engines that haven't wired every adapter.
#[derive(Default)]
pub struct DispatchTable {
    adapters: HashMap<String, Arc<dyn ServiceAdapter>>,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: Arc<dyn ServiceAdapter>) {
        self.adapters.insert(adapter.service().to_string(), adapter);
    }

    pub fn with(mut self, adapter: Arc<dyn ServiceAdapter>) -> Self {
        self.register(adapter);
        self
    }

    pub async fn dispatch(
        &self,
        service: &str,
        action: &str,
        params: &Value,
    ) -> Result<Value, DispatchError> {
        let Some(adapter) = self.adapters.get(service) else {
            return Ok(json!({
                "skipped": true,
                "reason": format!("no adapter registered for service '{service}'"),
            }));
        };
        match adapter.call(action, params).await {
            Err(DispatchError::UnknownAction(unknown)) => Ok(json!({
                "skipped": true,
                "reason": format!("service '{service}' has no action '{unknown}'"),
            })),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoAdapter;

    #[async_trait]
    impl ServiceAdapter for EchoAdapter {
        fn service(&self) -> &str {
            "echo"
        }

        async fn call(&self, action: &str, params: &Value) -> Result<Value, DispatchError> {
            match action {
                "say" => Ok(json!({"said": params.clone()})),
                other => Err(DispatchError::UnknownAction(other.to_string())),
            }
        }
    }

    #[tokio::test]
    async fn unknown_service_and_action_degrade_to_skipped() {
        let table = DispatchTable::new().with(Arc::new(EchoAdapter));

        let missing_service = table.dispatch("nope", "x", &json!({})).await.unwrap();
        assert_eq!(missing_service["skipped"], json!(true));

        let missing_action = table.dispatch("echo", "shout", &json!({})).await.unwrap();
        assert_eq!(missing_action["skipped"], json!(true));

        let ok = table.dispatch("echo", "say", &json!("hi")).await.unwrap();
        assert_eq!(ok, json!({"said": "hi"}));
    }
}
