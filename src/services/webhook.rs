use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use crate::error::NodeError;

/// Webhook transport boundary: POST a JSON payload, return the HTTP status.
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn post_json(&self, url: &str, payload: &Value) -> Result<u16, NodeError>;
}

/// reqwest-backed transport with a bounded request timeout.
pub struct HttpWebhookTransport {
    client: reqwest::Client,
}

impl HttpWebhookTransport {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

impl Default for HttpWebhookTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WebhookTransport for HttpWebhookTransport {
    async fn post_json(&self, url: &str, payload: &Value) -> Result<u16, NodeError> {
        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| NodeError::HttpError(e.to_string()))?;
        Ok(response.status().as_u16())
    }
}
