//! Publish/subscribe hand-off between services.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, instrument};

use refinery_shared::{RefineryError, Result};

use crate::auth::TokenSource;
use crate::event::encode_message;

/// Publishes JSON messages to a named topic.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Returns the message id assigned by the bus.
    async fn publish(&self, topic: &str, message: &Value) -> Result<String>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublishResponse {
    #[serde(default)]
    message_ids: Vec<String>,
}

/// Google Cloud Pub/Sub over REST.
pub struct PubSubPublisher {
    client: Client,
    endpoint: String,
    project: String,
    tokens: Arc<TokenSource>,
}

impl PubSubPublisher {
    pub fn new(client: Client, endpoint: &str, project: &str, tokens: Arc<TokenSource>) -> Self {
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            project: project.to_string(),
            tokens,
        }
    }

    fn topic_url(&self, topic: &str) -> String {
        format!(
            "{}/v1/projects/{}/topics/{topic}:publish",
            self.endpoint, self.project
        )
    }
}

#[async_trait]
impl Publisher for PubSubPublisher {
    #[instrument(skip_all, fields(topic = %topic))]
    async fn publish(&self, topic: &str, message: &Value) -> Result<String> {
        let body = json!({ "messages": [{ "data": encode_message(message) }] });
        let token = self.tokens.token().await?;

        let response = self
            .client
            .post(self.topic_url(topic))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| RefineryError::Network(format!("publish to {topic}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(RefineryError::api(status.as_u16(), text));
        }

        let parsed: PublishResponse = response
            .json()
            .await
            .map_err(|e| RefineryError::parse(format!("publish response: {e}")))?;

        let id = parsed
            .message_ids
            .into_iter()
            .next()
            .ok_or_else(|| RefineryError::Storage(format!("no message id from {topic}")))?;
        debug!(topic, message_id = %id, "published");
        Ok(id)
    }
}

/// Keeps published messages in memory.
#[derive(Default)]
pub struct MemoryPublisher {
    sent: Mutex<Vec<(String, Value)>>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything published so far, oldest first.
    pub fn messages(&self) -> Vec<(String, Value)> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Publisher for MemoryPublisher {
    async fn publish(&self, topic: &str, message: &Value) -> Result<String> {
        let mut sent = self
            .sent
            .lock()
            .map_err(|_| RefineryError::Storage("memory publisher poisoned".into()))?;
        sent.push((topic.to_string(), message.clone()));
        debug!(topic, "recorded message");
        Ok(format!("memory-{}", sent.len()))
    }
}
