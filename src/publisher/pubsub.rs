use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::publisher::{PublishError, Publisher};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublishResponse {
    #[serde(default)]
    message_ids: Vec<String>,
}

/// Publishes through the Pub/Sub REST API. Works unauthenticated against the
/// Pub/Sub emulator or an authenticating sidecar proxy.
pub struct PubsubPublisher {
    client: Client,
    endpoint: String,
    project: String,
}

impl PubsubPublisher {
    pub fn new(endpoint: String, project: String, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            project,
        })
    }

    /// Short topic names are scoped to the configured project.
    fn topic_path(&self, topic: &str) -> String {
        if topic.starts_with("projects/") {
            topic.to_string()
        } else {
            format!("projects/{}/topics/{}", self.project, topic)
        }
    }
}

#[async_trait]
impl Publisher for PubsubPublisher {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<String, PublishError> {
        let url = format!("{}/v1/{}:publish", self.endpoint, self.topic_path(topic));
        let body = json!({ "messages": [{ "data": STANDARD.encode(payload) }] });

        debug!(url = %url, bytes = payload.len(), "Publishing to Pub/Sub");

        let transport = |source| PublishError::Transport {
            topic: topic.to_string(),
            source,
        };

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(transport)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read response body".to_string());
            return Err(PublishError::Rejected {
                topic: topic.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let parsed: PublishResponse = resp.json().await.map_err(transport)?;
        parsed
            .message_ids
            .into_iter()
            .next()
            .ok_or_else(|| PublishError::MissingMessageId(topic.to_string()))
    }

    fn name(&self) -> &str {
        "pubsub"
    }
}
