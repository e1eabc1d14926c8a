//! NLP entity-analysis adapter.
//!
//! Wraps a `documents:analyzeEntities` style endpoint. The credential rides
//! as a query parameter; the request body carries the document text.

use reqwest::Method;
use serde_json::{json, Value};

use seoforge_types::IntegrationResult;

use crate::client::{AuthPlacement, CallContext, IntegrationClient};
use crate::config::NlpSettings;

/// A recognized entity.
#[derive(Debug, Clone)]
pub struct Entity {
    pub name: String,
    pub entity_type: String,
    pub salience: f64,
    /// Number of mentions in the analyzed document.
    pub mentions: usize,
    pub metadata: Value,
}

/// Client for the NLP entity provider.
#[derive(Debug)]
pub struct NlpClient {
    client: IntegrationClient,
    api_version: String,
}

impl NlpClient {
    pub fn new(settings: &NlpSettings) -> IntegrationResult<Self> {
        Ok(Self {
            client: IntegrationClient::new(
                "nlp",
                &settings.provider,
                AuthPlacement::QueryParam("key"),
            )?,
            api_version: settings.api_version.clone(),
        })
    }

    pub fn available(&self) -> bool {
        self.client.available()
    }

    pub fn close(&self) {
        self.client.close();
    }

    /// Analyze `text` and return its entities ordered as the provider ranks
    /// them.
    pub async fn analyze_entities(&self, text: &str) -> IntegrationResult<Vec<Entity>> {
        let endpoint = format!("/{}/documents:analyzeEntities", self.api_version);
        let body = json!({
            "document": {"type": "PLAIN_TEXT", "content": text},
            "encodingType": "UTF8",
        });

        let response = self
            .client
            .request_json(
                Method::POST,
                &endpoint,
                Some(body),
                CallContext::items(text.len()),
            )
            .await?;

        let entities = response
            .get("entities")
            .and_then(Value::as_array)
            .map(|rows| rows.iter().map(parse_entity).collect())
            .unwrap_or_default();
        Ok(entities)
    }

    /// The `limit` highest-salience entities.
    pub async fn top_entities(
        &self,
        text: &str,
        limit: usize,
    ) -> IntegrationResult<Vec<Entity>> {
        let mut entities = self.analyze_entities(text).await?;
        entities.sort_by(|a, b| {
            b.salience
                .partial_cmp(&a.salience)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        entities.truncate(limit);
        Ok(entities)
    }
}

fn parse_entity(row: &Value) -> Entity {
    Entity {
        name: row
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        entity_type: row
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("UNKNOWN")
            .to_string(),
        salience: row.get("salience").and_then(Value::as_f64).unwrap_or(0.0),
        mentions: row
            .get("mentions")
            .and_then(Value::as_array)
            .map(|m| m.len())
            .unwrap_or(0),
        metadata: row.get("metadata").cloned().unwrap_or(Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderSettings;
    use seoforge_utils::{CircuitBreakerConfig, RetryPolicy};
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(server: &MockServer) -> NlpSettings {
        NlpSettings {
            provider: ProviderSettings {
                api_key: Some("nlp-key".to_string()),
                api_url: server.uri(),
                timeout: Duration::from_secs(5),
                retry: RetryPolicy {
                    max_retries: 1,
                    retry_delay: Duration::from_millis(1),
                    max_delay: Duration::from_millis(5),
                },
                breaker: CircuitBreakerConfig {
                    failure_threshold: 50,
                    recovery_timeout: Duration::from_secs(60),
                },
            },
            api_version: "v1".to_string(),
        }
    }

    #[tokio::test]
    async fn parses_entities_with_key_as_query_param() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/documents:analyzeEntities"))
            .and(query_param("key", "nlp-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "entities": [
                    {
                        "name": "coffee grinder",
                        "type": "CONSUMER_GOOD",
                        "salience": 0.61,
                        "mentions": [{}, {}],
                        "metadata": {"mid": "/m/abc"}
                    },
                    {"name": "kitchen", "type": "LOCATION", "salience": 0.2, "mentions": [{}]}
                ]
            })))
            .mount(&server)
            .await;

        let client = NlpClient::new(&settings(&server)).unwrap();
        let entities = client.analyze_entities("some page text").await.unwrap();
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].name, "coffee grinder");
        assert_eq!(entities[0].entity_type, "CONSUMER_GOOD");
        assert_eq!(entities[0].mentions, 2);

        let top = client.top_entities("some page text", 1).await.unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].name, "coffee grinder");
    }
}
