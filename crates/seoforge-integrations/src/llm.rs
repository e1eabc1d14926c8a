//! LLM completion adapter.
//!
//! The model is a black box `complete(prompt) → text` service. The adapter
//! returns a result struct rather than an error so callers can branch on
//! `success` without try/catch at every call site; only configuration
//! problems surface as errors at construction time.

use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, warn};

use seoforge_types::IntegrationResult;

use crate::client::{AuthPlacement, CallContext, IntegrationClient};
use crate::config::LlmSettings;

/// Outcome of one completion call.
#[derive(Debug, Clone, Default)]
pub struct CompletionOutcome {
    pub success: bool,
    pub text: Option<String>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub error: Option<String>,
}

impl CompletionOutcome {
    fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// Client for the LLM completion provider.
#[derive(Debug)]
pub struct LlmClient {
    client: IntegrationClient,
    model: String,
}

impl LlmClient {
    pub fn new(settings: &LlmSettings) -> IntegrationResult<Self> {
        Ok(Self {
            client: IntegrationClient::new(
                "llm",
                &settings.provider,
                AuthPlacement::Header("x-api-key"),
            )?,
            model: settings.model.clone(),
        })
    }

    pub fn available(&self) -> bool {
        self.client.available()
    }

    pub fn close(&self) {
        self.client.close();
    }

    /// Request a completion. Failures are folded into the outcome struct.
    pub async fn complete(
        &self,
        user_prompt: &str,
        system_prompt: Option<&str>,
        max_tokens: u32,
        temperature: f32,
    ) -> CompletionOutcome {
        let mut body = json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "temperature": temperature,
            "messages": [{"role": "user", "content": user_prompt}],
        });
        if let Some(system) = system_prompt {
            body["system"] = Value::String(system.to_string());
        }

        let response = match self
            .client
            .request_json(Method::POST, "/messages", Some(body), CallContext::default())
            .await
        {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "completion call failed");
                return CompletionOutcome::failed(err.to_string());
            }
        };

        let text = response
            .get("content")
            .and_then(Value::as_array)
            .map(|blocks| {
                blocks
                    .iter()
                    .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
                    .filter_map(|b| b.get("text").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join("")
            })
            .filter(|t| !t.is_empty());

        let Some(text) = text else {
            return CompletionOutcome::failed("completion response contained no text");
        };

        let usage = response.get("usage").cloned().unwrap_or_default();
        let outcome = CompletionOutcome {
            success: true,
            text: Some(text),
            input_tokens: usage.get("input_tokens").and_then(Value::as_u64).unwrap_or(0),
            output_tokens: usage
                .get("output_tokens")
                .and_then(Value::as_u64)
                .unwrap_or(0),
            error: None,
        };
        debug!(
            input_tokens = outcome.input_tokens,
            output_tokens = outcome.output_tokens,
            "completion successful"
        );
        outcome
    }
}

/// Strip fenced code blocks from a model response, returning the JSON text
/// inside. Models frequently wrap JSON in ```json fences; parsers should not
/// have to care.
pub fn extract_json(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json", "JSON", or empty) up to the first newline.
    let body = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest,
    };
    body.trim_end()
        .strip_suffix("```")
        .map(str::trim)
        .unwrap_or(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderSettings;
    use seoforge_utils::{CircuitBreakerConfig, RetryPolicy};
    use std::time::Duration;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(server: &MockServer) -> LlmSettings {
        LlmSettings {
            provider: ProviderSettings {
                api_key: Some("llm-key".to_string()),
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
            model: "test-model".to_string(),
        }
    }

    #[tokio::test]
    async fn completion_returns_text_and_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(header("x-api-key", "llm-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [{"type": "text", "text": "Hello there"}],
                "usage": {"input_tokens": 12, "output_tokens": 4}
            })))
            .mount(&server)
            .await;

        let client = LlmClient::new(&settings(&server)).unwrap();
        let outcome = client.complete("hi", Some("be brief"), 100, 0.2).await;
        assert!(outcome.success);
        assert_eq!(outcome.text.as_deref(), Some("Hello there"));
        assert_eq!(outcome.input_tokens, 12);
        assert_eq!(outcome.output_tokens, 4);
    }

    #[tokio::test]
    async fn provider_failure_is_folded_into_outcome() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = LlmClient::new(&settings(&server)).unwrap();
        let outcome = client.complete("hi", None, 100, 0.0).await;
        assert!(!outcome.success);
        assert!(outcome.error.is_some());
    }

    #[test]
    fn extract_json_strips_fences() {
        assert_eq!(extract_json("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(extract_json("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(extract_json("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(extract_json("  ```json\n[1,2]\n```  "), "[1,2]");
    }

    #[test]
    fn extract_json_leaves_unfenced_untouched() {
        let text = "no fences here";
        assert_eq!(extract_json(text), text);
    }
}
