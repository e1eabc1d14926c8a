//! Web-crawl service adapter.
//!
//! Wraps a crawl service that fetches pages and derives markdown/links. When
//! the service is not configured the adapter falls back to a plain HTTP GET
//! and returns the HTML only, so callers get degraded results rather than
//! errors.
//! Batched calls send one request body containing the list of URLs.

use std::time::Duration;

use reqwest::Method;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use seoforge_types::{IntegrationError, IntegrationResult};

use crate::client::{AuthPlacement, CallContext, IntegrationClient};
use crate::config::ProviderSettings;

/// Options forwarded to the crawl service.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlOptions {
    /// Derive markdown from the fetched HTML.
    pub extract_markdown: bool,
    /// Collect outbound links.
    pub extract_links: bool,
    /// Skip words below this count when deriving markdown.
    pub word_count_threshold: u32,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            extract_markdown: true,
            extract_links: false,
            word_count_threshold: 10,
        }
    }
}

/// Result of crawling one URL.
#[derive(Debug, Clone)]
pub struct CrawlOutcome {
    pub url: String,
    pub success: bool,
    pub html: Option<String>,
    pub markdown: Option<String>,
    pub links: Vec<String>,
    pub error: Option<String>,
}

/// Client for the crawl service.
#[derive(Debug)]
pub struct CrawlClient {
    client: IntegrationClient,
    /// Plain client for the unconfigured fallback path.
    fallback: reqwest::Client,
}

impl CrawlClient {
    pub fn new(settings: &ProviderSettings) -> IntegrationResult<Self> {
        let fallback = reqwest::Client::builder()
            .timeout(settings.timeout.min(Duration::from_secs(30)))
            .use_rustls_tls()
            .build()
            .map_err(|e| IntegrationError::Transport(e.to_string()))?;
        Ok(Self {
            client: IntegrationClient::new("crawl", settings, AuthPlacement::BearerHeader)?,
            fallback,
        })
    }

    pub fn available(&self) -> bool {
        self.client.available()
    }

    pub fn close(&self) {
        self.client.close();
    }

    /// Crawl a single URL.
    pub async fn crawl(&self, url: &str, options: &CrawlOptions) -> CrawlOutcome {
        if !self.available() {
            return self.simple_fetch(url).await;
        }

        let body = json!({"urls": [url], "options": options});
        match self
            .client
            .request_json(Method::POST, "/crawl", Some(body), CallContext::target(url))
            .await
        {
            Ok(response) => parse_results(&response, &[url.to_string()])
                .into_iter()
                .next()
                .unwrap_or_else(|| CrawlOutcome {
                    url: url.to_string(),
                    success: false,
                    html: None,
                    markdown: None,
                    links: Vec::new(),
                    error: Some("crawl service returned no results".to_string()),
                }),
            Err(err) => {
                warn!(url, error = %err, "crawl service call failed");
                CrawlOutcome {
                    url: url.to_string(),
                    success: false,
                    html: None,
                    markdown: None,
                    links: Vec::new(),
                    error: Some(err.to_string()),
                }
            }
        }
    }

    /// Crawl many URLs with one request.
    pub async fn crawl_many(
        &self,
        urls: &[String],
        options: &CrawlOptions,
    ) -> Vec<CrawlOutcome> {
        if urls.is_empty() {
            return Vec::new();
        }
        if !self.available() {
            let mut outcomes = Vec::with_capacity(urls.len());
            for url in urls {
                outcomes.push(self.simple_fetch(url).await);
            }
            return outcomes;
        }

        let body = json!({"urls": urls, "options": options});
        match self
            .client
            .request_json(
                Method::POST,
                "/crawl",
                Some(body),
                CallContext::items(urls.len()),
            )
            .await
        {
            Ok(response) => parse_results(&response, urls),
            Err(err) => {
                warn!(url_count = urls.len(), error = %err, "batch crawl failed");
                urls.iter()
                    .map(|url| CrawlOutcome {
                        url: url.clone(),
                        success: false,
                        html: None,
                        markdown: None,
                        links: Vec::new(),
                        error: Some(err.to_string()),
                    })
                    .collect()
            }
        }
    }

    /// Unconfigured fallback: plain GET, HTML only, no derived markdown.
    async fn simple_fetch(&self, url: &str) -> CrawlOutcome {
        debug!(url, "crawl service not configured, using plain fetch");
        match self.fallback.get(url).send().await {
            Ok(response) if response.status().is_success() => {
                let html = response.text().await.unwrap_or_default();
                CrawlOutcome {
                    url: url.to_string(),
                    success: true,
                    html: Some(html),
                    markdown: None,
                    links: Vec::new(),
                    error: None,
                }
            }
            Ok(response) => CrawlOutcome {
                url: url.to_string(),
                success: false,
                html: None,
                markdown: None,
                links: Vec::new(),
                error: Some(format!("fetch returned {}", response.status())),
            },
            Err(err) => CrawlOutcome {
                url: url.to_string(),
                success: false,
                html: None,
                markdown: None,
                links: Vec::new(),
                error: Some(err.to_string()),
            },
        }
    }
}

fn parse_results(response: &Value, requested: &[String]) -> Vec<CrawlOutcome> {
    let rows = response.get("results").and_then(Value::as_array);
    let Some(rows) = rows else {
        return requested
            .iter()
            .map(|url| CrawlOutcome {
                url: url.clone(),
                success: false,
                html: None,
                markdown: None,
                links: Vec::new(),
                error: Some("malformed crawl response".to_string()),
            })
            .collect();
    };

    rows.iter()
        .map(|row| CrawlOutcome {
            url: row
                .get("url")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            success: row.get("success").and_then(Value::as_bool).unwrap_or(false),
            html: row
                .get("html")
                .and_then(Value::as_str)
                .map(|s| s.to_string()),
            markdown: row
                .get("markdown")
                .and_then(Value::as_str)
                .map(|s| s.to_string()),
            links: row
                .get("links")
                .and_then(Value::as_array)
                .map(|links| {
                    links
                        .iter()
                        .filter_map(Value::as_str)
                        .map(|s| s.to_string())
                        .collect()
                })
                .unwrap_or_default(),
            error: row
                .get("error")
                .and_then(Value::as_str)
                .map(|s| s.to_string()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use seoforge_utils::{CircuitBreakerConfig, RetryPolicy};
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(server: &MockServer, with_key: bool) -> ProviderSettings {
        ProviderSettings {
            api_key: with_key.then(|| "crawl-key".to_string()),
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
        }
    }

    #[tokio::test]
    async fn batch_sends_one_request_with_all_urls() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/crawl"))
            .and(body_string_contains("https://a.example"))
            .and(body_string_contains("https://b.example"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [
                    {"url": "https://a.example", "success": true, "html": "<p>a</p>", "markdown": "a"},
                    {"url": "https://b.example", "success": false, "error": "blocked"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = CrawlClient::new(&settings(&server, true)).unwrap();
        let outcomes = client
            .crawl_many(
                &["https://a.example".to_string(), "https://b.example".to_string()],
                &CrawlOptions::default(),
            )
            .await;
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].success);
        assert_eq!(outcomes[0].markdown.as_deref(), Some("a"));
        assert!(!outcomes[1].success);
        assert_eq!(outcomes[1].error.as_deref(), Some("blocked"));
    }

    #[tokio::test]
    async fn unconfigured_falls_back_to_plain_get() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>hi</html>"))
            .mount(&server)
            .await;

        let client = CrawlClient::new(&settings(&server, false)).unwrap();
        assert!(!client.available());
        let outcome = client
            .crawl(&format!("{}/page", server.uri()), &CrawlOptions::default())
            .await;
        assert!(outcome.success);
        assert_eq!(outcome.html.as_deref(), Some("<html>hi</html>"));
        // Fallback never derives markdown.
        assert!(outcome.markdown.is_none());
    }
}
