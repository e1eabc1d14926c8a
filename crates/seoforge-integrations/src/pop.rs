//! Optimization-provider adapter (task-based content optimization API).
//!
//! The provider exposes task endpoints: a submit returns a `task_id`, which is
//! polled until it reports success or failure. A full brief needs three
//! chained calls:
//!
//! 1. `POST /get-terms {keyword, url}` → poll → `{lsaPhrases, variations,
//!    prepareId}`
//! 2. `POST /create-report {prepareId, variations, lsaPhrases}` → poll →
//!    report nested under `report`
//! 3. `POST /get-custom-recommendations {reportId}` → recommendations nested
//!    under `recommendations`
//!
//! Steps 2 and 3 overwrite `variations` with differently shaped objects, so
//! the step-1 keyword variations are preserved under `_keyword_variations`
//! before merging. That key is a documented contract relied on by brief
//! parsing, not an implementation detail.
//!
//! Credential placement: `apiKey` in the request body (masked in logs).

use std::time::{Duration, Instant};

use reqwest::Method;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use seoforge_types::{IntegrationError, IntegrationResult};

use crate::client::{AuthPlacement, CallContext, IntegrationClient};
use crate::config::PopSettings;

/// Key under which step-1 keyword variations survive the step-2/3 merges.
pub const KEYWORD_VARIATIONS_KEY: &str = "_keyword_variations";

/// Status of a provider-side task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopTaskStatus {
    Pending,
    Progress,
    Success,
    Failure,
}

impl PopTaskStatus {
    fn parse(value: &Value) -> Self {
        match value.get("status").and_then(Value::as_str) {
            Some(s) if s.eq_ignore_ascii_case("success") => PopTaskStatus::Success,
            Some(s) if s.eq_ignore_ascii_case("failure") || s.eq_ignore_ascii_case("failed") => {
                PopTaskStatus::Failure
            }
            Some(s) if s.eq_ignore_ascii_case("progress") => PopTaskStatus::Progress,
            _ => PopTaskStatus::Pending,
        }
    }
}

/// A submitted provider task.
#[derive(Debug, Clone)]
pub struct PopTask {
    pub task_id: String,
    /// Fields returned alongside the task id (e.g. `reportId` on
    /// create-report).
    pub data: Value,
}

/// Client for the optimization provider.
#[derive(Debug)]
pub struct PopClient {
    client: IntegrationClient,
    poll_interval: Duration,
    poll_timeout: Duration,
}

impl PopClient {
    pub fn new(settings: &PopSettings) -> IntegrationResult<Self> {
        Ok(Self {
            client: IntegrationClient::new("pop", &settings.provider, AuthPlacement::BodyApiKey)?,
            poll_interval: settings.task_poll_interval,
            poll_timeout: settings.task_timeout,
        })
    }

    pub fn available(&self) -> bool {
        self.client.available()
    }

    pub fn close(&self) {
        self.client.close();
    }

    pub fn breaker(&self) -> &std::sync::Arc<seoforge_utils::CircuitBreaker> {
        self.client.breaker()
    }

    /// Step 1 submit: analyze a keyword + URL.
    pub async fn create_terms_task(&self, keyword: &str, url: &str) -> IntegrationResult<PopTask> {
        let response = self
            .client
            .request_json(
                Method::POST,
                "/get-terms",
                Some(json!({"keyword": keyword, "url": url})),
                CallContext::target(url),
            )
            .await?;
        self.task_from_response(response, "get-terms")
    }

    /// Step 2 submit: build the full report from step-1 output.
    pub async fn create_report(
        &self,
        prepare_id: &str,
        variations: &Value,
        lsa_phrases: &Value,
    ) -> IntegrationResult<PopTask> {
        let response = self
            .client
            .request_json(
                Method::POST,
                "/create-report",
                Some(json!({
                    "prepareId": prepare_id,
                    "variations": variations,
                    "lsaPhrases": lsa_phrases,
                })),
                CallContext::default(),
            )
            .await?;
        self.task_from_response(response, "create-report")
    }

    /// Step 3: keyword/heading placement recommendations for a report.
    pub async fn get_custom_recommendations(&self, report_id: &str) -> IntegrationResult<Value> {
        self.client
            .request_json(
                Method::POST,
                "/get-custom-recommendations",
                Some(json!({"reportId": report_id})),
                CallContext::default(),
            )
            .await
    }

    /// Poll `GET /task/{id}` until the task succeeds, fails, or the total
    /// poll timeout elapses.
    pub async fn poll_for_result(&self, task_id: &str) -> IntegrationResult<Value> {
        let started = Instant::now();
        loop {
            if started.elapsed() > self.poll_timeout {
                warn!(
                    task_id,
                    timeout_secs = self.poll_timeout.as_secs(),
                    "optimization task poll timed out"
                );
                return Err(IntegrationError::Timeout {
                    timeout_secs: self.poll_timeout.as_secs(),
                });
            }

            let response = self
                .client
                .request_json(
                    Method::GET,
                    &format!("/task/{task_id}"),
                    None,
                    CallContext::default(),
                )
                .await?;

            match PopTaskStatus::parse(&response) {
                PopTaskStatus::Success => return Ok(response),
                PopTaskStatus::Failure => {
                    let message = response
                        .get("error")
                        .and_then(Value::as_str)
                        .unwrap_or("task returned failure status")
                        .to_string();
                    return Err(IntegrationError::UnexpectedResponse {
                        provider: "pop",
                        message,
                    });
                }
                PopTaskStatus::Pending | PopTaskStatus::Progress => {
                    debug!(task_id, "optimization task still running");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }

    /// Run the full 3-step flow and merge the responses.
    ///
    /// Steps 1 and 2 failing are fatal; step 3 failing is logged and the
    /// merge proceeds without recommendations. Returns the merged response
    /// and the step-1 task id.
    pub async fn fetch_brief_data(
        &self,
        keyword: &str,
        url: &str,
    ) -> IntegrationResult<(Value, String)> {
        // --- Step 1: get-terms ---
        let terms_task = self.create_terms_task(keyword, url).await?;
        let task_id = terms_task.task_id.clone();
        let terms = self.poll_for_result(&task_id).await?;

        let mut merged = as_object(terms);
        let prepare_id = merged
            .get("prepareId")
            .and_then(Value::as_str)
            .map(|s| s.to_string());
        let variations = merged.get("variations").cloned().unwrap_or(Value::Array(vec![]));
        let lsa_phrases = merged
            .get("lsaPhrases")
            .cloned()
            .unwrap_or(Value::Array(vec![]));

        // Steps 2/3 replace "variations" with recommendation objects; keep the
        // step-1 strings addressable for brief parsing.
        merged.insert(KEYWORD_VARIATIONS_KEY.to_string(), variations.clone());

        let Some(prepare_id) = prepare_id else {
            warn!(
                keyword = %truncate_keyword(keyword),
                "no prepareId in get-terms response, returning step-1 data only"
            );
            return Ok((Value::Object(merged), task_id));
        };

        // --- Step 2: create-report ---
        let report_task = self
            .create_report(&prepare_id, &variations, &lsa_phrases)
            .await?;
        // reportId arrives in the submit response, not the polled result.
        let mut report_id = report_task
            .data
            .get("reportId")
            .and_then(Value::as_str)
            .map(|s| s.to_string());

        let report_result = self.poll_for_result(&report_task.task_id).await?;
        let report_data = as_object(report_result);

        if report_id.is_none() {
            report_id = report_data
                .get("reportId")
                .and_then(Value::as_str)
                .map(|s| s.to_string());
        }

        // The provider nests report fields under "report"; flatten them to
        // the top level. Some API versions do not nest, so fall back to
        // merging as-is.
        match report_data.get("report") {
            Some(Value::Object(inner)) if !inner.is_empty() => {
                info!(
                    keyword = %truncate_keyword(keyword),
                    report_keys = inner.len(),
                    "report data flattened"
                );
                merge_into(&mut merged, inner);
            }
            _ => merge_into(&mut merged, &report_data),
        }

        // --- Step 3: get-custom-recommendations (optional) ---
        let Some(report_id) = report_id else {
            warn!(
                keyword = %truncate_keyword(keyword),
                "no reportId in create-report response, skipping recommendations"
            );
            return Ok((Value::Object(merged), task_id));
        };

        match self.get_custom_recommendations(&report_id).await {
            Ok(recs) => {
                let recs = as_object(recs);
                match recs.get("recommendations") {
                    Some(Value::Object(inner)) if !inner.is_empty() => {
                        info!(
                            keyword = %truncate_keyword(keyword),
                            report_id = %report_id,
                            "recommendations flattened"
                        );
                        merge_into(&mut merged, inner);
                    }
                    _ => merge_into(&mut merged, &recs),
                }
            }
            Err(err) => {
                warn!(
                    keyword = %truncate_keyword(keyword),
                    error = %err,
                    "recommendations fetch failed, continuing without"
                );
            }
        }

        Ok((Value::Object(merged), task_id))
    }

    fn task_from_response(&self, response: Value, step: &'static str) -> IntegrationResult<PopTask> {
        let task_id = response
            .get("task_id")
            .or_else(|| response.get("taskId"))
            .and_then(Value::as_str)
            .map(|s| s.to_string());
        match task_id {
            Some(task_id) => Ok(PopTask {
                task_id,
                data: response,
            }),
            None => Err(IntegrationError::UnexpectedResponse {
                provider: "pop",
                message: format!("{step} response missing task_id"),
            }),
        }
    }
}

fn as_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn merge_into(target: &mut Map<String, Value>, source: &Map<String, Value>) {
    for (key, value) in source {
        target.insert(key.clone(), value.clone());
    }
}

fn truncate_keyword(keyword: &str) -> String {
    keyword.chars().take(50).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderSettings;
    use seoforge_utils::{CircuitBreakerConfig, RetryPolicy};
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn pop_settings(server: &MockServer) -> PopSettings {
        PopSettings {
            provider: ProviderSettings {
                api_key: Some("pop-key".to_string()),
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
            task_poll_interval: Duration::from_millis(5),
            task_timeout: Duration::from_millis(500),
        }
    }

    async fn mount_task(server: &MockServer, task_id: &str, body: Value) {
        Mock::given(method("GET"))
            .and(path(format!("/task/{task_id}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn full_flow_merges_and_preserves_variations() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/get-terms"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"task_id": "t1"})),
            )
            .mount(&server)
            .await;
        mount_task(
            &server,
            "t1",
            json!({
                "status": "SUCCESS",
                "prepareId": "prep-9",
                "variations": ["coffee canister", "coffee jar"],
                "lsaPhrases": [{"phrase": "airtight", "weight": 1}]
            }),
        )
        .await;
        Mock::given(method("POST"))
            .and(path("/create-report"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"task_id": "t2", "reportId": "r7"}),
            ))
            .mount(&server)
            .await;
        mount_task(
            &server,
            "t2",
            json!({
                "status": "success",
                "report": {
                    "competitors": [{"url": "https://a.example", "wordCount": 900}],
                    "variations": [{"signal": "h2", "target": 2}],
                    "wordCount": {"target": 1200}
                }
            }),
        )
        .await;
        Mock::given(method("POST"))
            .and(path("/get-custom-recommendations"))
            .and(body_string_contains("\"reportId\":\"r7\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "recommendations": {
                    "exactKeyword": [{"signal": "title", "target": 1}],
                    "pageStructure": [{"signal": "h2", "mean": 4.2, "min": 2, "max": 8}]
                }
            })))
            .mount(&server)
            .await;

        let client = PopClient::new(&pop_settings(&server)).unwrap();
        let (merged, task_id) = client
            .fetch_brief_data("coffee storage", "https://shop.example/coffee")
            .await
            .unwrap();

        assert_eq!(task_id, "t1");
        // Step-1 variations survive even though step 2 overwrote "variations".
        assert_eq!(
            merged[KEYWORD_VARIATIONS_KEY],
            json!(["coffee canister", "coffee jar"])
        );
        assert_eq!(merged["variations"][0]["signal"], "h2");
        // Report and recommendations are flattened to the top level.
        assert_eq!(merged["competitors"][0]["wordCount"], 900);
        assert_eq!(merged["exactKeyword"][0]["signal"], "title");
        assert_eq!(merged["wordCount"]["target"], 1200);
    }

    #[tokio::test]
    async fn missing_prepare_id_returns_step_one_only() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/get-terms"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"task_id": "t1"})))
            .mount(&server)
            .await;
        mount_task(
            &server,
            "t1",
            json!({"status": "SUCCESS", "variations": ["a"], "lsaPhrases": []}),
        )
        .await;

        let client = PopClient::new(&pop_settings(&server)).unwrap();
        let (merged, _) = client
            .fetch_brief_data("kw", "https://x.example")
            .await
            .unwrap();
        assert_eq!(merged[KEYWORD_VARIATIONS_KEY], json!(["a"]));
        assert!(merged.get("competitors").is_none());
    }

    #[tokio::test]
    async fn step_three_failure_is_tolerated() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/get-terms"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"task_id": "t1"})))
            .mount(&server)
            .await;
        mount_task(
            &server,
            "t1",
            json!({"status": "SUCCESS", "prepareId": "p", "variations": [], "lsaPhrases": []}),
        )
        .await;
        Mock::given(method("POST"))
            .and(path("/create-report"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"task_id": "t2", "reportId": "r"})),
            )
            .mount(&server)
            .await;
        mount_task(&server, "t2", json!({"status": "success", "report": {"pageScore": 70}}))
            .await;
        Mock::given(method("POST"))
            .and(path("/get-custom-recommendations"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = PopClient::new(&pop_settings(&server)).unwrap();
        let (merged, _) = client
            .fetch_brief_data("kw", "https://x.example")
            .await
            .unwrap();
        assert_eq!(merged["pageScore"], 70);
        assert!(merged.get("exactKeyword").is_none());
    }

    #[tokio::test]
    async fn task_failure_status_fails_the_flow() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/get-terms"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"task_id": "t1"})))
            .mount(&server)
            .await;
        mount_task(
            &server,
            "t1",
            json!({"status": "FAILURE", "error": "no terms available"}),
        )
        .await;

        let client = PopClient::new(&pop_settings(&server)).unwrap();
        let err = client
            .fetch_brief_data("kw", "https://x.example")
            .await
            .unwrap_err();
        match err {
            IntegrationError::UnexpectedResponse { message, .. } => {
                assert!(message.contains("no terms available"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn poll_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/get-terms"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"task_id": "t1"})))
            .mount(&server)
            .await;
        mount_task(&server, "t1", json!({"status": "progress"})).await;

        let mut settings = pop_settings(&server);
        settings.task_timeout = Duration::from_millis(20);
        let client = PopClient::new(&settings).unwrap();
        let err = client
            .fetch_brief_data("kw", "https://x.example")
            .await
            .unwrap_err();
        assert!(matches!(err, IntegrationError::Timeout { .. }));
    }
}
