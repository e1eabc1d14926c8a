//! Typed HTTP client base shared by every provider adapter.
//!
//! Wraps `reqwest` with the reliability behavior every integration needs:
//! circuit-breaker gating, bounded retries with exponential backoff,
//! Retry-After handling for 429s, credential masking, and structured
//! per-call telemetry. Adapters layer typed request/response structs on top.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::{Method, StatusCode};
use serde_json::Value;
use tracing::{debug, error, warn};
use uuid::Uuid;

use seoforge_types::{
    mask_api_key_field, truncate_for_log, IntegrationError, IntegrationResult, MASKED,
};
use seoforge_utils::{CircuitBreaker, RetryPolicy};

use crate::config::ProviderSettings;

/// Where the provider expects its credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPlacement {
    /// `Authorization: Bearer <key>` header.
    BearerHeader,
    /// `apiKey` field injected into the JSON request body (masked in logs).
    BodyApiKey,
    /// Named query parameter (e.g. `?key=<key>`).
    QueryParam(&'static str),
    /// Named request header (e.g. `X-API-KEY`).
    Header(&'static str),
    /// No credential required.
    None,
}

/// Optional contextual labels attached to call telemetry (e.g. the URL being
/// crawled, or the number of items in a batch).
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    pub target: Option<String>,
    pub item_count: Option<usize>,
}

impl CallContext {
    pub fn target(target: impl Into<String>) -> Self {
        Self {
            target: Some(target.into()),
            item_count: None,
        }
    }

    pub fn items(count: usize) -> Self {
        Self {
            target: None,
            item_count: Some(count),
        }
    }
}

/// Body shapes the client knows how to send.
enum RequestBody {
    Json(Value),
    Form(Vec<(String, String)>),
    Empty,
}

/// HTTP integration client: one instance per provider, process-wide, with a
/// shared circuit breaker across all in-flight calls.
pub struct IntegrationClient {
    provider: &'static str,
    base_url: String,
    api_key: Option<String>,
    auth: AuthPlacement,
    timeout: Duration,
    retry: RetryPolicy,
    breaker: Arc<CircuitBreaker>,
    http: reqwest::Client,
}

impl IntegrationClient {
    pub fn new(
        provider: &'static str,
        settings: &ProviderSettings,
        auth: AuthPlacement,
    ) -> IntegrationResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .use_rustls_tls()
            .build()
            .map_err(|e| IntegrationError::Transport(e.to_string()))?;

        Ok(Self {
            provider,
            base_url: settings.api_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            auth,
            timeout: settings.timeout,
            retry: settings.retry.clone(),
            breaker: Arc::new(CircuitBreaker::new(provider, settings.breaker.clone())),
            http,
        })
    }

    pub fn provider(&self) -> &'static str {
        self.provider
    }

    /// Whether the provider is configured (an API key is present, or none is
    /// required).
    pub fn available(&self) -> bool {
        self.api_key.is_some() || self.auth == AuthPlacement::None
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Drop pooled connections. Called by the container at shutdown.
    pub fn close(&self) {
        debug!(provider = self.provider, "integration client closed");
    }

    /// Issue a JSON request and parse the 2xx response body as JSON.
    pub async fn request_json(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<Value>,
        context: CallContext,
    ) -> IntegrationResult<Value> {
        let body = match body {
            Some(v) => RequestBody::Json(v),
            None => RequestBody::Empty,
        };
        self.request(method, endpoint, body, context).await
    }

    /// Issue a form-encoded POST (repeated keys allowed) and parse the 2xx
    /// response body as JSON.
    pub async fn post_form(
        &self,
        endpoint: &str,
        form: Vec<(String, String)>,
        context: CallContext,
    ) -> IntegrationResult<Value> {
        self.request(Method::POST, endpoint, RequestBody::Form(form), context)
            .await
    }

    async fn request(
        &self,
        method: Method,
        endpoint: &str,
        body: RequestBody,
        context: CallContext,
    ) -> IntegrationResult<Value> {
        if !self.available() {
            return Err(IntegrationError::NotConfigured {
                provider: self.provider,
            });
        }

        if !self.breaker.can_execute().await {
            debug!(
                provider = self.provider,
                endpoint,
                reason = "circuit breaker open",
                "integration call rejected"
            );
            return Err(IntegrationError::CircuitOpen);
        }

        // Correlates the retry attempts of one logical call in the logs.
        let call_id = Uuid::new_v4().simple().to_string()[..8].to_string();
        let url = format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'));

        let mut attempt: u32 = 0;
        loop {
            let started = Instant::now();
            self.log_attempt(&method, endpoint, &body, attempt, &call_id);

            let request = self.build_request(&method, &url, &body);
            let outcome = request.send().await;
            let duration_ms = started.elapsed().as_millis() as u64;

            match outcome {
                Ok(response) => {
                    let status = response.status();
                    let request_id = response
                        .headers()
                        .get("x-request-id")
                        .and_then(|v| v.to_str().ok())
                        .map(|s| s.to_string());

                    match self
                        .classify(response, status, endpoint, &method, duration_ms, attempt, &call_id, request_id, &context)
                        .await?
                    {
                        Classified::Done(value) => return Ok(value),
                        Classified::RetryAfter(delay) => {
                            tokio::time::sleep(delay).await;
                        }
                    }
                }
                Err(err) => {
                    self.breaker.record_failure().await;
                    let timed_out = err.is_timeout();
                    error!(
                        provider = self.provider,
                        endpoint,
                        method = %method,
                        duration_ms,
                        retry_attempt = attempt,
                        call_id = %call_id,
                        error = %err,
                        error_type = if timed_out { "timeout" } else { "transport" },
                        success = false,
                        "integration call failed"
                    );
                    if self.retry.has_attempts_after(attempt) {
                        let delay = self.retry.backoff(attempt);
                        warn!(
                            provider = self.provider,
                            endpoint,
                            attempt = attempt + 1,
                            max_retries = self.retry.max_retries,
                            delay_ms = delay.as_millis() as u64,
                            "integration call failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    } else if timed_out {
                        return Err(IntegrationError::Timeout {
                            timeout_secs: self.timeout.as_secs(),
                        });
                    } else {
                        return Err(IntegrationError::Transport(err.to_string()));
                    }
                }
            }

            attempt += 1;
        }
    }

    fn build_request(
        &self,
        method: &Method,
        url: &str,
        body: &RequestBody,
    ) -> reqwest::RequestBuilder {
        let mut builder = self.http.request(method.clone(), url);

        if let Some(key) = &self.api_key {
            builder = match self.auth {
                AuthPlacement::BearerHeader => builder.bearer_auth(key),
                AuthPlacement::QueryParam(name) => builder.query(&[(name, key.as_str())]),
                AuthPlacement::Header(name) => builder.header(name, key),
                AuthPlacement::BodyApiKey | AuthPlacement::None => builder,
            };
        }

        match body {
            RequestBody::Json(value) => {
                let payload = if matches!(self.auth, AuthPlacement::BodyApiKey) {
                    inject_api_key(value, self.api_key.as_deref())
                } else {
                    value.clone()
                };
                builder.json(&payload)
            }
            RequestBody::Form(fields) => builder.form(fields),
            RequestBody::Empty => builder,
        }
    }

    fn log_attempt(
        &self,
        method: &Method,
        endpoint: &str,
        body: &RequestBody,
        attempt: u32,
        call_id: &str,
    ) {
        let sanitized = match body {
            RequestBody::Json(value) => {
                truncate_for_log(&mask_api_key_field(value).to_string())
            }
            RequestBody::Form(fields) => truncate_for_log(&format!("{} form fields", fields.len())),
            RequestBody::Empty => String::new(),
        };
        debug!(
            provider = self.provider,
            endpoint,
            method = %method,
            retry_attempt = attempt,
            call_id = %call_id,
            request_body = %sanitized,
            "integration call start"
        );
    }

    #[allow(clippy::too_many_arguments)]
    async fn classify(
        &self,
        response: reqwest::Response,
        status: StatusCode,
        endpoint: &str,
        method: &Method,
        duration_ms: u64,
        attempt: u32,
        call_id: &str,
        request_id: Option<String>,
        context: &CallContext,
    ) -> IntegrationResult<Classified> {
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = parse_retry_after(&response);
            self.breaker.record_failure().await;
            warn!(
                provider = self.provider,
                endpoint,
                retry_after_secs = retry_after,
                request_id = request_id.as_deref().unwrap_or(""),
                call_id = %call_id,
                "integration rate limit hit (429)"
            );
            if self.retry.has_attempts_after(attempt) {
                if let Some(secs) = retry_after.filter(|s| *s <= 60) {
                    return Ok(Classified::RetryAfter(Duration::from_secs(secs)));
                }
            }
            return Err(IntegrationError::RateLimited { retry_after });
        }

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            self.breaker.record_failure().await;
            warn!(
                provider = self.provider,
                endpoint,
                method = %method,
                duration_ms,
                status_code = status.as_u16(),
                error_type = "auth",
                retry_attempt = attempt,
                call_id = %call_id,
                success = false,
                "integration call failed: authentication"
            );
            return Err(IntegrationError::AuthFailed {
                status: status.as_u16(),
            });
        }

        if status.is_server_error() {
            self.breaker.record_failure().await;
            error!(
                provider = self.provider,
                endpoint,
                method = %method,
                duration_ms,
                status_code = status.as_u16(),
                error_type = "server",
                retry_attempt = attempt,
                call_id = %call_id,
                success = false,
                "integration call failed: server error"
            );
            if self.retry.has_attempts_after(attempt) {
                let delay = self.retry.backoff(attempt);
                warn!(
                    provider = self.provider,
                    endpoint,
                    attempt = attempt + 1,
                    max_retries = self.retry.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "server error, retrying"
                );
                return Ok(Classified::RetryAfter(delay));
            }
            return Err(IntegrationError::Server {
                status: status.as_u16(),
            });
        }

        if status.is_client_error() {
            // Other 4xx: the request itself is wrong, retrying cannot help.
            let body = response.text().await.unwrap_or_default();
            warn!(
                provider = self.provider,
                endpoint,
                method = %method,
                duration_ms,
                status_code = status.as_u16(),
                error = %truncate_for_log(&body),
                error_type = "client",
                retry_attempt = attempt,
                call_id = %call_id,
                success = false,
                "integration call failed: client error"
            );
            return Err(IntegrationError::Client {
                status: status.as_u16(),
                body: truncate_for_log(&body),
            });
        }

        // 2xx
        let text = response.text().await.unwrap_or_default();
        let value = if text.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str(&text).map_err(|e| IntegrationError::UnexpectedResponse {
                provider: self.provider,
                message: format!("invalid JSON in response: {e}"),
            })?
        };

        self.breaker.record_success().await;
        debug!(
            provider = self.provider,
            endpoint,
            method = %method,
            duration_ms,
            retry_attempt = attempt,
            call_id = %call_id,
            request_id = request_id.as_deref().unwrap_or(""),
            target = context.target.as_deref().unwrap_or(""),
            item_count = context.item_count.unwrap_or(0),
            success = true,
            "integration call completed"
        );
        Ok(Classified::Done(value))
    }
}

enum Classified {
    Done(Value),
    RetryAfter(Duration),
}

/// Merge the credential into a JSON object body. Masked copies are used for
/// all logging; the key itself never reaches a log line.
fn inject_api_key(body: &Value, api_key: Option<&str>) -> Value {
    let Some(key) = api_key else {
        return body.clone();
    };
    match body {
        Value::Object(map) => {
            let mut with_key = map.clone();
            with_key.insert("apiKey".to_string(), Value::String(key.to_string()));
            Value::Object(with_key)
        }
        other => other.clone(),
    }
}

/// Parse `Retry-After` as whole seconds. HTTP-date and other non-numeric
/// forms are treated as absent.
fn parse_retry_after(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<f64>().ok())
        .map(|secs| secs.max(0.0) as u64)
}

/// Debug output never exposes the credential.
impl std::fmt::Debug for IntegrationClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntegrationClient")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| MASKED))
            .field("auth", &self.auth)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seoforge_utils::CircuitBreakerConfig;
    use std::time::Duration;
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(server: &MockServer, max_retries: u32) -> ProviderSettings {
        ProviderSettings {
            api_key: Some("test-key".to_string()),
            api_url: server.uri(),
            timeout: Duration::from_secs(5),
            retry: RetryPolicy {
                max_retries,
                retry_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(10),
            },
            breaker: CircuitBreakerConfig {
                failure_threshold: 10,
                recovery_timeout: Duration::from_secs(60),
            },
        }
    }

    #[tokio::test]
    async fn success_parses_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/echo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .mount(&server)
            .await;

        let client = IntegrationClient::new(
            "test",
            &settings(&server, 3),
            AuthPlacement::BearerHeader,
        )
        .unwrap();
        let result = client
            .request_json(
                Method::POST,
                "/echo",
                Some(serde_json::json!({"a": 1})),
                CallContext::default(),
            )
            .await
            .unwrap();
        assert_eq!(result["ok"], true);
    }

    #[tokio::test]
    async fn empty_body_yields_empty_object() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/empty"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client =
            IntegrationClient::new("test", &settings(&server, 3), AuthPlacement::BearerHeader)
                .unwrap();
        let result = client
            .request_json(Method::GET, "/empty", None, CallContext::default())
            .await
            .unwrap();
        assert_eq!(result, serde_json::json!({}));
    }

    #[tokio::test]
    async fn server_errors_retry_then_surface() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let client =
            IntegrationClient::new("test", &settings(&server, 3), AuthPlacement::BearerHeader)
                .unwrap();
        let err = client
            .request_json(Method::GET, "/flaky", None, CallContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, IntegrationError::Server { status: 503 }));
    }

    #[tokio::test]
    async fn client_errors_do_not_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bad"))
            .respond_with(ResponseTemplate::new(422).set_body_string("nope"))
            .expect(1)
            .mount(&server)
            .await;

        let client =
            IntegrationClient::new("test", &settings(&server, 3), AuthPlacement::BearerHeader)
                .unwrap();
        let err = client
            .request_json(Method::GET, "/bad", None, CallContext::default())
            .await
            .unwrap_err();
        match err {
            IntegrationError::Client { status, body } => {
                assert_eq!(status, 422);
                assert_eq!(body, "nope");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn auth_failures_surface_immediately() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/secret"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&server)
            .await;

        let client =
            IntegrationClient::new("test", &settings(&server, 3), AuthPlacement::BearerHeader)
                .unwrap();
        let err = client
            .request_json(Method::GET, "/secret", None, CallContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, IntegrationError::AuthFailed { status: 403 }));
    }

    #[tokio::test]
    async fn rate_limit_honors_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/limited"))
            .respond_with(
                ResponseTemplate::new(429).insert_header("retry-after", "0"),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/limited"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": 1})))
            .mount(&server)
            .await;

        let client =
            IntegrationClient::new("test", &settings(&server, 3), AuthPlacement::BearerHeader)
                .unwrap();
        let result = client
            .request_json(Method::GET, "/limited", None, CallContext::default())
            .await
            .unwrap();
        assert_eq!(result["ok"], 1);
    }

    #[tokio::test]
    async fn rate_limit_without_header_surfaces() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/limited"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let client =
            IntegrationClient::new("test", &settings(&server, 3), AuthPlacement::BearerHeader)
                .unwrap();
        let err = client
            .request_json(Method::GET, "/limited", None, CallContext::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            IntegrationError::RateLimited { retry_after: None }
        ));
    }

    #[tokio::test]
    async fn body_api_key_is_injected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/terms"))
            .and(body_string_contains("\"apiKey\":\"test-key\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": 1})))
            .expect(1)
            .mount(&server)
            .await;

        let client =
            IntegrationClient::new("test", &settings(&server, 3), AuthPlacement::BodyApiKey)
                .unwrap();
        client
            .request_json(
                Method::POST,
                "/terms",
                Some(serde_json::json!({"keyword": "coffee"})),
                CallContext::default(),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn bearer_and_query_auth_placement() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/h"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/q"))
            .and(query_param("key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let bearer =
            IntegrationClient::new("test", &settings(&server, 3), AuthPlacement::BearerHeader)
                .unwrap();
        bearer
            .request_json(Method::GET, "/h", None, CallContext::default())
            .await
            .unwrap();

        let query = IntegrationClient::new(
            "test",
            &settings(&server, 3),
            AuthPlacement::QueryParam("key"),
        )
        .unwrap();
        query
            .request_json(Method::GET, "/q", None, CallContext::default())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn circuit_opens_after_threshold_and_rejects() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/down"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let mut s = settings(&server, 1);
        s.breaker.failure_threshold = 2;
        let client =
            IntegrationClient::new("test", &s, AuthPlacement::BearerHeader).unwrap();

        for _ in 0..2 {
            let _ = client
                .request_json(Method::GET, "/down", None, CallContext::default())
                .await;
        }
        let err = client
            .request_json(Method::GET, "/down", None, CallContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, IntegrationError::CircuitOpen));
    }

    #[tokio::test]
    async fn unconfigured_client_refuses() {
        let server = MockServer::start().await;
        let mut s = settings(&server, 1);
        s.api_key = None;
        let client = IntegrationClient::new("test", &s, AuthPlacement::BearerHeader).unwrap();
        assert!(!client.available());
        let err = client
            .request_json(Method::GET, "/x", None, CallContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, IntegrationError::NotConfigured { .. }));
    }
}
