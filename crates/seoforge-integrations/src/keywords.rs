//! Keyword-volume provider adapter.
//!
//! The provider takes form-encoded requests (`country`, `currency`,
//! `dataSource`, `kw[]` repeated) with Bearer auth and caps each request at
//! 100 keywords. `get_keyword_data_batch` splits larger lists and gathers the
//! batches concurrently under a configurable parallelism bound, combining
//! results in input order.

use std::sync::Arc;

use futures::future::join_all;
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use seoforge_types::{IntegrationError, IntegrationResult};

use crate::client::{AuthPlacement, CallContext, IntegrationClient};
use crate::config::KeywordVolumeSettings;

/// Provider-side cap on keywords per request.
pub const MAX_KEYWORDS_PER_REQUEST: usize = 100;

/// Volume data for one keyword.
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordData {
    pub keyword: String,
    pub volume: Option<u64>,
    pub cpc: Option<f64>,
    pub competition: Option<f64>,
}

/// Combined outcome of one or more volume lookups.
#[derive(Debug, Clone, Default)]
pub struct KeywordBatch {
    pub keywords: Vec<KeywordData>,
    pub credits_used: Option<u64>,
    /// Per-batch error strings when some batches of a large lookup failed.
    pub errors: Vec<String>,
}

/// Client for the keyword-volume provider.
#[derive(Debug)]
pub struct KeywordVolumeClient {
    client: IntegrationClient,
    country: String,
    currency: String,
    data_source: String,
}

impl KeywordVolumeClient {
    pub fn new(settings: &KeywordVolumeSettings) -> IntegrationResult<Self> {
        Ok(Self {
            client: IntegrationClient::new(
                "keywords",
                &settings.provider,
                AuthPlacement::BearerHeader,
            )?,
            country: settings.country.clone(),
            currency: settings.currency.clone(),
            data_source: settings.data_source.clone(),
        })
    }

    pub fn available(&self) -> bool {
        self.client.available()
    }

    pub fn close(&self) {
        self.client.close();
    }

    /// Look up volume data for up to [`MAX_KEYWORDS_PER_REQUEST`] keywords.
    pub async fn get_keyword_data(
        &self,
        keywords: &[String],
        country: Option<&str>,
        currency: Option<&str>,
        data_source: Option<&str>,
    ) -> IntegrationResult<KeywordBatch> {
        if keywords.is_empty() {
            return Err(IntegrationError::UnexpectedResponse {
                provider: "keywords",
                message: "no keywords provided".to_string(),
            });
        }
        if keywords.len() > MAX_KEYWORDS_PER_REQUEST {
            return Err(IntegrationError::UnexpectedResponse {
                provider: "keywords",
                message: format!(
                    "too many keywords ({}), max {MAX_KEYWORDS_PER_REQUEST} per request",
                    keywords.len()
                ),
            });
        }

        let mut form: Vec<(String, String)> = vec![
            (
                "country".to_string(),
                country.unwrap_or(&self.country).to_string(),
            ),
            (
                "currency".to_string(),
                currency.unwrap_or(&self.currency).to_string(),
            ),
            (
                "dataSource".to_string(),
                data_source.unwrap_or(&self.data_source).to_string(),
            ),
        ];
        for kw in keywords {
            form.push(("kw[]".to_string(), kw.clone()));
        }

        let response = self
            .client
            .post_form(
                "/v1/get_keyword_data",
                form,
                CallContext::items(keywords.len()),
            )
            .await?;

        Ok(parse_keyword_response(&response))
    }

    /// Look up volume data for any number of keywords, splitting into
    /// provider-sized batches processed concurrently.
    pub async fn get_keyword_data_batch(
        &self,
        keywords: &[String],
        max_concurrent: usize,
    ) -> IntegrationResult<KeywordBatch> {
        if keywords.len() <= MAX_KEYWORDS_PER_REQUEST {
            return self.get_keyword_data(keywords, None, None, None).await;
        }

        let batches: Vec<&[String]> = keywords.chunks(MAX_KEYWORDS_PER_REQUEST).collect();
        info!(
            total_keywords = keywords.len(),
            total_batches = batches.len(),
            batch_size = MAX_KEYWORDS_PER_REQUEST,
            max_concurrent,
            "processing keyword lookup in batches"
        );

        let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
        let tasks = batches.into_iter().enumerate().map(|(index, batch)| {
            let semaphore = semaphore.clone();
            async move {
                // Semaphore closed only on drop, so acquire cannot fail here.
                let _permit = semaphore.acquire().await.expect("semaphore closed");
                (index, self.get_keyword_data(batch, None, None, None).await)
            }
        });

        let mut results = join_all(tasks).await;
        results.sort_by_key(|(index, _)| *index);

        let mut combined = KeywordBatch::default();
        let mut total_credits: u64 = 0;
        for (index, result) in results {
            match result {
                Ok(batch) => {
                    combined.keywords.extend(batch.keywords);
                    if let Some(credits) = batch.credits_used {
                        total_credits += credits;
                    }
                }
                Err(err) => {
                    warn!(batch_index = index, error = %err, "keyword batch failed");
                    combined.errors.push(format!("batch {}: {err}", index + 1));
                }
            }
        }

        if combined.keywords.is_empty() && !combined.errors.is_empty() {
            return Err(IntegrationError::UnexpectedResponse {
                provider: "keywords",
                message: combined.errors.join("; "),
            });
        }
        if total_credits > 0 {
            combined.credits_used = Some(total_credits);
        }
        Ok(combined)
    }
}

fn parse_keyword_response(response: &Value) -> KeywordBatch {
    let mut batch = KeywordBatch {
        credits_used: response.get("credits").and_then(Value::as_u64),
        ..Default::default()
    };

    if let Some(rows) = response.get("data").and_then(Value::as_array) {
        for row in rows {
            let Some(keyword) = row.get("keyword").and_then(Value::as_str) else {
                continue;
            };
            batch.keywords.push(KeywordData {
                keyword: keyword.to_string(),
                volume: row.get("vol").and_then(Value::as_u64),
                cpc: row
                    .get("cpc")
                    .and_then(|cpc| cpc.get("value"))
                    .and_then(value_as_f64),
                competition: row.get("competition").and_then(Value::as_f64),
            });
        }
    }
    batch
}

// The provider returns cpc values as either numbers or quoted strings.
fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
