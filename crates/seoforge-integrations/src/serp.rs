//! SERP adapter: discussion/post search scoped by keyword.
//!
//! HTTP GET with the search keyword, optional subreddit scoping, and a time
//! range. Every returned post is tagged with the caller-supplied
//! `search_keyword` so downstream scoring can attribute posts to the query
//! that surfaced them.

use reqwest::Method;
use serde_json::Value;

use seoforge_types::IntegrationResult;

use crate::client::{AuthPlacement, CallContext, IntegrationClient};
use crate::config::ProviderSettings;

/// One search result.
#[derive(Debug, Clone)]
pub struct SerpPost {
    pub title: String,
    pub url: String,
    pub snippet: Option<String>,
    pub subreddit: Option<String>,
    pub position: usize,
    /// The keyword this post was found for.
    pub search_keyword: String,
}

/// Client for the SERP provider.
#[derive(Debug)]
pub struct SerpClient {
    client: IntegrationClient,
}

impl SerpClient {
    pub fn new(settings: &ProviderSettings) -> IntegrationResult<Self> {
        Ok(Self {
            client: IntegrationClient::new("serp", settings, AuthPlacement::BearerHeader)?,
        })
    }

    pub fn available(&self) -> bool {
        self.client.available()
    }

    pub fn close(&self) {
        self.client.close();
    }

    /// Search for posts matching `keyword`, optionally restricted to
    /// `subreddits` and a time range (`"year"`, `"month"`, ...).
    pub async fn search(
        &self,
        keyword: &str,
        subreddits: &[String],
        time_range: Option<&str>,
        limit: usize,
    ) -> IntegrationResult<Vec<SerpPost>> {
        let query = if subreddits.is_empty() {
            keyword.to_string()
        } else {
            let scope = subreddits
                .iter()
                .map(|s| format!("site:reddit.com/r/{s}"))
                .collect::<Vec<_>>()
                .join(" OR ");
            format!("{keyword} ({scope})")
        };

        let mut endpoint = format!("/search?q={}&num={limit}", urlencode(&query));
        if let Some(range) = time_range {
            endpoint.push_str(&format!("&tbs=qdr:{}", urlencode(range)));
        }

        let response = self
            .client
            .request_json(
                Method::GET,
                &endpoint,
                None,
                CallContext::target(keyword),
            )
            .await?;

        Ok(parse_posts(&response, keyword))
    }
}

fn parse_posts(response: &Value, search_keyword: &str) -> Vec<SerpPost> {
    let rows = response
        .get("organic")
        .or_else(|| response.get("results"))
        .and_then(Value::as_array);

    let Some(rows) = rows else {
        return Vec::new();
    };

    rows.iter()
        .enumerate()
        .filter_map(|(index, row)| {
            let url = row.get("link").or_else(|| row.get("url"))?.as_str()?;
            Some(SerpPost {
                title: row
                    .get("title")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                url: url.to_string(),
                snippet: row
                    .get("snippet")
                    .and_then(Value::as_str)
                    .map(|s| s.to_string()),
                subreddit: subreddit_from_url(url),
                position: index + 1,
                search_keyword: search_keyword.to_string(),
            })
        })
        .collect()
}

fn subreddit_from_url(url: &str) -> Option<String> {
    let (_, rest) = url.split_once("/r/")?;
    let name = rest.split('/').next()?;
    (!name.is_empty()).then(|| name.to_string())
}

fn urlencode(text: &str) -> String {
    url::form_urlencoded::byte_serialize(text.as_bytes()).collect()
}
