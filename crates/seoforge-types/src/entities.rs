//! Durable entities persisted by the store.
//!
//! The opaque blobs (`phase_status`, `qa_results`, `stats`, `raw_response`)
//! stay as `serde_json::Value` at this boundary; components deserialize them
//! into typed structs at entry and re-serialize at exit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

use crate::status::{ContentStatus, JobStatus, PageCrawlStatus};

/// A customer site. Created by the caller; the core only mutates
/// `phase_status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub site_url: String,
    /// Generic per-phase metadata blob (recovery and stage metadata merge
    /// into it).
    pub phase_status: Value,
    pub brand_wizard_state: Value,
}

impl Project {
    pub fn new(name: impl Into<String>, site_url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            site_url: site_url.into(),
            phase_status: Value::Object(Default::default()),
            brand_wizard_state: Value::Object(Default::default()),
        }
    }
}

/// A crawled page. Owned by the crawl subsystem; the pipeline reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawledPage {
    pub id: Uuid,
    pub project_id: Uuid,
    pub normalized_url: String,
    /// Which workflow produced the page ("onboarding" unless overridden).
    pub source: String,
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub status: PageCrawlStatus,
    pub labels: Vec<String>,
    /// Heading texts keyed by tag name ("h1", "h2", ...).
    pub headings: HashMap<String, Vec<String>>,
    pub product_count: Option<u32>,
    pub word_count: Option<u32>,
}

impl CrawledPage {
    pub fn new(project_id: Uuid, normalized_url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id,
            normalized_url: normalized_url.into(),
            source: "onboarding".to_string(),
            title: None,
            meta_description: None,
            status: PageCrawlStatus::Completed,
            labels: Vec::new(),
            headings: HashMap::new(),
            product_count: None,
            word_count: None,
        }
    }
}

/// Caller-approved keyword assignment for a page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageKeywords {
    pub crawled_page_id: Uuid,
    pub primary_keyword: String,
    pub is_approved: bool,
}

/// An LSI phrase with its placement targets, as returned by the optimization
/// provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LsiTerm {
    pub phrase: String,
    #[serde(default)]
    pub weight: f64,
    #[serde(rename = "averageCount", default)]
    pub average_count: f64,
    #[serde(rename = "targetCount", default)]
    pub target_count: f64,
}

/// A ranking competitor from the optimization report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Competitor {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "h2Texts", default)]
    pub h2_texts: Vec<String>,
    #[serde(rename = "h3Texts", default)]
    pub h3_texts: Vec<String>,
    #[serde(rename = "pageScore", default)]
    pub page_score: f64,
    #[serde(rename = "wordCount", default)]
    pub word_count: u32,
}

/// A heading-structure target ("h2": aim for 5, between 2 and 8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeadingTarget {
    pub tag: String,
    pub target: i64,
    #[serde(default)]
    pub min: i64,
    #[serde(default)]
    pub max: i64,
    /// Which part of the provider response this came from
    /// ("recommendations" or "tagCounts").
    pub source: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeywordTargetKind {
    Exact,
    Lsi,
}

/// A keyword placement target (exact keyword or LSI phrase per page signal).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordTarget {
    pub signal: String,
    pub target: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phrase: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(rename = "type")]
    pub kind: KeywordTargetKind,
}

/// Structured optimization data for one page; unique per `page_id` and
/// replaced in place on force-refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentBrief {
    pub id: Uuid,
    pub page_id: Uuid,
    pub keyword: String,
    pub lsi_terms: Vec<LsiTerm>,
    pub related_searches: Vec<String>,
    pub competitors: Vec<Competitor>,
    pub related_questions: Vec<String>,
    pub heading_targets: Vec<HeadingTarget>,
    pub keyword_targets: Vec<KeywordTarget>,
    pub word_count_target: Option<u32>,
    pub word_count_min: Option<u32>,
    pub word_count_max: Option<u32>,
    pub page_score_target: Option<f64>,
    pub raw_response: Value,
    pub pop_task_id: Option<String>,
}

impl ContentBrief {
    pub fn new(page_id: Uuid, keyword: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            page_id,
            keyword: keyword.into(),
            lsi_terms: Vec::new(),
            related_searches: Vec::new(),
            competitors: Vec::new(),
            related_questions: Vec::new(),
            heading_targets: Vec::new(),
            keyword_targets: Vec::new(),
            word_count_target: None,
            word_count_min: None,
            word_count_max: None,
            page_score_target: None,
            raw_response: Value::Object(Default::default()),
            pop_task_id: None,
        }
    }
}

/// Generated content for one page; unique per `crawled_page_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageContent {
    pub id: Uuid,
    pub crawled_page_id: Uuid,
    pub status: ContentStatus,
    pub page_title: Option<String>,
    pub meta_description: Option<String>,
    pub top_description: Option<String>,
    pub bottom_description: Option<String>,
    pub word_count: u32,
    pub is_approved: bool,
    pub approved_at: Option<DateTime<Utc>>,
    pub qa_results: Option<Value>,
    pub generation_started_at: Option<DateTime<Utc>>,
    pub generation_completed_at: Option<DateTime<Utc>>,
}

impl PageContent {
    pub fn new(crawled_page_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            crawled_page_id,
            status: ContentStatus::Pending,
            page_title: None,
            meta_description: None,
            top_description: None,
            bottom_description: None,
            word_count: 0,
            is_approved: false,
            approved_at: None,
            qa_results: None,
            generation_started_at: None,
            generation_completed_at: None,
        }
    }

    /// The four content fields in canonical order.
    pub fn content_fields(&self) -> [(&'static str, Option<&str>); 4] {
        [
            ("page_title", self.page_title.as_deref()),
            ("meta_description", self.meta_description.as_deref()),
            ("top_description", self.top_description.as_deref()),
            ("bottom_description", self.bottom_description.as_deref()),
        ]
    }
}

/// Pipeline step a prompt-log row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptStep {
    ContentBrief,
    Writing,
    Taxonomy,
    LabelAssignment,
}

/// Append-only record of a prompt/response exchange for one page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptLog {
    pub id: Uuid,
    pub page_content_id: Uuid,
    pub step: PromptStep,
    pub role: String,
    pub prompt_text: String,
    pub response_text: String,
    pub created_at: DateTime<Utc>,
}

impl PromptLog {
    pub fn new(
        page_content_id: Uuid,
        step: PromptStep,
        role: impl Into<String>,
        prompt_text: impl Into<String>,
        response_text: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            page_content_id,
            step,
            role: role.into(),
            prompt_text: prompt_text.into(),
            response_text: response_text.into(),
            created_at: Utc::now(),
        }
    }
}

/// A long-running job record (crawl or generation run). Target of the
/// recovery sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationJob {
    pub id: Uuid,
    pub project_id: Uuid,
    pub status: JobStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Advanced by every business write; the recovery staleness check keys
    /// on it.
    pub updated_at: DateTime<Utc>,
    pub pages_crawled: u32,
    pub pages_failed: u32,
    pub stats: Value,
    pub error_log: Vec<Value>,
    pub error_message: Option<String>,
}

impl GenerationJob {
    pub fn new(project_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            project_id,
            status: JobStatus::Pending,
            started_at: None,
            completed_at: None,
            updated_at: now,
            pages_crawled: 0,
            pages_failed: 0,
            stats: Value::Object(Default::default()),
            error_log: Vec::new(),
            error_message: None,
        }
    }
}

/// Brand configuration blob for a project; unique per `project_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrandConfig {
    pub project_id: Uuid,
    pub brand_name: String,
    pub v2_schema: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lsi_term_accepts_provider_casing() {
        let term: LsiTerm = serde_json::from_value(serde_json::json!({
            "phrase": "burr grinder",
            "weight": 0.7,
            "averageCount": 3,
            "targetCount": 2
        }))
        .unwrap();
        assert_eq!(term.phrase, "burr grinder");
        assert_eq!(term.average_count, 3.0);
        assert_eq!(term.target_count, 2.0);
    }

    #[test]
    fn lsi_term_defaults_missing_counts() {
        let term: LsiTerm =
            serde_json::from_value(serde_json::json!({"phrase": "pour over"})).unwrap();
        assert_eq!(term.weight, 0.0);
        assert_eq!(term.average_count, 0.0);
        assert_eq!(term.target_count, 0.0);
    }

    #[test]
    fn competitor_accepts_partial_objects() {
        let comp: Competitor = serde_json::from_value(serde_json::json!({
            "url": "https://example.com/coffee",
            "pageScore": 81.5
        }))
        .unwrap();
        assert_eq!(comp.page_score, 81.5);
        assert_eq!(comp.word_count, 0);
        assert!(comp.h2_texts.is_empty());
    }

    #[test]
    fn keyword_target_kind_serializes_lowercase() {
        let target = KeywordTarget {
            signal: "title".into(),
            target: 1,
            phrase: None,
            comment: Some("include once".into()),
            kind: KeywordTargetKind::Exact,
        };
        let value = serde_json::to_value(&target).unwrap();
        assert_eq!(value["type"], "exact");
        assert!(value.get("phrase").is_none());
    }
}
