//! The quality rule engine.
//!
//! Runs synchronously over a `PageContent` and the brand settings, writing
//! `qa_results = {passed, issues, checked_at}` back onto the content. Checks:
//! tier-1 AI-trope words, brand banned phrases, word-count bounds, and HTML
//! tag balance in the two description fields.

use std::sync::OnceLock;

use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use seoforge_types::{BrandSettings, PageContent};

use crate::text::content_word_count;

/// Words characteristic of low-quality machine-written copy. Any occurrence
/// in any content field is an issue.
pub const TIER1_AI_WORDS: &[&str] = &[
    "delve",
    "unleash",
    "harness",
    "realm",
    "game-changer",
    "navigate",
    "landscape",
    "unlock",
    "elevate",
    "seamless",
    "robust",
    "tapestry",
];

/// Void elements that never take a closing tag.
const VOID_TAGS: &[&str] = &["br", "hr", "img", "input", "meta", "link", "source", "wbr"];

/// A single quality finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    #[serde(rename = "type")]
    pub issue_type: String,
    pub field: String,
    pub excerpt: String,
    pub rule_id: String,
}

/// The blob written to `PageContent.qa_results`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaResults {
    pub passed: bool,
    pub issues: Vec<Issue>,
    pub checked_at: String,
}

/// Run all checks and write the outcome onto `content.qa_results`.
///
/// Returns the results for callers that want them without re-reading the
/// blob. Idempotent: a second run over unchanged content produces the same
/// issues.
pub fn run_quality_checks(content: &mut PageContent, brand: &BrandSettings) -> QaResults {
    let mut issues: Vec<Issue> = Vec::new();

    for (field, value) in content.content_fields() {
        let Some(text) = value else { continue };
        check_tier1_words(field, text, &mut issues);
        check_banned_phrases(field, text, &brand.vocabulary.banned, &mut issues);
    }

    check_word_count(content, brand, &mut issues);

    for field in ["top_description", "bottom_description"] {
        let value = match field {
            "top_description" => content.top_description.as_deref(),
            _ => content.bottom_description.as_deref(),
        };
        if let Some(html) = value {
            check_tag_balance(field, html, &mut issues);
        }
    }

    let results = QaResults {
        passed: issues.is_empty(),
        issues,
        checked_at: Utc::now().to_rfc3339(),
    };

    debug!(
        page_content_id = %content.id,
        passed = results.passed,
        issue_count = results.issues.len(),
        "quality checks complete"
    );

    content.qa_results =
        Some(serde_json::to_value(&results).unwrap_or_else(|_| Value::Object(Default::default())));
    results
}

fn word_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[A-Za-z0-9'-]+").expect("static regex"))
}

fn check_tier1_words(field: &str, text: &str, issues: &mut Vec<Issue>) {
    let lowered = text.to_lowercase();
    for word in TIER1_AI_WORDS {
        let found = word_pattern()
            .find_iter(&lowered)
            .any(|m| m.as_str() == *word);
        if found {
            issues.push(Issue {
                issue_type: "tier1_ai_word".to_string(),
                field: field.to_string(),
                excerpt: excerpt_around(text, word),
                rule_id: format!("qa.tier1.{word}"),
            });
        }
    }
}

fn check_banned_phrases(field: &str, text: &str, banned: &[String], issues: &mut Vec<Issue>) {
    let lowered = text.to_lowercase();
    for phrase in banned {
        let phrase_lower = phrase.to_lowercase();
        if !phrase_lower.is_empty() && lowered.contains(&phrase_lower) {
            issues.push(Issue {
                issue_type: "banned_phrase".to_string(),
                field: field.to_string(),
                excerpt: excerpt_around(text, &phrase_lower),
                rule_id: "qa.vocabulary.banned".to_string(),
            });
        }
    }
}

fn check_word_count(content: &PageContent, brand: &BrandSettings, issues: &mut Vec<Issue>) {
    let total = content_word_count(content);
    if let Some(min) = brand.min_word_count {
        if total < min {
            issues.push(Issue {
                issue_type: "word_count_below_min".to_string(),
                field: "content".to_string(),
                excerpt: format!("{total} words, minimum {min}"),
                rule_id: "qa.length.min".to_string(),
            });
        }
    }
    if let Some(max) = brand.max_word_count {
        if total > max {
            issues.push(Issue {
                issue_type: "word_count_above_max".to_string(),
                field: "content".to_string(),
                excerpt: format!("{total} words, maximum {max}"),
                rule_id: "qa.length.max".to_string(),
            });
        }
    }
}

fn tag_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"<\s*(/?)\s*([a-zA-Z][a-zA-Z0-9]*)[^>]*?(/?)>").expect("static regex"))
}

fn check_tag_balance(field: &str, html: &str, issues: &mut Vec<Issue>) {
    use std::collections::HashMap;
    let mut depth: HashMap<String, i64> = HashMap::new();

    for capture in tag_name_pattern().captures_iter(html) {
        let closing = &capture[1] == "/";
        let self_closing = &capture[3] == "/";
        let name = capture[2].to_lowercase();
        if VOID_TAGS.contains(&name.as_str()) || self_closing {
            continue;
        }
        *depth.entry(name).or_insert(0) += if closing { -1 } else { 1 };
    }

    let mut unbalanced: Vec<String> = depth
        .into_iter()
        .filter(|(_, count)| *count != 0)
        .map(|(name, _)| name)
        .collect();
    unbalanced.sort();

    for name in unbalanced {
        issues.push(Issue {
            issue_type: "unbalanced_html".to_string(),
            field: field.to_string(),
            excerpt: format!("<{name}> open/close mismatch"),
            rule_id: format!("qa.html.balance.{name}"),
        });
    }
}

/// A short excerpt of `text` centered on the first occurrence of `needle`
/// (case-insensitive), for display in the review UI.
fn excerpt_around(text: &str, needle: &str) -> String {
    let lowered = text.to_lowercase();
    let Some(pos) = lowered.find(needle) else {
        return needle.to_string();
    };
    // Lowercasing can shift byte offsets for non-ASCII text; bail out to the
    // bare needle rather than slice off a char boundary.
    if pos >= text.len() || !text.is_char_boundary(pos) {
        return needle.to_string();
    }
    let start = text[..pos]
        .char_indices()
        .rev()
        .nth(29)
        .map(|(i, _)| i)
        .unwrap_or(0);
    let end_target = pos + needle.len() + 30;
    let end = if end_target >= text.len() {
        text.len()
    } else {
        let mut e = end_target;
        while !text.is_char_boundary(e) {
            e += 1;
        }
        e
    };
    text[start..end].trim().to_string()
}
