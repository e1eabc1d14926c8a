//! Content-brief orchestrator.
//!
//! Fetches optimization data for a page through the provider's 3-step flow,
//! parses the merged response into a `ContentBrief`, and caches it per page.
//! Every failure is folded into the returned outcome; nothing escapes to the
//! caller, so content generation is never blocked by the provider.

use serde_json::Value;
use tracing::{info, warn};

use seoforge_integrations::{PopClient, KEYWORD_VARIATIONS_KEY};
use seoforge_store::Store;
use seoforge_types::{
    Competitor, ContentBrief, CrawledPage, HeadingTarget, KeywordTarget, KeywordTargetKind,
    LsiTerm,
};

/// Result of a brief fetch.
#[derive(Debug, Clone)]
pub struct ContentBriefOutcome {
    pub success: bool,
    pub brief: Option<ContentBrief>,
    pub error: Option<String>,
    pub cached: bool,
}

impl ContentBriefOutcome {
    fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            brief: None,
            error: Some(error.into()),
            cached: false,
        }
    }
}

/// Fetch a content brief for `page`, returning the cached row unless
/// `force_refresh` is set.
pub async fn fetch_content_brief(
    store: &dyn Store,
    pop: &PopClient,
    page: &CrawledPage,
    keyword: &str,
    target_url: &str,
    force_refresh: bool,
) -> ContentBriefOutcome {
    if !force_refresh {
        match store.content_brief_for_page(page.id).await {
            Ok(Some(existing)) => {
                info!(
                    page_id = %page.id,
                    keyword = %head(keyword, 50),
                    "content brief already exists, returning cached"
                );
                return ContentBriefOutcome {
                    success: true,
                    brief: Some(existing),
                    error: None,
                    cached: true,
                };
            }
            Ok(None) => {}
            Err(err) => return ContentBriefOutcome::failure(err.to_string()),
        }
    }

    info!(
        page_id = %page.id,
        keyword = %head(keyword, 50),
        target_url = %head(target_url, 100),
        force_refresh,
        "fetching content brief from optimization provider"
    );

    let (response, task_id) = match pop.fetch_brief_data(keyword, target_url).await {
        Ok(result) => result,
        Err(err) => {
            warn!(
                page_id = %page.id,
                keyword = %head(keyword, 50),
                error = %err,
                "content brief fetch failed"
            );
            return ContentBriefOutcome::failure(err.to_string());
        }
    };

    let brief = parse_brief(page, keyword, &response, Some(task_id));

    info!(
        page_id = %page.id,
        keyword = %head(keyword, 50),
        lsi_term_count = brief.lsi_terms.len(),
        related_search_count = brief.related_searches.len(),
        competitor_count = brief.competitors.len(),
        related_question_count = brief.related_questions.len(),
        heading_target_count = brief.heading_targets.len(),
        keyword_target_count = brief.keyword_targets.len(),
        page_score_target = brief.page_score_target,
        "optimization response parsed"
    );

    match store.upsert_content_brief(brief).await {
        Ok(stored) => ContentBriefOutcome {
            success: true,
            brief: Some(stored),
            error: None,
            cached: false,
        },
        Err(err) => ContentBriefOutcome::failure(format!("failed to store brief: {err}")),
    }
}

/// Parse a merged provider response into a brief row.
pub fn parse_brief(
    page: &CrawledPage,
    keyword: &str,
    response: &Value,
    task_id: Option<String>,
) -> ContentBrief {
    let competitors = parse_competitors(response);
    let (word_count_min, word_count_max) = parse_word_count_range(response, &competitors);

    let mut brief = ContentBrief::new(page.id, keyword);
    brief.lsi_terms = parse_lsi_terms(response);
    brief.related_searches = parse_related_searches(response);
    brief.related_questions = parse_related_questions(response);
    brief.heading_targets = parse_heading_targets(response);
    brief.keyword_targets = parse_keyword_targets(response);
    brief.word_count_target = parse_word_count_target(response);
    brief.word_count_min = word_count_min;
    brief.word_count_max = word_count_max;
    brief.page_score_target = parse_page_score(response, &competitors);
    brief.competitors = competitors;
    brief.raw_response = response.clone();
    brief.pop_task_id = task_id;
    brief
}

fn parse_lsi_terms(response: &Value) -> Vec<LsiTerm> {
    let Some(rows) = response.get("lsaPhrases").and_then(Value::as_array) else {
        return Vec::new();
    };
    rows.iter()
        .filter_map(|row| {
            let phrase = row.get("phrase")?.as_str()?;
            Some(LsiTerm {
                phrase: phrase.to_string(),
                weight: row.get("weight").and_then(number_like).unwrap_or(0.0),
                average_count: row.get("averageCount").and_then(number_like).unwrap_or(0.0),
                target_count: row.get("targetCount").and_then(number_like).unwrap_or(0.0),
            })
        })
        .collect()
}

/// Keyword variations for related searches.
///
/// Prefers the *non-empty* preserved step-1 variations; an empty preserved
/// list falls through to `relatedSearches[].query` (a guard against
/// providers that return `[]`), then to `variations` if those are still
/// strings.
fn parse_related_searches(response: &Value) -> Vec<String> {
    if let Some(preserved) = response.get(KEYWORD_VARIATIONS_KEY).and_then(Value::as_array) {
        let strings: Vec<String> = preserved
            .iter()
            .filter_map(Value::as_str)
            .map(|s| s.to_string())
            .collect();
        if !strings.is_empty() {
            return strings;
        }
    }

    if let Some(related) = response.get("relatedSearches").and_then(Value::as_array) {
        let strings: Vec<String> = related
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Object(map) => map
                    .get("query")
                    .and_then(Value::as_str)
                    .map(|s| s.to_string()),
                _ => None,
            })
            .collect();
        if !strings.is_empty() {
            return strings;
        }
    }

    response
        .get("variations")
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .filter_map(Value::as_str)
                .map(|s| s.to_string())
                .collect()
        })
        .unwrap_or_default()
}

fn parse_word_count_target(response: &Value) -> Option<u32> {
    if let Some(target) = response
        .get("wordCount")
        .and_then(|wc| wc.get("target"))
        .and_then(number_like)
    {
        return Some(target as u32);
    }
    response
        .get("wordCountTarget")
        .and_then(number_like)
        .map(|t| t as u32)
}

fn parse_competitors(response: &Value) -> Vec<Competitor> {
    let Some(rows) = response.get("competitors").and_then(Value::as_array) else {
        return Vec::new();
    };
    rows.iter()
        .filter_map(Value::as_object)
        .map(|comp| Competitor {
            url: comp
                .get("url")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            title: comp
                .get("title")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            h2_texts: string_list(comp.get("h2Texts")),
            h3_texts: string_list(comp.get("h3Texts")),
            // Real responses carry null scores for pages not yet built.
            page_score: comp.get("pageScore").and_then(number_like).unwrap_or(0.0),
            word_count: comp.get("wordCount").and_then(number_like).unwrap_or(0.0) as u32,
        })
        .collect()
}

fn parse_related_questions(response: &Value) -> Vec<String> {
    let Some(rows) = response.get("relatedQuestions").and_then(Value::as_array) else {
        return Vec::new();
    };
    rows.iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.clone()),
            Value::Object(map) => map
                .get("question")
                .and_then(Value::as_str)
                .map(|s| s.to_string()),
            _ => None,
        })
        .collect()
}

/// Heading targets from `pageStructure` recommendations plus `tagCounts`,
/// de-duplicated case-insensitively with recommendations taking precedence.
fn parse_heading_targets(response: &Value) -> Vec<HeadingTarget> {
    let mut targets: Vec<HeadingTarget> = Vec::new();

    if let Some(rows) = response.get("pageStructure").and_then(Value::as_array) {
        for row in rows.iter().filter_map(Value::as_object) {
            let Some(signal) = row.get("signal").and_then(Value::as_str) else {
                continue;
            };
            // pageStructure items carry mean/min/max but no "target" key.
            targets.push(HeadingTarget {
                tag: signal.to_string(),
                target: row
                    .get("mean")
                    .and_then(number_like)
                    .unwrap_or(0.0)
                    .round() as i64,
                min: row.get("min").and_then(number_like).unwrap_or(0.0) as i64,
                max: row.get("max").and_then(number_like).unwrap_or(0.0) as i64,
                source: "recommendations".to_string(),
            });
        }
    }

    match response.get("tagCounts") {
        Some(Value::Array(rows)) => {
            for row in rows.iter().filter_map(Value::as_object) {
                let Some(tag_label) = row.get("tagLabel").and_then(Value::as_str) else {
                    continue;
                };
                if has_tag(&targets, tag_label) {
                    continue;
                }
                targets.push(HeadingTarget {
                    tag: tag_label.to_string(),
                    target: row
                        .get("mean")
                        .and_then(number_like)
                        .unwrap_or(0.0)
                        .round() as i64,
                    min: row.get("min").and_then(number_like).unwrap_or(0.0) as i64,
                    max: row.get("max").and_then(number_like).unwrap_or(0.0) as i64,
                    source: "tagCounts".to_string(),
                });
            }
        }
        Some(Value::Object(map)) => {
            // Flat shape: {"h1": 1, "h2": 5}.
            for (tag, count) in map {
                let Some(count) = number_like(count) else { continue };
                if has_tag(&targets, tag) {
                    continue;
                }
                targets.push(HeadingTarget {
                    tag: tag.clone(),
                    target: count as i64,
                    min: 0,
                    max: 0,
                    source: "tagCounts".to_string(),
                });
            }
        }
        _ => {}
    }

    targets
}

fn parse_keyword_targets(response: &Value) -> Vec<KeywordTarget> {
    let mut targets: Vec<KeywordTarget> = Vec::new();

    if let Some(rows) = response.get("exactKeyword").and_then(Value::as_array) {
        for row in rows.iter().filter_map(Value::as_object) {
            let Some(signal) = row.get("signal").and_then(Value::as_str) else {
                continue;
            };
            targets.push(KeywordTarget {
                signal: signal.to_string(),
                target: row.get("target").and_then(number_like).unwrap_or(0.0) as i64,
                phrase: None,
                comment: row
                    .get("comment")
                    .and_then(Value::as_str)
                    .map(|s| s.to_string()),
                kind: KeywordTargetKind::Exact,
            });
        }
    }

    if let Some(rows) = response.get("lsi").and_then(Value::as_array) {
        for row in rows.iter().filter_map(Value::as_object) {
            let Some(signal) = row.get("signal").and_then(Value::as_str) else {
                continue;
            };
            // The real API puts the phrase in "comment".
            let phrase = row
                .get("phrase")
                .and_then(Value::as_str)
                .or_else(|| row.get("comment").and_then(Value::as_str))
                .unwrap_or_default();
            targets.push(KeywordTarget {
                signal: signal.to_string(),
                target: row.get("target").and_then(number_like).unwrap_or(0.0) as i64,
                phrase: Some(phrase.to_string()),
                comment: None,
                kind: KeywordTargetKind::Lsi,
            });
        }
    }

    targets
}

/// Word-count range: competitor word counts when present, then explicit
/// `competitorsMin`/`competitorsMax`, then ±20% of the target.
fn parse_word_count_range(
    response: &Value,
    competitors: &[Competitor],
) -> (Option<u32>, Option<u32>) {
    let counts: Vec<u32> = competitors
        .iter()
        .map(|c| c.word_count)
        .filter(|wc| *wc > 0)
        .collect();
    if !counts.is_empty() {
        return (
            counts.iter().min().copied(),
            counts.iter().max().copied(),
        );
    }

    if let Some(wc) = response.get("wordCount").and_then(Value::as_object) {
        let min = wc.get("competitorsMin").and_then(number_like);
        let max = wc.get("competitorsMax").and_then(number_like);
        if let (Some(min), Some(max)) = (min, max) {
            return (Some(min as u32), Some(max as u32));
        }
        if let Some(target) = wc.get("target").and_then(number_like) {
            return (Some((target * 0.8) as u32), Some((target * 1.2) as u32));
        }
    }

    (None, None)
}

/// Page-score target: top level when present, else the mean of competitor
/// scores rounded to one decimal.
fn parse_page_score(response: &Value, competitors: &[Competitor]) -> Option<f64> {
    if let Some(score) = response.get("pageScore").and_then(number_like) {
        return Some(score);
    }

    let scores: Vec<f64> = competitors
        .iter()
        .map(|c| c.page_score)
        .filter(|s| *s > 0.0)
        .collect();
    if scores.is_empty() {
        return None;
    }
    let mean = scores.iter().sum::<f64>() / scores.len() as f64;
    Some((mean * 10.0).round() / 10.0)
}

fn number_like(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .filter_map(Value::as_str)
                .map(|s| s.to_string())
                .collect()
        })
        .unwrap_or_default()
}

fn has_tag(targets: &[HeadingTarget], tag: &str) -> bool {
    targets.iter().any(|t| t.tag.eq_ignore_ascii_case(tag))
}

fn head(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
