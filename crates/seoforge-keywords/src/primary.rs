//! Primary-keyword selection.
//!
//! Given a collection's candidate keywords and the set of keywords already
//! used as primaries elsewhere: drop the used ones (case-insensitive), sort
//! by `(−volume, keyword length)`, and take the first. When no candidate has
//! positive volume, fall back to the first unexcluded candidate in input
//! order so a collection still gets a primary.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, info};

use crate::{normalize_keyword, volume_desc_key, KeywordCandidate};

/// Outcome of a primary-keyword pick.
#[derive(Debug, Clone, Serialize)]
pub struct PrimaryKeywordResult {
    pub success: bool,
    pub primary_keyword: Option<String>,
    pub primary_volume: Option<u64>,
    pub error: Option<String>,
}

impl PrimaryKeywordResult {
    fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            primary_keyword: None,
            primary_volume: None,
            error: Some(error.into()),
        }
    }
}

/// Pick the primary keyword for a collection.
pub fn select_primary(
    collection_title: &str,
    candidates: &[KeywordCandidate],
    used_primaries: &HashSet<String>,
) -> PrimaryKeywordResult {
    if collection_title.trim().is_empty() {
        return PrimaryKeywordResult::failure("Collection title cannot be empty");
    }
    if candidates.is_empty() {
        return PrimaryKeywordResult::failure("No keyword candidates provided");
    }

    let used: HashSet<String> = used_primaries.iter().map(|k| normalize_keyword(k)).collect();
    let eligible: Vec<&KeywordCandidate> = candidates
        .iter()
        .filter(|c| !used.contains(&normalize_keyword(&c.keyword)))
        .collect();

    if eligible.is_empty() {
        return PrimaryKeywordResult::failure(
            "All candidates already used as primary keywords elsewhere",
        );
    }

    let mut ranked = eligible.clone();
    ranked.sort_by_key(|c| volume_desc_key(c));

    let best = ranked[0];
    let picked = if best.volume.unwrap_or(0) > 0 {
        best
    } else {
        // No volume data anywhere: first unexcluded candidate in input order.
        debug!(
            collection_title = %collection_title.chars().take(100).collect::<String>(),
            "no candidate has positive volume, falling back to input order"
        );
        eligible[0]
    };

    info!(
        collection_title = %collection_title.chars().take(100).collect::<String>(),
        primary_keyword = %picked.keyword,
        primary_volume = picked.volume.unwrap_or(0),
        candidate_count = candidates.len(),
        "primary keyword selected"
    );

    PrimaryKeywordResult {
        success: true,
        primary_keyword: Some(picked.keyword.clone()),
        primary_volume: picked.volume,
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates() -> Vec<KeywordCandidate> {
        vec![
            KeywordCandidate::new("coffee containers", Some(1500)),
            KeywordCandidate::new("coffee storage", Some(2000)),
            KeywordCandidate::new("coffee jar", Some(800)),
            KeywordCandidate::new("airtight coffee canister", Some(500)),
        ]
    }

    #[test]
    fn picks_highest_volume() {
        let result = select_primary("Coffee", &candidates(), &HashSet::new());
        assert!(result.success);
        assert_eq!(result.primary_keyword.as_deref(), Some("coffee storage"));
        assert_eq!(result.primary_volume, Some(2000));
    }

    #[test]
    fn tie_break_prefers_shorter_keyword() {
        let tied = vec![
            KeywordCandidate::new("coffee storage containers", Some(2000)),
            KeywordCandidate::new("coffee storage", Some(2000)),
            KeywordCandidate::new("best coffee storage ideas", Some(2000)),
        ];
        let result = select_primary("Coffee", &tied, &HashSet::new());
        assert_eq!(result.primary_keyword.as_deref(), Some("coffee storage"));
    }

    #[test]
    fn excludes_used_primaries_case_insensitively() {
        let used: HashSet<String> = ["Coffee Storage".to_string()].into();
        let result = select_primary("Coffee", &candidates(), &used);
        assert_eq!(result.primary_keyword.as_deref(), Some("coffee containers"));
    }

    #[test]
    fn falls_back_to_input_order_without_volume() {
        let no_volume = vec![
            KeywordCandidate::new("coffee containers", None),
            KeywordCandidate::new("coffee storage", None),
            KeywordCandidate::new("coffee jar", Some(0)),
        ];
        let result = select_primary("Coffee", &no_volume, &HashSet::new());
        assert!(result.success);
        assert_eq!(result.primary_keyword.as_deref(), Some("coffee containers"));
    }

    #[test]
    fn all_candidates_used_is_a_failure() {
        let used: HashSet<String> = candidates()
            .iter()
            .map(|c| c.keyword.clone())
            .collect();
        let result = select_primary("Coffee", &candidates(), &used);
        assert!(!result.success);
        assert!(result.error.unwrap().contains("already used"));
    }

    #[test]
    fn empty_title_is_a_failure() {
        let result = select_primary("  ", &candidates(), &HashSet::new());
        assert!(!result.success);
    }
}
