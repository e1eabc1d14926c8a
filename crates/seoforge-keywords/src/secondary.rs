//! Secondary-keyword selection: a mix of specific and broader terms.
//!
//! 1. From the specific candidates (dropping the primary, used primaries, and
//!    zero-volume entries, sorted by `(−volume, len)`) take up to
//!    `max_specific`.
//! 2. From the full keyword universe (dropping everything already picked, the
//!    primary, used primaries, and the specific set; volume must meet
//!    `broader_volume_threshold`) take up to
//!    `min(max_broader, 5 − picked)`.
//! 3. If the total is still under 5, refill from the remaining specific
//!    candidates.
//!
//! The specific/broader counts in the result are re-derived at the end from
//! the normalized specific-candidate set rather than incremented during
//! selection, so a keyword normalized twice can never be misattributed.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, info};

use crate::{normalize_keyword, volume_desc_key, KeywordCandidate};

/// Total secondary keywords to aim for.
const TOTAL_SECONDARY_KEYWORDS: usize = 5;

/// Tunables for secondary selection.
#[derive(Debug, Clone)]
pub struct SecondaryConfig {
    pub min_specific: usize,
    pub max_specific: usize,
    pub min_broader: usize,
    pub max_broader: usize,
    pub broader_volume_threshold: u64,
}

impl Default for SecondaryConfig {
    fn default() -> Self {
        Self {
            min_specific: 2,
            max_specific: 3,
            min_broader: 1,
            max_broader: 2,
            broader_volume_threshold: 1000,
        }
    }
}

/// Outcome of secondary-keyword selection.
#[derive(Debug, Clone, Serialize)]
pub struct SecondaryKeywordResult {
    pub success: bool,
    pub secondary_keywords: Vec<KeywordCandidate>,
    pub specific_count: usize,
    pub broader_count: usize,
    pub total_count: usize,
    pub error: Option<String>,
}

impl SecondaryKeywordResult {
    fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            secondary_keywords: Vec::new(),
            specific_count: 0,
            broader_count: 0,
            total_count: 0,
            error: Some(error.into()),
        }
    }
}

/// Select secondary keywords for a collection.
pub fn select_secondary(
    collection_title: &str,
    primary_keyword: &str,
    specific_keywords: &[KeywordCandidate],
    all_keywords: &[KeywordCandidate],
    used_primaries: &HashSet<String>,
    config: &SecondaryConfig,
) -> SecondaryKeywordResult {
    if collection_title.trim().is_empty() {
        return SecondaryKeywordResult::failure("Collection title cannot be empty");
    }
    if primary_keyword.trim().is_empty() {
        return SecondaryKeywordResult::failure("Primary keyword cannot be empty");
    }

    let normalized_primary = normalize_keyword(primary_keyword);
    let used: HashSet<String> = used_primaries.iter().map(|k| normalize_keyword(k)).collect();
    let specific_normalized: HashSet<String> = specific_keywords
        .iter()
        .map(|c| normalize_keyword(&c.keyword))
        .collect();

    let mut selected: Vec<KeywordCandidate> = Vec::new();
    let mut selected_normalized: HashSet<String> = HashSet::new();

    // Step 1: specific keywords.
    let mut specific_candidates: Vec<&KeywordCandidate> = specific_keywords
        .iter()
        .filter(|c| {
            let normalized = normalize_keyword(&c.keyword);
            normalized != normalized_primary
                && !used.contains(&normalized)
                && c.volume.unwrap_or(0) > 0
        })
        .collect();
    specific_candidates.sort_by_key(|c| volume_desc_key(c));

    for candidate in &specific_candidates {
        if selected.len() >= config.max_specific {
            break;
        }
        let normalized = normalize_keyword(&candidate.keyword);
        if selected_normalized.insert(normalized) {
            selected.push((*candidate).clone());
        }
    }

    debug!(
        specific_candidates = specific_candidates.len(),
        specific_selected = selected.len(),
        "specific keywords selected"
    );

    // Step 2: broader terms from the full universe.
    let broader_target = config
        .max_broader
        .min(TOTAL_SECONDARY_KEYWORDS.saturating_sub(selected.len()));

    let mut broader_candidates: Vec<&KeywordCandidate> = all_keywords
        .iter()
        .filter(|c| {
            let normalized = normalize_keyword(&c.keyword);
            !selected_normalized.contains(&normalized)
                && normalized != normalized_primary
                && !used.contains(&normalized)
                && !specific_normalized.contains(&normalized)
                && c.volume.unwrap_or(0) >= config.broader_volume_threshold
        })
        .collect();
    broader_candidates.sort_by_key(|c| volume_desc_key(c));

    let mut broader_picked = 0;
    for candidate in &broader_candidates {
        if broader_picked >= broader_target {
            break;
        }
        let normalized = normalize_keyword(&candidate.keyword);
        if selected_normalized.insert(normalized) {
            selected.push((*candidate).clone());
            broader_picked += 1;
        }
    }

    // Step 3: refill from remaining specifics if still under target.
    let remaining = TOTAL_SECONDARY_KEYWORDS.saturating_sub(selected.len());
    if remaining > 0 {
        let refill: Vec<&KeywordCandidate> = specific_candidates
            .iter()
            .filter(|c| !selected_normalized.contains(&normalize_keyword(&c.keyword)))
            .take(remaining)
            .copied()
            .collect();
        for candidate in refill {
            selected_normalized.insert(normalize_keyword(&candidate.keyword));
            selected.push(candidate.clone());
        }
    }

    // Counts re-derived from normalized input sets.
    let total_count = selected.len();
    let specific_count = selected
        .iter()
        .filter(|c| specific_normalized.contains(&normalize_keyword(&c.keyword)))
        .count();
    let broader_count = total_count - specific_count;

    info!(
        collection_title = %collection_title.chars().take(100).collect::<String>(),
        primary_keyword,
        total_count,
        specific_count,
        broader_count,
        "secondary keywords selected"
    );

    SecondaryKeywordResult {
        success: true,
        secondary_keywords: selected,
        specific_count,
        broader_count,
        total_count,
        error: None,
    }
}
