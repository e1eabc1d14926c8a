//! # SEOForge Keywords
//!
//! Pure keyword-selection algorithms used by the research workflow:
//!
//! - `primary`: pick the primary keyword for a collection (highest volume,
//!   shorter-keyword tie-break)
//! - `secondary`: pick 3–5 secondary keywords as a specific/broader mix
//! - `related`: Jaccard-similarity related-collection ranking and greedy
//!   clustering
//!
//! Everything here is deterministic and side-effect free; comparison always
//! happens on normalized keywords (lowercased, collapsed whitespace).

pub mod primary;
pub mod related;
pub mod secondary;

pub use primary::{select_primary, PrimaryKeywordResult};
pub use related::{
    find_clusters, find_related, jaccard_similarity, Collection, RelatedCollectionMatch,
    RelatedCollectionsResult,
};
pub use secondary::{select_secondary, SecondaryConfig, SecondaryKeywordResult};

use serde::{Deserialize, Serialize};

/// A keyword candidate with volume data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordCandidate {
    pub keyword: String,
    pub volume: Option<u64>,
    #[serde(default)]
    pub cpc: Option<f64>,
    #[serde(default)]
    pub competition: Option<f64>,
}

impl KeywordCandidate {
    pub fn new(keyword: impl Into<String>, volume: Option<u64>) -> Self {
        Self {
            keyword: keyword.into(),
            volume,
            cpc: None,
            competition: None,
        }
    }
}

/// Normalize a keyword for comparison: lowercase, trimmed, single spaces.
pub fn normalize_keyword(keyword: &str) -> String {
    keyword
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Sort key for "highest volume first, shorter keyword wins ties".
pub(crate) fn volume_desc_key(candidate: &KeywordCandidate) -> (i128, usize) {
    let volume = candidate.volume.unwrap_or(0) as i128;
    (-volume, candidate.keyword.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_collapses_whitespace() {
        assert_eq!(normalize_keyword("  Coffee   Storage "), "coffee storage");
        assert_eq!(normalize_keyword("COFFEE"), "coffee");
    }

    #[test]
    fn sort_key_orders_by_volume_then_length() {
        let high = KeywordCandidate::new("high volume", Some(2000));
        let low = KeywordCandidate::new("low volume", Some(500));
        assert!(volume_desc_key(&high) < volume_desc_key(&low));

        let short = KeywordCandidate::new("coffee", Some(1000));
        let long = KeywordCandidate::new("coffee storage container", Some(1000));
        assert!(volume_desc_key(&short) < volume_desc_key(&long));
    }
}
