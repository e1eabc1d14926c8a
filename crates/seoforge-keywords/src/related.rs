//! Related-collection discovery by label overlap.
//!
//! Collections are groups of pages sharing labels; relatedness is the Jaccard
//! coefficient of their label sets, `J(A, B) = |A ∩ B| / |A ∪ B|`. A second
//! mode clusters collections greedily: any collection within
//! `cluster_threshold` of a cluster seed joins that cluster.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, info};

/// A collection of pages with shared labels.
#[derive(Debug, Clone, Serialize)]
pub struct Collection {
    pub id: String,
    pub name: String,
    pub labels: HashSet<String>,
    pub page_count: usize,
}

impl Collection {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        labels: impl IntoIterator<Item = &'static str>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            labels: labels.into_iter().map(|l| l.to_string()).collect(),
            page_count: 0,
        }
    }
}

/// A match with its similarity score and overlap detail.
#[derive(Debug, Clone, Serialize)]
pub struct RelatedCollectionMatch {
    pub collection: Collection,
    pub similarity_score: f64,
    pub overlapping_labels: Vec<String>,
    pub unique_to_source: Vec<String>,
    pub unique_to_match: Vec<String>,
}

/// Outcome of a related-collection search.
#[derive(Debug, Clone, Serialize)]
pub struct RelatedCollectionsResult {
    pub success: bool,
    pub matches: Vec<RelatedCollectionMatch>,
    pub total_candidates: usize,
    /// Candidates dropped for being below the threshold or unlabeled.
    pub filtered_count: usize,
    pub error: Option<String>,
}

/// Jaccard similarity of two label sets. Empty-vs-anything is 0.
pub fn jaccard_similarity(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    intersection as f64 / union as f64
}

/// Find collections related to `source_labels`, sorted by similarity
/// descending and cut at `max_results`.
pub fn find_related(
    source_labels: &HashSet<String>,
    candidates: &[Collection],
    similarity_threshold: f64,
    max_results: usize,
) -> RelatedCollectionsResult {
    if source_labels.is_empty() {
        return RelatedCollectionsResult {
            success: false,
            matches: Vec::new(),
            total_candidates: candidates.len(),
            filtered_count: 0,
            error: Some("Source labels cannot be empty".to_string()),
        };
    }

    let mut matches: Vec<RelatedCollectionMatch> = Vec::new();
    let mut filtered_count = 0;

    for collection in candidates {
        if collection.labels.is_empty() {
            filtered_count += 1;
            continue;
        }
        let similarity = jaccard_similarity(source_labels, &collection.labels);
        if similarity < similarity_threshold {
            filtered_count += 1;
            continue;
        }
        let mut overlapping: Vec<String> = source_labels
            .intersection(&collection.labels)
            .cloned()
            .collect();
        let mut unique_to_source: Vec<String> = source_labels
            .difference(&collection.labels)
            .cloned()
            .collect();
        let mut unique_to_match: Vec<String> = collection
            .labels
            .difference(source_labels)
            .cloned()
            .collect();
        overlapping.sort();
        unique_to_source.sort();
        unique_to_match.sort();

        matches.push(RelatedCollectionMatch {
            collection: collection.clone(),
            similarity_score: similarity,
            overlapping_labels: overlapping,
            unique_to_source,
            unique_to_match,
        });
    }

    matches.sort_by(|a, b| {
        b.similarity_score
            .partial_cmp(&a.similarity_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    matches.truncate(max_results);

    info!(
        total_candidates = candidates.len(),
        matches_found = matches.len(),
        filtered_below_threshold = filtered_count,
        similarity_threshold,
        "related collections search complete"
    );

    RelatedCollectionsResult {
        success: true,
        matches,
        total_candidates: candidates.len(),
        filtered_count,
        error: None,
    }
}

/// Greedy single-pass clustering: each unclustered collection seeds a
/// cluster, and every later collection with `J ≥ cluster_threshold` to the
/// seed joins it.
pub fn find_clusters(
    collections: &[Collection],
    cluster_threshold: f64,
) -> Vec<Vec<Collection>> {
    if collections.is_empty() {
        return Vec::new();
    }

    let mut clustered: HashSet<&str> = HashSet::new();
    let mut clusters: Vec<Vec<Collection>> = Vec::new();

    for collection in collections {
        if clustered.contains(collection.id.as_str()) {
            continue;
        }
        let mut cluster = vec![collection.clone()];
        clustered.insert(collection.id.as_str());

        for other in collections {
            if clustered.contains(other.id.as_str()) {
                continue;
            }
            if jaccard_similarity(&collection.labels, &other.labels) >= cluster_threshold {
                cluster.push(other.clone());
                clustered.insert(other.id.as_str());
            }
        }
        clusters.push(cluster);
    }

    debug!(
        collection_count = collections.len(),
        cluster_count = clusters.len(),
        cluster_threshold,
        "collection clustering complete"
    );

    clusters
}
