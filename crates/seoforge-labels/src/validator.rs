//! Label validation shared by AI assignment and user edits.
//!
//! Labels are normalized (lowercased, trimmed, de-duplicated preserving
//! order), the count must land in `[2, 5]`, and every label must come from
//! the project taxonomy. Validation is idempotent on its normalized output.

use std::collections::HashSet;

use serde::Serialize;
use serde_json::json;

/// Minimum labels a page must carry.
pub const MIN_LABELS_PER_PAGE: usize = 2;
/// Maximum labels a page may carry.
pub const MAX_LABELS_PER_PAGE: usize = 5;

/// One validation failure.
#[derive(Debug, Clone, Serialize)]
pub struct LabelValidationError {
    pub code: &'static str,
    pub message: String,
    pub details: serde_json::Value,
}

/// Validation outcome with the normalized labels.
#[derive(Debug, Clone, Serialize)]
pub struct LabelValidationResult {
    pub valid: bool,
    pub labels: Vec<String>,
    pub errors: Vec<LabelValidationError>,
}

impl LabelValidationResult {
    pub fn error_messages(&self) -> Vec<String> {
        self.errors.iter().map(|e| e.message.clone()).collect()
    }
}

/// Validate `labels` against a taxonomy and the count constraints.
pub fn validate_labels(labels: &[String], taxonomy: &HashSet<String>) -> LabelValidationResult {
    validate_labels_with_bounds(labels, taxonomy, MIN_LABELS_PER_PAGE, MAX_LABELS_PER_PAGE)
}

pub fn validate_labels_with_bounds(
    labels: &[String],
    taxonomy: &HashSet<String>,
    min_labels: usize,
    max_labels: usize,
) -> LabelValidationResult {
    let mut errors: Vec<LabelValidationError> = Vec::new();

    if taxonomy.is_empty() {
        errors.push(LabelValidationError {
            code: "no_taxonomy",
            message: "No taxonomy exists for this project. Generate one first.".to_string(),
            details: json!({}),
        });
        return LabelValidationResult {
            valid: false,
            labels: Vec::new(),
            errors,
        };
    }

    // Normalize and de-duplicate, preserving first-seen order.
    let mut seen: HashSet<String> = HashSet::new();
    let mut normalized: Vec<String> = Vec::new();
    for label in labels {
        let cleaned = label.trim().to_lowercase();
        if cleaned.is_empty() {
            continue;
        }
        if seen.insert(cleaned.clone()) {
            normalized.push(cleaned);
        }
    }

    if normalized.len() < min_labels {
        errors.push(LabelValidationError {
            code: "too_few_labels",
            message: format!(
                "At least {min_labels} labels are required. Got {}.",
                normalized.len()
            ),
            details: json!({"min_required": min_labels, "actual_count": normalized.len()}),
        });
    }

    if normalized.len() > max_labels {
        errors.push(LabelValidationError {
            code: "too_many_labels",
            message: format!(
                "Maximum {max_labels} labels allowed. Got {}.",
                normalized.len()
            ),
            details: json!({"max_allowed": max_labels, "actual_count": normalized.len()}),
        });
    }

    let invalid: Vec<String> = normalized
        .iter()
        .filter(|label| !taxonomy.contains(*label))
        .cloned()
        .collect();
    if !invalid.is_empty() {
        let listed = invalid
            .iter()
            .map(|l| format!("'{l}'"))
            .collect::<Vec<_>>()
            .join(", ");
        let mut valid_labels: Vec<&String> = taxonomy.iter().collect();
        valid_labels.sort();
        errors.push(LabelValidationError {
            code: "invalid_labels",
            message: format!("Invalid labels: {listed}. Must be from project taxonomy."),
            details: json!({"invalid_labels": invalid, "valid_labels": valid_labels}),
        });
    }

    LabelValidationResult {
        valid: errors.is_empty(),
        labels: normalized,
        errors,
    }
}
