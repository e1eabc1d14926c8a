//! Taxonomy generation and label assignment.
//!
//! `generate_taxonomy` summarizes a project's completed pages, asks the LLM
//! for a label taxonomy, and stores it under
//! `project.phase_status.onboarding.taxonomy`. `assign_labels` then labels
//! each page against that taxonomy, validating every assignment with the
//! shared validator before persisting.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use seoforge_integrations::{extract_json, LlmClient};
use seoforge_store::Store;
use seoforge_types::{CoreError, CoreResult, CrawledPage, Project};

use crate::validator::validate_labels;

const TAXONOMY_SYSTEM_PROMPT: &str = "\
You are a site-architecture analyst. Given summaries of a website's pages, \
produce a taxonomy of 5-12 labels that captures the distinct content types \
and purposes present on this site. Labels must be lowercase kebab-case, \
specific to this site's content, and mutually distinguishable. Never emit \
generic labels like 'page', 'content', 'website', 'general', or 'misc'. \
Respond with JSON only: {\"labels\": [{\"name\": ..., \"description\": ..., \
\"examples\": [...]}], \"reasoning\": ...}";

const ASSIGNMENT_SYSTEM_PROMPT: &str = "\
You label website pages against a fixed taxonomy. Choose 2-5 labels from the \
provided taxonomy that best describe the page. Use only labels from the \
taxonomy, exactly as written. Respond with JSON only: \
{\"labels\": [...], \"confidence\": 0.0-1.0, \"reasoning\": ...}";

/// A label definition in the taxonomy.
#[derive(Debug, Clone)]
pub struct TaxonomyLabel {
    pub name: String,
    pub description: String,
    pub examples: Vec<String>,
}

/// Result of taxonomy generation.
#[derive(Debug, Clone)]
pub struct GeneratedTaxonomy {
    pub labels: Vec<TaxonomyLabel>,
    pub reasoning: String,
}

/// Result of labeling one page.
#[derive(Debug, Clone)]
pub struct LabelAssignment {
    pub page_id: Uuid,
    pub labels: Vec<String>,
    pub confidence: f64,
    pub success: bool,
    pub error: Option<String>,
}

/// Service generating taxonomies and assigning labels.
pub struct LabelTaxonomyService {
    store: Arc<dyn Store>,
    llm: Arc<LlmClient>,
}

impl LabelTaxonomyService {
    pub fn new(store: Arc<dyn Store>, llm: Arc<LlmClient>) -> Self {
        Self { store, llm }
    }

    /// Generate and persist a taxonomy for a project. Returns `None` when
    /// the project has no completed pages or the model output is unusable.
    pub async fn generate_taxonomy(
        &self,
        project_id: Uuid,
    ) -> CoreResult<Option<GeneratedTaxonomy>> {
        let pages = self.store.completed_pages(project_id).await?;
        if pages.is_empty() {
            warn!(%project_id, "no completed pages found for taxonomy generation");
            return Ok(None);
        }

        info!(%project_id, page_count = pages.len(), "generating taxonomy");

        let summaries: Vec<String> = pages.iter().map(page_summary).collect();
        let user_prompt = format!(
            "Analyze these {} pages from a website and generate a taxonomy of labels:\n\n{}\n\n\
             Generate a taxonomy that captures the main content types and purposes of these pages.",
            pages.len(),
            summaries.join("\n")
        );

        let completion = self
            .llm
            .complete(&user_prompt, Some(TAXONOMY_SYSTEM_PROMPT), 2000, 0.1)
            .await;
        if !completion.success {
            warn!(
                %project_id,
                error = completion.error.as_deref().unwrap_or("unknown"),
                "taxonomy generation failed"
            );
            return Ok(None);
        }

        let text = completion.text.unwrap_or_default();
        let parsed: Value = match serde_json::from_str(extract_json(&text)) {
            Ok(value) => value,
            Err(err) => {
                warn!(%project_id, error = %err, "failed to parse taxonomy response");
                return Ok(None);
            }
        };

        let labels: Vec<TaxonomyLabel> = parsed
            .get("labels")
            .and_then(Value::as_array)
            .map(|rows| {
                rows.iter()
                    .filter_map(|row| {
                        let name = row.get("name")?.as_str()?.trim().to_lowercase();
                        if name.is_empty() {
                            return None;
                        }
                        Some(TaxonomyLabel {
                            name,
                            description: row
                                .get("description")
                                .and_then(Value::as_str)
                                .unwrap_or_default()
                                .to_string(),
                            examples: row
                                .get("examples")
                                .and_then(Value::as_array)
                                .map(|e| {
                                    e.iter()
                                        .filter_map(Value::as_str)
                                        .map(|s| s.to_string())
                                        .collect()
                                })
                                .unwrap_or_default(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        if labels.is_empty() {
            warn!(%project_id, "taxonomy response contained no labels");
            return Ok(None);
        }

        let taxonomy = GeneratedTaxonomy {
            labels,
            reasoning: parsed
                .get("reasoning")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        };

        self.persist_taxonomy(project_id, &taxonomy).await?;
        info!(
            %project_id,
            label_count = taxonomy.labels.len(),
            "taxonomy generated and stored"
        );
        Ok(Some(taxonomy))
    }

    /// Assign labels to every completed page of a project against its stored
    /// taxonomy. Per-page failures are recorded, not raised.
    pub async fn assign_labels(&self, project_id: Uuid) -> CoreResult<Vec<LabelAssignment>> {
        let project = self
            .store
            .project(project_id)
            .await?
            .ok_or_else(|| CoreError::not_found("project", project_id.to_string()))?;
        let taxonomy = taxonomy_label_set(&project);
        if taxonomy.is_empty() {
            return Err(CoreError::validation(
                "taxonomy",
                project_id.to_string(),
                "no taxonomy exists for this project",
            ));
        }

        let pages = self.store.completed_pages(project_id).await?;
        let mut assignments = Vec::with_capacity(pages.len());
        for page in &pages {
            let assignment = self.assign_labels_to_page(page, &taxonomy).await;
            if assignment.success {
                if let Err(err) = self
                    .store
                    .set_page_labels(page.id, assignment.labels.clone())
                    .await
                {
                    warn!(page_id = %page.id, error = %err, "failed to persist page labels");
                }
            }
            assignments.push(assignment);
        }

        info!(
            %project_id,
            total = assignments.len(),
            labeled = assignments.iter().filter(|a| a.success).count(),
            "label assignment complete"
        );
        Ok(assignments)
    }

    async fn assign_labels_to_page(
        &self,
        page: &CrawledPage,
        taxonomy: &HashSet<String>,
    ) -> LabelAssignment {
        let mut taxonomy_list: Vec<&String> = taxonomy.iter().collect();
        taxonomy_list.sort();
        let user_prompt = format!(
            "Taxonomy labels:\n{}\n\nPage:\n{}\n\nAssign 2-5 labels.",
            taxonomy_list
                .iter()
                .map(|l| format!("- {l}"))
                .collect::<Vec<_>>()
                .join("\n"),
            page_summary(page)
        );

        let completion = self
            .llm
            .complete(&user_prompt, Some(ASSIGNMENT_SYSTEM_PROMPT), 500, 0.0)
            .await;
        if !completion.success {
            return LabelAssignment {
                page_id: page.id,
                labels: Vec::new(),
                confidence: 0.0,
                success: false,
                error: completion.error,
            };
        }

        let text = completion.text.unwrap_or_default();
        let parsed: Value = match serde_json::from_str(extract_json(&text)) {
            Ok(value) => value,
            Err(err) => {
                return LabelAssignment {
                    page_id: page.id,
                    labels: Vec::new(),
                    confidence: 0.0,
                    success: false,
                    error: Some(format!("unparseable assignment response: {err}")),
                }
            }
        };

        let proposed: Vec<String> = parsed
            .get("labels")
            .and_then(Value::as_array)
            .map(|rows| {
                rows.iter()
                    .filter_map(Value::as_str)
                    .map(|s| s.to_string())
                    .collect()
            })
            .unwrap_or_default();

        let validation = validate_labels(&proposed, taxonomy);
        if !validation.valid {
            let error = Some(validation.error_messages().join("; "));
            return LabelAssignment {
                page_id: page.id,
                labels: validation.labels,
                confidence: 0.0,
                success: false,
                error,
            };
        }

        LabelAssignment {
            page_id: page.id,
            labels: validation.labels,
            confidence: parsed
                .get("confidence")
                .and_then(Value::as_f64)
                .unwrap_or(0.0),
            success: true,
            error: None,
        }
    }

    async fn persist_taxonomy(
        &self,
        project_id: Uuid,
        taxonomy: &GeneratedTaxonomy,
    ) -> CoreResult<()> {
        let mut project = self
            .store
            .project(project_id)
            .await?
            .ok_or_else(|| CoreError::not_found("project", project_id.to_string()))?;

        let blob = json!({
            "labels": taxonomy
                .labels
                .iter()
                .map(|l| json!({
                    "name": l.name,
                    "description": l.description,
                    "examples": l.examples,
                }))
                .collect::<Vec<_>>(),
            "reasoning": taxonomy.reasoning,
            "generated_at": Utc::now().to_rfc3339(),
        });

        if !project.phase_status.is_object() {
            project.phase_status = Value::Object(Default::default());
        }
        let phase_status = project.phase_status.as_object_mut().expect("object");
        let onboarding = phase_status
            .entry("onboarding")
            .or_insert_with(|| Value::Object(Default::default()));
        if !onboarding.is_object() {
            *onboarding = Value::Object(Default::default());
        }
        onboarding
            .as_object_mut()
            .expect("object")
            .insert("taxonomy".to_string(), blob);

        self.store.save_project(project).await
    }
}

/// Labels from a project's stored taxonomy.
pub fn taxonomy_label_set(project: &Project) -> HashSet<String> {
    project
        .phase_status
        .get("onboarding")
        .and_then(|o| o.get("taxonomy"))
        .and_then(|t| t.get("labels"))
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .filter_map(|row| row.get("name").and_then(Value::as_str))
                .map(|s| s.to_lowercase())
                .collect()
        })
        .unwrap_or_default()
}

fn page_summary(page: &CrawledPage) -> String {
    let mut summary = format!("- URL: {}", page.normalized_url);
    if let Some(title) = &page.title {
        summary.push_str(&format!("\n  Title: {title}"));
    }
    if let Some(meta) = &page.meta_description {
        let cut: String = meta.chars().take(200).collect();
        summary.push_str(&format!("\n  Description: {cut}"));
    }
    if let Some(h1) = page.headings.get("h1").and_then(|h| h.first()) {
        summary.push_str(&format!("\n  H1: {h1}"));
    }
    if let Some(products) = page.product_count {
        summary.push_str(&format!("\n  Products: {products}"));
    }
    if let Some(words) = page.word_count {
        summary.push_str(&format!("\n  Word count: {words}"));
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_label_set_reads_phase_status() {
        let mut project = Project::new("Shop", "https://shop.example");
        project.phase_status = json!({
            "onboarding": {
                "taxonomy": {
                    "labels": [
                        {"name": "Product-Detail", "description": "", "examples": []},
                        {"name": "blog-post", "description": "", "examples": []}
                    ],
                    "reasoning": "r"
                }
            }
        });
        let labels = taxonomy_label_set(&project);
        assert!(labels.contains("product-detail"));
        assert!(labels.contains("blog-post"));
        assert_eq!(labels.len(), 2);
    }

    #[test]
    fn taxonomy_label_set_empty_without_taxonomy() {
        let project = Project::new("Shop", "https://shop.example");
        assert!(taxonomy_label_set(&project).is_empty());
    }

    #[test]
    fn page_summary_includes_available_fields() {
        let mut page = CrawledPage::new(Uuid::new_v4(), "https://shop.example/gear");
        page.title = Some("Gear".to_string());
        page.product_count = Some(12);
        page.headings
            .insert("h1".to_string(), vec!["Outdoor Gear".to_string()]);
        let summary = page_summary(&page);
        assert!(summary.contains("URL: https://shop.example/gear"));
        assert!(summary.contains("Title: Gear"));
        assert!(summary.contains("H1: Outdoor Gear"));
        assert!(summary.contains("Products: 12"));
    }
}
