//! Content editing operations.
//!
//! Library surface behind the review/approval endpoints: partial field
//! updates (which re-derive the word count and clear approval), approval
//! toggles, bulk approval of clean pages, and quality recheck.

use chrono::Utc;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use seoforge_quality::{content_word_count, run_quality_checks, QaResults};
use seoforge_store::Store;
use seoforge_types::{BrandSettings, ContentStatus, CoreError, CoreResult, PageContent};

/// Partial update of the editable content fields. `Some` values are applied;
/// `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct ContentEdit {
    pub page_title: Option<String>,
    pub meta_description: Option<String>,
    pub top_description: Option<String>,
    pub bottom_description: Option<String>,
}

impl ContentEdit {
    fn is_empty(&self) -> bool {
        self.page_title.is_none()
            && self.meta_description.is_none()
            && self.top_description.is_none()
            && self.bottom_description.is_none()
    }
}

/// Apply a partial edit. Any change re-derives `word_count` and clears
/// approval, so edited content always goes back through review.
pub async fn update_content(
    store: &dyn Store,
    page_id: Uuid,
    edit: ContentEdit,
) -> CoreResult<PageContent> {
    let mut content = load_content(store, page_id).await?;

    if edit.is_empty() {
        return Ok(content);
    }

    let mut changed = false;
    let mut apply = |target: &mut Option<String>, value: Option<String>| {
        if let Some(value) = value {
            if target.as_deref() != Some(value.as_str()) {
                *target = Some(value);
                changed = true;
            }
        }
    };
    apply(&mut content.page_title, edit.page_title);
    apply(&mut content.meta_description, edit.meta_description);
    apply(&mut content.top_description, edit.top_description);
    apply(&mut content.bottom_description, edit.bottom_description);

    if changed {
        content.word_count = content_word_count(&content);
        content.is_approved = false;
        content.approved_at = None;
        store.save_page_content(content.clone()).await?;
        info!(%page_id, word_count = content.word_count, "content updated, approval cleared");
    }
    Ok(content)
}

/// Approve content. Only `complete` content can be approved.
pub async fn approve_content(store: &dyn Store, page_id: Uuid) -> CoreResult<PageContent> {
    let mut content = load_content(store, page_id).await?;
    if content.status != ContentStatus::Complete {
        return Err(CoreError::validation(
            "status",
            content.status.to_string(),
            "only complete content can be approved",
        ));
    }
    content.is_approved = true;
    content.approved_at = Some(Utc::now());
    store.save_page_content(content.clone()).await?;
    Ok(content)
}

/// Clear approval.
pub async fn unapprove_content(store: &dyn Store, page_id: Uuid) -> CoreResult<PageContent> {
    let mut content = load_content(store, page_id).await?;
    content.is_approved = false;
    content.approved_at = None;
    store.save_page_content(content.clone()).await?;
    Ok(content)
}

/// Approve every eligible page of a project: `complete`, QA passed, not yet
/// approved. Returns the number approved.
pub async fn bulk_approve(store: &dyn Store, project_id: Uuid) -> CoreResult<usize> {
    let contents = store.contents_for_project(project_id).await?;
    let now = Utc::now();
    let mut approved = 0;

    for mut content in contents {
        if content.status != ContentStatus::Complete || content.is_approved {
            continue;
        }
        let qa_passed = content
            .qa_results
            .as_ref()
            .and_then(|qa| qa.get("passed"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if !qa_passed {
            continue;
        }
        content.is_approved = true;
        content.approved_at = Some(now);
        store.save_page_content(content).await?;
        approved += 1;
    }

    info!(%project_id, approved, "bulk approval complete");
    Ok(approved)
}

/// Re-run the quality checks over current content.
pub async fn recheck_content(
    store: &dyn Store,
    project_id: Uuid,
    page_id: Uuid,
) -> CoreResult<QaResults> {
    let mut content = load_content(store, page_id).await?;
    let brand = match store.brand_config(project_id).await? {
        Some(config) => BrandSettings::from_value(&config.v2_schema),
        None => BrandSettings::default(),
    };
    let results = run_quality_checks(&mut content, &brand);
    store.save_page_content(content).await?;
    Ok(results)
}

async fn load_content(store: &dyn Store, page_id: Uuid) -> CoreResult<PageContent> {
    store
        .page_content(page_id)
        .await?
        .ok_or_else(|| CoreError::not_found("page_content", page_id.to_string()))
}

// Re-exported for the service layer's status aggregation.
pub(crate) fn qa_passed(content: &PageContent) -> Option<bool> {
    content
        .qa_results
        .as_ref()
        .and_then(|qa| qa.get("passed"))
        .and_then(Value::as_bool)
}

pub(crate) fn qa_issue_count(content: &PageContent) -> usize {
    content
        .qa_results
        .as_ref()
        .and_then(|qa| qa.get("issues"))
        .and_then(Value::as_array)
        .map(|issues| issues.len())
        .unwrap_or(0)
}

pub(crate) fn qa_error(content: &PageContent) -> Option<String> {
    content
        .qa_results
        .as_ref()
        .and_then(|qa| qa.get("error"))
        .and_then(Value::as_str)
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use seoforge_store::MemoryStore;
    use serde_json::json;

    async fn complete_content(store: &MemoryStore, qa_passed: bool) -> PageContent {
        let mut content = PageContent::new(Uuid::new_v4());
        content.status = ContentStatus::Complete;
        content.page_title = Some("Coffee Storage".to_string());
        content.meta_description = Some("Keep beans fresh".to_string());
        content.top_description = Some("<p>Top copy here.</p>".to_string());
        content.bottom_description = Some("<p>Bottom copy.</p>".to_string());
        content.word_count = 99; // deliberately wrong; edits must re-derive
        content.qa_results = Some(json!({"passed": qa_passed, "issues": []}));
        store.save_page_content(content.clone()).await.unwrap();
        content
    }

    #[tokio::test]
    async fn edit_rederives_word_count_and_clears_approval() {
        let store = MemoryStore::new();
        let mut content = complete_content(&store, true).await;
        content.is_approved = true;
        content.approved_at = Some(Utc::now());
        store.save_page_content(content.clone()).await.unwrap();

        let edited = update_content(
            &store,
            content.crawled_page_id,
            ContentEdit {
                bottom_description: Some("<p>Five words exactly in here</p>".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        // title(2) + meta(3) + top(3) + bottom(5)
        assert_eq!(edited.word_count, 13);
        assert!(!edited.is_approved);
        assert!(edited.approved_at.is_none());
    }

    #[tokio::test]
    async fn noop_edit_keeps_approval() {
        let store = MemoryStore::new();
        let mut content = complete_content(&store, true).await;
        content.is_approved = true;
        store.save_page_content(content.clone()).await.unwrap();

        let unchanged = update_content(
            &store,
            content.crawled_page_id,
            ContentEdit {
                page_title: Some("Coffee Storage".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(unchanged.is_approved);
    }

    #[tokio::test]
    async fn approve_requires_complete_status() {
        let store = MemoryStore::new();
        let mut content = complete_content(&store, true).await;
        content.status = ContentStatus::Writing;
        store.save_page_content(content.clone()).await.unwrap();

        let err = approve_content(&store, content.crawled_page_id)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation { .. }));
    }

    #[tokio::test]
    async fn approve_and_unapprove_round_trip() {
        let store = MemoryStore::new();
        let content = complete_content(&store, true).await;

        let approved = approve_content(&store, content.crawled_page_id)
            .await
            .unwrap();
        assert!(approved.is_approved);
        assert!(approved.approved_at.is_some());

        let unapproved = unapprove_content(&store, content.crawled_page_id)
            .await
            .unwrap();
        assert!(!unapproved.is_approved);
        assert!(unapproved.approved_at.is_none());
    }

    #[tokio::test]
    async fn bulk_approve_skips_failed_qa_and_already_approved() {
        let store = MemoryStore::new();
        let project = seoforge_types::Project::new("P", "https://p.example");
        store.insert_project(project.clone()).await.unwrap();

        let mut eligible_ids = Vec::new();
        for (qa, pre_approved) in [(true, false), (false, false), (true, true)] {
            let mut page =
                seoforge_types::CrawledPage::new(project.id, format!("https://p.example/{qa}{pre_approved}"));
            page.project_id = project.id;
            store.insert_page(page.clone()).await.unwrap();
            let mut content = complete_content(&store, qa).await;
            content.crawled_page_id = page.id;
            content.is_approved = pre_approved;
            store.save_page_content(content.clone()).await.unwrap();
            if qa && !pre_approved {
                eligible_ids.push(page.id);
            }
        }

        let approved = bulk_approve(&store, project.id).await.unwrap();
        assert_eq!(approved, eligible_ids.len());
    }

    #[tokio::test]
    async fn recheck_flags_edited_regression() {
        let store = MemoryStore::new();
        let project = seoforge_types::Project::new("P", "https://p.example");
        store.insert_project(project.clone()).await.unwrap();
        let content = complete_content(&store, true).await;

        // Introduce a tier-1 word, then recheck.
        update_content(
            &store,
            content.crawled_page_id,
            ContentEdit {
                bottom_description: Some("<p>Let's delve into beans.</p>".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let results = recheck_content(&store, project.id, content.crawled_page_id)
            .await
            .unwrap();
        assert!(!results.passed);
        assert!(results
            .issues
            .iter()
            .any(|i| i.issue_type == "tier1_ai_word" && i.excerpt.contains("delve")));
    }

    #[tokio::test]
    async fn missing_content_is_not_found() {
        let store = MemoryStore::new();
        let err = update_content(&store, Uuid::new_v4(), ContentEdit::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
    }
}
