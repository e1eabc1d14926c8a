//! Upstream contract: trigger, status, and startup recovery.
//!
//! The HTTP layer calls these and maps the results onto its responses
//! (`202`, `400` for no approved keywords, `409` for an active run). The
//! spawned run outlives the request that triggered it; the active-run
//! registry entry is released by an RAII guard on every exit path.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

use chrono::Utc;
use seoforge_store::Store;
use seoforge_types::{ContentStatus, CoreError, CoreResult, GenerationJob, JobStatus};

use crate::editing::{qa_error, qa_issue_count, qa_passed};
use crate::pipeline::ContentPipeline;
use crate::registry::ActiveRunRegistry;

/// Why a trigger was rejected.
#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("no approved keywords exist for project {0}")]
    NoApprovedKeywords(Uuid),
    #[error("content generation already in progress for project {0}")]
    AlreadyRunning(Uuid),
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Overall status of a project's generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Idle,
    Generating,
    Complete,
    Failed,
}

/// Per-page entry in the status report.
#[derive(Debug, Clone, Serialize)]
pub struct PageStatus {
    pub page_id: Uuid,
    pub url: String,
    pub keyword: String,
    pub source: String,
    pub status: String,
    pub error: Option<String>,
    pub qa_passed: Option<bool>,
    pub qa_issue_count: usize,
    pub is_approved: bool,
}

/// Aggregate status for the polling endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub overall_status: OverallStatus,
    pub pages_total: usize,
    pub pages_pending: usize,
    pub pages_generating: usize,
    pub pages_complete: usize,
    pub pages_failed: usize,
    pub pages_approved: usize,
    pub pages: Vec<PageStatus>,
}

/// Validate and launch a pipeline run as a background task.
///
/// Returns once the run is accepted; the pipeline itself runs on the task
/// scheduler and survives the caller's scope.
pub async fn trigger_generation(
    pipeline: Arc<ContentPipeline>,
    registry: Arc<ActiveRunRegistry>,
    project_id: Uuid,
    force_refresh: bool,
    refresh_briefs: bool,
) -> Result<(), TriggerError> {
    let approved = pipeline.store().approved_pages(project_id).await?;
    if approved.is_empty() {
        return Err(TriggerError::NoApprovedKeywords(project_id));
    }

    let Some(guard) = registry.try_claim(project_id) else {
        return Err(TriggerError::AlreadyRunning(project_id));
    };

    info!(%project_id, force_refresh, refresh_briefs, "content generation accepted");

    // Durable job record for this run; the recovery sweep closes it out if
    // the process dies mid-run.
    let mut job = GenerationJob::new(project_id);
    job.status = JobStatus::Running;
    job.started_at = Some(Utc::now());
    let job_id = job.id;
    pipeline.store().insert_job(job).await?;

    tokio::spawn(async move {
        // Guard moves into the task; dropping it on any exit path (normal
        // completion or panic unwind) releases the registry entry.
        let cancel = guard.cancel_flag();
        let _guard = guard;
        let result = pipeline
            .run_with_cancel(project_id, force_refresh, refresh_briefs, Some(cancel))
            .await;
        if result.failed > 0 {
            error!(
                %project_id,
                failed = result.failed,
                succeeded = result.succeeded,
                "pipeline finished with failures"
            );
        }
        if let Err(err) = close_job(pipeline.store(), job_id, &result).await {
            error!(%project_id, error = %err, "failed to close generation job");
        }
    });

    Ok(())
}

async fn close_job(
    store: &Arc<dyn Store>,
    job_id: Uuid,
    result: &crate::pipeline::PipelineResult,
) -> CoreResult<()> {
    let Some(mut job) = store.job(job_id).await? else {
        return Ok(());
    };
    job.status = if result.failed > 0 {
        JobStatus::Failed
    } else {
        JobStatus::Completed
    };
    job.completed_at = Some(Utc::now());
    job.pages_crawled = result.succeeded as u32;
    job.pages_failed = result.failed as u32;
    if result.failed > 0 {
        job.error_message = Some(format!("{} pages failed generation", result.failed));
    }
    if let Some(stats) = job.stats.as_object_mut() {
        stats.insert("total_pages".to_string(), result.total_pages.into());
        stats.insert("skipped".to_string(), result.skipped.into());
    }
    store.update_job(job).await
}

/// Request advisory cancellation of an active run. Returns whether a run was
/// active to cancel.
pub fn cancel_generation(registry: &ActiveRunRegistry, project_id: Uuid) -> bool {
    registry.cancel(project_id)
}

/// Build the status report for a project.
pub async fn generation_status(
    store: &dyn Store,
    registry: &ActiveRunRegistry,
    project_id: Uuid,
) -> CoreResult<StatusReport> {
    let approved = store.approved_pages(project_id).await?;

    let mut pages: Vec<PageStatus> = Vec::with_capacity(approved.len());
    let mut pending = 0;
    let mut generating = 0;
    let mut complete = 0;
    let mut failed = 0;
    let mut approved_count = 0;

    for page in &approved {
        let content = store.page_content(page.page_id).await?;
        let (status, error, qa_pass, qa_issues, is_approved) = match &content {
            Some(content) => {
                match content.status {
                    ContentStatus::Pending => pending += 1,
                    ContentStatus::Complete => complete += 1,
                    ContentStatus::Failed => failed += 1,
                    _ => generating += 1,
                }
                if content.is_approved {
                    approved_count += 1;
                }
                (
                    content.status.to_string(),
                    qa_error(content),
                    qa_passed(content),
                    qa_issue_count(content),
                    content.is_approved,
                )
            }
            None => {
                pending += 1;
                ("pending".to_string(), None, None, 0, false)
            }
        };
        pages.push(PageStatus {
            page_id: page.page_id,
            url: page.url.clone(),
            keyword: page.keyword.clone(),
            source: page.source.clone(),
            status,
            error,
            qa_passed: qa_pass,
            qa_issue_count: qa_issues,
            is_approved,
        });
    }

    let has_any_content = pages.iter().any(|p| p.status != "pending");
    let overall_status = if registry.is_active(project_id) {
        OverallStatus::Generating
    } else if pages.is_empty() || !has_any_content {
        OverallStatus::Idle
    } else if generating > 0 || pending > 0 {
        // Content exists but no active run: a previous run was partial.
        if complete + failed > 0 {
            OverallStatus::Complete
        } else {
            OverallStatus::Idle
        }
    } else if failed > 0 {
        OverallStatus::Failed
    } else {
        OverallStatus::Complete
    };

    Ok(StatusReport {
        overall_status,
        pages_total: pages.len(),
        pages_pending: pending,
        pages_generating: generating,
        pages_complete: complete,
        pages_failed: failed,
        pages_approved: approved_count,
        pages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use seoforge_store::MemoryStore;
    use seoforge_types::{CrawledPage, PageContent, PageKeywords, Project};
    use serde_json::json;

    async fn seed_page(
        store: &MemoryStore,
        project_id: Uuid,
        url: &str,
        status: Option<ContentStatus>,
    ) -> Uuid {
        let page = CrawledPage::new(project_id, url);
        let page_id = page.id;
        store.insert_page(page).await.unwrap();
        store
            .upsert_page_keywords(PageKeywords {
                crawled_page_id: page_id,
                primary_keyword: format!("kw {url}"),
                is_approved: true,
            })
            .await
            .unwrap();
        if let Some(status) = status {
            let mut content = PageContent::new(page_id);
            content.status = status;
            if status == ContentStatus::Failed {
                content.qa_results = Some(json!({"error": "writer exploded"}));
            }
            if status == ContentStatus::Complete {
                content.qa_results = Some(json!({"passed": true, "issues": []}));
            }
            store.save_page_content(content).await.unwrap();
        }
        page_id
    }

    #[tokio::test]
    async fn status_reports_counts_and_errors() {
        let store = MemoryStore::new();
        let registry = ActiveRunRegistry::new();
        let project = Project::new("P", "https://p.example");
        store.insert_project(project.clone()).await.unwrap();

        seed_page(&store, project.id, "https://p.example/a", Some(ContentStatus::Complete)).await;
        seed_page(&store, project.id, "https://p.example/b", Some(ContentStatus::Failed)).await;
        seed_page(&store, project.id, "https://p.example/c", None).await;

        let report = generation_status(&store, &registry, project.id)
            .await
            .unwrap();
        assert_eq!(report.pages_total, 3);
        assert_eq!(report.pages_complete, 1);
        assert_eq!(report.pages_failed, 1);
        assert_eq!(report.pages_pending, 1);

        let failed_page = report
            .pages
            .iter()
            .find(|p| p.status == "failed")
            .unwrap();
        assert_eq!(failed_page.error.as_deref(), Some("writer exploded"));
        let complete_page = report
            .pages
            .iter()
            .find(|p| p.status == "complete")
            .unwrap();
        assert_eq!(complete_page.qa_passed, Some(true));
        assert_eq!(complete_page.source, "onboarding");
    }

    #[tokio::test]
    async fn status_is_generating_while_registry_holds_project() {
        let store = MemoryStore::new();
        let registry = Arc::new(ActiveRunRegistry::new());
        let project = Project::new("P", "https://p.example");
        store.insert_project(project.clone()).await.unwrap();
        seed_page(&store, project.id, "https://p.example/a", Some(ContentStatus::Writing)).await;

        let _guard = registry.try_claim(project.id).unwrap();
        let report = generation_status(&store, &registry, project.id)
            .await
            .unwrap();
        assert_eq!(report.overall_status, OverallStatus::Generating);
    }

    #[tokio::test]
    async fn status_idle_without_content() {
        let store = MemoryStore::new();
        let registry = ActiveRunRegistry::new();
        let project = Project::new("P", "https://p.example");
        store.insert_project(project.clone()).await.unwrap();
        seed_page(&store, project.id, "https://p.example/a", None).await;

        let report = generation_status(&store, &registry, project.id)
            .await
            .unwrap();
        assert_eq!(report.overall_status, OverallStatus::Idle);
    }

    #[tokio::test]
    async fn status_failed_when_any_page_failed() {
        let store = MemoryStore::new();
        let registry = ActiveRunRegistry::new();
        let project = Project::new("P", "https://p.example");
        store.insert_project(project.clone()).await.unwrap();
        seed_page(&store, project.id, "https://p.example/a", Some(ContentStatus::Complete)).await;
        seed_page(&store, project.id, "https://p.example/b", Some(ContentStatus::Failed)).await;

        let report = generation_status(&store, &registry, project.id)
            .await
            .unwrap();
        assert_eq!(report.overall_status, OverallStatus::Failed);
    }
}
