//! The durable-store port.

use async_trait::async_trait;
use uuid::Uuid;

use seoforge_types::{
    BrandConfig, ContentBrief, ContentStatus, CoreResult, CrawledPage, GenerationJob, JobStatus,
    PageContent, PageKeywords, Project, PromptLog,
};

/// Lightweight projection of a page with an approved keyword, used by the
/// pipeline so it never holds full entities across task boundaries.
#[derive(Debug, Clone)]
pub struct ApprovedPage {
    pub page_id: Uuid,
    pub url: String,
    pub keyword: String,
    /// Workflow that produced the page, surfaced by the status endpoint.
    pub source: String,
    pub existing_content_status: Option<ContentStatus>,
}

/// Atomic operations over the durable store.
///
/// Every method is one transaction. Implementations must guarantee the
/// uniqueness invariants: one `ContentBrief` per page, one `PageContent` per
/// page, one `BrandConfig` per project.
#[async_trait]
pub trait Store: Send + Sync {
    // --- projects ---
    async fn insert_project(&self, project: Project) -> CoreResult<()>;
    async fn project(&self, id: Uuid) -> CoreResult<Option<Project>>;
    async fn save_project(&self, project: Project) -> CoreResult<()>;

    // --- crawled pages & keywords ---
    async fn insert_page(&self, page: CrawledPage) -> CoreResult<()>;
    async fn crawled_page(&self, id: Uuid) -> CoreResult<Option<CrawledPage>>;
    /// Pages with `status == completed` for a project (taxonomy input).
    async fn completed_pages(&self, project_id: Uuid) -> CoreResult<Vec<CrawledPage>>;
    async fn set_page_labels(&self, page_id: Uuid, labels: Vec<String>) -> CoreResult<()>;
    async fn upsert_page_keywords(&self, keywords: PageKeywords) -> CoreResult<()>;
    /// Pages whose keyword is approved, with their current content status.
    async fn approved_pages(&self, project_id: Uuid) -> CoreResult<Vec<ApprovedPage>>;

    // --- content briefs ---
    async fn content_brief_for_page(&self, page_id: Uuid) -> CoreResult<Option<ContentBrief>>;
    /// Create or replace the brief for `brief.page_id`. An existing row keeps
    /// its id; all other fields are overwritten.
    async fn upsert_content_brief(&self, brief: ContentBrief) -> CoreResult<ContentBrief>;

    // --- page content ---
    async fn page_content(&self, crawled_page_id: Uuid) -> CoreResult<Option<PageContent>>;
    /// Get the content row for a page, creating a pending one if absent.
    async fn ensure_page_content(&self, crawled_page_id: Uuid) -> CoreResult<PageContent>;
    async fn save_page_content(&self, content: PageContent) -> CoreResult<()>;
    /// Batch status flip for many pages in one transaction, creating missing
    /// rows. Used before the Phase-1 brief prefetch so a status poll sees
    /// every page move at once.
    async fn set_content_statuses(
        &self,
        page_ids: &[Uuid],
        status: ContentStatus,
    ) -> CoreResult<()>;
    /// Force-refresh reset: status back to pending, generation timestamps
    /// cleared, in one transaction.
    async fn reset_content_for_regeneration(&self, page_ids: &[Uuid]) -> CoreResult<()>;
    async fn contents_for_project(&self, project_id: Uuid) -> CoreResult<Vec<PageContent>>;

    // --- prompt logs (append-only) ---
    async fn append_prompt_log(&self, log: PromptLog) -> CoreResult<()>;
    async fn prompt_logs(&self, page_content_id: Uuid) -> CoreResult<Vec<PromptLog>>;

    // --- jobs ---
    async fn insert_job(&self, job: GenerationJob) -> CoreResult<()>;
    async fn job(&self, id: Uuid) -> CoreResult<Option<GenerationJob>>;
    /// Persist a job mutation; `updated_at` is advanced by the store, the
    /// same way an ORM auto-update column behaves.
    async fn update_job(&self, job: GenerationJob) -> CoreResult<()>;
    async fn jobs_with_status(&self, statuses: &[JobStatus]) -> CoreResult<Vec<GenerationJob>>;

    // --- brand config ---
    async fn brand_config(&self, project_id: Uuid) -> CoreResult<Option<BrandConfig>>;
    async fn upsert_brand_config(&self, config: BrandConfig) -> CoreResult<()>;
}
