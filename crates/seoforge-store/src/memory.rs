//! In-memory store adapter.
//!
//! Backs the [`Store`] port with maps behind one `RwLock`; each trait method
//! takes the lock once, which gives the same atomicity a per-call transaction
//! would. Used by the test suites and by single-node deployments that accept
//! volatile storage.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use seoforge_types::{
    BrandConfig, ContentBrief, ContentStatus, CoreError, CoreResult, CrawledPage, GenerationJob,
    JobStatus, PageContent, PageKeywords, Project, PromptLog,
};

use crate::store::{ApprovedPage, Store};

#[derive(Default)]
struct Tables {
    projects: HashMap<Uuid, Project>,
    pages: HashMap<Uuid, CrawledPage>,
    page_keywords: HashMap<Uuid, PageKeywords>,
    briefs: HashMap<Uuid, ContentBrief>,
    contents: HashMap<Uuid, PageContent>,
    prompt_logs: Vec<PromptLog>,
    jobs: HashMap<Uuid, GenerationJob>,
    brand_configs: HashMap<Uuid, BrandConfig>,
}

/// Volatile [`Store`] implementation.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_project(&self, project: Project) -> CoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.projects.contains_key(&project.id) {
            return Err(CoreError::Duplicate {
                entity: "project",
                id: project.id.to_string(),
            });
        }
        tables.projects.insert(project.id, project);
        Ok(())
    }

    async fn project(&self, id: Uuid) -> CoreResult<Option<Project>> {
        Ok(self.tables.read().await.projects.get(&id).cloned())
    }

    async fn save_project(&self, project: Project) -> CoreResult<()> {
        self.tables
            .write()
            .await
            .projects
            .insert(project.id, project);
        Ok(())
    }

    async fn insert_page(&self, page: CrawledPage) -> CoreResult<()> {
        self.tables.write().await.pages.insert(page.id, page);
        Ok(())
    }

    async fn crawled_page(&self, id: Uuid) -> CoreResult<Option<CrawledPage>> {
        Ok(self.tables.read().await.pages.get(&id).cloned())
    }

    async fn completed_pages(&self, project_id: Uuid) -> CoreResult<Vec<CrawledPage>> {
        let tables = self.tables.read().await;
        let mut pages: Vec<CrawledPage> = tables
            .pages
            .values()
            .filter(|p| {
                p.project_id == project_id
                    && p.status == seoforge_types::PageCrawlStatus::Completed
            })
            .cloned()
            .collect();
        pages.sort_by(|a, b| a.normalized_url.cmp(&b.normalized_url));
        Ok(pages)
    }

    async fn set_page_labels(&self, page_id: Uuid, labels: Vec<String>) -> CoreResult<()> {
        let mut tables = self.tables.write().await;
        let page = tables
            .pages
            .get_mut(&page_id)
            .ok_or_else(|| CoreError::not_found("crawled_page", page_id.to_string()))?;
        page.labels = labels;
        Ok(())
    }

    async fn upsert_page_keywords(&self, keywords: PageKeywords) -> CoreResult<()> {
        self.tables
            .write()
            .await
            .page_keywords
            .insert(keywords.crawled_page_id, keywords);
        Ok(())
    }

    async fn approved_pages(&self, project_id: Uuid) -> CoreResult<Vec<ApprovedPage>> {
        let tables = self.tables.read().await;
        let mut result: Vec<ApprovedPage> = tables
            .pages
            .values()
            .filter(|p| p.project_id == project_id)
            .filter_map(|page| {
                let keywords = tables.page_keywords.get(&page.id)?;
                if !keywords.is_approved || keywords.primary_keyword.trim().is_empty() {
                    return None;
                }
                Some(ApprovedPage {
                    page_id: page.id,
                    url: page.normalized_url.clone(),
                    keyword: keywords.primary_keyword.clone(),
                    source: page.source.clone(),
                    existing_content_status: tables.contents.get(&page.id).map(|c| c.status),
                })
            })
            .collect();
        // Deterministic order so concurrency=1 processes in insertion order.
        result.sort_by(|a, b| a.url.cmp(&b.url));
        Ok(result)
    }

    async fn content_brief_for_page(&self, page_id: Uuid) -> CoreResult<Option<ContentBrief>> {
        Ok(self.tables.read().await.briefs.get(&page_id).cloned())
    }

    async fn upsert_content_brief(&self, mut brief: ContentBrief) -> CoreResult<ContentBrief> {
        let mut tables = self.tables.write().await;
        if let Some(existing) = tables.briefs.get(&brief.page_id) {
            brief.id = existing.id;
        }
        tables.briefs.insert(brief.page_id, brief.clone());
        Ok(brief)
    }

    async fn page_content(&self, crawled_page_id: Uuid) -> CoreResult<Option<PageContent>> {
        Ok(self
            .tables
            .read()
            .await
            .contents
            .get(&crawled_page_id)
            .cloned())
    }

    async fn ensure_page_content(&self, crawled_page_id: Uuid) -> CoreResult<PageContent> {
        let mut tables = self.tables.write().await;
        let content = tables
            .contents
            .entry(crawled_page_id)
            .or_insert_with(|| PageContent::new(crawled_page_id));
        Ok(content.clone())
    }

    async fn save_page_content(&self, content: PageContent) -> CoreResult<()> {
        self.tables
            .write()
            .await
            .contents
            .insert(content.crawled_page_id, content);
        Ok(())
    }

    async fn set_content_statuses(
        &self,
        page_ids: &[Uuid],
        status: ContentStatus,
    ) -> CoreResult<()> {
        let mut tables = self.tables.write().await;
        for page_id in page_ids {
            let content = tables
                .contents
                .entry(*page_id)
                .or_insert_with(|| PageContent::new(*page_id));
            content.status = status;
        }
        Ok(())
    }

    async fn reset_content_for_regeneration(&self, page_ids: &[Uuid]) -> CoreResult<()> {
        let mut tables = self.tables.write().await;
        for page_id in page_ids {
            if let Some(content) = tables.contents.get_mut(page_id) {
                content.status = ContentStatus::Pending;
                content.generation_started_at = None;
                content.generation_completed_at = None;
            }
        }
        Ok(())
    }

    async fn contents_for_project(&self, project_id: Uuid) -> CoreResult<Vec<PageContent>> {
        let tables = self.tables.read().await;
        let page_ids: Vec<Uuid> = tables
            .pages
            .values()
            .filter(|p| p.project_id == project_id)
            .map(|p| p.id)
            .collect();
        Ok(page_ids
            .iter()
            .filter_map(|id| tables.contents.get(id).cloned())
            .collect())
    }

    async fn append_prompt_log(&self, log: PromptLog) -> CoreResult<()> {
        self.tables.write().await.prompt_logs.push(log);
        Ok(())
    }

    async fn prompt_logs(&self, page_content_id: Uuid) -> CoreResult<Vec<PromptLog>> {
        Ok(self
            .tables
            .read()
            .await
            .prompt_logs
            .iter()
            .filter(|l| l.page_content_id == page_content_id)
            .cloned()
            .collect())
    }

    async fn insert_job(&self, job: GenerationJob) -> CoreResult<()> {
        self.tables.write().await.jobs.insert(job.id, job);
        Ok(())
    }

    async fn job(&self, id: Uuid) -> CoreResult<Option<GenerationJob>> {
        Ok(self.tables.read().await.jobs.get(&id).cloned())
    }

    async fn update_job(&self, mut job: GenerationJob) -> CoreResult<()> {
        job.updated_at = Utc::now();
        self.tables.write().await.jobs.insert(job.id, job);
        Ok(())
    }

    async fn jobs_with_status(&self, statuses: &[JobStatus]) -> CoreResult<Vec<GenerationJob>> {
        let tables = self.tables.read().await;
        let mut jobs: Vec<GenerationJob> = tables
            .jobs
            .values()
            .filter(|j| statuses.contains(&j.status))
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.updated_at);
        Ok(jobs)
    }

    async fn brand_config(&self, project_id: Uuid) -> CoreResult<Option<BrandConfig>> {
        Ok(self
            .tables
            .read()
            .await
            .brand_configs
            .get(&project_id)
            .cloned())
    }

    async fn upsert_brand_config(&self, config: BrandConfig) -> CoreResult<()> {
        self.tables
            .write()
            .await
            .brand_configs
            .insert(config.project_id, config);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn page_with_keyword(
        project_id: Uuid,
        url: &str,
        keyword: &str,
        approved: bool,
    ) -> (CrawledPage, PageKeywords) {
        let page = CrawledPage::new(project_id, url);
        let keywords = PageKeywords {
            crawled_page_id: page.id,
            primary_keyword: keyword.to_string(),
            is_approved: approved,
        };
        (page, keywords)
    }

    #[tokio::test]
    async fn approved_pages_joins_and_filters() {
        let store = MemoryStore::new();
        let project = Project::new("Shop", "https://shop.example");
        let project_id = project.id;
        store.insert_project(project).await.unwrap();

        let (p1, k1) = page_with_keyword(project_id, "https://shop.example/a", "kw a", true);
        let (p2, k2) = page_with_keyword(project_id, "https://shop.example/b", "kw b", false);
        for (p, k) in [(p1, k1), (p2, k2)] {
            store.insert_page(p).await.unwrap();
            store.upsert_page_keywords(k).await.unwrap();
        }

        let approved = store.approved_pages(project_id).await.unwrap();
        assert_eq!(approved.len(), 1);
        assert_eq!(approved[0].keyword, "kw a");
        assert_eq!(approved[0].source, "onboarding");
        assert!(approved[0].existing_content_status.is_none());
    }

    #[tokio::test]
    async fn brief_upsert_replaces_in_place_keeping_id() {
        let store = MemoryStore::new();
        let page_id = Uuid::new_v4();

        let first = store
            .upsert_content_brief(ContentBrief::new(page_id, "original"))
            .await
            .unwrap();
        let mut replacement = ContentBrief::new(page_id, "refreshed");
        replacement.raw_response = json!({"refreshed": true});
        let second = store.upsert_content_brief(replacement).await.unwrap();

        assert_eq!(first.id, second.id);
        let stored = store.content_brief_for_page(page_id).await.unwrap().unwrap();
        assert_eq!(stored.keyword, "refreshed");
    }

    #[tokio::test]
    async fn ensure_page_content_is_idempotent() {
        let store = MemoryStore::new();
        let page_id = Uuid::new_v4();
        let a = store.ensure_page_content(page_id).await.unwrap();
        let b = store.ensure_page_content(page_id).await.unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(a.status, ContentStatus::Pending);
    }

    #[tokio::test]
    async fn batch_status_flip_creates_missing_rows() {
        let store = MemoryStore::new();
        let ids = vec![Uuid::new_v4(), Uuid::new_v4()];
        store
            .set_content_statuses(&ids, ContentStatus::GeneratingBrief)
            .await
            .unwrap();
        for id in &ids {
            let content = store.page_content(*id).await.unwrap().unwrap();
            assert_eq!(content.status, ContentStatus::GeneratingBrief);
        }
    }

    #[tokio::test]
    async fn update_job_advances_updated_at() {
        let store = MemoryStore::new();
        let mut job = GenerationJob::new(Uuid::new_v4());
        job.updated_at = Utc::now() - chrono::Duration::minutes(30);
        let stale = job.updated_at;
        store.insert_job(job.clone()).await.unwrap();

        job.status = JobStatus::Running;
        store.update_job(job.clone()).await.unwrap();
        let reloaded = store.job(job.id).await.unwrap().unwrap();
        assert!(reloaded.updated_at > stale);
    }

    #[tokio::test]
    async fn duplicate_project_insert_is_rejected() {
        let store = MemoryStore::new();
        let project = Project::new("P", "https://p.example");
        store.insert_project(project.clone()).await.unwrap();
        let err = store.insert_project(project).await.unwrap_err();
        assert!(matches!(err, CoreError::Duplicate { .. }));
    }
}
