//! The content generation pipeline.
//!
//! Two phases per run. Phase 1 pre-fetches optimization briefs for every page
//! that needs one, concurrently and ungated: brief fetches are poll loops
//! that are mostly I/O wait, so serializing them behind the writing semaphore
//! would dominate wall-clock time. Phase 2 runs write + check per page under
//! a semaphore, with per-page error isolation: one failed page never stops
//! the others, and a broken per-page scope is abandoned in favor of a fresh
//! one that records the failure.

use std::env;
use std::sync::atomic::{AtomicBool, Ordering::Relaxed};
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use serde_json::json;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use uuid::Uuid;

use seoforge_integrations::{LlmClient, PopClient};
use seoforge_quality::run_quality_checks;
use seoforge_store::{ApprovedPage, Store};
use seoforge_types::{
    BrandSettings, Competitor, ContentBrief, ContentStatus, CoreError, CoreResult, PromptLog,
    PromptStep,
};

use crate::brief::{fetch_content_brief, ContentBriefOutcome};
use crate::progress::{ProgressRegistry, ProgressTracker};
use crate::writer::generate_content;

/// Pipeline tuning.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Phase-2 semaphore size.
    pub concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { concurrency: 1 }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        Self {
            concurrency: env::var("SEOFORGE_CONTENT_GENERATION_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|c| *c > 0)
                .unwrap_or(1),
        }
    }
}

/// Result of processing one page.
#[derive(Debug, Clone, Serialize)]
pub struct PipelinePageResult {
    pub page_id: Uuid,
    pub url: String,
    pub success: bool,
    pub error: Option<String>,
    pub skipped: bool,
}

/// Result of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub project_id: Uuid,
    pub total_pages: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub page_results: Vec<PipelinePageResult>,
    pub started_at: String,
    pub completed_at: String,
}

/// The brief → write → check orchestrator.
pub struct ContentPipeline {
    store: Arc<dyn Store>,
    pop: Arc<PopClient>,
    llm: Arc<LlmClient>,
    config: PipelineConfig,
    progress: Arc<ProgressRegistry>,
}

impl ContentPipeline {
    pub fn new(
        store: Arc<dyn Store>,
        pop: Arc<PopClient>,
        llm: Arc<LlmClient>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            pop,
            llm,
            config,
            progress: Arc::new(ProgressRegistry::default()),
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Per-run progress counters, readable while a run is in flight.
    pub fn progress(&self) -> &Arc<ProgressRegistry> {
        &self.progress
    }

    /// Run the pipeline for every approved page of a project.
    pub async fn run(
        &self,
        project_id: Uuid,
        force_refresh: bool,
        refresh_briefs: bool,
    ) -> PipelineResult {
        self.run_with_cancel(project_id, force_refresh, refresh_briefs, None)
            .await
    }

    /// Run with an advisory cancel flag: once set, pages not yet started are
    /// abandoned while in-flight pages complete through their current step.
    pub async fn run_with_cancel(
        &self,
        project_id: Uuid,
        force_refresh: bool,
        refresh_briefs: bool,
        cancel: Option<Arc<AtomicBool>>,
    ) -> PipelineResult {
        let started_at = Utc::now();
        info!(
            %project_id,
            concurrency = self.config.concurrency,
            force_refresh,
            refresh_briefs,
            "starting content generation pipeline"
        );

        let mut result = PipelineResult {
            project_id,
            total_pages: 0,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            page_results: Vec::new(),
            started_at: started_at.to_rfc3339(),
            completed_at: String::new(),
        };

        let tracker = self.progress.start(project_id);
        tracker.set_phase("loading");

        let (pages, brand) = match self.load_inputs(project_id).await {
            Ok(inputs) => inputs,
            Err(err) => {
                error!(%project_id, error = %err, "pipeline failed to load inputs");
                result.completed_at = Utc::now().to_rfc3339();
                self.progress.finish(project_id);
                return result;
            }
        };

        if pages.is_empty() {
            info!(%project_id, "no approved pages found for content generation");
            result.completed_at = Utc::now().to_rfc3339();
            self.progress.finish(project_id);
            return result;
        }
        result.total_pages = pages.len();

        // Reset statuses upfront on force-refresh so a status poll
        // immediately shows the pipeline restarting.
        if force_refresh {
            let page_ids: Vec<Uuid> = pages.iter().map(|p| p.page_id).collect();
            if let Err(err) = self.store.reset_content_for_regeneration(&page_ids).await {
                warn!(%project_id, error = %err, "failed to reset page statuses");
            }
        }

        // --- Phase 1: brief prefetch, ungated ---
        let needing_briefs: Vec<&ApprovedPage> = pages
            .iter()
            .filter(|p| {
                force_refresh
                    || p.existing_content_status != Some(ContentStatus::Complete)
            })
            .collect();

        if needing_briefs.is_empty() {
            info!(%project_id, "all pages already complete, skipping brief prefetch");
        } else {
            tracker.set_phase("prefetching_briefs");
            self.prefetch_briefs(&needing_briefs, refresh_briefs, cancel.as_deref(), &tracker)
                .await;
        }

        // --- Phase 2: write + check, gated ---
        tracker.set_phase("writing");
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let tasks = pages.iter().map(|page| {
            let semaphore = Arc::clone(&semaphore);
            let brand = brand.clone();
            let cancel = cancel.clone();
            let tracker = Arc::clone(&tracker);
            async move {
                let _permit = semaphore.acquire().await.expect("semaphore closed");
                if cancel.as_ref().is_some_and(|flag| flag.load(Relaxed)) {
                    info!(page_id = %page.page_id, "run cancelled, abandoning page");
                    return PipelinePageResult {
                        page_id: page.page_id,
                        url: page.url.clone(),
                        success: true,
                        error: None,
                        skipped: true,
                    };
                }
                let result = self
                    .process_single_page(page, &brand, force_refresh, &tracker)
                    .await;
                if result.success && !result.skipped {
                    tracker.stored.fetch_add(1, Relaxed);
                }
                result
            }
        });
        let page_results = join_all(tasks).await;

        for page_result in page_results {
            if page_result.skipped {
                result.skipped += 1;
            } else if page_result.success {
                result.succeeded += 1;
            } else {
                result.failed += 1;
            }
            result.page_results.push(page_result);
        }

        result.completed_at = Utc::now().to_rfc3339();
        info!(
            %project_id,
            total = result.total_pages,
            succeeded = result.succeeded,
            failed = result.failed,
            skipped = result.skipped,
            "content generation pipeline complete"
        );
        self.progress.finish(project_id);
        result
    }

    async fn load_inputs(
        &self,
        project_id: Uuid,
    ) -> CoreResult<(Vec<ApprovedPage>, BrandSettings)> {
        let pages = self.store.approved_pages(project_id).await?;
        let brand = match self.store.brand_config(project_id).await? {
            Some(config) => BrandSettings::from_value(&config.v2_schema),
            None => {
                warn!(%project_id, "no brand config found for project");
                BrandSettings::default()
            }
        };
        Ok((pages, brand))
    }

    /// Phase 1: flip every page to `generating_brief` in one batch, then
    /// fetch all briefs concurrently. Failures are logged and swallowed;
    /// Phase 2 retries the fetch per page.
    async fn prefetch_briefs(
        &self,
        pages: &[&ApprovedPage],
        refresh_briefs: bool,
        cancel: Option<&AtomicBool>,
        tracker: &ProgressTracker,
    ) {
        info!(page_count = pages.len(), "prefetching briefs concurrently");

        let page_ids: Vec<Uuid> = pages.iter().map(|p| p.page_id).collect();
        if let Err(err) = self
            .store
            .set_content_statuses(&page_ids, ContentStatus::GeneratingBrief)
            .await
        {
            warn!(error = %err, "failed to batch-set brief statuses");
        }

        let fetches = pages.iter().map(|page| async move {
            if cancel.is_some_and(|flag| flag.load(Relaxed)) {
                return;
            }
            let crawled = match self.store.crawled_page(page.page_id).await {
                Ok(Some(crawled)) => crawled,
                Ok(None) => return,
                Err(err) => {
                    warn!(page_id = %page.page_id, error = %err, "brief prefetch load failed");
                    return;
                }
            };
            let outcome = fetch_content_brief(
                self.store.as_ref(),
                &self.pop,
                &crawled,
                &page.keyword,
                &page.url,
                refresh_briefs,
            )
            .await;
            tracker.keywords_searched.fetch_add(1, Relaxed);
            if !outcome.success {
                warn!(
                    page_id = %page.page_id,
                    error = outcome.error.as_deref().unwrap_or("unknown"),
                    "brief prefetch failed (pipeline will retry)"
                );
            }
        });
        join_all(fetches).await;

        info!(page_count = pages.len(), "brief prefetch complete");
    }

    /// Phase 2 for one page: brief (cached) → write → check, with every
    /// failure mapped to a failed status and a page result.
    async fn process_single_page(
        &self,
        page: &ApprovedPage,
        brand: &BrandSettings,
        force_refresh: bool,
        tracker: &ProgressTracker,
    ) -> PipelinePageResult {
        if !force_refresh && page.existing_content_status == Some(ContentStatus::Complete) {
            info!(page_id = %page.page_id, url = %page.url, "skipping page with complete content");
            return PipelinePageResult {
                page_id: page.page_id,
                url: page.url.clone(),
                success: true,
                error: None,
                skipped: true,
            };
        }

        info!(page_id = %page.page_id, url = %page.url, "processing page through pipeline");

        match self.run_page_steps(page, brand, tracker).await {
            Ok(result) => result,
            Err(err) => {
                error!(
                    page_id = %page.page_id,
                    url = %page.url,
                    error = %err,
                    "content pipeline failed for page"
                );
                // The per-page scope may be poisoned; mark the failure
                // through a fresh one so the status is recorded regardless.
                self.mark_page_failed(page.page_id, &err.to_string()).await;
                PipelinePageResult {
                    page_id: page.page_id,
                    url: page.url.clone(),
                    success: false,
                    error: Some(err.to_string()),
                    skipped: false,
                }
            }
        }
    }

    async fn run_page_steps(
        &self,
        page: &ApprovedPage,
        brand: &BrandSettings,
        tracker: &ProgressTracker,
    ) -> CoreResult<PipelinePageResult> {
        let crawled = self
            .store
            .crawled_page(page.page_id)
            .await?
            .ok_or_else(|| CoreError::not_found("crawled_page", page.page_id.to_string()))?;

        // Step 1: brief (normally cached from Phase 1).
        let mut content = self.store.ensure_page_content(page.page_id).await?;
        content.status = ContentStatus::GeneratingBrief;
        content.generation_started_at = Some(Utc::now());
        self.store.save_page_content(content.clone()).await?;

        // Phase 1 already refreshed the brief if asked; here the cache is
        // always preferred so a retry never double-spends provider credits.
        let brief_outcome = fetch_content_brief(
            self.store.as_ref(),
            &self.pop,
            &crawled,
            &page.keyword,
            &page.url,
            false,
        )
        .await;

        if !brief_outcome.success {
            warn!(
                page_id = %page.page_id,
                error = brief_outcome.error.as_deref().unwrap_or("unknown"),
                "content brief fetch failed, continuing without brief"
            );
        }
        let brief = brief_outcome.brief.clone();

        self.log_brief(&content.id, &page.keyword, &brief_outcome)
            .await?;

        let brand = match &brief {
            Some(brief) if !brief.competitors.is_empty() => {
                self.enrich_competitors(crawled.project_id, brand, &brief.competitors)
                    .await
            }
            _ => brand.clone(),
        };

        // Step 2: write.
        let writing = generate_content(
            self.store.as_ref(),
            &self.llm,
            &crawled,
            brief.as_ref(),
            &brand,
            &page.keyword,
        )
        .await?;

        if !writing.success {
            return Ok(PipelinePageResult {
                page_id: page.page_id,
                url: page.url.clone(),
                success: false,
                error: writing.error,
                skipped: false,
            });
        }
        let mut written = writing
            .page_content
            .ok_or_else(|| CoreError::not_found("page_content", page.page_id.to_string()))?;

        // Step 3: quality checks.
        written.status = ContentStatus::Checking;
        self.store.save_page_content(written.clone()).await?;

        let qa = run_quality_checks(&mut written, &brand);
        tracker.posts_scored.fetch_add(1, Relaxed);

        // Step 4: complete.
        written.status = ContentStatus::Complete;
        written.generation_completed_at = Some(Utc::now());
        self.store.save_page_content(written.clone()).await?;

        info!(
            page_id = %page.page_id,
            url = %page.url,
            word_count = written.word_count,
            qa_passed = qa.passed,
            "page content generation complete"
        );

        Ok(PipelinePageResult {
            page_id: page.page_id,
            url: page.url.clone(),
            success: true,
            error: None,
            skipped: false,
        })
    }

    async fn mark_page_failed(&self, page_id: Uuid, error: &str) {
        let outcome: CoreResult<()> = async {
            let mut content = self.store.ensure_page_content(page_id).await?;
            content.status = ContentStatus::Failed;
            content.generation_completed_at = Some(Utc::now());
            content.qa_results = Some(json!({"error": error}));
            self.store.save_page_content(content).await
        }
        .await;
        if let Err(err) = outcome {
            error!(%page_id, error = %err, "failed to mark page as failed after pipeline error");
        }
    }

    /// Record the brief step in the prompt log with a readable summary.
    async fn log_brief(
        &self,
        page_content_id: &Uuid,
        keyword: &str,
        outcome: &ContentBriefOutcome,
    ) -> CoreResult<()> {
        let prompt_text = format!(
            "Optimization brief (get-terms + create-report + recommendations) for keyword: {keyword}"
        );
        let response_text = match (&outcome.brief, outcome.success) {
            (Some(brief), true) => summarize_brief(brief),
            _ => format!(
                "Brief fetch failed: {}",
                outcome.error.as_deref().unwrap_or("unknown error")
            ),
        };
        self.store
            .append_prompt_log(PromptLog::new(
                *page_content_id,
                PromptStep::ContentBrief,
                "system",
                prompt_text,
                response_text,
            ))
            .await
    }

    /// Merge competitor brand names derived from the brief's competitor URLs
    /// into `vocabulary.competitors`, persisting when anything new appears.
    async fn enrich_competitors(
        &self,
        project_id: Uuid,
        brand: &BrandSettings,
        competitors: &[Competitor],
    ) -> BrandSettings {
        let new_brands = extract_competitor_brands(competitors);
        if new_brands.is_empty() {
            return brand.clone();
        }

        let mut updated = brand.clone();
        let mut existing_lower: std::collections::HashSet<String> = updated
            .vocabulary
            .competitors
            .iter()
            .map(|n| n.to_lowercase())
            .collect();

        let mut added: Vec<String> = Vec::new();
        for name in new_brands {
            if existing_lower.insert(name.to_lowercase()) {
                updated.vocabulary.competitors.push(name.clone());
                added.push(name);
            }
        }
        if added.is_empty() {
            return updated;
        }

        // Persist; a storage hiccup here must not fail the page.
        let persisted: CoreResult<()> = async {
            if let Some(mut config) = self.store.brand_config(project_id).await? {
                config.v2_schema = updated.merge_into(&config.v2_schema);
                self.store.upsert_brand_config(config).await?;
            }
            Ok(())
        }
        .await;
        match persisted {
            Ok(()) => info!(
                %project_id,
                added = ?added,
                total = updated.vocabulary.competitors.len(),
                "enriched vocabulary.competitors from brief URLs"
            ),
            Err(err) => warn!(
                %project_id,
                error = %err,
                "failed to persist competitor enrichment"
            ),
        }
        updated
    }
}

/// Human-readable summary of a brief for the prompt inspector.
fn summarize_brief(brief: &ContentBrief) -> String {
    let mut parts: Vec<String> = Vec::new();

    if !brief.lsi_terms.is_empty() {
        parts.push(format!("LSI Terms ({}):", brief.lsi_terms.len()));
        for term in brief.lsi_terms.iter().take(20) {
            parts.push(format!(
                "  - {} (weight: {}, target: {})",
                term.phrase, term.weight, term.average_count
            ));
        }
    }
    if !brief.related_searches.is_empty() {
        parts.push(format!(
            "\nKeyword Variations ({}):",
            brief.related_searches.len()
        ));
        for variation in &brief.related_searches {
            parts.push(format!("  - {variation}"));
        }
    }
    if !brief.competitors.is_empty() {
        parts.push(format!("\nCompetitors ({}):", brief.competitors.len()));
        for comp in &brief.competitors {
            parts.push(format!(
                "  - {} (score: {}, words: {})",
                comp.url, comp.page_score, comp.word_count
            ));
        }
    }
    if !brief.related_questions.is_empty() {
        parts.push(format!(
            "\nRelated Questions ({}):",
            brief.related_questions.len()
        ));
        for question in &brief.related_questions {
            parts.push(format!("  - {question}"));
        }
    }
    if !brief.heading_targets.is_empty() {
        parts.push(format!(
            "\nHeading Structure Targets ({}):",
            brief.heading_targets.len()
        ));
        for target in &brief.heading_targets {
            parts.push(format!("  - {}: {}", target.tag, target.target));
        }
    }
    if !brief.keyword_targets.is_empty() {
        parts.push(format!(
            "\nKeyword Placement Targets ({}):",
            brief.keyword_targets.len()
        ));
        for target in &brief.keyword_targets {
            let phrase = target
                .phrase
                .as_deref()
                .or(target.comment.as_deref())
                .unwrap_or("");
            let mut line = format!(
                "  - {} ({:?}): target={}",
                target.signal, target.kind, target.target
            );
            if !phrase.is_empty() {
                line.push_str(&format!(" [{phrase}]"));
            }
            parts.push(line);
        }
    }
    if let Some(score) = brief.page_score_target {
        parts.push(format!("\nPage Score Target: {score}"));
    }
    let word_range = match (
        brief.word_count_min,
        brief.word_count_target,
        brief.word_count_max,
    ) {
        (Some(min), target, Some(max)) => format!(
            "min={min}, avg={}, max={max}",
            target.map(|t| t.to_string()).unwrap_or_else(|| "N/A".into())
        ),
        (_, Some(target), _) => target.to_string(),
        _ => "N/A".to_string(),
    };
    parts.push(format!("\nWord Count Range: {word_range}"));

    parts.join("\n")
}

/// Brand names from competitor URLs: the registrable-domain stem, title-cased
/// as found, de-duplicated case-insensitively.
pub fn extract_competitor_brands(competitors: &[Competitor]) -> Vec<String> {
    let mut seen: std::collections::HashSet<String> = std::collections::HashSet::new();
    let mut brands: Vec<String> = Vec::new();
    for comp in competitors {
        let Some(stem) = domain_stem(&comp.url) else {
            continue;
        };
        if seen.insert(stem.to_lowercase()) {
            brands.push(stem);
        }
    }
    brands
}

fn domain_stem(url: &str) -> Option<String> {
    let host = url
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .split('/')
        .next()?
        .trim_start_matches("www.");
    let stem = host.split('.').next()?;
    if stem.is_empty() {
        return None;
    }
    Some(stem.to_string())
}
