//! # SEOForge Integrations
//!
//! External-integration framework for the SEOForge core: a typed HTTP client
//! base with retry, exponential backoff, rate-limit honoring, circuit-breaker
//! gating, credential masking, and per-call structured telemetry, plus the
//! per-provider adapters built on it.
//!
//! Clients are process-wide singletons owned by the [`Integrations`]
//! container, constructed once at startup and passed explicitly to services.
//! Their circuit breakers are therefore shared across all in-flight calls.

pub mod client;
pub mod config;
pub mod crawl;
pub mod keywords;
pub mod llm;
pub mod nlp;
pub mod pop;
pub mod serp;

pub use client::{AuthPlacement, CallContext, IntegrationClient};
pub use config::{
    KeywordVolumeSettings, LlmSettings, NlpSettings, PopSettings, ProviderSettings,
};
pub use crawl::{CrawlClient, CrawlOptions, CrawlOutcome};
pub use keywords::{KeywordBatch, KeywordData, KeywordVolumeClient, MAX_KEYWORDS_PER_REQUEST};
pub use llm::{extract_json, CompletionOutcome, LlmClient};
pub use nlp::{Entity, NlpClient};
pub use pop::{PopClient, PopTask, PopTaskStatus, KEYWORD_VARIATIONS_KEY};
pub use serp::{SerpClient, SerpPost};

use std::sync::Arc;

use seoforge_types::IntegrationResult;
use tracing::info;

/// Container owning every integration client.
///
/// Replaces module-global client instances: built once at process start,
/// passed by `Arc` into components, closed at shutdown.
pub struct Integrations {
    pub pop: Arc<PopClient>,
    pub keywords: Arc<KeywordVolumeClient>,
    pub nlp: Arc<NlpClient>,
    pub serp: Arc<SerpClient>,
    pub llm: Arc<LlmClient>,
    pub crawl: Arc<CrawlClient>,
}

impl Integrations {
    /// Build every client from environment configuration.
    pub fn from_env() -> IntegrationResult<Self> {
        let container = Self {
            pop: Arc::new(PopClient::new(&PopSettings::from_env())?),
            keywords: Arc::new(KeywordVolumeClient::new(&KeywordVolumeSettings::from_env())?),
            nlp: Arc::new(NlpClient::new(&NlpSettings::from_env())?),
            serp: Arc::new(SerpClient::new(&ProviderSettings::from_env(
                "SERP",
                "https://google.serper.dev",
            ))?),
            llm: Arc::new(LlmClient::new(&LlmSettings::from_env())?),
            crawl: Arc::new(CrawlClient::new(&ProviderSettings::from_env(
                "CRAWL",
                "http://localhost:11235",
            ))?),
        };
        info!(
            pop = container.pop.available(),
            keywords = container.keywords.available(),
            nlp = container.nlp.available(),
            serp = container.serp.available(),
            llm = container.llm.available(),
            crawl = container.crawl.available(),
            "integration container initialized"
        );
        Ok(container)
    }

    /// Shut down every client's connection pool.
    pub fn close(&self) {
        self.pop.close();
        self.keywords.close();
        self.nlp.close();
        self.serp.close();
        self.llm.close();
        self.crawl.close();
        info!("integration container closed");
    }
}
