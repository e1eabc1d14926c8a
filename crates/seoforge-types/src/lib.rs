//! # SEOForge Types
//!
//! Shared types for the SEOForge content production core. This crate provides
//! the durable entity definitions, status state machines, and the closed error
//! taxonomy used across the other SEOForge crates, so that integration,
//! storage, and pipeline crates do not depend on each other for plain data.
//!
//! ## Organization
//!
//! - `entities`: durable entities (projects, pages, briefs, content, jobs)
//! - `status`: content/job status enums and their transition rules
//! - `errors`: `IntegrationError` and `CoreError` taxonomies
//! - `secrets`: credential masking and log-body truncation
//! - `brand`: typed view over the opaque brand-config blob

pub mod brand;
pub mod entities;
pub mod errors;
pub mod secrets;
pub mod status;

pub use brand::{BrandSettings, Vocabulary};
pub use entities::{
    BrandConfig, Competitor, ContentBrief, CrawledPage, GenerationJob, HeadingTarget,
    KeywordTarget, KeywordTargetKind, LsiTerm, PageContent, PageKeywords, Project, PromptLog,
    PromptStep,
};
pub use errors::{CoreError, CoreResult, IntegrationError, IntegrationResult};
pub use secrets::{mask_api_key_field, truncate_for_log, MASKED, MAX_LOGGED_BODY_BYTES};
pub use status::{ContentStatus, JobStatus, PageCrawlStatus};
