//! # SEOForge Pipeline
//!
//! The orchestration core: the two-phase content generation pipeline
//! (brief prefetch, then gated write + check), the content-brief
//! orchestrator, the active-run registry and progress tracking, the job
//! recovery service, content editing operations, and the upstream contract
//! the HTTP layer calls.

pub mod brief;
pub mod editing;
pub mod pipeline;
pub mod progress;
pub mod recovery;
pub mod registry;
pub mod service;
pub mod writer;

pub use brief::{fetch_content_brief, parse_brief, ContentBriefOutcome};
pub use editing::{
    approve_content, bulk_approve, recheck_content, unapprove_content, update_content,
    ContentEdit,
};
pub use pipeline::{
    extract_competitor_brands, ContentPipeline, PipelineConfig, PipelinePageResult,
    PipelineResult,
};
pub use progress::{ProgressRegistry, ProgressSnapshot, ProgressTracker};
pub use recovery::{
    run_startup_recovery, InterruptedJob, RecoveryResult, RecoveryService, RecoverySummary,
    DEFAULT_STALE_THRESHOLD_MINUTES,
};
pub use registry::{ActiveRunRegistry, RunGuard};
pub use service::{
    cancel_generation, generation_status, trigger_generation, OverallStatus, PageStatus,
    StatusReport, TriggerError,
};
pub use writer::{generate_content, WritingOutcome};
