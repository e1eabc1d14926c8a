//! Status enums for page content and long-running jobs.

use serde::{Deserialize, Serialize};

/// Per-page content generation status.
///
/// Follows the DAG `pending → generating_brief → writing → checking →
/// complete`; any state may transition to `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentStatus {
    Pending,
    GeneratingBrief,
    Writing,
    Checking,
    Complete,
    Failed,
}

impl ContentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentStatus::Pending => "pending",
            ContentStatus::GeneratingBrief => "generating_brief",
            ContentStatus::Writing => "writing",
            ContentStatus::Checking => "checking",
            ContentStatus::Complete => "complete",
            ContentStatus::Failed => "failed",
        }
    }

    /// Whether a forward transition to `next` is allowed.
    pub fn can_transition_to(&self, next: ContentStatus) -> bool {
        use ContentStatus::*;
        if next == Failed {
            return true;
        }
        matches!(
            (*self, next),
            (Pending, GeneratingBrief)
                | (GeneratingBrief, Writing)
                | (Writing, Checking)
                | (Checking, Complete)
                | (Failed, Pending)
                | (Complete, Pending)
                | (Failed, GeneratingBrief)
                | (Complete, GeneratingBrief)
        )
    }
}

impl std::fmt::Display for ContentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Crawl status of a page (owned by the crawl subsystem; the pipeline only
/// reads it).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageCrawlStatus {
    Pending,
    Completed,
    Failed,
}

/// Status of a long-running job record.
///
/// `Interrupted` is a first-class terminal status distinct from `Failed`:
/// it marks jobs closed out by the recovery sweep rather than by their own
/// error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Interrupted,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Interrupted => "interrupted",
        }
    }

    /// Terminal statuses are never touched by recovery.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled | JobStatus::Interrupted
        )
    }

    /// Non-terminal statuses are eligible for the recovery sweep once stale.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Running)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_status_dag() {
        assert!(ContentStatus::Pending.can_transition_to(ContentStatus::GeneratingBrief));
        assert!(ContentStatus::GeneratingBrief.can_transition_to(ContentStatus::Writing));
        assert!(ContentStatus::Writing.can_transition_to(ContentStatus::Checking));
        assert!(ContentStatus::Checking.can_transition_to(ContentStatus::Complete));
        assert!(!ContentStatus::Pending.can_transition_to(ContentStatus::Complete));
        assert!(!ContentStatus::Writing.can_transition_to(ContentStatus::Complete));
    }

    #[test]
    fn any_status_may_fail() {
        for status in [
            ContentStatus::Pending,
            ContentStatus::GeneratingBrief,
            ContentStatus::Writing,
            ContentStatus::Checking,
            ContentStatus::Complete,
        ] {
            assert!(status.can_transition_to(ContentStatus::Failed));
        }
    }

    #[test]
    fn interrupted_is_terminal_but_not_recoverable() {
        assert!(JobStatus::Interrupted.is_terminal());
        assert!(!JobStatus::Interrupted.is_recoverable());
        assert!(JobStatus::Running.is_recoverable());
        assert!(JobStatus::Pending.is_recoverable());
        assert!(!JobStatus::Completed.is_recoverable());
    }

    #[test]
    fn serde_snake_case_round_trip() {
        let s = serde_json::to_string(&ContentStatus::GeneratingBrief).unwrap();
        assert_eq!(s, "\"generating_brief\"");
        let parsed: JobStatus = serde_json::from_str("\"interrupted\"").unwrap();
        assert_eq!(parsed, JobStatus::Interrupted);
    }
}
