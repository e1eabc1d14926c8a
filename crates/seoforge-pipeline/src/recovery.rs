//! Job recovery across process restarts.
//!
//! A job left `pending` or `running` whose `updated_at` is older than the
//! stale threshold was interrupted (most likely a server restart killed its
//! task). The sweep transitions such jobs to a terminal state with recovery
//! metadata merged into their stats blob, so the status surface stops
//! reporting phantom in-flight work.
//!
//! `updated_at` only advances on business writes; the threshold must exceed
//! the longest legitimate quiet interval between progress updates.

use std::env;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};
use uuid::Uuid;

use seoforge_store::Store;
use seoforge_types::{CoreResult, JobStatus};

/// Default staleness window in minutes.
pub const DEFAULT_STALE_THRESHOLD_MINUTES: i64 = 5;

/// A stale non-terminal job found by the sweep.
#[derive(Debug, Clone)]
pub struct InterruptedJob {
    pub job_id: Uuid,
    pub project_id: Uuid,
    pub status: JobStatus,
    pub pages_crawled: u32,
    pub pages_failed: u32,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of recovering one job.
#[derive(Debug, Clone, Serialize)]
pub struct RecoveryResult {
    pub job_id: Uuid,
    pub project_id: String,
    pub previous_status: String,
    pub new_status: String,
    /// `recovered`, `skipped`, `not_found`, or `error`.
    pub action_taken: String,
    pub error: Option<String>,
    pub recovered_at: String,
}

/// Outcome of a full sweep.
#[derive(Debug, Clone, Serialize)]
pub struct RecoverySummary {
    pub total_found: usize,
    pub total_recovered: usize,
    pub total_failed: usize,
    pub results: Vec<RecoveryResult>,
    pub duration_ms: i64,
    pub started_at: String,
    pub completed_at: String,
}

/// The recovery service.
pub struct RecoveryService {
    store: Arc<dyn Store>,
    stale_threshold_minutes: i64,
}

impl RecoveryService {
    pub fn new(store: Arc<dyn Store>, stale_threshold_minutes: i64) -> Self {
        Self {
            store,
            stale_threshold_minutes,
        }
    }

    pub fn with_default_threshold(store: Arc<dyn Store>) -> Self {
        Self::new(store, DEFAULT_STALE_THRESHOLD_MINUTES)
    }

    pub fn stale_threshold_minutes(&self) -> i64 {
        self.stale_threshold_minutes
    }

    /// Jobs in a non-terminal status whose `updated_at` is stale.
    pub async fn find_interrupted(
        &self,
        stale_threshold_minutes: Option<i64>,
    ) -> CoreResult<Vec<InterruptedJob>> {
        let threshold = stale_threshold_minutes.unwrap_or(self.stale_threshold_minutes);
        let cutoff = Utc::now() - Duration::minutes(threshold);

        let jobs = self
            .store
            .jobs_with_status(&[JobStatus::Pending, JobStatus::Running])
            .await?;

        let interrupted: Vec<InterruptedJob> = jobs
            .into_iter()
            .filter(|job| job.updated_at < cutoff)
            .map(|job| InterruptedJob {
                job_id: job.id,
                project_id: job.project_id,
                status: job.status,
                pages_crawled: job.pages_crawled,
                pages_failed: job.pages_failed,
                updated_at: job.updated_at,
            })
            .collect();

        info!(
            found = interrupted.len(),
            stale_threshold_minutes = threshold,
            "scanned for interrupted jobs"
        );
        Ok(interrupted)
    }

    /// Transition one job to a terminal state with recovery metadata.
    pub async fn recover_one(&self, job_id: Uuid, mark_as_failed: bool) -> RecoveryResult {
        let now = Utc::now();
        let job = match self.store.job(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                return RecoveryResult {
                    job_id,
                    project_id: "unknown".to_string(),
                    previous_status: "unknown".to_string(),
                    new_status: "unknown".to_string(),
                    action_taken: "not_found".to_string(),
                    error: Some("job not found".to_string()),
                    recovered_at: now.to_rfc3339(),
                }
            }
            Err(err) => {
                return RecoveryResult {
                    job_id,
                    project_id: "unknown".to_string(),
                    previous_status: "unknown".to_string(),
                    new_status: "unknown".to_string(),
                    action_taken: "error".to_string(),
                    error: Some(err.to_string()),
                    recovered_at: now.to_rfc3339(),
                }
            }
        };

        let project_id = job.project_id.to_string();
        let previous_status = job.status;
        if !previous_status.is_recoverable() {
            return RecoveryResult {
                job_id,
                project_id,
                previous_status: previous_status.to_string(),
                new_status: previous_status.to_string(),
                action_taken: "skipped".to_string(),
                error: Some(format!(
                    "job not in recoverable state: {previous_status}"
                )),
                recovered_at: now.to_rfc3339(),
            };
        }

        let new_status = if mark_as_failed {
            JobStatus::Failed
        } else {
            JobStatus::Interrupted
        };

        let mut updated = job;
        updated.status = new_status;
        updated.completed_at = Some(now);
        updated.error_message = Some(format!(
            "Job interrupted by server restart after {} pages crawled",
            updated.pages_crawled
        ));
        merge_recovery_stats(&mut updated.stats, previous_status, now);

        if let Err(err) = self.store.update_job(updated).await {
            error!(%job_id, error = %err, "failed to persist job recovery");
            return RecoveryResult {
                job_id,
                project_id,
                previous_status: previous_status.to_string(),
                new_status: "unknown".to_string(),
                action_taken: "error".to_string(),
                error: Some(err.to_string()),
                recovered_at: now.to_rfc3339(),
            };
        }

        info!(
            %job_id,
            previous_status = %previous_status,
            new_status = %new_status,
            "recovered interrupted job"
        );

        RecoveryResult {
            job_id,
            project_id,
            previous_status: previous_status.to_string(),
            new_status: new_status.to_string(),
            action_taken: "recovered".to_string(),
            error: None,
            recovered_at: now.to_rfc3339(),
        }
    }

    /// Sweep and recover every interrupted job. Per-job failures become
    /// failed entries in the summary; the sweep continues.
    pub async fn recover_all(
        &self,
        mark_as_failed: bool,
        stale_threshold_minutes: Option<i64>,
    ) -> CoreResult<RecoverySummary> {
        let started = Utc::now();
        let interrupted = self.find_interrupted(stale_threshold_minutes).await?;

        let mut results: Vec<RecoveryResult> = Vec::with_capacity(interrupted.len());
        let mut total_recovered = 0;
        let mut total_failed = 0;

        for job in &interrupted {
            let result = self.recover_one(job.job_id, mark_as_failed).await;
            if result.action_taken == "recovered" {
                total_recovered += 1;
            } else {
                warn!(
                    job_id = %job.job_id,
                    action = %result.action_taken,
                    error = result.error.as_deref().unwrap_or(""),
                    "job recovery did not complete"
                );
                total_failed += 1;
            }
            results.push(result);
        }

        let completed = Utc::now();
        let summary = RecoverySummary {
            total_found: interrupted.len(),
            total_recovered,
            total_failed,
            results,
            duration_ms: (completed - started).num_milliseconds(),
            started_at: started.to_rfc3339(),
            completed_at: completed.to_rfc3339(),
        };

        info!(
            total_found = summary.total_found,
            total_recovered = summary.total_recovered,
            total_failed = summary.total_failed,
            duration_ms = summary.duration_ms,
            "recovery sweep complete"
        );
        Ok(summary)
    }
}

/// Run the startup sweep with the configured threshold.
pub async fn run_startup_recovery(store: Arc<dyn Store>) -> CoreResult<RecoverySummary> {
    let threshold = env::var("SEOFORGE_STALE_THRESHOLD_MINUTES")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_STALE_THRESHOLD_MINUTES);
    RecoveryService::new(store, threshold)
        .recover_all(true, None)
        .await
}

fn merge_recovery_stats(stats: &mut Value, previous_status: JobStatus, now: DateTime<Utc>) {
    if !stats.is_object() {
        *stats = Value::Object(Default::default());
    }
    stats.as_object_mut().expect("object").insert(
        "recovery".to_string(),
        json!({
            "interrupted": true,
            "recovery_reason": "server_restart",
            "previous_status": previous_status.to_string(),
            "interrupted_at": now.to_rfc3339(),
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use seoforge_store::MemoryStore;
    use seoforge_types::GenerationJob;

    async fn stale_job(store: &MemoryStore, status: JobStatus, minutes_old: i64) -> Uuid {
        let mut job = GenerationJob::new(Uuid::new_v4());
        job.status = status;
        job.pages_crawled = 7;
        job.updated_at = Utc::now() - Duration::minutes(minutes_old);
        let id = job.id;
        store.insert_job(job).await.unwrap();
        id
    }

    fn service(store: Arc<MemoryStore>) -> RecoveryService {
        RecoveryService::new(store, 5)
    }

    #[tokio::test]
    async fn finds_only_stale_non_terminal_jobs() {
        let store = Arc::new(MemoryStore::new());
        let running = stale_job(&store, JobStatus::Running, 10).await;
        let pending = stale_job(&store, JobStatus::Pending, 10).await;
        let recent = stale_job(&store, JobStatus::Running, 1).await;
        let completed = stale_job(&store, JobStatus::Completed, 60).await;

        let found = service(store).find_interrupted(None).await.unwrap();
        let ids: Vec<Uuid> = found.iter().map(|j| j.job_id).collect();
        assert!(ids.contains(&running));
        assert!(ids.contains(&pending));
        assert!(!ids.contains(&recent));
        assert!(!ids.contains(&completed));
    }

    #[tokio::test]
    async fn threshold_override_applies() {
        let store = Arc::new(MemoryStore::new());
        let running = stale_job(&store, JobStatus::Running, 10).await;
        let found = service(store)
            .find_interrupted(Some(60))
            .await
            .unwrap();
        assert!(!found.iter().any(|j| j.job_id == running));
    }

    #[tokio::test]
    async fn recovers_running_job_as_failed_with_metadata() {
        let store = Arc::new(MemoryStore::new());
        let job_id = stale_job(&store, JobStatus::Running, 10).await;

        let result = service(Arc::clone(&store)).recover_one(job_id, true).await;
        assert_eq!(result.action_taken, "recovered");
        assert_eq!(result.previous_status, "running");
        assert_eq!(result.new_status, "failed");
        assert!(result.error.is_none());

        let job = store.job(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.completed_at.is_some());
        let message = job.error_message.unwrap();
        assert!(message.to_lowercase().contains("server restart"));
        assert!(message.contains('7'));

        let recovery = &job.stats["recovery"];
        assert_eq!(recovery["interrupted"], true);
        assert_eq!(recovery["recovery_reason"], "server_restart");
        assert_eq!(recovery["previous_status"], "running");
        assert!(recovery["interrupted_at"].is_string());
    }

    #[tokio::test]
    async fn recovers_as_interrupted_when_asked() {
        let store = Arc::new(MemoryStore::new());
        let job_id = stale_job(&store, JobStatus::Running, 10).await;
        let result = service(Arc::clone(&store)).recover_one(job_id, false).await;
        assert_eq!(result.new_status, "interrupted");
        let job = store.job(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Interrupted);
    }

    #[tokio::test]
    async fn skips_terminal_jobs() {
        let store = Arc::new(MemoryStore::new());
        let job_id = stale_job(&store, JobStatus::Completed, 60).await;
        let result = service(store).recover_one(job_id, true).await;
        assert_eq!(result.action_taken, "skipped");
        assert_eq!(result.previous_status, "completed");
        assert_eq!(result.new_status, "completed");
        assert!(result.error.unwrap().contains("not in recoverable state"));
    }

    #[tokio::test]
    async fn missing_job_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let result = service(store).recover_one(Uuid::new_v4(), true).await;
        assert_eq!(result.action_taken, "not_found");
        assert_eq!(result.project_id, "unknown");
        assert_eq!(result.error.as_deref(), Some("job not found"));
    }

    #[tokio::test]
    async fn recover_all_sweeps_and_summarizes() {
        let store = Arc::new(MemoryStore::new());
        let a = stale_job(&store, JobStatus::Running, 10).await;
        let b = stale_job(&store, JobStatus::Pending, 10).await;
        stale_job(&store, JobStatus::Running, 1).await;

        let summary = service(Arc::clone(&store))
            .recover_all(true, None)
            .await
            .unwrap();
        assert_eq!(summary.total_found, 2);
        assert_eq!(summary.total_recovered, 2);
        assert_eq!(summary.total_failed, 0);
        assert_eq!(summary.results.len(), 2);
        assert!(summary.duration_ms >= 0);

        for id in [a, b] {
            let job = store.job(id).await.unwrap().unwrap();
            assert_eq!(job.status, JobStatus::Failed);
        }
    }

    #[tokio::test]
    async fn second_sweep_finds_nothing() {
        let store = Arc::new(MemoryStore::new());
        stale_job(&store, JobStatus::Running, 10).await;

        let service = service(Arc::clone(&store));
        let first = service.recover_all(true, None).await.unwrap();
        assert_eq!(first.total_recovered, 1);
        let second = service.recover_all(true, None).await.unwrap();
        assert_eq!(second.total_found, 0);
    }
}
