//! Transient per-run progress counters.
//!
//! Updated from inside the pipeline, read by the status endpoint. Process
//! scoped; nothing here is persisted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering::Relaxed};
use std::sync::{Arc, Mutex};

use uuid::Uuid;

/// Counters for one run.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    /// Keywords looked up against the optimization provider (Phase 1).
    pub keywords_searched: AtomicU64,
    /// Pages run through the quality checker (Phase 2).
    pub posts_scored: AtomicU64,
    /// Pages persisted as complete.
    pub stored: AtomicU64,
    phase: Mutex<String>,
}

impl ProgressTracker {
    pub fn set_phase(&self, phase: impl Into<String>) {
        *self.phase.lock().expect("progress poisoned") = phase.into();
    }

    pub fn phase(&self) -> String {
        self.phase.lock().expect("progress poisoned").clone()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            keywords_searched: self.keywords_searched.load(Relaxed),
            posts_scored: self.posts_scored.load(Relaxed),
            stored: self.stored.load(Relaxed),
            phase: self.phase(),
        }
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub keywords_searched: u64,
    pub posts_scored: u64,
    pub stored: u64,
    pub phase: String,
}

/// Per-project progress trackers for in-flight runs.
#[derive(Debug, Default)]
pub struct ProgressRegistry {
    trackers: Mutex<HashMap<Uuid, Arc<ProgressTracker>>>,
}

impl ProgressRegistry {
    pub fn start(&self, project_id: Uuid) -> Arc<ProgressTracker> {
        let tracker = Arc::new(ProgressTracker::default());
        self.trackers
            .lock()
            .expect("progress poisoned")
            .insert(project_id, Arc::clone(&tracker));
        tracker
    }

    pub fn get(&self, project_id: Uuid) -> Option<Arc<ProgressTracker>> {
        self.trackers
            .lock()
            .expect("progress poisoned")
            .get(&project_id)
            .cloned()
    }

    pub fn finish(&self, project_id: Uuid) {
        self.trackers
            .lock()
            .expect("progress poisoned")
            .remove(&project_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_counters() {
        let registry = ProgressRegistry::default();
        let project_id = Uuid::new_v4();
        let tracker = registry.start(project_id);

        tracker.keywords_searched.fetch_add(3, Relaxed);
        tracker.set_phase("writing");

        let snapshot = registry.get(project_id).unwrap().snapshot();
        assert_eq!(snapshot.keywords_searched, 3);
        assert_eq!(snapshot.phase, "writing");

        registry.finish(project_id);
        assert!(registry.get(project_id).is_none());
    }
}
