//! Process-local active-run registry.
//!
//! The at-most-one guard for pipeline runs: a project id is present while its
//! pipeline is running, together with the run's advisory cancel flag.
//! Process-local only; a horizontally scaled deployment needs a shared lock
//! instead (durable-store compare-and-swap or an external coordinator). Lost
//! on restart, after which the recovery sweep covers long-running jobs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering::Relaxed};
use std::sync::{Arc, Mutex};

use tracing::debug;
use uuid::Uuid;

/// Set of project ids with an active pipeline run.
#[derive(Debug, Default)]
pub struct ActiveRunRegistry {
    active: Mutex<HashMap<Uuid, Arc<AtomicBool>>>,
}

impl ActiveRunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to claim a project. Returns a guard that releases the claim on
    /// drop, or `None` if a run is already active.
    pub fn try_claim(self: &Arc<Self>, project_id: Uuid) -> Option<RunGuard> {
        let mut active = self.active.lock().expect("registry poisoned");
        if active.contains_key(&project_id) {
            return None;
        }
        let cancel_flag = Arc::new(AtomicBool::new(false));
        active.insert(project_id, Arc::clone(&cancel_flag));
        debug!(%project_id, "pipeline run claimed");
        Some(RunGuard {
            registry: Arc::clone(self),
            project_id,
            cancel_flag,
        })
    }

    pub fn is_active(&self, project_id: Uuid) -> bool {
        self.active
            .lock()
            .expect("registry poisoned")
            .contains_key(&project_id)
    }

    /// Request cancellation of an active run. Advisory: the run abandons
    /// pages it has not started, while in-flight pages complete through
    /// their current step. Returns whether a run was active.
    pub fn cancel(&self, project_id: Uuid) -> bool {
        match self
            .active
            .lock()
            .expect("registry poisoned")
            .get(&project_id)
        {
            Some(flag) => {
                flag.store(true, Relaxed);
                debug!(%project_id, "pipeline run cancellation requested");
                true
            }
            None => false,
        }
    }

    fn release(&self, project_id: Uuid) {
        self.active
            .lock()
            .expect("registry poisoned")
            .remove(&project_id);
        debug!(%project_id, "pipeline run released");
    }
}

/// RAII claim on a project's pipeline slot. Dropping it releases the slot,
/// so the registry is cleared on every exit path, panics included.
#[derive(Debug)]
pub struct RunGuard {
    registry: Arc<ActiveRunRegistry>,
    project_id: Uuid,
    cancel_flag: Arc<AtomicBool>,
}

impl RunGuard {
    /// The advisory cancel flag for this run.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel_flag)
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.registry.release(self.project_id);
    }
}
