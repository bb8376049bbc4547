use std::collections::BTreeMap;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::scheduler::session::WorkerSession;

/// Registry entry for one connected worker.
#[derive(Debug, Clone)]
pub struct WorkerState {
    pub id: String,
    pub session: WorkerSession,
    pub running_tasks: u32,
}

impl WorkerState {
    pub fn new(id: String, session: WorkerSession) -> Self {
        Self {
            id,
            session,
            running_tasks: 0,
        }
    }
}

/// Point-in-time view of a registered worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerLoad {
    pub worker_id: String,
    pub running_tasks: u32,
}

/// Tracks live workers and their reported load.
///
/// Every operation runs under a single lock acquisition. Entries are kept
/// ordered by identity so that least-loaded ties resolve to the lowest id.
#[derive(Debug, Default)]
pub struct WorkerRegistry {
    workers: RwLock<BTreeMap<String, WorkerState>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a worker, replacing any previous entry for the same id.
    ///
    /// An entry under a different id that points at the same session is
    /// dropped, so one session never backs two identities.
    pub async fn register(&self, worker_id: &str, session: WorkerSession) {
        let mut workers = self.workers.write().await;
        let session_id = session.id();
        workers.retain(|id, w| id == worker_id || w.session.id() != session_id);
        if let Some(previous) = workers.insert(
            worker_id.to_string(),
            WorkerState::new(worker_id.to_string(), session),
        ) {
            if previous.session.id() != session_id {
                tracing::warn!(
                    worker_id,
                    previous_session = %previous.session.id(),
                    "Worker re-registered from a new session, replacing previous entry"
                );
            }
        }
        tracing::info!(worker_id, session_id = %session_id, "Worker registered");
    }

    /// Remove a worker. Returns whether an entry was present.
    pub async fn deregister(&self, worker_id: &str) -> bool {
        let removed = self.workers.write().await.remove(worker_id).is_some();
        if removed {
            tracing::info!(worker_id, "Worker deregistered");
        }
        removed
    }

    /// Remove a worker only while its entry still belongs to `session_id`.
    ///
    /// A session that was superseded by a newer Hello for the same id must
    /// not evict its replacement when it tears down.
    pub async fn deregister_session(&self, worker_id: &str, session_id: Uuid) -> bool {
        let mut workers = self.workers.write().await;
        match workers.get(worker_id) {
            Some(w) if w.session.id() == session_id => {
                workers.remove(worker_id);
                tracing::info!(worker_id, session_id = %session_id, "Worker deregistered");
                true
            }
            Some(_) => {
                tracing::debug!(
                    worker_id,
                    session_id = %session_id,
                    "Stale session closed, newer registration kept"
                );
                false
            }
            None => false,
        }
    }

    /// Overwrite the reported load. Unknown workers are ignored.
    pub async fn update_load(&self, worker_id: &str, running_tasks: u32) {
        if let Some(worker) = self.workers.write().await.get_mut(worker_id) {
            worker.running_tasks = running_tasks;
        }
    }

    /// Account for one finished task, never going below zero.
    ///
    /// Only applies while the entry still belongs to `session_id`; a result
    /// arriving late on a superseded session leaves the replacement's load
    /// alone. Returns whether the load was touched.
    pub async fn release_task(&self, worker_id: &str, session_id: Uuid) -> bool {
        let mut workers = self.workers.write().await;
        match workers.get_mut(worker_id) {
            Some(worker) if worker.session.id() == session_id => {
                worker.running_tasks = worker.running_tasks.saturating_sub(1);
                true
            }
            Some(_) => {
                tracing::debug!(
                    worker_id,
                    session_id = %session_id,
                    "Result from superseded session, load unchanged"
                );
                false
            }
            None => false,
        }
    }

    /// Session currently backing `worker_id`.
    pub async fn session_of(&self, worker_id: &str) -> Option<Uuid> {
        self.workers
            .read()
            .await
            .get(worker_id)
            .map(|w| w.session.id())
    }

    /// Least-loaded worker id, lowest id on ties.
    pub async fn select_least_loaded(&self) -> Option<String> {
        let workers = self.workers.read().await;
        Self::least_loaded(&workers).map(|w| w.id.clone())
    }

    /// Pick the least-loaded worker and count the task against it in the
    /// same critical section. The returned session is used to send Execute.
    pub async fn select_for_dispatch(&self) -> Option<(String, WorkerSession)> {
        let mut workers = self.workers.write().await;
        let worker_id = Self::least_loaded(&workers)?.id.clone();
        let worker = workers.get_mut(&worker_id)?;
        worker.running_tasks += 1;
        Some((worker_id, worker.session.clone()))
    }

    pub async fn load_of(&self, worker_id: &str) -> Option<u32> {
        self.workers
            .read()
            .await
            .get(worker_id)
            .map(|w| w.running_tasks)
    }

    /// All workers ordered by id.
    pub async fn snapshot(&self) -> Vec<WorkerLoad> {
        self.workers
            .read()
            .await
            .values()
            .map(|w| WorkerLoad {
                worker_id: w.id.clone(),
                running_tasks: w.running_tasks,
            })
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.workers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.workers.read().await.is_empty()
    }

    // `min_by_key` keeps the first minimum, which is the lowest id here.
    fn least_loaded(workers: &BTreeMap<String, WorkerState>) -> Option<&WorkerState> {
        workers.values().min_by_key(|w| w.running_tasks)
    }
}
