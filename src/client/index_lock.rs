//! Per-project index lock
//!
//! Only one indexing run per project is active in a process. Callers that
//! arrive while a run is in progress subscribe to its result instead of
//! starting a second run.

use crate::store::CodeEmbeddingRecord;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::sync::broadcast;

/// Maximum time an indexing run can hold the lock before it is considered stale
const MAX_LOCK_DURATION: Duration = Duration::from_secs(30 * 60);

/// Result shared with every caller of one run; errors are carried as text
pub(crate) type IndexOutcome = Result<Vec<CodeEmbeddingRecord>, String>;

pub(crate) type IndexOps = Arc<RwLock<HashMap<String, IndexingOperation>>>;

/// State for an in-progress indexing run
pub(crate) struct IndexingOperation {
    result_tx: broadcast::Sender<IndexOutcome>,
    /// Cleared once the run has published its outcome
    active: Arc<AtomicBool>,
    started_at: Instant,
}

impl IndexingOperation {
    fn is_stale(&self) -> bool {
        self.active.load(Ordering::Acquire) && self.started_at.elapsed() > MAX_LOCK_DURATION
    }
}

/// Result of trying to acquire an index lock
pub(crate) enum IndexLockResult {
    /// We acquired the lock and should perform indexing
    Acquired(IndexLockGuard),
    /// Another run for the project is in progress, wait for its result
    WaitForResult(broadcast::Receiver<IndexOutcome>),
}

/// Try to take the index lock of `project_id`
pub(crate) async fn try_acquire(ops: &IndexOps, project_id: &str) -> IndexLockResult {
    let mut locks = ops.write().await;

    if let Some(existing) = locks.get(project_id) {
        if existing.active.load(Ordering::Acquire) && !existing.is_stale() {
            tracing::info!(
                "Indexing already in progress for project {}, waiting for result",
                project_id
            );
            return IndexLockResult::WaitForResult(existing.result_tx.subscribe());
        }
        tracing::debug!("Replacing finished or stale index lock for {}", project_id);
        locks.remove(project_id);
    }

    // One result is ever sent
    let (result_tx, _) = broadcast::channel(1);
    let active = Arc::new(AtomicBool::new(true));
    locks.insert(
        project_id.to_string(),
        IndexingOperation {
            result_tx: result_tx.clone(),
            active: active.clone(),
            started_at: Instant::now(),
        },
    );

    IndexLockResult::Acquired(IndexLockGuard {
        project_id: project_id.to_string(),
        locks_map: ops.clone(),
        result_tx,
        active,
        released: false,
    })
}

/// Guard for a held index lock
///
/// [`release`](Self::release) publishes the outcome and removes the lock.
/// A guard dropped without release (panic or cancelled task) still wakes
/// every waiter with an error.
pub(crate) struct IndexLockGuard {
    project_id: String,
    locks_map: IndexOps,
    result_tx: broadcast::Sender<IndexOutcome>,
    active: Arc<AtomicBool>,
    released: bool,
}

impl IndexLockGuard {
    pub(crate) async fn release(mut self, outcome: &IndexOutcome) {
        // Publish under the map lock so no caller can subscribe after the send
        let mut locks = self.locks_map.write().await;
        self.active.store(false, Ordering::Release);
        // No receivers is fine
        let _ = self.result_tx.send(outcome.clone());

        remove_if_owned(&mut locks, &self.project_id, &self.active);
        drop(locks);
        self.released = true;
    }
}

impl Drop for IndexLockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        tracing::warn!(
            "Index lock for project {} dropped without release - spawning cleanup task",
            self.project_id
        );

        let interrupted: IndexOutcome = Err("Indexing operation was interrupted".to_string());
        let project_id = self.project_id.clone();
        let locks_map = self.locks_map.clone();
        let active = self.active.clone();
        let result_tx = self.result_tx.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    let mut locks = locks_map.write().await;
                    active.store(false, Ordering::Release);
                    let _ = result_tx.send(interrupted);
                    remove_if_owned(&mut locks, &project_id, &active);
                });
            }
            Err(_) => {
                // Waiters must not hang on an abandoned run
                active.store(false, Ordering::Release);
                let _ = result_tx.send(interrupted);
            }
        }
    }
}

/// Remove the lock entry only if it still belongs to the run owning `active`
fn remove_if_owned(
    locks: &mut HashMap<String, IndexingOperation>,
    project_id: &str,
    active: &Arc<AtomicBool>,
) {
    if locks
        .get(project_id)
        .is_some_and(|op| Arc::ptr_eq(&op.active, active))
    {
        locks.remove(project_id);
    }
}
