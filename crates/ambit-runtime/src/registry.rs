use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use ambit_types::ScopeIdentity;
use compact_str::CompactString;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;

pub(crate) struct TaskEntry {
    pub(crate) label: CompactString,
    pub(crate) scope: ScopeIdentity,
    pub(crate) abort: AbortHandle,
    pub(crate) done: oneshot::Receiver<()>,
}

/// Process-wide ledger of live background tasks, keyed by task id.
pub(crate) fn task_registry() -> &'static Mutex<HashMap<u64, TaskEntry>> {
    static REGISTRY: OnceLock<Mutex<HashMap<u64, TaskEntry>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

pub(crate) fn next_task_id() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

/// Dropped inside the task body, so the registry entry disappears when the
/// task finishes for any reason, abort included.
pub(crate) struct CompletionGuard {
    pub(crate) id: u64,
    pub(crate) tx: Option<oneshot::Sender<()>>,
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        task_registry().lock().remove(&self.id);
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Aborts every registered background task and waits until each one has
/// actually unwound. Tasks spawned after the drain are unaffected.
pub async fn shutdown_background_tasks() {
    let drained: Vec<TaskEntry> = {
        let mut registry = task_registry().lock();
        let ids: Vec<u64> = registry.keys().copied().collect();
        ids.into_iter()
            .filter_map(|id| registry.remove(&id))
            .collect()
    };
    for entry in &drained {
        tracing::debug!(
            task = %entry.label,
            scope = %entry.scope,
            "aborting background task at shutdown"
        );
        entry.abort.abort();
    }
    for entry in drained {
        // The guard fires even when the task body never ran.
        let _ = entry.done.await;
    }
}
