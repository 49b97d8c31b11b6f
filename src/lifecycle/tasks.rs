//! Tracked background tasks with bulk cancellation.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use tokio::task::AbortHandle;

/// Handle to a supervised background task.
///
/// The supervisor owns the task from spawn until it completes naturally or
/// is cancelled; the handle only observes it.
#[derive(Debug, Clone)]
pub struct BackgroundTaskHandle {
    id: u64,
    abort: AbortHandle,
}

impl BackgroundTaskHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_finished(&self) -> bool {
        self.abort.is_finished()
    }
}

/// Registry of fire-and-forget work, drained at shutdown.
///
/// Every spawned task stays registered until it completes naturally
/// (self-removal) or `cancel_all` clears the registry. Cancellation is
/// cooperative: an aborted task stops at its next suspension point, and
/// non-cooperative work is not forcibly terminated. One task's failure
/// never affects siblings or the registry bookkeeping.
#[derive(Clone, Default)]
pub struct TaskSupervisor {
    inner: Arc<SupervisorInner>,
}

#[derive(Default)]
struct SupervisorInner {
    tasks: Mutex<HashMap<u64, AbortHandle>>,
    next_id: AtomicU64,
    /// Pinged on every self-removal so `await_all` can make progress.
    completed: Notify,
}

struct RemoveOnDrop {
    inner: Arc<SupervisorInner>,
    id: u64,
}

impl Drop for RemoveOnDrop {
    fn drop(&mut self) {
        if let Ok(mut tasks) = self.inner.tasks.lock() {
            tasks.remove(&self.id);
        }
        self.inner.completed.notify_one();
    }
}

impl TaskSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a unit of work and register it until it finishes.
    pub fn spawn<F>(&self, work: F) -> BackgroundTaskHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let inner = Arc::clone(&self.inner);

        // The registry lock is held across the spawn so the task's
        // self-removal cannot run before registration. The guard removes
        // the entry however the task ends: completion, panic, or abort.
        let mut tasks = self.inner.tasks.lock().expect("task registry poisoned");
        let handle = tokio::spawn(async move {
            let _guard = RemoveOnDrop { inner, id };
            work.await;
        });
        let abort = handle.abort_handle();
        tasks.insert(id, abort.clone());

        BackgroundTaskHandle { id, abort }
    }

    /// Number of tasks currently registered.
    pub fn len(&self) -> usize {
        self.inner.tasks.lock().expect("task registry poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cancel every registered task and clear the registry.
    ///
    /// Tasks observe the cancellation at their next suspension point.
    pub fn cancel_all(&self) {
        let mut tasks = self.inner.tasks.lock().expect("task registry poisoned");
        let cancelled = tasks.len();
        for handle in tasks.values() {
            handle.abort();
        }
        tasks.clear();
        if cancelled > 0 {
            tracing::info!(cancelled, "Cancelled background tasks");
        }
    }

    /// Wait until every task registered at call time has finished, or the
    /// timeout elapses. Tasks spawned afterwards are not waited on.
    pub async fn await_all(&self, timeout: Option<Duration>) {
        let snapshot: Vec<AbortHandle> = self
            .inner
            .tasks
            .lock()
            .expect("task registry poisoned")
            .values()
            .cloned()
            .collect();
        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            if snapshot.iter().all(AbortHandle::is_finished) {
                return;
            }
            let completed = self.inner.completed.notified();
            match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        tracing::warn!(
                            remaining = snapshot.iter().filter(|h| !h.is_finished()).count(),
                            "Timed out waiting for background tasks"
                        );
                        return;
                    }
                    let _ = tokio::time::timeout(deadline - now, completed).await;
                }
                None => completed.await,
            }
        }
    }
}
