use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::sync::watch;
use tracing::{info, warn};

use super::types::TaskInfo;

/// Why a process was asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillReason {
    /// Cancelled by a caller or by shutdown.
    Cancel,
    /// A new run took over the same task id.
    Replaced,
}

/// Registry side of one running external process.
pub struct TaskHandle {
    operation: String,
    pid: Option<u32>,
    started_at: DateTime<Utc>,
    generation: u64,
    kill_tx: watch::Sender<Option<KillReason>>,
    exited_rx: watch::Receiver<bool>,
}

/// Process side of a [`TaskHandle`], owned by whoever waits on the child.
///
/// Dropping it marks the process as exited.
pub struct ProcessControl {
    kill_rx: watch::Receiver<Option<KillReason>>,
    exited_tx: watch::Sender<bool>,
}

impl TaskHandle {
    pub fn new(operation: impl Into<String>, pid: Option<u32>) -> (TaskHandle, ProcessControl) {
        let (kill_tx, kill_rx) = watch::channel(None);
        let (exited_tx, exited_rx) = watch::channel(false);
        let handle = TaskHandle {
            operation: operation.into(),
            pid,
            started_at: Utc::now(),
            generation: 0,
            kill_tx,
            exited_rx,
        };
        (handle, ProcessControl { kill_rx, exited_tx })
    }

    /// Ask the owning side to kill the process. Does not wait.
    pub fn terminate(&self, reason: KillReason) {
        self.kill_tx.send_replace(Some(reason));
    }

    /// Resolves once the process side has been dropped.
    pub async fn wait_exited(&self) {
        let mut exited = self.exited_rx.clone();
        // Err means the control was dropped, which is an exit too
        let _ = exited.wait_for(|exited| *exited).await;
    }

    fn info(&self, task_id: &str) -> TaskInfo {
        TaskInfo {
            task_id: task_id.to_string(),
            operation: self.operation.clone(),
            pid: self.pid,
            started_at: self.started_at,
        }
    }
}

impl ProcessControl {
    /// Resolves with the reason once termination was requested. Never
    /// resolves if the handle was dropped without a request.
    pub async fn kill_requested(&mut self) -> KillReason {
        let requested = self.kill_rx.wait_for(|reason| reason.is_some()).await.ok().and_then(|r| *r);
        match requested {
            Some(reason) => reason,
            None => std::future::pending().await,
        }
    }
}

impl Drop for ProcessControl {
    fn drop(&mut self) {
        self.exited_tx.send_replace(true);
    }
}

/// Task id to in-flight process map.
///
/// The map lock is synchronous and never held across an await, so entries
/// can be removed from `Drop`.
pub struct TaskRegistry {
    tasks: Mutex<HashMap<String, TaskHandle>>,
    next_generation: AtomicU64,
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
        }
    }

    fn tasks(&self) -> MutexGuard<'_, HashMap<String, TaskHandle>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `handle` under `task_id` and return its generation.
    ///
    /// A process already registered under the same id is terminated and replaced.
    pub fn register(&self, task_id: &str, mut handle: TaskHandle) -> u64 {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        handle.generation = generation;

        let displaced = self.tasks().insert(task_id.to_string(), handle);
        if let Some(previous) = displaced {
            warn!(
                "Task {} re-registered, terminating previous {} process",
                task_id, previous.operation
            );
            previous.terminate(KillReason::Replaced);
        }

        info!("Registered task {}", task_id);
        generation
    }

    /// Terminate and remove a task, waiting until its process has exited.
    ///
    /// Returns false when no such task is registered.
    pub async fn cancel(&self, task_id: &str) -> bool {
        let handle = self.tasks().remove(task_id);
        match handle {
            Some(handle) => {
                info!("Cancelling task {} ({})", task_id, handle.operation);
                handle.terminate(KillReason::Cancel);
                handle.wait_exited().await;
                info!("Task {} exited after cancellation", task_id);
                true
            }
            None => {
                warn!("Cancel requested for unknown task {}", task_id);
                false
            }
        }
    }

    /// Terminate every registered process and empty the registry.
    pub async fn cancel_all(&self) -> usize {
        let handles: Vec<(String, TaskHandle)> = self.tasks().drain().collect();
        if handles.is_empty() {
            return 0;
        }

        info!("Cancelling {} running tasks", handles.len());
        for (_, handle) in &handles {
            handle.terminate(KillReason::Cancel);
        }
        join_all(handles.iter().map(|(_, handle)| handle.wait_exited())).await;
        handles.len()
    }

    /// Remove `task_id` only if it still belongs to `generation`.
    pub fn deregister(&self, task_id: &str, generation: u64) -> bool {
        let mut tasks = self.tasks();
        match tasks.get(task_id) {
            Some(handle) if handle.generation == generation => {
                tasks.remove(task_id);
                true
            }
            _ => false,
        }
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.tasks().contains_key(task_id)
    }

    pub fn len(&self) -> usize {
        self.tasks().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks().is_empty()
    }

    pub fn list(&self) -> Vec<TaskInfo> {
        let tasks = self.tasks();
        let mut infos: Vec<TaskInfo> = tasks.iter().map(|(id, handle)| handle.info(id)).collect();
        infos.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        infos
    }
}
