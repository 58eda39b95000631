use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One progress sample for a running task, `progress` is a percentage in `[0, 100]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub task_id: String,
    pub progress: f64,
}

/// Everything pushed on the progress channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TaskEvent {
    Progress(ProgressEvent),
    #[serde(rename_all = "camelCase")]
    Completed { task_id: String, message: String },
    #[serde(rename_all = "camelCase")]
    Failed { task_id: String, error: String },
    #[serde(rename_all = "camelCase")]
    Cancelled { task_id: String },
}

impl TaskEvent {
    pub fn progress(task_id: &str, progress: f64) -> Self {
        TaskEvent::Progress(ProgressEvent {
            task_id: task_id.to_string(),
            progress,
        })
    }

    pub fn task_id(&self) -> &str {
        match self {
            TaskEvent::Progress(event) => &event.task_id,
            TaskEvent::Completed { task_id, .. } => task_id,
            TaskEvent::Failed { task_id, .. } => task_id,
            TaskEvent::Cancelled { task_id } => task_id,
        }
    }
}

/// Snapshot of a registered task, as listed by `GET /tasks`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInfo {
    pub task_id: String,
    pub operation: String,
    pub pid: Option<u32>,
    pub started_at: DateTime<Utc>,
}
