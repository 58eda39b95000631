use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tracing::info;

use crate::task::TaskInfo;
use crate::utils::http::CancelResponse;
use crate::AppContext;

pub fn tasks_router() -> Router<Arc<AppContext>> {
    Router::new()
        .route("/tasks", get(list_tasks))
        .route("/tasks/:task_id/cancel", post(cancel_task))
}

// Cancel endpoint, resolves once the process is gone
async fn cancel_task(
    State(ctx): State<Arc<AppContext>>,
    Path(task_id): Path<String>,
) -> Json<CancelResponse> {
    let success = ctx.task_manager.cancel(&task_id).await;
    info!("Cancel requested for {}: {}", task_id, if success { "cancelled" } else { "not running" });
    Json(CancelResponse { success })
}

async fn list_tasks(State(ctx): State<Arc<AppContext>>) -> Json<Vec<TaskInfo>> {
    Json(ctx.task_manager.running_tasks())
}
