use axum::Router;
use std::sync::Arc;
use crate::AppContext;

pub mod events;
pub mod invoke;
pub mod tasks;

pub fn router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .merge(invoke::invoke_router())
        .merge(tasks::tasks_router())
        .merge(events::events_router())
        .with_state(ctx)
}
