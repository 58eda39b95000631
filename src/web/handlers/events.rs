use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Json, Router,
};
use futures::stream::Stream;
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::task::TaskEvent;
use crate::AppContext;

pub fn events_router() -> Router<Arc<AppContext>> {
    Router::new()
        .route("/events", get(events_handler))
        .route("/health", get(health))
}

/// Task events as SSE, one JSON `data:` line per event.
pub async fn events_handler(
    State(ctx): State<Arc<AppContext>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = ctx.task_manager.subscribe();

    // lagged receivers just skip what they missed
    let stream = BroadcastStream::new(rx)
        .filter_map(|result| result.ok())
        .map(|event: TaskEvent| {
            let data = serde_json::to_string(&event).unwrap_or_else(|e| {
                format!(r#"{{"error": "serialization failed: {}"}}"#, e)
            });
            Ok(Event::default().data(data))
        });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("ping"))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Health {
    status: &'static str,
    version: &'static str,
    running_tasks: usize,
}

async fn health(State(ctx): State<Arc<AppContext>>) -> Json<Health> {
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        running_tasks: ctx.task_manager.registry().len(),
    })
}
