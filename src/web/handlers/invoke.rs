use axum::{
    body::Bytes,
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info};

use crate::error::MediaError;
use crate::processors::{dispatch, HANDLERS};
use crate::utils::http::Envelope;
use crate::AppContext;

pub fn invoke_router() -> Router<Arc<AppContext>> {
    Router::new()
        .route("/invoke/*handler", post(invoke))
        .route("/handlers", get(list_handlers))
}

// 所有操作都返回 200 + {success, message}
async fn invoke(
    State(ctx): State<Arc<AppContext>>,
    Path(handler): Path<String>,
    body: Bytes,
) -> Json<Envelope> {
    let handler = handler.trim_start_matches('/');
    let result = match parse_body(&body) {
        Ok(params) => dispatch(&ctx, handler, params).await,
        Err(e) => Err(e),
    };

    match &result {
        Ok(message) => info!("{}: {}", handler, message),
        Err(e) => error!("{} failed: {}", handler, e),
    }
    Json(Envelope::from(result))
}

fn parse_body(body: &[u8]) -> Result<Value, MediaError> {
    if body.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(Value::Object(Default::default()));
    }
    Ok(serde_json::from_slice(body)?)
}

async fn list_handlers() -> Json<Vec<&'static str>> {
    Json(HANDLERS.to_vec())
}
