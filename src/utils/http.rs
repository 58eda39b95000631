use serde::{Deserialize, Serialize};

use crate::error::MediaError;

/// Uniform reply of every operation handler.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Envelope {
    pub success: bool,
    pub message: String,
}

impl Envelope {
    pub fn ok(message: impl Into<String>) -> Self {
        Self { success: true, message: message.into() }
    }

    pub fn failed(error: &MediaError) -> Self {
        Self {
            success: false,
            message: format!("Processing failed: {}", error),
        }
    }
}

impl From<Result<String, MediaError>> for Envelope {
    fn from(result: Result<String, MediaError>) -> Self {
        match result {
            Ok(message) => Envelope::ok(message),
            Err(e) => Envelope::failed(&e),
        }
    }
}

/// Reply of the cancel handler.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CancelResponse {
    pub success: bool,
}
