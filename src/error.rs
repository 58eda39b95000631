use thiserror::Error;

/// Errors raised by operation adapters and the engines they drive.
///
/// Every variant ends up as the `message` of a failed boundary envelope,
/// so the `Display` output is what the UI shows.
#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid {kind} mode: {mode}")]
    InvalidMode { kind: &'static str, mode: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{0}")]
    ExternalProcess(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Task {0} was cancelled")]
    Cancelled(String),

    #[error("Unknown handler: {0}")]
    UnknownHandler(String),
}

impl MediaError {
    pub fn invalid_mode(kind: &'static str, mode: impl Into<String>) -> Self {
        MediaError::InvalidMode { kind, mode: mode.into() }
    }
}

impl From<serde_json::Error> for MediaError {
    fn from(error: serde_json::Error) -> Self {
        MediaError::InvalidArgument(error.to_string())
    }
}

pub type MediaResult<T> = std::result::Result<T, MediaError>;
