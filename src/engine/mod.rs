pub mod command;
pub mod progress;
pub mod runner;
#[cfg(all(test, unix))]
pub(crate) mod testing;

use std::path::PathBuf;

pub use command::FfmpegCommand;
pub use progress::{progress_from_line, progress_percent};
pub use runner::run_ffmpeg;

/// Locations of the external transcoder binaries.
#[derive(Debug, Clone)]
pub struct ToolPaths {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }
}
