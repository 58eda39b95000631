pub mod engine;
pub mod error;
pub mod format;
pub mod processors;
pub mod task;
pub mod utils;
pub mod web;

use std::path::PathBuf;
use std::{env, sync::Arc};

use engine::ToolPaths;
use once_cell::sync::Lazy;
use task::TaskManager;

pub use error::{MediaError, MediaResult};

pub struct AppContext {
    pub task_manager: Arc<TaskManager>,
    pub tools: ToolPaths,
}

impl AppContext {
    pub fn new(tools: ToolPaths) -> Self {
        Self {
            task_manager: Arc::new(TaskManager::new()),
            tools,
        }
    }

    /// Context configured from the environment, including the optional progress webhook.
    pub fn from_env() -> Self {
        let mut task_manager = TaskManager::new();
        if let Some(url) = PROGRESS_CALLBACK_URL.as_deref() {
            task_manager = task_manager.with_http_callback(url);
        }
        Self {
            task_manager: Arc::new(task_manager),
            tools: ToolPaths {
                ffmpeg: PathBuf::from(FFMPEG_PATH.as_str()),
                ffprobe: PathBuf::from(FFPROBE_PATH.as_str()),
            },
        }
    }
}

const MEDIA_FFMPEG_PATH: &str = "ffmpeg";
const MEDIA_FFPROBE_PATH: &str = "ffprobe";
const MEDIA_BIND_ADDR: &str = "127.0.0.1:7210";
const MEDIA_LOG_DIR: &str = "./logs";

fn var(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) => Some(value),
        Err(_) => dotenv::var(name).ok(),
    }
}

pub static FFMPEG_PATH: Lazy<String> =
    Lazy::new(|| var("MEDIA_FFMPEG_PATH").unwrap_or_else(|| MEDIA_FFMPEG_PATH.to_string()));

pub static FFPROBE_PATH: Lazy<String> =
    Lazy::new(|| var("MEDIA_FFPROBE_PATH").unwrap_or_else(|| MEDIA_FFPROBE_PATH.to_string()));

pub static BIND_ADDR: Lazy<String> =
    Lazy::new(|| var("MEDIA_BIND_ADDR").unwrap_or_else(|| MEDIA_BIND_ADDR.to_string()));

pub static LOG_DIR: Lazy<String> =
    Lazy::new(|| var("MEDIA_LOG_DIR").unwrap_or_else(|| MEDIA_LOG_DIR.to_string()));

// 未设置时不推送进度
pub static PROGRESS_CALLBACK_URL: Lazy<Option<String>> =
    Lazy::new(|| var("MEDIA_PROGRESS_CALLBACK_URL").filter(|url| !url.trim().is_empty()));

pub fn init_env() {
    dotenv::dotenv().ok();

    // 确保日志目录存在
    std::fs::create_dir_all(LOG_DIR.as_str()).unwrap_or_else(|e| {
        eprintln!("Failed to create log directory: {}", e);
    });
}
