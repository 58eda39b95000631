#![allow(clippy::uninlined_format_args)]

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use media_rs::{utils::logger, AppContext};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    media_rs::init_env();

    // 初始化日志系统
    let _guard = logger::init(media_rs::LOG_DIR.to_string())?;

    info!("Starting media service ({})...", env!("GIT_HASH"));

    let ctx = Arc::new(AppContext::from_env());
    info!(
        "Using ffmpeg at {}, ffprobe at {}",
        ctx.tools.ffmpeg.display(),
        ctx.tools.ffprobe.display()
    );

    // 配置服务器地址
    let addr: SocketAddr = media_rs::BIND_ADDR
        .parse()
        .with_context(|| format!("Invalid MEDIA_BIND_ADDR: {}", media_rs::BIND_ADDR.as_str()))?;
    info!("Starting HTTP server at http://{}", addr);

    // 收到 ctrl-c 后先结束所有还在运行的 ffmpeg, 再优雅关闭
    let signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", e);
        }
    };

    match media_rs::web::start_server(ctx.clone(), addr, signal).await {
        Ok(_) => info!("Server stopped gracefully"),
        Err(e) => {
            tracing::error!("Server error: {}", e);
            ctx.task_manager.shutdown().await;
            return Err(e);
        }
    }

    Ok(())
}
