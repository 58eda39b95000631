use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

pub mod handlers;

use crate::AppContext;

pub async fn start_server<F>(ctx: Arc<AppContext>, addr: SocketAddr, signal: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!("Starting server on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    serve(listener, ctx, signal).await
}

/// Serve on an already bound listener until `signal` resolves.
///
/// Running tasks are cancelled as soon as the signal fires, so in-flight
/// invocations answer right away instead of holding the graceful shutdown
/// open until their transcoder finishes.
pub async fn serve<F>(listener: TcpListener, ctx: Arc<AppContext>, signal: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = handlers::router(ctx.clone());
    let shutdown = async move {
        signal.await;
        info!("Shutdown requested, cancelling running tasks");
        ctx.task_manager.shutdown().await;
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
