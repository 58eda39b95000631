use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::broadcast;

use super::types::TaskEvent;

/// Receiver of task events (progress, completion, failure, cancellation).
#[async_trait]
pub trait TaskCallback: Send + Sync {
    async fn on_event(&self, event: &TaskEvent) -> Result<()>;
}

// HTTP 回调实现
pub struct HttpCallback {
    client: reqwest::Client,
    callback_url: String,
}

impl HttpCallback {
    pub fn new(callback_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, callback_url }
    }

    pub fn url(&self) -> &str {
        &self.callback_url
    }
}

#[async_trait]
impl TaskCallback for HttpCallback {
    async fn on_event(&self, event: &TaskEvent) -> Result<()> {
        self.client
            .post(&self.callback_url)
            .json(event)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

// 函数回调实现
pub struct FunctionCallback<F> {
    callback: F,
}

impl<F> FunctionCallback<F>
where
    F: Fn(&TaskEvent) -> Result<()> + Send + Sync + 'static,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

#[async_trait]
impl<F> TaskCallback for FunctionCallback<F>
where
    F: Fn(&TaskEvent) -> Result<()> + Send + Sync + 'static,
{
    async fn on_event(&self, event: &TaskEvent) -> Result<()> {
        (self.callback)(event)
    }
}

// 内部事件回调实现, the SSE endpoint subscribes here
#[derive(Clone)]
pub struct EventCallback {
    sender: broadcast::Sender<TaskEvent>,
}

impl EventCallback {
    pub fn new(capacity: usize) -> (Self, broadcast::Receiver<TaskEvent>) {
        let (sender, receiver) = broadcast::channel(capacity);
        (Self { sender }, receiver)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl TaskCallback for EventCallback {
    async fn on_event(&self, event: &TaskEvent) -> Result<()> {
        // no subscriber is not an error, the UI may not be listening yet
        let _ = self.sender.send(event.clone());
        Ok(())
    }
}
