use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};

use super::callback::{EventCallback, HttpCallback, TaskCallback};
use super::registry::TaskRegistry;
use super::types::{TaskEvent, TaskInfo};

/// Owns the task registry and fans task events out to every callback.
///
/// One instance lives for the whole service, created at startup and torn
/// down with [`TaskManager::shutdown`].
pub struct TaskManager {
    registry: TaskRegistry,
    event_callback: EventCallback,
    callbacks: Vec<Arc<dyn TaskCallback>>,
}

impl TaskManager {
    pub fn new() -> Self {
        let (event_callback, _) = EventCallback::new(256);
        Self {
            registry: TaskRegistry::new(),
            event_callback,
            callbacks: Vec::new(),
        }
    }

    /// Also POST every event to `url`, off the notifying task.
    ///
    /// Must be called inside a tokio runtime.
    pub fn with_http_callback(self, url: &str) -> Self {
        let callback = HttpCallback::new(url.to_string());
        info!("Relaying task events to {}", callback.url());
        self.relay(Arc::new(callback));
        self
    }

    /// Feed `callback` from the broadcast channel on its own task, so a slow
    /// receiver never holds up [`TaskManager::notify`]. Events reach it in
    /// emission order; the relay ends when the manager is dropped.
    pub fn relay(&self, callback: Arc<dyn TaskCallback>) {
        let mut receiver = self.subscribe();
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => {
                        if let Err(e) = callback.on_event(&event).await {
                            warn!("Relayed callback failed for {}: {}", event.task_id(), e);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Callback relay fell behind, {} events skipped", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }

    pub fn register_callback(&mut self, callback: Arc<dyn TaskCallback>) {
        self.callbacks.push(callback);
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.event_callback.subscribe()
    }

    /// Deliver an event to the broadcast channel and every registered callback, in order.
    pub async fn notify(&self, event: TaskEvent) {
        if let Err(e) = self.event_callback.on_event(&event).await {
            warn!("Failed to broadcast event for task {}: {}", event.task_id(), e);
        }
        for callback in &self.callbacks {
            if let Err(e) = callback.on_event(&event).await {
                warn!("Task callback failed for {}: {}", event.task_id(), e);
            }
        }
    }

    pub async fn cancel(&self, task_id: &str) -> bool {
        self.registry.cancel(task_id).await
    }

    pub fn running_tasks(&self) -> Vec<TaskInfo> {
        self.registry.list()
    }

    /// Kill everything still running. Called once on service shutdown.
    pub async fn shutdown(&self) {
        let cancelled = self.registry.cancel_all().await;
        info!("Task manager shut down, {} running tasks cancelled", cancelled);
    }
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::callback::FunctionCallback;
    use crate::task::registry::TaskHandle;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::mpsc;

    // forwards every event after a delay
    struct SlowCallback {
        delay: Duration,
        sink: mpsc::UnboundedSender<TaskEvent>,
    }

    #[async_trait]
    impl TaskCallback for SlowCallback {
        async fn on_event(&self, event: &TaskEvent) -> anyhow::Result<()> {
            tokio::time::sleep(self.delay).await;
            self.sink.send(event.clone())?;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_notify_reaches_subscribers_and_callbacks() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let mut manager = TaskManager::new();
        manager.register_callback(Arc::new(FunctionCallback::new(move |event: &TaskEvent| {
            sink.lock().unwrap().push(event.clone());
            Ok(())
        })));
        let mut receiver = manager.subscribe();

        manager.notify(TaskEvent::progress("t", 30.0)).await;
        manager.notify(TaskEvent::progress("t", 20.0)).await;

        // relayed as emitted, no reordering or filtering
        assert_eq!(receiver.recv().await.unwrap(), TaskEvent::progress("t", 30.0));
        assert_eq!(receiver.recv().await.unwrap(), TaskEvent::progress("t", 20.0));
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_failing_callback_does_not_stop_others() {
        let seen = Arc::new(Mutex::new(0));
        let sink = seen.clone();

        let mut manager = TaskManager::new();
        manager.register_callback(Arc::new(FunctionCallback::new(|_: &TaskEvent| {
            Err(anyhow::anyhow!("boom"))
        })));
        manager.register_callback(Arc::new(FunctionCallback::new(move |_: &TaskEvent| {
            *sink.lock().unwrap() += 1;
            Ok(())
        })));

        manager.notify(TaskEvent::Cancelled { task_id: "t".into() }).await;
        assert_eq!(*seen.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_empties_registry() {
        let manager = TaskManager::new();
        let (handle, control) = TaskHandle::new("audio/convert", None);
        manager.registry().register("t", handle);
        drop(control);

        manager.shutdown().await;
        assert!(manager.registry().is_empty());
        assert!(!manager.cancel("t").await);
    }

    #[tokio::test]
    async fn test_slow_relay_does_not_block_notify() {
        let manager = TaskManager::new();
        let (sink, mut delivered) = mpsc::unbounded_channel();
        manager.relay(Arc::new(SlowCallback { delay: Duration::from_millis(300), sink }));

        let notified = tokio::time::timeout(Duration::from_millis(100), async {
            manager.notify(TaskEvent::progress("slow", 10.0)).await;
            manager.notify(TaskEvent::progress("slow", 20.0)).await;
        })
        .await;
        assert!(notified.is_ok(), "notify waited on the relayed callback");

        // still delivered, in order
        assert_eq!(delivered.recv().await.unwrap(), TaskEvent::progress("slow", 10.0));
        assert_eq!(delivered.recv().await.unwrap(), TaskEvent::progress("slow", 20.0));
    }

    #[tokio::test]
    async fn test_relay_stops_with_manager() {
        let manager = TaskManager::new();
        let (sink, mut delivered) = mpsc::unbounded_channel();
        manager.relay(Arc::new(SlowCallback { delay: Duration::ZERO, sink }));
        drop(manager);

        let closed = tokio::time::timeout(Duration::from_secs(1), delivered.recv()).await;
        assert_eq!(closed.unwrap(), None);
    }
}
