//! Graceful shutdown coordination.
//!
//! ## Architecture
//!
//! - **`ShutdownHandler` trait**: components implement this for cleanup
//! - **`ShutdownCoordinator`**: broadcasts the stop signal, then runs handlers
//! - **`wait_for_signal()`**: waits for SIGTERM or Ctrl+C
//!
//! Handlers run one after another in registration order, all under a single
//! grace period. Register the tasks that use a resource before the handler
//! that closes it (consumer loop before broker connection).
//!
//! ## Usage
//!
//! ```ignore
//! use billing_queue_runtime::shutdown::*;
//! use std::time::Duration;
//!
//! let mut coordinator = ShutdownCoordinator::new(Duration::from_secs(30));
//! let consumer = OrderConsumer::new(queue.clone(), store, coordinator.subscribe()).spawn();
//!
//! coordinator.register(Arc::new(TaskShutdownHandler::new("consumer", consumer)));
//! coordinator.register(Arc::new(GenericShutdownHandler::new("broker".into(), move || ...)));
//!
//! wait_for_signal().await;
//! coordinator.shutdown().await?;
//! ```

use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// A resource or task that must be released before the process exits.
#[async_trait]
pub trait ShutdownHandler: Send + Sync {
    /// Name used in shutdown logs and error reports.
    fn name(&self) -> &str;

    /// Release the resource, or wait for the task to finish.
    ///
    /// # Errors
    ///
    /// Returns a description of what could not be released.
    async fn shutdown(&self) -> Result<(), String>;
}

/// Stops the consumer loop and HTTP servers, then releases broker and database handles.
///
/// Subscribers see the broadcast first; handlers then run in registration
/// order against one shared deadline. Failures are collected, not short-circuited.
pub struct ShutdownCoordinator {
    handlers: Vec<Arc<dyn ShutdownHandler>>,
    shutdown_tx: broadcast::Sender<()>,
    timeout_duration: Duration,
}

impl ShutdownCoordinator {
    /// Coordinator whose handlers must all finish within `timeout`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(16);

        Self {
            handlers: Vec::new(),
            shutdown_tx,
            timeout_duration: timeout,
        }
    }

    /// Append a handler; it runs after every handler registered before it.
    pub fn register(&mut self, handler: Arc<dyn ShutdownHandler>) {
        info!(component = handler.name(), "Registered shutdown handler");
        self.handlers.push(handler);
    }

    /// Receiver that fires once when [`shutdown`](Self::shutdown) starts.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Broadcast the stop signal, then run every handler in order.
    ///
    /// Handlers still pending when the deadline passes are reported as timed out.
    ///
    /// # Errors
    ///
    /// Returns one `"name: reason"` entry per handler that failed or timed out.
    pub async fn shutdown(&self) -> Result<(), Vec<String>> {
        info!(
            components = self.handlers.len(),
            timeout = ?self.timeout_duration,
            "Initiating graceful shutdown"
        );

        if let Err(e) = self.shutdown_tx.send(()) {
            warn!("No active shutdown signal receivers: {}", e);
        }

        let deadline = Instant::now() + self.timeout_duration;
        let mut errors = Vec::new();

        for handler in &self.handlers {
            let name = handler.name();
            info!(component = name, "Shutting down component");

            match tokio::time::timeout_at(deadline, handler.shutdown()).await {
                Ok(Ok(())) => info!(component = name, "Component shut down"),
                Ok(Err(e)) => {
                    error!(component = name, error = %e, "Component shutdown failed");
                    errors.push(format!("{name}: {e}"));
                }
                Err(_) => {
                    error!(component = name, "Component shutdown timed out");
                    errors.push(format!("{name}: timeout after {:?}", self.timeout_duration));
                }
            }
        }

        if errors.is_empty() {
            info!("All components shut down successfully");
            Ok(())
        } else {
            error!(errors = errors.len(), "Shutdown completed with errors");
            Err(errors)
        }
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

type ShutdownFn = dyn Fn() -> Pin<Box<dyn Future<Output = Result<(), String>> + Send>> + Send + Sync;

/// Generic shutdown handler using closures
///
/// # Example
///
/// ```ignore
/// let handler = GenericShutdownHandler::new("orders-db".into(), move || {
///     let store = store.clone();
///     async move { store.close().await; Ok(()) }
/// });
/// ```
pub struct GenericShutdownHandler {
    name: String,
    on_shutdown: Arc<ShutdownFn>,
}

impl GenericShutdownHandler {
    /// Create new generic shutdown handler
    pub fn new<F, Fut>(name: String, on_shutdown: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        Self {
            name,
            on_shutdown: Arc::new(move || Box::pin(on_shutdown())),
        }
    }
}

#[async_trait]
impl ShutdownHandler for GenericShutdownHandler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn shutdown(&self) -> Result<(), String> {
        (self.on_shutdown)().await
    }
}

/// Waits for a background task that stops on the broadcast signal.
pub struct TaskShutdownHandler {
    name: String,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TaskShutdownHandler {
    /// Wrap a spawned task.
    #[must_use]
    pub fn new(name: impl Into<String>, handle: JoinHandle<()>) -> Self {
        Self {
            name: name.into(),
            handle: Mutex::new(Some(handle)),
        }
    }
}

#[async_trait]
impl ShutdownHandler for TaskShutdownHandler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn shutdown(&self) -> Result<(), String> {
        let Some(handle) = self.handle.lock().await.take() else {
            return Ok(());
        };
        handle.await.map_err(|e| format!("task failed: {e}"))
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
pub async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C"),
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to register SIGTERM handler, waiting for Ctrl+C only");
                wait_for_ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        wait_for_ctrl_c().await;
    }
}

async fn wait_for_ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C"),
        Err(e) => {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct MockShutdownHandler {
        name: String,
        should_fail: bool,
        delay: Option<Duration>,
        log: Arc<std::sync::Mutex<Vec<String>>>,
        shutdown_called: Arc<AtomicBool>,
    }

    impl MockShutdownHandler {
        fn new(name: impl Into<String>, should_fail: bool, log: &Arc<std::sync::Mutex<Vec<String>>>) -> Self {
            Self {
                name: name.into(),
                should_fail,
                delay: None,
                log: Arc::clone(log),
                shutdown_called: Arc::new(AtomicBool::new(false)),
            }
        }

        fn was_called(&self) -> bool {
            self.shutdown_called.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ShutdownHandler for MockShutdownHandler {
        fn name(&self) -> &str {
            &self.name
        }

        async fn shutdown(&self) -> Result<(), String> {
            self.shutdown_called.store(true, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.log.lock().unwrap().push(self.name.clone());

            if self.should_fail {
                Err("Simulated failure".to_string())
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_handlers_run_in_registration_order() {
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let consumer = Arc::new(MockShutdownHandler::new("consumer", false, &log));
        let broker = Arc::new(MockShutdownHandler::new("broker", false, &log));

        let mut coordinator = ShutdownCoordinator::new(Duration::from_secs(5));
        coordinator.register(consumer.clone());
        coordinator.register(broker.clone());
        assert_eq!(coordinator.handler_count(), 2);

        assert!(coordinator.shutdown().await.is_ok());
        assert!(consumer.was_called());
        assert!(broker.was_called());
        assert_eq!(*log.lock().unwrap(), vec!["consumer", "broker"]);
    }

    #[tokio::test]
    async fn test_one_failure_is_reported_and_others_still_run() {
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut coordinator = ShutdownCoordinator::new(Duration::from_secs(5));
        coordinator.register(Arc::new(MockShutdownHandler::new("consumer", true, &log)));
        coordinator.register(Arc::new(MockShutdownHandler::new("broker", false, &log)));

        let errors = coordinator.shutdown().await.unwrap_err();

        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("consumer"));
        assert_eq!(log.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_grace_period_is_shared() {
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut slow = MockShutdownHandler::new("slow", false, &log);
        slow.delay = Some(Duration::from_secs(60));

        let mut coordinator = ShutdownCoordinator::new(Duration::from_secs(30));
        coordinator.register(Arc::new(slow));

        let errors = coordinator.shutdown().await.unwrap_err();
        assert!(errors[0].contains("timeout"));
    }

    #[tokio::test]
    async fn test_broadcast_stops_task_before_handler_awaits_it() {
        let mut coordinator = ShutdownCoordinator::new(Duration::from_secs(5));
        let mut rx = coordinator.subscribe();
        let stopped = Arc::new(AtomicBool::new(false));
        let stopped_clone = Arc::clone(&stopped);

        let task = tokio::spawn(async move {
            rx.recv().await.ok();
            stopped_clone.store(true, Ordering::SeqCst);
        });
        coordinator.register(Arc::new(TaskShutdownHandler::new("task", task)));

        assert!(coordinator.shutdown().await.is_ok());
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_generic_shutdown_handler() {
        let called = Arc::new(AtomicBool::new(false));
        let called_clone = Arc::clone(&called);

        let handler = GenericShutdownHandler::new("test".to_string(), move || {
            let called = Arc::clone(&called_clone);
            async move {
                called.store(true, Ordering::SeqCst);
                Ok(())
            }
        });

        assert!(handler.shutdown().await.is_ok());
        assert!(called.load(Ordering::SeqCst));

        let failing =
            GenericShutdownHandler::new("test".to_string(), || async { Err("Test error".to_string()) });
        assert_eq!(failing.shutdown().await.unwrap_err(), "Test error");
    }
}
