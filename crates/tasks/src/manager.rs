use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{FutureExt, TryFutureExt};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::shutdown::{ShutdownGuard, ShutdownSignal};

/// Error carrying the name of a panicked task and the panic payload,
/// downcast to a string where possible.
#[derive(Debug, thiserror::Error)]
pub struct PanickedTaskError {
    task_name: String,
    error: Option<String>,
}

impl fmt::Display for PanickedTaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let task_name = &self.task_name;
        if let Some(error) = &self.error {
            write!(f, "critical task `{task_name}` panicked: `{error}`")
        } else {
            write!(f, "critical task `{task_name}` panicked")
        }
    }
}

impl PanickedTaskError {
    fn new(task_name: &str, error: Box<dyn Any>) -> Self {
        let error = match error.downcast::<String>() {
            Ok(value) => Some(*value),
            Err(error) => error.downcast::<&str>().ok().map(|s| s.to_string()),
        };

        Self {
            task_name: task_name.to_string(),
            error,
        }
    }

    pub fn task_name(&self) -> &str {
        &self.task_name
    }
}

/// Spawns and tracks long running tasks, watches for task panics and
/// manages graceful shutdown on panics and external signals.
pub struct TaskManager {
    tokio_handle: Handle,
    panicked_tasks_tx: mpsc::UnboundedSender<PanickedTaskError>,
    panicked_tasks_rx: mpsc::UnboundedReceiver<PanickedTaskError>,
    shutdown_signal: ShutdownSignal,
    pending_tasks: Arc<AtomicUsize>,
}

impl TaskManager {
    pub fn new(tokio_handle: Handle) -> Self {
        let (panicked_tasks_tx, panicked_tasks_rx) = mpsc::unbounded_channel();
        Self {
            tokio_handle,
            panicked_tasks_tx,
            panicked_tasks_rx,
            shutdown_signal: ShutdownSignal::new(),
            pending_tasks: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn executor(&self) -> TaskExecutor {
        TaskExecutor {
            tokio_handle: self.tokio_handle.clone(),
            panicked_tasks_tx: self.panicked_tasks_tx.clone(),
            shutdown_signal: self.shutdown_signal.clone(),
            pending_tasks: self.pending_tasks.clone(),
        }
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown_signal.clone()
    }

    /// Installs a ctrl-c listener that triggers the shutdown signal.
    pub fn start_signal_listener(&self) {
        let shutdown_signal = self.shutdown_signal();
        self.tokio_handle.spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            warn!("got INT, initiating shutdown");
            shutdown_signal.send();
        });
    }

    /// Blocks until a task panics or the shutdown signal fires, then waits
    /// out the graceful shutdown window. Returns the panic if one happened.
    pub fn monitor(mut self, shutdown_timeout: Option<Duration>) -> Result<(), PanickedTaskError> {
        let signal = self.shutdown_signal.clone();
        let res = self.tokio_handle.block_on(async {
            tokio::select! {
                msg = self.panicked_tasks_rx.recv() => match msg {
                    Some(err) => Err(err),
                    None => Ok(()),
                },
                _ = signal.wait() => Ok(()),
            }
        });

        self.shutdown_signal.send();
        if !self.wait_for_graceful_shutdown(shutdown_timeout) {
            info!("shutdown timeout expired, forcing shutdown");
        }

        res
    }

    fn wait_for_graceful_shutdown(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        while self.pending_tasks.load(Ordering::SeqCst) > 0 {
            if deadline.is_some_and(|d| Instant::now() > d) {
                return false;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        true
    }
}

/// A handle that can spawn new watched tasks.
#[derive(Clone, Debug)]
pub struct TaskExecutor {
    tokio_handle: Handle,
    panicked_tasks_tx: mpsc::UnboundedSender<PanickedTaskError>,
    shutdown_signal: ShutdownSignal,
    pending_tasks: Arc<AtomicUsize>,
}

impl TaskExecutor {
    /// Spawns a future whose panic takes the whole process down. The task
    /// receives a [`ShutdownGuard`] and is expected to exit when it fires.
    pub fn spawn_critical<F>(
        &self,
        name: &'static str,
        async_func: impl FnOnce(ShutdownGuard) -> F,
    ) -> tokio::task::JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let panicked_tasks_tx = self.panicked_tasks_tx.clone();
        let guard = ShutdownGuard::new(self.shutdown_signal.clone(), self.pending_tasks.clone());
        let fut = async_func(guard);

        let task = AssertUnwindSafe(fut)
            .catch_unwind()
            .map_err(move |err| {
                let task_error = PanickedTaskError::new(name, err);
                error!(%name, err = %task_error, "critical task failed");
                let _ = panicked_tasks_tx.send(task_error);
            })
            .map(drop);

        info!(%name, "starting critical task");
        self.tokio_handle.spawn(task)
    }
}
