use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// Broadcast-style shutdown flag. Cloning shares the underlying signal.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl ShutdownSignal {
    pub(crate) fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Sends the shutdown signal to every subscriber.
    pub fn send(&self) {
        self.flag.store(true, Ordering::Relaxed);
        self.notify.notify_waiters();
    }

    pub fn should_shutdown(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    pub(crate) async fn wait(&self) {
        while !self.should_shutdown() {
            self.notify.notified().await;
        }
    }
}

/// Held by a running task; tracks liveness for graceful shutdown and lets
/// the task poll or await the signal between suspension points.
pub struct ShutdownGuard {
    signal: ShutdownSignal,
    pending: Arc<AtomicUsize>,
}

impl ShutdownGuard {
    pub(crate) fn new(signal: ShutdownSignal, pending: Arc<AtomicUsize>) -> Self {
        pending.fetch_add(1, Ordering::SeqCst);
        Self { signal, pending }
    }

    /// Check if shutdown signal has been sent.
    pub fn should_shutdown(&self) -> bool {
        self.signal.should_shutdown()
    }

    /// Waits until the shutdown signal is sent.
    pub async fn wait_for_shutdown(&self) {
        self.signal.wait().await
    }
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        self.pending.fetch_sub(1, Ordering::SeqCst);
    }
}
