//! Long-running task supervision: spawn provider loops, watch for panics,
//! fan a shutdown signal out to all of them.

mod manager;
mod shutdown;

pub use manager::{PanickedTaskError, TaskExecutor, TaskManager};
pub use shutdown::{ShutdownGuard, ShutdownSignal};
