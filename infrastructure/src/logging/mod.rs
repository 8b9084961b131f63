//! Logging infrastructure: progress reporting over `tracing`.
//!
//! Provides [`TracingProgress`], which implements the
//! [`ProgressNotifier`](quorum_application::ProgressNotifier) port.

mod progress;

pub use progress::TracingProgress;
