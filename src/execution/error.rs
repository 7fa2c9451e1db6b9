//! Failure values carried through `set_error`.

use std::io;
use thiserror::Error;

/// Failure reported to receivers.
///
/// Any error raised by leaf work is boxed unchanged, so callers of
/// [`sync_wait`](super::sync_wait) can downcast to the original type.
pub type Error = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for substrate operations that fail outside of a composition.
pub type ExecutionResult<T> = Result<T, ExecutionError>;

/// Failures raised by the substrate itself.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// Leaf work panicked instead of returning an error.
    #[error("operation panicked: {0}")]
    Panicked(String),

    /// The OS refused to spawn a worker thread.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] io::Error),
}

impl ExecutionError {
    /// Builds a [`ExecutionError::Panicked`] from a caught panic payload.
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(message) = payload.downcast_ref::<&str>() {
            (*message).to_string()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            "unknown panic payload".to_string()
        };

        Self::Panicked(message)
    }
}
