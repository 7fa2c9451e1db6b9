//! Fluent builder for SingleThreadContext construction.
//!
//! Provides a builder pattern interface for configuring the worker thread of a context.

use crate::runtime::SingleThreadContext;

const DEFAULT_NAME: &str = "fanctl-worker";

/// Builder for constructing SingleThreadContext instances with fluent API.
///
/// # Example
/// ```ignore
/// let context = ContextBuilder::new().name("work").stack_size(256 * 1024).build();
/// ```
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    name: String,
    stack_size: Option<usize>,
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextBuilder {
    /// Creates a new builder with the default thread name and the platform stack size.
    pub fn new() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            stack_size: None,
        }
    }

    /// Names the worker thread.
    ///
    /// # Arguments
    /// * `name` - Thread name, also used in log lines about the context
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the stack size of the worker thread in bytes.
    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    /// Builds a stopped context with the current configuration.
    ///
    /// # Returns
    /// A context whose worker is spawned by [`SingleThreadContext::run`]
    pub fn build(self) -> SingleThreadContext {
        SingleThreadContext::with_config(self.name, self.stack_size)
    }
}
