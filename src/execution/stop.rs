//! Cooperative cancellation flags.
//!
//! A [`StopSource`] owns the flag; [`StopToken`]s are read-only views handed to operations,
//! which poll them at their own safe points. Requests are monotonic: once made they stay made.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Owner of a cancellation flag.
#[derive(Debug, Default)]
pub struct StopSource {
    requested: Arc<AtomicBool>,
}

impl StopSource {
    /// Creates a source with no stop requested.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    ///
    /// # Returns
    /// `true` if this call made the request, `false` if it had already been made
    pub fn request_stop(&self) -> bool {
        !self.requested.swap(true, Ordering::AcqRel)
    }

    /// Reports whether cancellation has been requested.
    pub fn stop_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    /// Returns a token observing this source.
    pub fn token(&self) -> StopToken {
        StopToken {
            requested: Some(self.requested.clone()),
        }
    }
}

/// Read-only view of a [`StopSource`].
///
/// The default token is not associated with any source and can never be stopped.
#[derive(Debug, Clone, Default)]
pub struct StopToken {
    requested: Option<Arc<AtomicBool>>,
}

impl StopToken {
    /// Token for which no stop will ever be requested.
    pub fn never() -> Self {
        Self::default()
    }

    /// `false` when no cancellation can ever be requested through this token.
    pub fn stop_possible(&self) -> bool {
        self.requested.is_some()
    }

    /// Reports whether cancellation has been requested.
    pub fn stop_requested(&self) -> bool {
        self.requested
            .as_ref()
            .is_some_and(|requested| requested.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_token_is_not_stoppable() {
        let token = StopToken::never();

        assert!(!token.stop_possible());
        assert!(!token.stop_requested());
    }

    #[test]
    fn request_is_visible_through_tokens_and_monotonic() {
        let source = StopSource::new();
        let token = source.token();

        assert!(token.stop_possible());
        assert!(!token.stop_requested());

        assert!(source.request_stop());
        assert!(!source.request_stop(), "second request reports no change");

        assert!(token.stop_requested());
        assert!(source.token().stop_requested());
        assert!(source.stop_requested());
    }
}
