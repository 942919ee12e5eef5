//! Per-invocation context.

use std::any::Any;
use std::fmt::{self, Debug};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// The context of a single agent run.
///
/// It's passed explicitly to every hook, so hooks never need to look up
/// ambient state. Hosts can attach one value of any type (e.g. the current
/// user profile) and hooks read it back by type.
#[derive(Clone, Default)]
pub struct RunContext {
    data: Option<Arc<dyn Any + Send + Sync>>,
    cancellation: CancellationToken,
}

impl RunContext {
    /// Creates an empty context.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a host-defined value.
    #[inline]
    pub fn with_data<T: Send + Sync + 'static>(mut self, data: T) -> Self {
        self.data = Some(Arc::new(data));
        self
    }

    /// Uses the given token to cancel the run.
    #[inline]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Returns the attached value if it has type `T`.
    #[inline]
    pub fn data<T: 'static>(&self) -> Option<&T> {
        self.data.as_deref()?.downcast_ref()
    }

    /// Returns the cancellation token of this run.
    #[inline]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }
}

impl Debug for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("has_data", &self.data.is_some())
            .field("cancelled", &self.cancellation.is_cancelled())
            .finish()
    }
}
