// todos/src/context.rs

use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, TodoError};

/// Cancellation and deadline carried through every store call.
///
/// Store operations are synchronous; they poll [`OpContext::check`] on entry and
/// between directory entries while listing, so a cancelled or expired context
/// stops work at the next checkpoint rather than mid-I/O.
#[derive(Clone, Debug, Default)]
pub struct OpContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl OpContext {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self { Self::default() }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self { token: CancellationToken::new(), deadline: Some(deadline) }
    }

    /// Derive a context that is cancelled with its parent but can also be cancelled alone.
    pub fn child(&self) -> Self {
        Self { token: self.token.child_token(), deadline: self.deadline }
    }

    pub fn cancel(&self) { self.token.cancel(); }

    pub fn token(&self) -> &CancellationToken { &self.token }

    pub fn deadline(&self) -> Option<Instant> { self.deadline }

    pub fn is_done(&self) -> bool {
        self.token.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_done() { Err(TodoError::Cancelled) } else { Ok(()) }
    }
}
