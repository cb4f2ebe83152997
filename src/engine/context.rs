//! Per-call deadline and cancellation
//!
//! A `CallContext` travels with every engine call. The connection provider races
//! the connect step and the database work against the deadline and the caller's
//! cancel signal; whichever fires first wins.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::{GatewayError, Result};

/// Caller-side handle that trips a `CancelSignal`
#[derive(Debug, Clone)]
pub struct CancelHandle {
    sender: Arc<watch::Sender<bool>>,
}

/// Receiver side of a cancellation pair, cheap to clone
#[derive(Debug, Clone)]
pub struct CancelSignal {
    receiver: watch::Receiver<bool>,
}

impl CancelHandle {
    /// Create a linked handle/signal pair
    #[must_use]
    pub fn new() -> (Self, CancelSignal) {
        let (sender, receiver) = watch::channel(false);
        (Self { sender: Arc::new(sender) }, CancelSignal { receiver })
    }

    /// Trip the signal. Idempotent.
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }
}

impl CancelSignal {
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolve once the signal is tripped
    ///
    /// Never resolves if the handle is dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        let sender_gone = receiver.wait_for(|&cancelled| cancelled).await.is_err();
        if sender_gone {
            std::future::pending::<()>().await;
        }
    }
}

/// Deadline and cancellation scope for one gateway call
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    deadline: Option<Duration>,
    cancel: Option<CancelSignal>,
}

impl CallContext {
    /// No deadline, no cancellation
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// `None` disables the deadline
    #[must_use]
    pub fn with_optional_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, signal: CancelSignal) -> Self {
        self.cancel = Some(signal);
        self
    }

    #[must_use]
    pub const fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelSignal::is_cancelled)
    }

    /// Run `work`, failing with `Timeout` once `started + deadline` passes or
    /// with `Cancelled` once the signal trips
    ///
    /// The deadline is measured from `started` so that the connect step and the
    /// statement share one budget.
    pub async fn guard<T, F>(&self, started: Instant, work: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.is_cancelled() {
            return Err(GatewayError::Cancelled);
        }

        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(started + deadline).await,
                None => std::future::pending::<()>().await,
            }
        };
        let cancelled = async {
            match &self.cancel {
                Some(signal) => signal.cancelled().await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            outcome = work => outcome,
            () = expired => Err(GatewayError::Timeout(self.deadline.unwrap_or_default())),
            () = cancelled => Err(GatewayError::Cancelled),
        }
    }
}
