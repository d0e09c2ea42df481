//! Caller-driven cancellation and deadlines for store operations.
//!
//! Every statement is raced against the caller's signal. Dropping the query
//! future aborts it; the connection is then reset by sqlx before reuse.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use ledger_core::StorageError;

/// Deadline and/or explicit cancel flag attached to a call.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    deadline: Option<Instant>,
    canceled: Option<watch::Receiver<bool>>,
}

impl CancelSignal {
    /// No deadline, never canceled.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Cancel as soon as `true` is published on the channel.
    pub fn with_cancel(mut self, canceled: watch::Receiver<bool>) -> Self {
        self.canceled = Some(canceled);
        self
    }

    fn check(&self, operation: &str) -> Result<(), StorageError> {
        if self.canceled.as_ref().is_some_and(|rx| *rx.borrow()) {
            return Err(StorageError::Canceled(operation.to_string()));
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(StorageError::DeadlineExceeded(operation.to_string()));
        }
        Ok(())
    }

    /// Run `fut` unless the signal fires first.
    pub async fn guard<F, T>(&self, operation: &str, fut: F) -> Result<T, StorageError>
    where
        F: Future<Output = T>,
    {
        self.check(operation)?;

        let deadline = self.deadline;
        let canceled = self.canceled.clone();

        tokio::select! {
            biased;
            _ = wait_canceled(canceled) => Err(StorageError::Canceled(operation.to_string())),
            _ = wait_deadline(deadline) => Err(StorageError::DeadlineExceeded(operation.to_string())),
            out = fut => Ok(out),
        }
    }
}

async fn wait_canceled(canceled: Option<watch::Receiver<bool>>) {
    let Some(mut rx) = canceled else {
        return std::future::pending().await;
    };
    let sender_gone = rx.wait_for(|canceled| *canceled).await.is_err();
    if sender_gone {
        std::future::pending::<()>().await;
    }
}

async fn wait_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
