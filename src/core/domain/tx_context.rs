use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_CLEANUP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Interruption {
    #[error("deadline exceeded")]
    DeadlineExceeded,
    #[error("cancelled")]
    Cancelled,
}

/// Deadline and cancellation governing one orchestration attempt.
///
/// Ordinary adapter calls honor both. Teardown calls (rollbacks issued while
/// aborting) run under their own cleanup budget instead, so an expired or
/// cancelled attempt still resolves the branches it opened.
#[derive(Debug, Clone)]
pub struct TxContext {
    deadline: Option<Instant>,
    cancel: CancellationToken,
    cleanup_timeout: Duration,
}

impl Default for TxContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TxContext {
    pub fn new() -> Self {
        Self {
            deadline: None,
            cancel: CancellationToken::new(),
            cleanup_timeout: DEFAULT_CLEANUP_TIMEOUT,
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new().deadline(Instant::now() + timeout)
    }

    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cleanup_timeout(mut self, timeout: Duration) -> Self {
        self.cleanup_timeout = timeout;
        self
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Why the attempt may no longer issue new work, if it may not.
    pub fn interruption(&self) -> Option<Interruption> {
        if self.cancel.is_cancelled() {
            return Some(Interruption::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(Interruption::DeadlineExceeded),
            _ => None,
        }
    }

    /// Runs `fut` unless the attempt is already over, and abandons it when
    /// the deadline passes or the token is cancelled.
    pub async fn run<F>(&self, fut: F) -> Result<F::Output, Interruption>
    where
        F: Future,
    {
        if let Some(interruption) = self.interruption() {
            return Err(interruption);
        }
        let bounded = async {
            match self.deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, fut)
                    .await
                    .map_err(|_| Interruption::DeadlineExceeded),
                None => Ok(fut.await),
            }
        };
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Interruption::Cancelled),
            result = bounded => result,
        }
    }

    /// Runs a teardown call under the cleanup budget only.
    pub async fn run_cleanup<F>(&self, fut: F) -> Result<F::Output, Interruption>
    where
        F: Future,
    {
        tokio::time::timeout(self.cleanup_timeout, fut)
            .await
            .map_err(|_| Interruption::DeadlineExceeded)
    }
}
