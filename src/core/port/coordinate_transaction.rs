use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::core::domain::coordinator::{CoordinatorError, TransactionRequest};
use crate::core::domain::global_transaction::TransactionReport;

#[derive(Debug, Clone)]
pub struct CoordinateTransactionInput {
    pub request: TransactionRequest,
    /// Overrides the configured deadline for this attempt.
    pub timeout: Option<Duration>,
}

#[async_trait]
pub trait CoordinateTransactionInputBoundary: Send + Sync {
    async fn execute(
        &self,
        input: CoordinateTransactionInput,
        output_boundary: &mut dyn CoordinateTransactionOutputBoundary,
    ) -> Result<(), CoordinateTransactionError>;
}

#[derive(Debug, Error)]
pub enum CoordinateTransactionError {
    #[error(transparent)]
    CoordinatorError(#[from] CoordinatorError),

    #[error("Failed to process output: {0}")]
    OutputError(#[from] CoordinateTransactionOutputError),
}

pub trait CoordinateTransactionOutputBoundary: Send + Sync {
    fn execute(&mut self, report: TransactionReport) -> Result<(), CoordinateTransactionOutputError>;
}

#[derive(Debug, Error)]
pub enum CoordinateTransactionOutputError {
    #[error("Output already set for transaction {0}")]
    AlreadySet(String),
}
