use std::time::Duration;

use async_trait::async_trait;

use crate::core::domain::coordinator::TransactionCoordinator;
use crate::core::domain::tx_context::TxContext;
use crate::core::port::coordinate_transaction::{
    CoordinateTransactionError, CoordinateTransactionInput, CoordinateTransactionInputBoundary,
    CoordinateTransactionOutputBoundary,
};

pub struct CoordinateTransactionUseCase {
    coordinator: TransactionCoordinator,
    timeout: Duration,
    cleanup_timeout: Duration,
}

impl CoordinateTransactionUseCase {
    pub fn new(coordinator: TransactionCoordinator, timeout: Duration, cleanup_timeout: Duration) -> Self {
        Self {
            coordinator,
            timeout,
            cleanup_timeout,
        }
    }
}

#[async_trait]
impl CoordinateTransactionInputBoundary for CoordinateTransactionUseCase {
    async fn execute(
        &self,
        input: CoordinateTransactionInput,
        output_boundary: &mut dyn CoordinateTransactionOutputBoundary,
    ) -> Result<(), CoordinateTransactionError> {
        let ctx = TxContext::with_timeout(input.timeout.unwrap_or(self.timeout))
            .cleanup_timeout(self.cleanup_timeout);
        let report = self.coordinator.execute(input.request, &ctx).await?;

        output_boundary.execute(report)?;

        Ok(())
    }
}
