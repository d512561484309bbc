use std::time::Duration;

use async_trait::async_trait;

use crate::core::domain::recovery::RecoverySweeper;
use crate::core::domain::tx_context::TxContext;
use crate::core::port::recover_transaction::{
    RecoverInput, RecoverTransactionError, RecoverTransactionInputBoundary,
    RecoverTransactionOutputBoundary, UnvalidatedRecoverInput,
};

pub struct RecoverTransactionUseCase {
    sweeper: RecoverySweeper,
    timeout: Duration,
}

impl RecoverTransactionUseCase {
    pub fn new(sweeper: RecoverySweeper, timeout: Duration) -> Self {
        Self { sweeper, timeout }
    }
}

#[async_trait]
impl RecoverTransactionInputBoundary for RecoverTransactionUseCase {
    async fn execute(
        &self,
        input: UnvalidatedRecoverInput,
        output_boundary: &mut dyn RecoverTransactionOutputBoundary,
    ) -> Result<(), RecoverTransactionError> {
        let input = RecoverInput::try_from(input)?;
        let ctx = TxContext::with_timeout(self.timeout);
        let report = self
            .sweeper
            .sweep(&input.global_id, input.decision, &ctx)
            .await?;

        output_boundary.execute(report)?;

        Ok(())
    }
}
