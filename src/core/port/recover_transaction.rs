use async_trait::async_trait;
use thiserror::Error;

use crate::core::domain::decision_log::Decision;
use crate::core::domain::global_id::{GlobalId, GlobalIdError};
use crate::core::domain::recovery::{SweepError, SweepReport};

#[derive(Debug, Clone)]
pub struct UnvalidatedRecoverInput {
    pub global_id: String,
    pub decision: Option<Decision>,
}

#[derive(Debug, Clone)]
pub struct RecoverInput {
    pub global_id: GlobalId,
    pub decision: Option<Decision>,
}

impl TryFrom<UnvalidatedRecoverInput> for RecoverInput {
    type Error = GlobalIdError;

    fn try_from(value: UnvalidatedRecoverInput) -> Result<Self, Self::Error> {
        Ok(RecoverInput {
            global_id: GlobalId::parse(value.global_id)?,
            decision: value.decision,
        })
    }
}

#[async_trait]
pub trait RecoverTransactionInputBoundary: Send + Sync {
    async fn execute(
        &self,
        input: UnvalidatedRecoverInput,
        output_boundary: &mut dyn RecoverTransactionOutputBoundary,
    ) -> Result<(), RecoverTransactionError>;
}

#[derive(Debug, Error)]
pub enum RecoverTransactionError {
    #[error(transparent)]
    ValidationError(#[from] GlobalIdError),

    #[error(transparent)]
    SweepError(#[from] SweepError),

    #[error("Failed to process output: {0}")]
    OutputError(#[from] RecoverTransactionOutputError),
}

pub trait RecoverTransactionOutputBoundary: Send + Sync {
    fn execute(&mut self, report: SweepReport) -> Result<(), RecoverTransactionOutputError>;
}

#[derive(Debug, Error)]
pub enum RecoverTransactionOutputError {
    #[error("Output already set for transaction {0}")]
    AlreadySet(String),
}
