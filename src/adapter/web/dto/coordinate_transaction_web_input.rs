use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::core::domain::branch::BranchDescriptor;
use crate::core::domain::coordinator::TransactionRequest;
use crate::core::domain::global_id::{GlobalId, GlobalIdError};
use crate::core::domain::global_transaction::AtomicityLevel;
use crate::core::port::coordinate_transaction::CoordinateTransactionInput;

impl TryFrom<CoordinateTransactionWebInput> for CoordinateTransactionInput {
    type Error = GlobalIdError;

    fn try_from(value: CoordinateTransactionWebInput) -> Result<Self, Self::Error> {
        let global_id = value.global_id.map(GlobalId::parse).transpose()?;
        Ok(Self {
            request: TransactionRequest {
                global_id,
                atomicity: value.atomicity.unwrap_or_default(),
                branches: value.branches,
            },
            timeout: value.timeout_ms.map(Duration::from_millis),
        })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CoordinateTransactionWebInput {
    pub global_id: Option<String>,
    pub atomicity: Option<AtomicityLevel>,
    pub timeout_ms: Option<u64>,
    pub branches: Vec<BranchDescriptor>,
}
