use serde::{Deserialize, Serialize};

use crate::core::domain::decision_log::Decision;

#[derive(Debug, Default, Serialize, Deserialize, Clone)]
pub struct RecoverTransactionWebInput {
    /// Operator override; without it the decision log is consulted.
    pub decision: Option<Decision>,
}
