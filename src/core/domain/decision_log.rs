use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::core::domain::global_id::GlobalId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Commit,
    Abort,
}

#[derive(Debug, Error)]
pub enum DecisionLogError {
    #[error("Decision log I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed decision log entry: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Durable record of what the coordinator decided for each global
/// transaction. Recovery consults it to resolve orphaned prepared branches.
#[async_trait]
pub trait DecisionLog: Send + Sync {
    async fn record(&self, global_id: &GlobalId, decision: Decision) -> Result<(), DecisionLogError>;

    /// The latest decision recorded for `global_id`.
    async fn decision(&self, global_id: &GlobalId) -> Result<Option<Decision>, DecisionLogError>;
}

#[derive(Debug, Default)]
pub struct InMemoryDecisionLog {
    entries: RwLock<HashMap<GlobalId, Decision>>,
}

impl InMemoryDecisionLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DecisionLog for InMemoryDecisionLog {
    async fn record(&self, global_id: &GlobalId, decision: Decision) -> Result<(), DecisionLogError> {
        self.entries.write().await.insert(global_id.clone(), decision);
        Ok(())
    }

    async fn decision(&self, global_id: &GlobalId) -> Result<Option<Decision>, DecisionLogError> {
        Ok(self.entries.read().await.get(global_id).copied())
    }
}
