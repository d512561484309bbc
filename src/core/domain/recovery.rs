use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::core::domain::branch::ResourceManagerKind;
use crate::core::domain::decision_log::{Decision, DecisionLog, DecisionLogError};
use crate::core::domain::global_id::GlobalId;
use crate::core::domain::registry::ResourceManagerRegistry;
use crate::core::domain::transaction::{Operation, ResourceManager, TransactionError};
use crate::core::domain::tx_context::TxContext;

#[derive(Debug, Error)]
pub enum SweepError {
    #[error(transparent)]
    DecisionLog(#[from] DecisionLogError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "resolution", rename_all = "snake_case")]
pub enum Resolution {
    /// No prepared transaction with this id on the target.
    NothingPrepared,
    Committed,
    RolledBack,
    /// Listed as prepared but gone by the time it was resolved.
    AlreadyResolved,
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSweep {
    pub target: String,
    pub kind: ResourceManagerKind,
    #[serde(flatten)]
    pub resolution: Resolution,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub global_id: GlobalId,
    pub decision: Decision,
    pub targets: Vec<TargetSweep>,
}

impl SweepReport {
    /// True when no target still holds an unresolved prepared transaction.
    pub fn is_resolved(&self) -> bool {
        !self
            .targets
            .iter()
            .any(|t| matches!(t.resolution, Resolution::Failed { .. }))
    }
}

/// Resolves prepared transactions left behind by a crashed coordinator or a
/// partial commit. The decision comes from the operator, else the decision
/// log, else abort is presumed.
#[derive(Clone)]
pub struct RecoverySweeper {
    registry: Arc<ResourceManagerRegistry>,
    decision_log: Option<Arc<dyn DecisionLog>>,
}

impl RecoverySweeper {
    pub fn new(registry: Arc<ResourceManagerRegistry>) -> Self {
        Self {
            registry,
            decision_log: None,
        }
    }

    pub fn with_decision_log(mut self, decision_log: Arc<dyn DecisionLog>) -> Self {
        self.decision_log = Some(decision_log);
        self
    }

    async fn resolve_decision(
        &self,
        global_id: &GlobalId,
        operator: Option<Decision>,
    ) -> Result<Decision, SweepError> {
        let Some(log) = &self.decision_log else {
            return Ok(operator.unwrap_or(Decision::Abort));
        };
        match operator {
            Some(decision) => {
                log.record(global_id, decision).await?;
                Ok(decision)
            }
            None => Ok(log.decision(global_id).await?.unwrap_or(Decision::Abort)),
        }
    }

    /// Sweeps every registered target for prepared transactions named
    /// `global_id`. Running it again after a successful pass finds nothing.
    pub async fn sweep(
        &self,
        global_id: &GlobalId,
        operator: Option<Decision>,
        ctx: &TxContext,
    ) -> Result<SweepReport, SweepError> {
        let decision = self.resolve_decision(global_id, operator).await?;
        info!(global_id = %global_id, ?decision, "Sweeping prepared transactions");

        let mut targets = Vec::new();
        for (target, resource_manager) in self.registry.iter() {
            let resolution = sweep_target(resource_manager.as_ref(), global_id, decision, ctx).await;
            match &resolution {
                Resolution::Failed { error } => {
                    warn!(global_id = %global_id, resource = target, "Sweep failed: {error}")
                }
                Resolution::NothingPrepared => {}
                other => info!(global_id = %global_id, resource = target, resolution = ?other, "Prepared transaction resolved"),
            }
            targets.push(TargetSweep {
                target: target.to_string(),
                kind: resource_manager.kind(),
                resolution,
            });
        }

        Ok(SweepReport {
            global_id: global_id.clone(),
            decision,
            targets,
        })
    }
}

async fn sweep_target(
    resource_manager: &dyn ResourceManager,
    global_id: &GlobalId,
    decision: Decision,
    ctx: &TxContext,
) -> Resolution {
    let prepared = match ctx.run(resource_manager.recover()).await {
        Ok(Ok(prepared)) => prepared,
        Ok(Err(e)) => return Resolution::Failed { error: e.to_string() },
        Err(interruption) => {
            let e = TransactionError::for_operation(Operation::Recover, interruption.to_string());
            return Resolution::Failed { error: e.to_string() };
        }
    };
    if !prepared.iter().any(|id| id == global_id.as_str()) {
        return Resolution::NothingPrepared;
    }

    let (operation, result) = match decision {
        Decision::Commit => (
            Operation::Commit,
            ctx.run(resource_manager.commit_prepared(global_id)).await,
        ),
        Decision::Abort => (
            Operation::Rollback,
            ctx.run(resource_manager.rollback_prepared(global_id)).await,
        ),
    };
    match result {
        Ok(Ok(())) if decision == Decision::Commit => Resolution::Committed,
        Ok(Ok(())) => Resolution::RolledBack,
        Ok(Err(TransactionError::BranchNotFound(_))) => Resolution::AlreadyResolved,
        Ok(Err(e)) => Resolution::Failed { error: e.to_string() },
        Err(interruption) => Resolution::Failed {
            error: TransactionError::for_operation(operation, interruption.to_string()).to_string(),
        },
    }
}
