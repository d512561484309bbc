use serde::{Deserialize, Serialize};

use crate::core::domain::branch::{BranchPhase, ResourceManagerKind, TransactionBranch};
use crate::core::domain::global_id::GlobalId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GlobalState {
    Open,
    Active,
    Preparing,
    Prepared,
    Committing,
    Committed,
    Aborting,
    Aborted,
    PartialCommitInconsistency,
}

impl GlobalState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            GlobalState::Committed | GlobalState::Aborted | GlobalState::PartialCommitInconsistency
        )
    }
}

/// How strongly the branches are tied together.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AtomicityLevel {
    /// Prepare every branch before committing any.
    #[default]
    TwoPhase,
    /// Commit each branch directly, in order, with no prepare phase. A later
    /// commit failure leaves earlier branches committed with no repair path.
    BestEffort,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchReport {
    pub branch_id: String,
    pub target: String,
    pub kind: ResourceManagerKind,
    pub phase: BranchPhase,
    pub rows_affected: Vec<u64>,
}

impl From<&TransactionBranch> for BranchReport {
    fn from(branch: &TransactionBranch) -> Self {
        Self {
            branch_id: branch.branch_id().to_string(),
            target: branch.target().to_string(),
            kind: branch.kind(),
            phase: branch.phase(),
            rows_affected: branch.rows_affected().to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Committed,
    /// Every branch rolled back; nothing committed.
    AbortedClean,
    /// Nothing committed, but not every branch ended aborted: some were
    /// never opened or still hold a transaction whose rollback failed.
    AbortedPartial {
        leaked: Vec<String>,
    },
    /// Commit phase broke after at least one commit was issued. Requires a
    /// recovery sweep.
    PartialCommitInconsistency {
        committed: Vec<String>,
        not_committed: Vec<String>,
        in_doubt: Vec<String>,
    },
}

impl Outcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, Outcome::Committed)
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, Outcome::AbortedClean | Outcome::AbortedPartial { .. })
    }
}

/// Result of one orchestration attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReport {
    pub global_id: GlobalId,
    pub atomicity: AtomicityLevel,
    pub state: GlobalState,
    pub outcome: Outcome,
    pub branches: Vec<BranchReport>,
}

impl TransactionReport {
    pub fn phases(&self) -> Vec<BranchPhase> {
        self.branches.iter().map(|b| b.phase).collect()
    }

    /// Rows affected per branch, summed over its statements.
    pub fn row_counts(&self) -> Vec<u64> {
        self.branches
            .iter()
            .map(|b| b.rows_affected.iter().sum())
            .collect()
    }
}
