use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::domain::statement::Statement;
use crate::core::domain::transaction::{BranchHandle, ResourceManager};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceManagerKind {
    /// `PREPARE TRANSACTION` / `COMMIT PREPARED` dialect (Postgres).
    #[serde(rename = "standard_sql_2pc")]
    StandardSql2pc,
    /// `XA BEGIN` / `XA PREPARE` / `XA COMMIT` dialect (MySQL).
    Xa,
    Other,
}

impl fmt::Display for ResourceManagerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceManagerKind::StandardSql2pc => f.write_str("standard_sql_2pc"),
            ResourceManagerKind::Xa => f.write_str("xa"),
            ResourceManagerKind::Other => f.write_str("other"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchPhase {
    Inactive,
    Active,
    Prepared,
    Committed,
    Aborted,
}

impl BranchPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, BranchPhase::Committed | BranchPhase::Aborted)
    }

    /// Phases only move forward: Inactive -> Active -> Prepared ->
    /// {Committed | Aborted}, with Active -> {Committed | Aborted} allowed
    /// for branches that never prepare.
    pub fn can_transition_to(self, next: BranchPhase) -> bool {
        use BranchPhase::*;
        matches!(
            (self, next),
            (Inactive, Active)
                | (Active, Prepared)
                | (Active, Aborted)
                | (Active, Committed)
                | (Prepared, Committed)
                | (Prepared, Aborted)
        )
    }
}

/// Caller-supplied description of one branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchDescriptor {
    pub kind: ResourceManagerKind,
    /// Name of a registered connection target.
    pub target: String,
    #[serde(default)]
    pub statements: Vec<Statement>,
}

impl BranchDescriptor {
    pub fn new(kind: ResourceManagerKind, target: impl Into<String>) -> Self {
        Self {
            kind,
            target: target.into(),
            statements: Vec::new(),
        }
    }

    pub fn with_statement(mut self, statement: Statement) -> Self {
        self.statements.push(statement);
        self
    }
}

/// Runtime state of one resource manager's participation in a global
/// transaction. The handle is owned exclusively by the branch from Begin
/// until the branch is released.
pub struct TransactionBranch {
    pub(crate) branch_id: String,
    pub(crate) target: String,
    pub(crate) kind: ResourceManagerKind,
    pub(crate) phase: BranchPhase,
    pub(crate) rows_affected: Vec<u64>,
    pub(crate) resource_manager: Arc<dyn ResourceManager>,
    pub(crate) handle: Option<Box<dyn BranchHandle>>,
}

impl TransactionBranch {
    pub(crate) fn new(
        branch_id: String,
        target: String,
        kind: ResourceManagerKind,
        resource_manager: Arc<dyn ResourceManager>,
    ) -> Self {
        Self {
            branch_id,
            target,
            kind,
            phase: BranchPhase::Inactive,
            rows_affected: Vec::new(),
            resource_manager,
            handle: None,
        }
    }

    pub fn branch_id(&self) -> &str {
        &self.branch_id
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn kind(&self) -> ResourceManagerKind {
        self.kind
    }

    pub fn phase(&self) -> BranchPhase {
        self.phase
    }

    pub fn rows_affected(&self) -> &[u64] {
        &self.rows_affected
    }

    /// Moves the branch forward. Illegal moves are ignored and reported so a
    /// terminal branch can never be reopened.
    pub(crate) fn advance(&mut self, next: BranchPhase) -> bool {
        if self.phase.can_transition_to(next) {
            self.phase = next;
            true
        } else {
            tracing::warn!(
                branch_id = %self.branch_id,
                from = ?self.phase,
                to = ?next,
                "Ignoring illegal branch phase transition"
            );
            false
        }
    }
}

impl fmt::Debug for TransactionBranch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionBranch")
            .field("branch_id", &self.branch_id)
            .field("target", &self.target)
            .field("kind", &self.kind)
            .field("phase", &self.phase)
            .field("rows_affected", &self.rows_affected)
            .field("open_handle", &self.handle.is_some())
            .finish()
    }
}
