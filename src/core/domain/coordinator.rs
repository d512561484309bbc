use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::core::domain::branch::{BranchDescriptor, BranchPhase, TransactionBranch};
use crate::core::domain::decision_log::{Decision, DecisionLog, DecisionLogError};
use crate::core::domain::global_id::{GlobalId, GlobalIdError};
use crate::core::domain::global_transaction::{
    AtomicityLevel, BranchReport, GlobalState, Outcome, TransactionReport,
};
use crate::core::domain::registry::ResourceManagerRegistry;
use crate::core::domain::statement::Statement;
use crate::core::domain::transaction::{BranchHandle, Operation, TransactionError};
use crate::core::domain::tx_context::{Interruption, TxContext};

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("Transaction request has no branches")]
    NoBranches,

    #[error("Unknown connection target: {0}")]
    UnknownTarget(String),

    #[error("Branch {index} declares kind {declared} but target {target} is {actual}")]
    KindMismatch {
        index: usize,
        target: String,
        declared: String,
        actual: String,
    },

    #[error("Branch index {0} is out of range")]
    NoSuchBranch(usize),

    #[error("Cannot {operation} while global transaction is {state:?}")]
    InvalidState {
        operation: &'static str,
        state: GlobalState,
    },

    #[error("Cannot {operation} with atomicity {atomicity:?}")]
    WrongAtomicity {
        operation: &'static str,
        atomicity: AtomicityLevel,
    },

    #[error(transparent)]
    InvalidGlobalId(#[from] GlobalIdError),

    #[error("Global transaction id {0} already has a recorded decision")]
    DuplicateGlobalId(GlobalId),

    #[error(transparent)]
    DecisionLog(#[from] DecisionLogError),

    #[error("Global transaction {global_id} aborted: {source}")]
    Aborted {
        global_id: GlobalId,
        #[source]
        source: TransactionError,
    },

    #[error(
        "Global transaction {global_id} partially committed (committed: {committed:?}, not committed: {not_committed:?})"
    )]
    PartialCommitInconsistency {
        global_id: GlobalId,
        committed: Vec<String>,
        not_committed: Vec<String>,
    },
}

impl CoordinatorError {
    /// Whether the error is a protocol outcome rather than a rejected
    /// request.
    pub fn is_outcome(&self) -> bool {
        matches!(
            self,
            CoordinatorError::Aborted { .. } | CoordinatorError::PartialCommitInconsistency { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRequest {
    #[serde(default)]
    pub global_id: Option<GlobalId>,
    #[serde(default)]
    pub atomicity: AtomicityLevel,
    pub branches: Vec<BranchDescriptor>,
}

impl TransactionRequest {
    pub fn new(branches: Vec<BranchDescriptor>) -> Self {
        Self {
            global_id: None,
            atomicity: AtomicityLevel::default(),
            branches,
        }
    }

    pub fn global_id(mut self, global_id: GlobalId) -> Self {
        self.global_id = Some(global_id);
        self
    }

    pub fn atomicity(mut self, atomicity: AtomicityLevel) -> Self {
        self.atomicity = atomicity;
        self
    }
}

/// Drives global transactions across the registered resource managers.
#[derive(Clone)]
pub struct TransactionCoordinator {
    registry: Arc<ResourceManagerRegistry>,
    decision_log: Option<Arc<dyn DecisionLog>>,
}

impl TransactionCoordinator {
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

    pub fn registry(&self) -> &Arc<ResourceManagerRegistry> {
        &self.registry
    }

    /// Validates `request` and lays out its branches. No connection is
    /// opened until [`GlobalTransaction::begin`].
    pub async fn open(&self, request: TransactionRequest) -> Result<GlobalTransaction, CoordinatorError> {
        if request.branches.is_empty() {
            return Err(CoordinatorError::NoBranches);
        }
        let global_id = match request.global_id {
            Some(global_id) => {
                self.ensure_unused(&global_id).await?;
                global_id
            }
            None => GlobalId::generate(),
        };

        let mut branches = Vec::with_capacity(request.branches.len());
        let mut work = Vec::with_capacity(request.branches.len());
        for (index, descriptor) in request.branches.into_iter().enumerate() {
            let resource_manager = self
                .registry
                .get(&descriptor.target)
                .ok_or_else(|| CoordinatorError::UnknownTarget(descriptor.target.clone()))?;
            if resource_manager.kind() != descriptor.kind {
                return Err(CoordinatorError::KindMismatch {
                    index,
                    target: descriptor.target,
                    declared: descriptor.kind.to_string(),
                    actual: resource_manager.kind().to_string(),
                });
            }
            branches.push(TransactionBranch::new(
                global_id.branch_id(index),
                descriptor.target,
                descriptor.kind,
                resource_manager.clone(),
            ));
            work.push(descriptor.statements);
        }

        Ok(GlobalTransaction {
            global_id,
            atomicity: request.atomicity,
            state: GlobalState::Open,
            branches,
            work,
            in_doubt: Vec::new(),
            commit_sent: Vec::new(),
            commit_recorded: false,
            decision_log: self.decision_log.clone(),
        })
    }

    /// A global id names exactly one attempt. An id with a decision on
    /// record belongs to an earlier attempt, possibly still awaiting
    /// recovery.
    async fn ensure_unused(&self, global_id: &GlobalId) -> Result<(), CoordinatorError> {
        let Some(log) = &self.decision_log else {
            return Ok(());
        };
        match log.decision(global_id).await? {
            Some(decision) => {
                warn!(global_id = %global_id, ?decision, "Rejecting reused global id");
                Err(CoordinatorError::DuplicateGlobalId(global_id.clone()))
            }
            None => Ok(()),
        }
    }

    /// Runs a whole attempt and reports how it ended. Only rejected requests
    /// surface as errors; aborts and partial commits are outcomes.
    pub async fn execute(
        &self,
        request: TransactionRequest,
        ctx: &TxContext,
    ) -> Result<TransactionReport, CoordinatorError> {
        let mut transaction = self.open(request).await?;
        match transaction.drive(ctx).await {
            Ok(()) => {}
            Err(e) if e.is_outcome() => debug!(global_id = %transaction.global_id, "{e}"),
            Err(e) => return Err(e),
        }
        transaction.report().ok_or(CoordinatorError::InvalidState {
            operation: "report",
            state: transaction.state,
        })
    }
}

/// One global transaction in flight.
pub struct GlobalTransaction {
    global_id: GlobalId,
    atomicity: AtomicityLevel,
    state: GlobalState,
    branches: Vec<TransactionBranch>,
    work: Vec<Vec<Statement>>,
    in_doubt: Vec<usize>,
    /// Branches a commit was sent to, whatever the reply.
    commit_sent: Vec<usize>,
    /// This attempt wrote the Commit decision itself.
    commit_recorded: bool,
    decision_log: Option<Arc<dyn DecisionLog>>,
}

impl GlobalTransaction {
    pub fn global_id(&self) -> &GlobalId {
        &self.global_id
    }

    pub fn atomicity(&self) -> AtomicityLevel {
        self.atomicity
    }

    pub fn state(&self) -> GlobalState {
        self.state
    }

    pub fn branches(&self) -> &[TransactionBranch] {
        &self.branches
    }

    /// Runs every phase with the statements given at open time.
    pub async fn drive(&mut self, ctx: &TxContext) -> Result<(), CoordinatorError> {
        self.begin(ctx).await?;
        for index in 0..self.branches.len() {
            let statements = std::mem::take(&mut self.work[index]);
            self.run_branch_work(index, &statements, ctx).await?;
        }
        match self.atomicity {
            AtomicityLevel::TwoPhase => {
                self.prepare_all(ctx).await?;
                self.commit_all(ctx).await
            }
            AtomicityLevel::BestEffort => self.commit_each(ctx).await,
        }
    }

    /// Opens one branch per descriptor, in order. The first connection
    /// failure rolls back the branches already opened.
    pub async fn begin(&mut self, ctx: &TxContext) -> Result<(), CoordinatorError> {
        self.expect_state("begin", GlobalState::Open)?;
        info!(global_id = %self.global_id, branches = self.branches.len(), atomicity = ?self.atomicity, "Beginning global transaction");

        for index in 0..self.branches.len() {
            let branch = &mut self.branches[index];
            let resource_manager = branch.resource_manager.clone();
            match ctx.run(resource_manager.begin(&self.global_id)).await {
                Ok(Ok(handle)) => {
                    branch.handle = Some(handle);
                    branch.advance(BranchPhase::Active);
                    debug!(global_id = %self.global_id, branch_id = %branch.branch_id, kind = %branch.kind, "Branch opened");
                }
                Ok(Err(e)) => return Err(self.abort(ctx, e).await),
                Err(interruption) => {
                    let cause = interrupted(Operation::Begin, interruption);
                    return Err(self.abort(ctx, cause).await);
                }
            }
        }
        self.state = GlobalState::Active;
        Ok(())
    }

    /// Executes branch-local statements on an active branch and returns the
    /// rows each affected. Any failure aborts every branch.
    pub async fn run_branch_work(
        &mut self,
        index: usize,
        statements: &[Statement],
        ctx: &TxContext,
    ) -> Result<Vec<u64>, CoordinatorError> {
        self.expect_state("run branch work", GlobalState::Active)?;
        if index >= self.branches.len() {
            return Err(CoordinatorError::NoSuchBranch(index));
        }

        let mut counts = Vec::with_capacity(statements.len());
        for statement in statements {
            let branch = &mut self.branches[index];
            let Some(handle) = branch.handle.as_mut() else {
                return Err(CoordinatorError::InvalidState {
                    operation: "run branch work",
                    state: self.state,
                });
            };
            let result = match ctx.run(handle.execute(statement)).await {
                Ok(result) => result,
                Err(interruption) => Err(interrupted(Operation::Execute, interruption)),
            };
            match result {
                Ok(rows) => {
                    info!(global_id = %self.global_id, branch_id = %branch.branch_id, rows_affected = rows, "Statement executed");
                    branch.rows_affected.push(rows);
                    counts.push(rows);
                }
                Err(e) => return Err(self.abort(ctx, e).await),
            }
        }
        Ok(counts)
    }

    /// Phase one. Prepares every branch in order; the first failure rolls
    /// back every branch, the failing one included.
    pub async fn prepare_all(&mut self, ctx: &TxContext) -> Result<(), CoordinatorError> {
        self.expect_state("prepare", GlobalState::Active)?;
        self.expect_atomicity("prepare", AtomicityLevel::TwoPhase)?;
        self.state = GlobalState::Preparing;

        for index in 0..self.branches.len() {
            let branch = &mut self.branches[index];
            let Some(handle) = branch.handle.as_mut() else {
                continue;
            };
            let result = match ctx.run(handle.prepare(&self.global_id)).await {
                Ok(result) => result,
                Err(interruption) => Err(interrupted(Operation::Prepare, interruption)),
            };
            match result {
                Ok(()) => {
                    branch.advance(BranchPhase::Prepared);
                    info!(global_id = %self.global_id, branch_id = %branch.branch_id, "Branch prepared");
                }
                Err(e) => return Err(self.abort(ctx, e).await),
            }
        }
        self.state = GlobalState::Prepared;
        Ok(())
    }

    /// Phase two. Records the commit decision, then commits every prepared
    /// branch in order. A failure after the first commit is reported as a
    /// partial commit and never retried.
    pub async fn commit_all(&mut self, ctx: &TxContext) -> Result<(), CoordinatorError> {
        self.expect_state("commit", GlobalState::Prepared)?;

        if let Some(interruption) = ctx.interruption() {
            return Err(self.abort(ctx, interrupted(Operation::Commit, interruption)).await);
        }
        if let Err(e) = self.record_decision(Decision::Commit).await {
            let cause = TransactionError::CommitError(format!("failed to record commit decision: {e}"));
            return Err(self.abort(ctx, cause).await);
        }
        self.commit_recorded = true;
        self.state = GlobalState::Committing;
        self.commit_branches(ctx, true).await
    }

    /// Best-effort mode: commits each active branch directly, in order, with
    /// no prepare phase.
    pub async fn commit_each(&mut self, ctx: &TxContext) -> Result<(), CoordinatorError> {
        self.expect_state("commit", GlobalState::Active)?;
        self.expect_atomicity("commit without prepare", AtomicityLevel::BestEffort)?;
        self.state = GlobalState::Committing;
        self.commit_branches(ctx, false).await
    }

    async fn commit_branches(&mut self, ctx: &TxContext, prepared: bool) -> Result<(), CoordinatorError> {
        for index in 0..self.branches.len() {
            if let Some(interruption) = ctx.interruption() {
                let cause = interrupted(Operation::Commit, interruption);
                return Err(self.commit_failed(ctx, index, cause, false).await);
            }

            let branch = &mut self.branches[index];
            let Some(handle) = branch.handle.as_mut() else {
                continue;
            };
            self.commit_sent.push(index);
            match ctx.run(handle.commit(&self.global_id, prepared)).await {
                Ok(Ok(())) => {}
                Ok(Err(TransactionError::BranchNotFound(id))) => {
                    debug!(global_id = %self.global_id, branch_id = %branch.branch_id, "Transaction {id} already resolved at commit");
                }
                Ok(Err(e)) => return Err(self.commit_failed(ctx, index, e, false).await),
                Err(interruption) => {
                    let cause = interrupted(Operation::Commit, interruption);
                    return Err(self.commit_failed(ctx, index, cause, true).await);
                }
            }
            branch.advance(BranchPhase::Committed);
            info!(global_id = %self.global_id, branch_id = %branch.branch_id, "Branch committed");
        }

        self.state = GlobalState::Committed;
        self.release_all(ctx).await;
        info!(global_id = %self.global_id, "Global transaction committed");
        Ok(())
    }

    /// Commit on branch `index` failed. With nothing committed and the
    /// outcome known, this is an ordinary abort; otherwise the transaction
    /// is left partially committed for recovery.
    async fn commit_failed(
        &mut self,
        ctx: &TxContext,
        index: usize,
        cause: TransactionError,
        in_flight: bool,
    ) -> CoordinatorError {
        if index == 0 && !in_flight {
            return self.abort(ctx, cause).await;
        }

        if in_flight {
            self.in_doubt.push(index);
        }
        if self.atomicity == AtomicityLevel::BestEffort {
            // Unprepared sessions cannot be recovered later; release their
            // locks now. An in-flight commit is left alone.
            let from = if in_flight { index + 1 } else { index };
            self.rollback_branches(ctx, from).await;
        }
        self.state = GlobalState::PartialCommitInconsistency;
        self.release_all(ctx).await;

        let (committed, not_committed): (Vec<_>, Vec<_>) = self
            .branches
            .iter()
            .partition(|b| b.phase == BranchPhase::Committed);
        let committed: Vec<String> = committed.into_iter().map(|b| b.branch_id.clone()).collect();
        let not_committed: Vec<String> = not_committed.into_iter().map(|b| b.branch_id.clone()).collect();
        error!(
            global_id = %self.global_id,
            ?committed,
            ?not_committed,
            cause = %cause,
            "Partial commit; recovery sweep required"
        );
        CoordinatorError::PartialCommitInconsistency {
            global_id: self.global_id.clone(),
            committed,
            not_committed,
        }
    }

    /// Rolls back every open branch and ends the transaction aborted.
    async fn abort(&mut self, ctx: &TxContext, cause: TransactionError) -> CoordinatorError {
        warn!(global_id = %self.global_id, cause = %cause, "Aborting global transaction");
        self.state = GlobalState::Aborting;
        if let Some(log) = &self.decision_log {
            record_abort(log.as_ref(), &self.global_id, self.commit_recorded).await;
        }
        self.rollback_branches(ctx, 0).await;
        self.state = GlobalState::Aborted;
        self.release_all(ctx).await;
        CoordinatorError::Aborted {
            global_id: self.global_id.clone(),
            source: cause,
        }
    }

    /// Shared teardown: rolls back branches `from..` that are still Active or
    /// Prepared, closest-first (reverse open order).
    async fn rollback_branches(&mut self, ctx: &TxContext, from: usize) {
        for (offset, branch) in self.branches[from..].iter_mut().enumerate().rev() {
            if !matches!(branch.phase, BranchPhase::Active | BranchPhase::Prepared) {
                continue;
            }
            let Some(handle) = branch.handle.as_mut() else {
                continue;
            };
            let was_prepared = branch.phase == BranchPhase::Prepared;
            match ctx.run_cleanup(handle.rollback(&self.global_id, was_prepared)).await {
                Ok(Ok(())) => {
                    branch.advance(BranchPhase::Aborted);
                    info!(global_id = %self.global_id, branch_id = %branch.branch_id, "Branch rolled back");
                }
                Ok(Err(TransactionError::BranchNotFound(_))) => {
                    branch.advance(BranchPhase::Aborted);
                    if self.commit_sent.contains(&(from + offset)) {
                        // The failed commit may have been applied before its
                        // reply was lost.
                        warn!(global_id = %self.global_id, branch_id = %branch.branch_id, "Transaction gone at rollback after a failed commit; it may have committed");
                    } else {
                        debug!(global_id = %self.global_id, branch_id = %branch.branch_id, "Branch already resolved");
                    }
                }
                Ok(Err(e)) => {
                    warn!(global_id = %self.global_id, branch_id = %branch.branch_id, "Rollback failed, branch leaked: {e}");
                }
                Err(interruption) => {
                    warn!(global_id = %self.global_id, branch_id = %branch.branch_id, "Rollback {interruption}, branch leaked");
                }
            }
        }
    }

    async fn release_all(&mut self, ctx: &TxContext) {
        for branch in &mut self.branches {
            if let Some(handle) = branch.handle.take() {
                if ctx.run_cleanup(handle.release()).await.is_err() {
                    warn!(branch_id = %branch.branch_id, "Timed out releasing connection");
                }
            }
        }
    }

    async fn record_decision(&self, decision: Decision) -> Result<(), DecisionLogError> {
        match &self.decision_log {
            Some(log) => log.record(&self.global_id, decision).await,
            None => Ok(()),
        }
    }

    fn expect_state(&self, operation: &'static str, state: GlobalState) -> Result<(), CoordinatorError> {
        if self.state == state {
            Ok(())
        } else {
            Err(CoordinatorError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    fn expect_atomicity(&self, operation: &'static str, atomicity: AtomicityLevel) -> Result<(), CoordinatorError> {
        if self.atomicity == atomicity {
            Ok(())
        } else {
            Err(CoordinatorError::WrongAtomicity {
                operation,
                atomicity: self.atomicity,
            })
        }
    }

    fn branch_ids(&self, pred: impl Fn(usize, &TransactionBranch) -> bool) -> Vec<String> {
        self.branches
            .iter()
            .enumerate()
            .filter(|(i, b)| pred(*i, *b))
            .map(|(_, b)| b.branch_id.clone())
            .collect()
    }

    /// How the attempt ended, once it has ended.
    pub fn outcome(&self) -> Option<Outcome> {
        match self.state {
            GlobalState::Committed => Some(Outcome::Committed),
            GlobalState::Aborted => {
                if self.branches.iter().all(|b| b.phase == BranchPhase::Aborted) {
                    Some(Outcome::AbortedClean)
                } else {
                    Some(Outcome::AbortedPartial {
                        leaked: self.branch_ids(|_, b| {
                            matches!(b.phase, BranchPhase::Active | BranchPhase::Prepared)
                        }),
                    })
                }
            }
            GlobalState::PartialCommitInconsistency => Some(Outcome::PartialCommitInconsistency {
                committed: self.branch_ids(|_, b| b.phase == BranchPhase::Committed),
                not_committed: self.branch_ids(|i, b| {
                    b.phase != BranchPhase::Committed && !self.in_doubt.contains(&i)
                }),
                in_doubt: self.branch_ids(|i, _| self.in_doubt.contains(&i)),
            }),
            _ => None,
        }
    }

    pub fn report(&self) -> Option<TransactionReport> {
        let outcome = self.outcome()?;
        Some(TransactionReport {
            global_id: self.global_id.clone(),
            atomicity: self.atomicity,
            state: self.state,
            outcome,
            branches: self.branches.iter().map(BranchReport::from).collect(),
        })
    }
}

impl Drop for GlobalTransaction {
    /// A transaction abandoned before reaching a decision still has its open
    /// branches rolled back. Once committing has started the decision is
    /// commit, so prepared branches are left for recovery.
    fn drop(&mut self) {
        if self.state.is_terminal() || self.state == GlobalState::Committing {
            return;
        }
        let open: Vec<(String, bool, Box<dyn BranchHandle>)> = self
            .branches
            .iter_mut()
            .rev()
            .filter(|b| matches!(b.phase, BranchPhase::Active | BranchPhase::Prepared))
            .filter_map(|b| {
                let was_prepared = b.phase == BranchPhase::Prepared;
                b.handle.take().map(|h| (b.branch_id.clone(), was_prepared, h))
            })
            .collect();
        if open.is_empty() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(global_id = %self.global_id, "Dropped with open branches outside a runtime; connections closed");
            return;
        };
        let global_id = self.global_id.clone();
        let decision_log = self.decision_log.clone();
        let commit_recorded = self.commit_recorded;
        warn!(global_id = %global_id, "Dropped before completion; rolling back open branches");
        runtime.spawn(async move {
            if let Some(log) = decision_log {
                record_abort(log.as_ref(), &global_id, commit_recorded).await;
            }
            let ctx = TxContext::new();
            for (branch_id, was_prepared, mut handle) in open {
                match ctx.run_cleanup(handle.rollback(&global_id, was_prepared)).await {
                    Ok(Ok(())) | Ok(Err(TransactionError::BranchNotFound(_))) => {
                        handle.release().await;
                    }
                    Ok(Err(e)) => warn!(global_id = %global_id, branch_id = %branch_id, "Rollback failed, branch leaked: {e}"),
                    Err(_) => warn!(global_id = %global_id, branch_id = %branch_id, "Rollback timed out, branch leaked"),
                }
            }
        });
    }
}

/// Records Abort for `global_id`, never over a Commit written by another
/// attempt. `own_commit` marks a Commit this attempt recorded and is now
/// retracting.
async fn record_abort(log: &dyn DecisionLog, global_id: &GlobalId, own_commit: bool) {
    if !own_commit {
        match log.decision(global_id).await {
            Ok(Some(Decision::Commit)) => {
                error!(global_id = %global_id, "Commit decision already on record; not overwriting it with abort");
                return;
            }
            Ok(_) => {}
            Err(e) => {
                // Recovery presumes abort when nothing is recorded.
                warn!(global_id = %global_id, "Failed to read decision log, abort not recorded: {e}");
                return;
            }
        }
    }
    if let Err(e) = log.record(global_id, Decision::Abort).await {
        warn!(global_id = %global_id, "Failed to record abort decision: {e}");
    }
}

fn interrupted(operation: Operation, interruption: Interruption) -> TransactionError {
    TransactionError::for_operation(operation, interruption.to_string())
}
