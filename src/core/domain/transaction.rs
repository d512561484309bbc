use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use crate::core::domain::branch::ResourceManagerKind;
use crate::core::domain::global_id::GlobalId;
use crate::core::domain::statement::Statement;

/// The step of the protocol an adapter call belongs to. Classification of a
/// backend failure depends on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Begin,
    Execute,
    Prepare,
    Commit,
    Rollback,
    Recover,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Begin => "begin",
            Operation::Execute => "execute",
            Operation::Prepare => "prepare",
            Operation::Commit => "commit",
            Operation::Rollback => "rollback",
            Operation::Recover => "recover",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("Connection error: {0}")]
    ConnectionError(String),
    #[error("Failed to execute statement: {0}")]
    ExecutionError(String),
    #[error("Failed to prepare transaction: {0}")]
    PrepareError(String),
    #[error("Failed to commit transaction: {0}")]
    CommitError(String),
    #[error("Failed to rollback transaction: {0}")]
    RollbackError(String),
    #[error("Transaction {0} is unknown to the resource manager")]
    BranchNotFound(String),
    #[error("Parameter binding error: {0}")]
    BindError(String),
    #[error("Failed to list prepared transactions: {0}")]
    RecoveryError(String),
}

impl TransactionError {
    /// The failure variant for `operation` carrying `message`.
    pub fn for_operation(operation: Operation, message: impl Into<String>) -> Self {
        let message = message.into();
        match operation {
            Operation::Begin => TransactionError::ConnectionError(message),
            Operation::Execute => TransactionError::ExecutionError(message),
            Operation::Prepare => TransactionError::PrepareError(message),
            Operation::Commit => TransactionError::CommitError(message),
            Operation::Rollback => TransactionError::RollbackError(message),
            Operation::Recover => TransactionError::RecoveryError(message),
        }
    }

    pub fn is_branch_not_found(&self) -> bool {
        matches!(self, TransactionError::BranchNotFound(_))
    }
}

/// One backend that can take part in a global transaction. Implementations
/// own a connection pool and hand out exclusively owned branch handles.
#[async_trait]
pub trait ResourceManager: Send + Sync {
    fn kind(&self) -> ResourceManagerKind;

    /// Acquires a dedicated connection and opens the branch's local
    /// transaction under `global_id`.
    async fn begin(&self, global_id: &GlobalId) -> Result<Box<dyn BranchHandle>, TransactionError>;

    /// Ids of transactions currently prepared on this backend.
    async fn recover(&self) -> Result<Vec<String>, TransactionError>;

    /// Commits a prepared transaction from any connection.
    async fn commit_prepared(&self, global_id: &GlobalId) -> Result<(), TransactionError>;

    /// Rolls back a prepared transaction from any connection.
    async fn rollback_prepared(&self, global_id: &GlobalId) -> Result<(), TransactionError>;
}

/// A branch's live session on one resource manager.
#[async_trait]
pub trait BranchHandle: Send + Sync {
    /// Runs one statement and returns the rows it affected.
    async fn execute(&mut self, statement: &Statement) -> Result<u64, TransactionError>;

    async fn prepare(&mut self, global_id: &GlobalId) -> Result<(), TransactionError>;

    /// Commits the prepared transaction by id when `was_prepared`, otherwise
    /// commits the live session in one phase.
    async fn commit(&mut self, global_id: &GlobalId, was_prepared: bool) -> Result<(), TransactionError>;

    /// Symmetric to [`BranchHandle::commit`]. Yields
    /// [`TransactionError::BranchNotFound`] when the backend no longer knows
    /// the transaction, which callers treat as success.
    async fn rollback(&mut self, global_id: &GlobalId, was_prepared: bool) -> Result<(), TransactionError>;

    /// Gives the connection back. A session that still holds an open or
    /// prepared transaction is closed instead of being returned to its pool.
    async fn release(self: Box<Self>);
}
