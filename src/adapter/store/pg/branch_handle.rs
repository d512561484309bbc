use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::{Connection, Executor, PgPool, Postgres};
use tracing::{debug, warn};

use crate::adapter::store::backend_error::backend_error;
use crate::core::domain::branch::ResourceManagerKind;
use crate::core::domain::classifier::ErrorClassifier;
use crate::core::domain::global_id::GlobalId;
use crate::core::domain::statement::{Statement, ToSql};
use crate::core::domain::transaction::{BranchHandle, Operation, TransactionError};

/// Postgres branch: `BEGIN` on a dedicated connection, then
/// `PREPARE TRANSACTION` / `COMMIT PREPARED` / `ROLLBACK PREPARED`.
pub struct PgBranchHandle {
    pool: PgPool,
    conn: Option<PoolConnection<Postgres>>,
    /// The session holds an open or prepared transaction.
    in_transaction: bool,
    /// `PREPARE TRANSACTION` was sent. It may have completed on the server
    /// even when no success reply arrived.
    prepare_attempted: bool,
    classifier: ErrorClassifier,
}

impl PgBranchHandle {
    pub(crate) fn new(pool: PgPool, conn: PoolConnection<Postgres>) -> Self {
        Self {
            pool,
            conn: Some(conn),
            in_transaction: true,
            prepare_attempted: false,
            classifier: ErrorClassifier::new(ResourceManagerKind::StandardSql2pc),
        }
    }

    async fn command(&mut self, operation: Operation, sql: &str) -> Result<(), TransactionError> {
        debug!(command = sql, "postgres");
        let result = match self.conn.as_mut() {
            Some(conn) => Executor::execute(&mut **conn, sqlx::raw_sql(sql)).await,
            None => sqlx::raw_sql(sql).execute(&self.pool).await,
        };
        result
            .map(|_| ())
            .map_err(|e| self.classifier.classify(operation, backend_error(&e)))
    }

    /// Rolls back a prepared transaction by id from a fresh pooled
    /// connection; the branch session may be unusable after an abandoned
    /// prepare.
    async fn rollback_by_id(&self, global_id: &GlobalId) -> Result<(), TransactionError> {
        let sql = rollback_prepared(global_id);
        debug!(command = %sql, "postgres");
        sqlx::raw_sql(&sql)
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| self.classifier.classify(Operation::Rollback, backend_error(&e)))
    }
}

pub(crate) fn prepare_transaction(global_id: &GlobalId) -> String {
    format!("PREPARE TRANSACTION '{global_id}'")
}

pub(crate) fn commit_prepared(global_id: &GlobalId) -> String {
    format!("COMMIT PREPARED '{global_id}'")
}

pub(crate) fn rollback_prepared(global_id: &GlobalId) -> String {
    format!("ROLLBACK PREPARED '{global_id}'")
}

#[async_trait]
impl BranchHandle for PgBranchHandle {
    async fn execute(&mut self, statement: &Statement) -> Result<u64, TransactionError> {
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| TransactionError::ExecutionError("connection already released".into()))?;

        let mut query = sqlx::query(&statement.sql);
        for param in &statement.params {
            if param.is_null() {
                query = query.bind(None::<String>);
            } else if let Some(value) = param.as_bool() {
                query = query.bind(value);
            } else if let Some(value) = param.as_i64() {
                query = query.bind(value);
            } else if let Some(value) = param.as_string() {
                query = query.bind(value);
            } else {
                return Err(TransactionError::BindError(format!(
                    "Unsupported parameter type: {:?}",
                    param
                )));
            }
        }

        let result = query
            .execute(&mut **conn)
            .await
            .map_err(|e| self.classifier.classify(Operation::Execute, backend_error(&e)))?;
        Ok(result.rows_affected())
    }

    async fn prepare(&mut self, global_id: &GlobalId) -> Result<(), TransactionError> {
        self.prepare_attempted = true;
        self.command(Operation::Prepare, &prepare_transaction(global_id))
            .await
    }

    async fn commit(&mut self, global_id: &GlobalId, was_prepared: bool) -> Result<(), TransactionError> {
        if was_prepared {
            self.command(Operation::Commit, &commit_prepared(global_id))
                .await?;
        } else {
            self.command(Operation::Commit, "COMMIT").await?;
        }
        self.in_transaction = false;
        Ok(())
    }

    async fn rollback(&mut self, global_id: &GlobalId, was_prepared: bool) -> Result<(), TransactionError> {
        if was_prepared {
            let result = self
                .command(Operation::Rollback, &rollback_prepared(global_id))
                .await;
            if matches!(result, Ok(()) | Err(TransactionError::BranchNotFound(_))) {
                self.in_transaction = false;
            }
            return result;
        }

        let session = self.command(Operation::Rollback, "ROLLBACK").await;
        if !self.prepare_attempted {
            if session.is_ok() {
                self.in_transaction = false;
            }
            return session;
        }

        // A plain ROLLBACK never touches a named prepared transaction.
        if let Err(e) = &session {
            debug!(global_id = %global_id, "ROLLBACK after failed prepare: {e}");
        }
        match self.rollback_by_id(global_id).await {
            Ok(()) | Err(TransactionError::BranchNotFound(_)) => {
                // A session that refused ROLLBACK is closed on release.
                if session.is_ok() {
                    self.in_transaction = false;
                }
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn release(mut self: Box<Self>) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        if self.in_transaction {
            if let Err(e) = conn.detach().close().await {
                warn!("Failed to close postgres connection holding a transaction: {e}");
            }
        }
    }
}

impl Drop for PgBranchHandle {
    fn drop(&mut self) {
        if self.in_transaction {
            if let Some(conn) = self.conn.take() {
                // Closing the socket ends an open transaction; a prepared one
                // survives for recovery.
                drop(conn.detach());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_follow_the_prepared_transaction_dialect() {
        let id = GlobalId::parse("G1").unwrap();
        assert_eq!(prepare_transaction(&id), "PREPARE TRANSACTION 'G1'");
        assert_eq!(commit_prepared(&id), "COMMIT PREPARED 'G1'");
        assert_eq!(rollback_prepared(&id), "ROLLBACK PREPARED 'G1'");
    }
}
