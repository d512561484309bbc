use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::{Connection, Executor, MySql, MySqlPool};
use tracing::{debug, warn};

use crate::adapter::store::backend_error::backend_error;
use crate::core::domain::branch::ResourceManagerKind;
use crate::core::domain::classifier::ErrorClassifier;
use crate::core::domain::global_id::GlobalId;
use crate::core::domain::statement::{Statement, ToSql};
use crate::core::domain::transaction::{BranchHandle, Operation, TransactionError};

/// XA branch: work framed by `XA BEGIN` / `XA END`, then `XA PREPARE` and
/// `XA COMMIT` / `XA ROLLBACK`.
///
/// XA statements are sent over the text protocol; MySQL does not accept
/// them as prepared statements.
pub struct MySqlBranchHandle {
    pool: MySqlPool,
    conn: Option<PoolConnection<MySql>>,
    in_transaction: bool,
    classifier: ErrorClassifier,
}

impl MySqlBranchHandle {
    pub(crate) fn new(pool: MySqlPool, conn: PoolConnection<MySql>) -> Self {
        Self {
            pool,
            conn: Some(conn),
            in_transaction: true,
            classifier: ErrorClassifier::new(ResourceManagerKind::Xa),
        }
    }

    async fn command(&mut self, operation: Operation, sql: &str) -> Result<(), TransactionError> {
        debug!(command = sql, "mysql");
        let result = match self.conn.as_mut() {
            Some(conn) => Executor::execute(&mut **conn, sqlx::raw_sql(sql)).await,
            None => sqlx::raw_sql(sql).execute(&self.pool).await,
        };
        result
            .map(|_| ())
            .map_err(|e| self.classifier.classify(operation, backend_error(&e)))
    }
}

pub(crate) fn xa_begin(global_id: &GlobalId) -> String {
    format!("XA BEGIN '{global_id}'")
}

pub(crate) fn xa_end(global_id: &GlobalId) -> String {
    format!("XA END '{global_id}'")
}

pub(crate) fn xa_prepare(global_id: &GlobalId) -> String {
    format!("XA PREPARE '{global_id}'")
}

pub(crate) fn xa_commit(global_id: &GlobalId) -> String {
    format!("XA COMMIT '{global_id}'")
}

pub(crate) fn xa_commit_one_phase(global_id: &GlobalId) -> String {
    format!("XA COMMIT '{global_id}' ONE PHASE")
}

pub(crate) fn xa_rollback(global_id: &GlobalId) -> String {
    format!("XA ROLLBACK '{global_id}'")
}

#[async_trait]
impl BranchHandle for MySqlBranchHandle {
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
        self.command(Operation::Prepare, &xa_end(global_id)).await?;
        self.command(Operation::Prepare, &xa_prepare(global_id)).await
    }

    async fn commit(&mut self, global_id: &GlobalId, was_prepared: bool) -> Result<(), TransactionError> {
        if was_prepared {
            self.command(Operation::Commit, &xa_commit(global_id)).await?;
        } else {
            self.command(Operation::Commit, &xa_end(global_id)).await?;
            self.command(Operation::Commit, &xa_commit_one_phase(global_id))
                .await?;
        }
        self.in_transaction = false;
        Ok(())
    }

    async fn rollback(&mut self, global_id: &GlobalId, was_prepared: bool) -> Result<(), TransactionError> {
        if !was_prepared {
            // XA ROLLBACK is refused while the branch is still ACTIVE. When
            // the branch was already ended (a failed prepare) this errors and
            // the rollback below still applies.
            if let Err(e) = self.command(Operation::Rollback, &xa_end(global_id)).await {
                debug!(global_id = %global_id, "XA END before rollback: {e}");
            }
        }
        let result = self
            .command(Operation::Rollback, &xa_rollback(global_id))
            .await;
        match result {
            Ok(()) | Err(TransactionError::BranchNotFound(_)) => self.in_transaction = false,
            Err(_) => {}
        }
        result
    }

    async fn release(mut self: Box<Self>) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        if self.in_transaction {
            if let Err(e) = conn.detach().close().await {
                warn!("Failed to close mysql connection holding an XA transaction: {e}");
            }
        }
    }
}

impl Drop for MySqlBranchHandle {
    fn drop(&mut self) {
        if self.in_transaction {
            if let Some(conn) = self.conn.take() {
                drop(conn.detach());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_follow_the_xa_dialect() {
        let id = GlobalId::parse("G1").unwrap();
        assert_eq!(xa_begin(&id), "XA BEGIN 'G1'");
        assert_eq!(xa_end(&id), "XA END 'G1'");
        assert_eq!(xa_prepare(&id), "XA PREPARE 'G1'");
        assert_eq!(xa_commit(&id), "XA COMMIT 'G1'");
        assert_eq!(xa_commit_one_phase(&id), "XA COMMIT 'G1' ONE PHASE");
        assert_eq!(xa_rollback(&id), "XA ROLLBACK 'G1'");
    }
}
