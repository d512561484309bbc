use async_trait::async_trait;
use sqlx::mysql::{MySqlPoolOptions, MySqlRow};
use sqlx::{Executor, MySqlPool, Row};
use tracing::debug;

use crate::adapter::store::backend_error::backend_error;
use crate::adapter::store::mysql::branch_handle::{xa_begin, xa_commit, xa_rollback, MySqlBranchHandle};
use crate::core::domain::branch::ResourceManagerKind;
use crate::core::domain::classifier::ErrorClassifier;
use crate::core::domain::global_id::GlobalId;
use crate::core::domain::transaction::{BranchHandle, Operation, ResourceManager, TransactionError};

pub struct MySqlResourceManager {
    pool: MySqlPool,
    classifier: ErrorClassifier,
}

impl MySqlResourceManager {
    pub fn new(pool: MySqlPool) -> Self {
        Self {
            pool,
            classifier: ErrorClassifier::new(ResourceManagerKind::Xa),
        }
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = MySqlPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(Self::new(pool))
    }

    async fn resolve(&self, operation: Operation, sql: String) -> Result<(), TransactionError> {
        debug!(command = %sql, "mysql");
        sqlx::raw_sql(&sql)
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| self.classifier.classify(operation, backend_error(&e)))
    }
}

/// `XA RECOVER` returns gtrid and bqual concatenated in `data`.
fn gtrid(row: &MySqlRow) -> Result<String, sqlx::Error> {
    let gtrid_length: i64 = row.try_get_unchecked("gtrid_length")?;
    let data: Vec<u8> = row.try_get_unchecked("data")?;
    let end = usize::try_from(gtrid_length).unwrap_or(0).min(data.len());
    Ok(String::from_utf8_lossy(&data[..end]).into_owned())
}

#[async_trait]
impl ResourceManager for MySqlResourceManager {
    fn kind(&self) -> ResourceManagerKind {
        ResourceManagerKind::Xa
    }

    async fn begin(&self, global_id: &GlobalId) -> Result<Box<dyn BranchHandle>, TransactionError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| self.classifier.classify(Operation::Begin, backend_error(&e)))?;
        let sql = xa_begin(global_id);
        debug!(command = %sql, "mysql");
        Executor::execute(&mut *conn, sqlx::raw_sql(&sql))
            .await
            .map_err(|e| self.classifier.classify(Operation::Begin, backend_error(&e)))?;
        Ok(Box::new(MySqlBranchHandle::new(self.pool.clone(), conn)))
    }

    async fn recover(&self) -> Result<Vec<String>, TransactionError> {
        let rows = sqlx::raw_sql("XA RECOVER")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| self.classifier.classify(Operation::Recover, backend_error(&e)))?;
        rows.iter()
            .map(gtrid)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| self.classifier.classify(Operation::Recover, backend_error(&e)))
    }

    async fn commit_prepared(&self, global_id: &GlobalId) -> Result<(), TransactionError> {
        self.resolve(Operation::Commit, xa_commit(global_id)).await
    }

    async fn rollback_prepared(&self, global_id: &GlobalId) -> Result<(), TransactionError> {
        self.resolve(Operation::Rollback, xa_rollback(global_id)).await
    }
}
