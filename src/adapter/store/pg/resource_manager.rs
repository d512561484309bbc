use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use tracing::debug;

use crate::adapter::store::backend_error::backend_error;
use crate::adapter::store::pg::branch_handle::{commit_prepared, rollback_prepared, PgBranchHandle};
use crate::core::domain::branch::ResourceManagerKind;
use crate::core::domain::classifier::ErrorClassifier;
use crate::core::domain::global_id::GlobalId;
use crate::core::domain::transaction::{BranchHandle, Operation, ResourceManager, TransactionError};

pub struct PgResourceManager {
    pool: PgPool,
    classifier: ErrorClassifier,
}

impl PgResourceManager {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            classifier: ErrorClassifier::new(ResourceManagerKind::StandardSql2pc),
        }
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(Self::new(pool))
    }

    async fn resolve(&self, operation: Operation, sql: String) -> Result<(), TransactionError> {
        debug!(command = %sql, "postgres");
        sqlx::raw_sql(&sql)
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| self.classifier.classify(operation, backend_error(&e)))
    }
}

#[async_trait]
impl ResourceManager for PgResourceManager {
    fn kind(&self) -> ResourceManagerKind {
        ResourceManagerKind::StandardSql2pc
    }

    async fn begin(&self, _global_id: &GlobalId) -> Result<Box<dyn BranchHandle>, TransactionError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| self.classifier.classify(Operation::Begin, backend_error(&e)))?;
        Executor::execute(&mut *conn, sqlx::raw_sql("BEGIN"))
            .await
            .map_err(|e| self.classifier.classify(Operation::Begin, backend_error(&e)))?;
        Ok(Box::new(PgBranchHandle::new(self.pool.clone(), conn)))
    }

    async fn recover(&self) -> Result<Vec<String>, TransactionError> {
        sqlx::query_scalar::<_, String>(
            "SELECT gid FROM pg_prepared_xacts WHERE database = current_database()",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| self.classifier.classify(Operation::Recover, backend_error(&e)))
    }

    async fn commit_prepared(&self, global_id: &GlobalId) -> Result<(), TransactionError> {
        self.resolve(Operation::Commit, commit_prepared(global_id)).await
    }

    async fn rollback_prepared(&self, global_id: &GlobalId) -> Result<(), TransactionError> {
        self.resolve(Operation::Rollback, rollback_prepared(global_id)).await
    }
}
