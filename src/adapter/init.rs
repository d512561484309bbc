use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::adapter::config::{AppConfig, MYSQL_TARGET, POSTGRES_TARGET};
use crate::adapter::store::file_decision_log::FileDecisionLog;
use crate::adapter::store::mysql::resource_manager::MySqlResourceManager;
use crate::adapter::store::pg::resource_manager::PgResourceManager;
use crate::adapter::web::app_state::AppState;
use crate::core::domain::coordinator::TransactionCoordinator;
use crate::core::domain::decision_log::{DecisionLog, InMemoryDecisionLog};
use crate::core::domain::recovery::RecoverySweeper;
use crate::core::domain::registry::ResourceManagerRegistry;
use crate::core::use_case::coordinate_transaction::CoordinateTransactionUseCase;
use crate::core::use_case::recover_transaction::RecoverTransactionUseCase;

pub struct AppInitializer;

impl AppInitializer {
    pub async fn initialize(config: &AppConfig) -> Result<Arc<AppState>, AppInitializerError> {
        let mut registry = ResourceManagerRegistry::new();
        if let Some(url) = config.pg_url() {
            let resource_manager = PgResourceManager::connect(url, config.pool_size())
                .await
                .map_err(|e| AppInitializerError::DatabaseInitError(e.to_string()))?;
            registry.register(POSTGRES_TARGET, Arc::new(resource_manager));
            info!(target_name = POSTGRES_TARGET, "Registered postgres resource manager");
        }
        if let Some(url) = config.mysql_url() {
            let resource_manager = MySqlResourceManager::connect(url, config.pool_size())
                .await
                .map_err(|e| AppInitializerError::DatabaseInitError(e.to_string()))?;
            registry.register(MYSQL_TARGET, Arc::new(resource_manager));
            info!(target_name = MYSQL_TARGET, "Registered mysql resource manager");
        }
        if registry.is_empty() {
            return Err(AppInitializerError::NoTargets);
        }

        let decision_log: Arc<dyn DecisionLog> = match config.decision_log() {
            Some(path) => Arc::new(FileDecisionLog::new(path)),
            None => Arc::new(InMemoryDecisionLog::new()),
        };

        Ok(Self::assemble(Arc::new(registry), decision_log, config))
    }

    /// Wires use cases around an already-built registry.
    pub fn assemble(
        registry: Arc<ResourceManagerRegistry>,
        decision_log: Arc<dyn DecisionLog>,
        config: &AppConfig,
    ) -> Arc<AppState> {
        let coordinator =
            TransactionCoordinator::new(registry.clone()).with_decision_log(decision_log.clone());
        let sweeper = RecoverySweeper::new(registry.clone()).with_decision_log(decision_log);

        let coordinate_transaction_use_case = Arc::new(CoordinateTransactionUseCase::new(
            coordinator,
            config.timeout(),
            config.cleanup_timeout(),
        ));
        let recover_transaction_use_case =
            Arc::new(RecoverTransactionUseCase::new(sweeper, config.timeout()));

        Arc::new(AppState {
            registry,
            coordinate_transaction_use_case,
            recover_transaction_use_case,
        })
    }
}

#[derive(Debug, Error)]
pub enum AppInitializerError {
    #[error("Failed to initialize database: {0}")]
    DatabaseInitError(String),
    #[error("No resource manager configured; set ATOMIC_COMMIT_PG_URL and/or ATOMIC_COMMIT_MYSQL_URL")]
    NoTargets,
}
