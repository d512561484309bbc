use std::sync::Arc;

use crate::core::domain::registry::ResourceManagerRegistry;
use crate::core::port::coordinate_transaction::CoordinateTransactionInputBoundary;
use crate::core::port::recover_transaction::RecoverTransactionInputBoundary;

pub struct AppState {
    pub registry: Arc<ResourceManagerRegistry>,
    pub coordinate_transaction_use_case: Arc<dyn CoordinateTransactionInputBoundary>,
    pub recover_transaction_use_case: Arc<dyn RecoverTransactionInputBoundary>,
}
