use axum::http::StatusCode;
use axum::Json;
use std::sync::Arc;

use crate::core::domain::global_transaction::TransactionReport;
use crate::core::port::coordinate_transaction::{
    CoordinateTransactionInput, CoordinateTransactionInputBoundary,
};

use crate::adapter::web::dto::coordinate_transaction_web_input::CoordinateTransactionWebInput;
use crate::adapter::web::presenter::coordinate_transaction::CoordinateTransactionPresenter;

pub struct TransactionHandler {
    use_case: Arc<dyn CoordinateTransactionInputBoundary>,
}

impl TransactionHandler {
    pub fn new(use_case: Arc<dyn CoordinateTransactionInputBoundary>) -> Self {
        Self { use_case }
    }

    pub async fn coordinate(
        &self,
        input: CoordinateTransactionWebInput,
    ) -> Result<(StatusCode, Json<TransactionReport>), (StatusCode, String)> {
        let mut presenter = CoordinateTransactionPresenter::new();
        let input = CoordinateTransactionInput::try_from(input)
            .map_err(|e| (StatusCode::BAD_REQUEST, format!("Invalid global id: {}", e)))?;

        match self.use_case.execute(input, &mut presenter).await {
            Ok(_) => {
                if let Some(report) = presenter.output.take() {
                    Ok(presenter.success(report))
                } else {
                    Err((
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Output not set by presenter".to_string(),
                    ))
                }
            }
            Err(error) => Err(presenter.failure(error)),
        }
    }
}
