use axum::http::StatusCode;
use axum::Json;
use std::sync::Arc;

use crate::core::domain::recovery::SweepReport;
use crate::core::port::recover_transaction::{
    RecoverTransactionInputBoundary, UnvalidatedRecoverInput,
};

use crate::adapter::web::dto::recover_transaction_web_input::RecoverTransactionWebInput;
use crate::adapter::web::presenter::recover_transaction::RecoverTransactionPresenter;

pub struct RecoveryHandler {
    use_case: Arc<dyn RecoverTransactionInputBoundary>,
}

impl RecoveryHandler {
    pub fn new(use_case: Arc<dyn RecoverTransactionInputBoundary>) -> Self {
        Self { use_case }
    }

    pub async fn recover(
        &self,
        global_id: String,
        input: RecoverTransactionWebInput,
    ) -> Result<(StatusCode, Json<SweepReport>), (StatusCode, String)> {
        let mut presenter = RecoverTransactionPresenter::new();
        let input = UnvalidatedRecoverInput {
            global_id,
            decision: input.decision,
        };

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
