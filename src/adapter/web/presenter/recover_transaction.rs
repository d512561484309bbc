use axum::http::StatusCode;
use axum::Json;

use crate::core::domain::recovery::SweepReport;
use crate::core::port::recover_transaction::{
    RecoverTransactionError, RecoverTransactionOutputBoundary, RecoverTransactionOutputError,
};

#[derive(Default)]
pub struct RecoverTransactionPresenter {
    pub(crate) output: Option<SweepReport>,
}

impl RecoverTransactionPresenter {
    pub fn new() -> Self {
        Self { output: None }
    }

    pub fn take_output(&mut self) -> Option<SweepReport> {
        self.output.take()
    }

    pub(crate) fn success(&self, report: SweepReport) -> (StatusCode, Json<SweepReport>) {
        let status = if report.is_resolved() {
            StatusCode::OK
        } else {
            StatusCode::BAD_GATEWAY
        };
        (status, Json(report))
    }

    pub(crate) fn failure(&self, error: RecoverTransactionError) -> (StatusCode, String) {
        let status = match &error {
            RecoverTransactionError::ValidationError(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, format!("Failed to recover transaction: {}", error))
    }
}

impl RecoverTransactionOutputBoundary for RecoverTransactionPresenter {
    fn execute(&mut self, report: SweepReport) -> Result<(), RecoverTransactionOutputError> {
        if self.output.is_some() {
            return Err(RecoverTransactionOutputError::AlreadySet(
                report.global_id.to_string(),
            ));
        }
        self.output = Some(report);
        Ok(())
    }
}
