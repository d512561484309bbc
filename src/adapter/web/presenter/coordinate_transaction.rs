use axum::http::StatusCode;
use axum::Json;

use crate::core::domain::coordinator::CoordinatorError;
use crate::core::domain::global_transaction::{Outcome, TransactionReport};
use crate::core::port::coordinate_transaction::{
    CoordinateTransactionError, CoordinateTransactionOutputBoundary, CoordinateTransactionOutputError,
};

#[derive(Default)]
pub struct CoordinateTransactionPresenter {
    pub(crate) output: Option<TransactionReport>,
}

impl CoordinateTransactionPresenter {
    pub fn new() -> Self {
        Self { output: None }
    }

    pub(crate) fn success(&self, report: TransactionReport) -> (StatusCode, Json<TransactionReport>) {
        let status = match report.outcome {
            Outcome::Committed => StatusCode::OK,
            Outcome::AbortedClean | Outcome::AbortedPartial { .. } => StatusCode::CONFLICT,
            Outcome::PartialCommitInconsistency { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(report))
    }

    pub(crate) fn failure(&self, error: CoordinateTransactionError) -> (StatusCode, String) {
        let status = match &error {
            CoordinateTransactionError::CoordinatorError(
                CoordinatorError::NoBranches
                | CoordinatorError::UnknownTarget(_)
                | CoordinatorError::KindMismatch { .. }
                | CoordinatorError::NoSuchBranch(_)
                | CoordinatorError::InvalidGlobalId(_)
                | CoordinatorError::DuplicateGlobalId(_),
            ) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, format!("Failed to coordinate transaction: {}", error))
    }
}

impl CoordinateTransactionOutputBoundary for CoordinateTransactionPresenter {
    fn execute(&mut self, report: TransactionReport) -> Result<(), CoordinateTransactionOutputError> {
        if self.output.is_some() {
            return Err(CoordinateTransactionOutputError::AlreadySet(
                report.global_id.to_string(),
            ));
        }
        self.output = Some(report);
        Ok(())
    }
}
