use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use std::sync::Arc;

use crate::adapter::web::app_state::AppState;
use crate::adapter::web::dto::coordinate_transaction_web_input::CoordinateTransactionWebInput;
use crate::adapter::web::dto::recover_transaction_web_input::RecoverTransactionWebInput;
use crate::adapter::web::handler::transactions::post::TransactionHandler;
use crate::adapter::web::handler::transactions::recover::RecoveryHandler;
use crate::core::domain::global_transaction::TransactionReport;
use crate::core::domain::recovery::SweepReport;

pub async fn post(
    State(state): State<Arc<AppState>>,
    Json(input): Json<CoordinateTransactionWebInput>,
) -> Result<(StatusCode, Json<TransactionReport>), (StatusCode, String)> {
    let handler = TransactionHandler::new(state.coordinate_transaction_use_case.clone());
    handler.coordinate(input).await
}

pub async fn recover(
    State(state): State<Arc<AppState>>,
    Path(global_id): Path<String>,
    input: Option<Json<RecoverTransactionWebInput>>,
) -> Result<(StatusCode, Json<SweepReport>), (StatusCode, String)> {
    let handler = RecoveryHandler::new(state.recover_transaction_use_case.clone());
    let input = input.map(|Json(input)| input).unwrap_or_default();
    handler.recover(global_id, input).await
}
