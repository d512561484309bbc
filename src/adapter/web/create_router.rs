use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

use crate::adapter::web::app_state::AppState;
use crate::adapter::web::route::{targets, transactions};

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/targets", get(targets::list))
        .route("/transactions", post(transactions::post))
        .route("/transactions/:global_id/recover", post(transactions::recover))
        .with_state(state)
}
