//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;
use store::ShopStore;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Outbound operations waiting for the transport to drain them.
    pub outbox_pending: usize,
}

/// GET /health: reports liveness and the outbox backlog.
pub async fn check<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        outbox_pending: state.outbox.pending().await,
    })
}
