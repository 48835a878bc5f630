//! Messages the bot sends on its own, such as order announcements.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;
use store::ShopStore;

use crate::AppState;
use crate::gateway::OutboundOp;

#[derive(Serialize)]
pub struct OutboxResponse {
    pub operations: Vec<OutboundOp>,
}

/// GET /outbox: drains the queued send and edit operations, oldest first.
pub async fn drain<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Json<OutboxResponse> {
    let operations = state.outbox.drain().await;
    if !operations.is_empty() {
        tracing::debug!(count = operations.len(), "Outbox drained");
    }
    Json(OutboxResponse { operations })
}
