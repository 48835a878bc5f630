//! Inbound updates from the chat transport.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;
use store::ShopStore;

use crate::AppState;
use crate::command::InboundEvent;
use crate::reply::Reply;

#[derive(Serialize)]
pub struct UpdateResponse {
    pub replies: Vec<Reply>,
}

/// POST /updates: handles one inbound event and returns the replies to render.
pub async fn handle<S: ShopStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(event): Json<InboundEvent>,
) -> Json<UpdateResponse> {
    let replies = state.dispatcher.handle(event).await;
    Json(UpdateResponse { replies })
}
