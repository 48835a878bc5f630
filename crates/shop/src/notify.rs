//! Order notifications.

use std::sync::Arc;

use async_trait::async_trait;
use common::{MessageHandle, OrderId, OrderStatus, UserId};
use serde::Serialize;
use store::Order;
use thiserror::Error;
use tokio::sync::Mutex;

/// Something subscribers should hear about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ShopEvent {
    /// A new order was committed.
    OrderPlaced(Order),

    /// An order moved to a new status.
    StatusChanged {
        order_id: OrderId,
        user_id: UserId,
        previous: OrderStatus,
        status: OrderStatus,
        /// Handle of the announcement to edit in place, if one was sent.
        handle: Option<MessageHandle>,
    },
}

impl ShopEvent {
    pub fn order_id(&self) -> OrderId {
        match self {
            ShopEvent::OrderPlaced(order) => order.id,
            ShopEvent::StatusChanged { order_id, .. } => *order_id,
        }
    }
}

/// Delivery of a notification failed.
#[derive(Debug, Error)]
#[error("Notification failed: {0}")]
pub struct NotifyError(pub String);

/// Receives shop events after the transaction that produced them has committed.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers the event. Returns the handle of the announcement message, if one was sent.
    async fn notify(&self, event: ShopEvent) -> Result<Option<MessageHandle>, NotifyError>;
}

#[async_trait]
impl<N: Notifier + ?Sized> Notifier for Arc<N> {
    async fn notify(&self, event: ShopEvent) -> Result<Option<MessageHandle>, NotifyError> {
        (**self).notify(event).await
    }
}

#[derive(Debug, Default)]
struct InMemoryNotifierState {
    events: Vec<ShopEvent>,
    last_handle: i64,
    fail: bool,
}

/// Notifier that records events, for testing.
///
/// Every `OrderPlaced` gets a fresh handle.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotifier {
    state: Arc<Mutex<InMemoryNotifierState>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following delivery fail.
    pub async fn set_fail(&self, fail: bool) {
        self.state.lock().await.fail = fail;
    }

    /// Returns the events delivered so far.
    pub async fn events(&self) -> Vec<ShopEvent> {
        self.state.lock().await.events.clone()
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn notify(&self, event: ShopEvent) -> Result<Option<MessageHandle>, NotifyError> {
        let mut state = self.state.lock().await;
        if state.fail {
            return Err(NotifyError("transport unavailable".to_string()));
        }

        let handle = match event {
            ShopEvent::OrderPlaced(_) => {
                state.last_handle += 1;
                Some(MessageHandle::new(state.last_handle))
            }
            ShopEvent::StatusChanged { handle, .. } => handle,
        };
        state.events.push(event);
        Ok(handle)
    }
}
