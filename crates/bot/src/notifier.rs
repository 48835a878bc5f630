//! Order notifications delivered through the chat gateway.

use async_trait::async_trait;
use common::{ChatId, MessageHandle};
use shop::{Notifier, NotifyError, ShopEvent};

use crate::gateway::ChatGateway;
use crate::reply::{self, Reply};

/// Announces orders in the admin channel and keeps customers posted on status changes.
#[derive(Debug, Clone)]
pub struct ChatNotifier<G> {
    gateway: G,
    admin_chat: Option<ChatId>,
}

impl<G: ChatGateway> ChatNotifier<G> {
    pub fn new(gateway: G, admin_chat: Option<ChatId>) -> Self {
        Self {
            gateway,
            admin_chat,
        }
    }
}

#[async_trait]
impl<G: ChatGateway> Notifier for ChatNotifier<G> {
    async fn notify(&self, event: ShopEvent) -> Result<Option<MessageHandle>, NotifyError> {
        match event {
            ShopEvent::OrderPlaced(order) => {
                let Some(admin_chat) = self.admin_chat else {
                    tracing::debug!(order_id = %order.id, "No admin channel configured");
                    return Ok(None);
                };

                let announcement = Reply::text(admin_chat, reply::order_announcement(&order));
                let handle = self
                    .gateway
                    .send(announcement)
                    .await
                    .map_err(|e| NotifyError(e.to_string()))?;
                Ok(Some(handle))
            }
            ShopEvent::StatusChanged {
                order_id,
                user_id,
                status,
                handle,
                ..
            } => {
                let label = reply::status_label(status);
                self.gateway
                    .send(Reply::text(
                        user_id.private_chat(),
                        format!("Your order #{order_id} is now {label}."),
                    ))
                    .await
                    .map_err(|e| NotifyError(e.to_string()))?;

                if let (Some(admin_chat), Some(handle)) = (self.admin_chat, handle) {
                    self.gateway
                        .edit(
                            admin_chat,
                            handle,
                            format!("Order #{order_id} from user {user_id}: {label}"),
                        )
                        .await
                        .map_err(|e| NotifyError(e.to_string()))?;
                }
                Ok(handle)
            }
        }
    }
}
