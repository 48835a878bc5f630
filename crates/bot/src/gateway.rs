//! Outbound side of the chat transport.

use std::sync::Arc;

use async_trait::async_trait;
use common::{ChatId, MessageHandle};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::reply::Reply;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Message {handle} in chat {chat_id} is unknown")]
    UnknownMessage {
        chat_id: ChatId,
        handle: MessageHandle,
    },

    #[error("Transport unavailable: {0}")]
    Unavailable(String),
}

/// Delivers messages that are not replies to an inbound event.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    /// Sends a message and returns a handle that can later be used to edit it.
    async fn send(&self, message: Reply) -> Result<MessageHandle, GatewayError>;

    /// Replaces the text of a previously sent message.
    async fn edit(
        &self,
        chat_id: ChatId,
        handle: MessageHandle,
        text: String,
    ) -> Result<(), GatewayError>;
}

/// A queued outbound operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum OutboundOp {
    Send {
        handle: MessageHandle,
        #[serde(flatten)]
        message: Reply,
    },
    Edit {
        chat_id: ChatId,
        handle: MessageHandle,
        text: String,
    },
}

#[derive(Debug, Default)]
struct Outbox {
    queue: Vec<OutboundOp>,
    sent: Vec<(ChatId, MessageHandle)>,
    last_handle: i64,
}

/// Gateway that queues operations until the transport drains them.
#[derive(Debug, Clone, Default)]
pub struct OutboxGateway {
    outbox: Arc<Mutex<Outbox>>,
}

impl OutboxGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes every queued operation, oldest first.
    pub async fn drain(&self) -> Vec<OutboundOp> {
        std::mem::take(&mut self.outbox.lock().await.queue)
    }

    pub async fn pending(&self) -> usize {
        self.outbox.lock().await.queue.len()
    }
}

#[async_trait]
impl ChatGateway for OutboxGateway {
    async fn send(&self, message: Reply) -> Result<MessageHandle, GatewayError> {
        let mut outbox = self.outbox.lock().await;
        outbox.last_handle += 1;
        let handle = MessageHandle::new(outbox.last_handle);

        outbox.sent.push((message.chat_id, handle));
        outbox.queue.push(OutboundOp::Send { handle, message });
        Ok(handle)
    }

    async fn edit(
        &self,
        chat_id: ChatId,
        handle: MessageHandle,
        text: String,
    ) -> Result<(), GatewayError> {
        let mut outbox = self.outbox.lock().await;
        if !outbox.sent.contains(&(chat_id, handle)) {
            return Err(GatewayError::UnknownMessage { chat_id, handle });
        }

        outbox.queue.push(OutboundOp::Edit {
            chat_id,
            handle,
            text,
        });
        Ok(())
    }
}
