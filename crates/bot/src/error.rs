//! Bot error types with user-facing message mapping.

use shop::ShopError;
use store::StoreError;
use thiserror::Error;

use crate::command::CommandError;
use crate::session::FlowError;

/// Anything that can go wrong while handling one update.
#[derive(Debug, Error)]
pub enum BotError {
    #[error(transparent)]
    Shop(#[from] ShopError),

    #[error(transparent)]
    Flow(#[from] FlowError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl BotError {
    /// The text shown to the user. Internal failures are logged and replaced by a fixed message.
    pub fn user_message(&self) -> String {
        match self {
            BotError::Shop(err) => shop_error_message(err),
            BotError::Flow(err) => err.to_string(),
            BotError::Command(err) => err.to_string(),
            BotError::Store(err) => {
                tracing::error!(error = %err, "internal store error");
                INTERNAL_MESSAGE.to_string()
            }
        }
    }

    /// Short name of the error kind, used as a metrics label.
    pub fn kind(&self) -> &'static str {
        match self {
            BotError::Shop(err) => err.kind(),
            BotError::Flow(_) => "flow",
            BotError::Command(_) => "command",
            BotError::Store(_) => "internal",
        }
    }
}

const INTERNAL_MESSAGE: &str = "Something went wrong on our side. Please try again later.";
const BUSY_MESSAGE: &str = "The shop is busy right now. Please try again.";

fn shop_error_message(err: &ShopError) -> String {
    match err {
        ShopError::NotFound { entity, .. } => format!("{entity} not found."),
        ShopError::InsufficientStock { available: 0, .. } => {
            "Sorry, this product is out of stock.".to_string()
        }
        ShopError::InsufficientStock { available, .. } => {
            format!("Sorry, only {available} left in stock.")
        }
        ShopError::EmptyCart => "Your cart is empty.".to_string(),
        ShopError::InvalidTransition { from, to } => {
            format!("An order that is {from} cannot become {to}.")
        }
        ShopError::Forbidden { .. } => "This command is for administrators only.".to_string(),
        ShopError::Conflict(_) | ShopError::Timeout(_) => BUSY_MESSAGE.to_string(),
        ShopError::Validation(message) => message.clone(),
        ShopError::Store(inner) => {
            tracing::error!(error = %inner, "internal store error");
            INTERNAL_MESSAGE.to_string()
        }
    }
}
