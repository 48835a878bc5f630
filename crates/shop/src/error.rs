//! Storefront error types.

use std::time::Duration;

use common::{OrderStatus, ProductId};
use store::StoreError;
use thiserror::Error;

/// Errors returned by the storefront components.
#[derive(Debug, Error)]
pub enum ShopError {
    /// A product or order does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// The requested quantity exceeds the live stock of a product.
    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// Checkout was attempted with an empty cart.
    #[error("Cart is empty")]
    EmptyCart,

    /// The order lifecycle has no edge between the two statuses.
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// The actor is not allowed to perform the action.
    #[error("Forbidden: {action}")]
    Forbidden { action: &'static str },

    /// A concurrent writer changed the data; the operation was retried and still lost.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Malformed input.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The transaction did not commit in time and was rolled back.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// An internal storage error.
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl ShopError {
    /// Short machine-readable name of the error kind, used as a metrics label.
    pub fn kind(&self) -> &'static str {
        match self {
            ShopError::NotFound { .. } => "not_found",
            ShopError::InsufficientStock { .. } => "insufficient_stock",
            ShopError::EmptyCart => "empty_cart",
            ShopError::InvalidTransition { .. } => "invalid_transition",
            ShopError::Forbidden { .. } => "forbidden",
            ShopError::Conflict(_) => "conflict",
            ShopError::Validation(_) => "validation",
            ShopError::Timeout(_) => "timeout",
            ShopError::Store(_) => "internal",
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ShopError::Conflict(_))
    }

    pub(crate) fn product_not_found(id: ProductId) -> Self {
        ShopError::NotFound {
            entity: "Product",
            id: id.get(),
        }
    }
}

impl From<StoreError> for ShopError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::ProductNotFound(id) => ShopError::product_not_found(id),
            StoreError::OrderNotFound(id) => ShopError::NotFound {
                entity: "Order",
                id: id.get(),
            },
            StoreError::InsufficientStock {
                product_id,
                requested,
                available,
            } => ShopError::InsufficientStock {
                product_id,
                requested,
                available,
            },
            StoreError::StaleCart(_) | StoreError::StatusConflict { .. } | StoreError::Busy => {
                ShopError::Conflict(e.to_string())
            }
            StoreError::Timeout(after) => ShopError::Timeout(after),
            StoreError::InvalidRecord(message) => ShopError::Validation(message),
            other => ShopError::Store(other),
        }
    }
}

/// Result type for storefront operations.
pub type Result<T> = std::result::Result<T, ShopError>;
