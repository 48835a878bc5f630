use std::time::Duration;

use thiserror::Error;

use crate::{OrderId, OrderStatus, ProductId, UserId};

/// Errors that can occur when interacting with the shop store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The product does not exist.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// The order does not exist.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The requested quantity exceeds the current stock of a product.
    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// The user's cart changed between reading it and committing the order.
    #[error("Cart of user {0} changed during checkout")]
    StaleCart(UserId),

    /// The order's status changed between reading it and updating it.
    #[error("Status conflict for order {order_id}: expected {expected}, found {actual}")]
    StatusConflict {
        order_id: OrderId,
        expected: OrderStatus,
        actual: OrderStatus,
    },

    /// The database refused the write because another transaction holds the lock.
    #[error("Database is busy")]
    Busy,

    /// The transaction did not commit within the configured bound.
    #[error("Transaction timed out after {0:?}")]
    Timeout(Duration),

    /// A record failed validation on its way into or out of the store.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Returns true for failures caused by a concurrent writer; retrying may succeed.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StoreError::StaleCart(_) | StoreError::StatusConflict { .. } | StoreError::Busy
        )
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        // SQLITE_BUSY (5) and SQLITE_LOCKED (6), including their extended codes.
        if let sqlx::Error::Database(ref db_err) = e
            && let Some(code) = db_err.code()
            && let Ok(code) = code.parse::<i32>()
            && matches!(code & 0xff, 5 | 6)
        {
            return StoreError::Busy;
        }
        StoreError::Database(e)
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_classification() {
        assert!(StoreError::Busy.is_conflict());
        assert!(StoreError::StaleCart(UserId::new(1)).is_conflict());
        assert!(!StoreError::ProductNotFound(ProductId::new(1)).is_conflict());
        assert!(!StoreError::Timeout(Duration::from_secs(1)).is_conflict());
    }
}
