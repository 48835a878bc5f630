//! Per-user shopping carts.

use common::{Money, ProductId, UserId};
use serde::Serialize;
use store::{CartItem, CartLine, ShopStore};

use crate::{Result, ShopError};

/// A cart with its total at current prices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartSummary {
    pub items: Vec<CartItem>,
    pub total: Money,
}

impl CartSummary {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn total_quantity(&self) -> u32 {
        self.items.iter().map(|item| item.quantity).sum()
    }
}

/// Cart mutations, checked against live stock.
///
/// Carts express intent only; stock is taken at checkout.
#[derive(Clone)]
pub struct CartLedger<S: ShopStore> {
    store: S,
}

impl<S: ShopStore> CartLedger<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Adds `quantity` units; the resulting line may not exceed live stock.
    #[tracing::instrument(skip(self))]
    pub async fn add_item(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartLine> {
        if quantity == 0 {
            return Err(ShopError::Validation(
                "Quantity to add must be positive".to_string(),
            ));
        }
        Ok(self.store.add_to_cart(user_id, product_id, quantity).await?)
    }

    /// Sets a line to exactly `quantity` units. Zero or less removes the line.
    ///
    /// Returns the line, or None if it was removed.
    #[tracing::instrument(skip(self))]
    pub async fn set_quantity(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<Option<CartLine>> {
        if quantity <= 0 {
            self.remove_item(user_id, product_id).await?;
            return Ok(None);
        }

        let quantity = u32::try_from(quantity)
            .map_err(|_| ShopError::Validation(format!("Quantity {quantity} is too large")))?;
        let line = self
            .store
            .set_cart_quantity(user_id, product_id, quantity)
            .await?;
        Ok(Some(line))
    }

    /// Removes a line. Returns false if there was none.
    pub async fn remove_item(&self, user_id: UserId, product_id: ProductId) -> Result<bool> {
        Ok(self.store.remove_from_cart(user_id, product_id).await?)
    }

    /// The cart at current prices, in insertion order.
    pub async fn list_items(&self, user_id: UserId) -> Result<Vec<CartItem>> {
        Ok(self.store.cart_items(user_id).await?)
    }

    /// Empties the cart. Clearing an empty cart is not an error.
    pub async fn clear(&self, user_id: UserId) -> Result<()> {
        self.store.clear_cart(user_id).await?;
        Ok(())
    }

    /// Adds one unit.
    pub async fn increment(&self, user_id: UserId, product_id: ProductId) -> Result<CartLine> {
        self.add_item(user_id, product_id, 1).await
    }

    /// Removes one unit; the line disappears when it reaches zero.
    ///
    /// Returns the remaining line, or None if there is none.
    pub async fn decrement(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<Option<CartLine>> {
        let current = self
            .list_items(user_id)
            .await?
            .into_iter()
            .find(|item| item.product_id == product_id)
            .map(|item| item.quantity);

        match current {
            Some(quantity) => {
                self.set_quantity(user_id, product_id, i64::from(quantity) - 1)
                    .await
            }
            None => Ok(None),
        }
    }

    pub async fn summary(&self, user_id: UserId) -> Result<CartSummary> {
        let items = self.list_items(user_id).await?;
        let total = store::sum_line_totals(items.iter().map(CartItem::line_total))?;
        Ok(CartSummary { items, total })
    }
}
