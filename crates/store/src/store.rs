use std::collections::HashSet;

use async_trait::async_trait;

use crate::{
    CartItem, CartLine, MessageHandle, Money, NewOrder, Order, OrderId, OrderLine, OrderStatus,
    Product, ProductDraft, ProductId, Result, SessionRecord, StoreError, UserId, sum_line_totals,
};

/// Core trait for shop storage implementations.
///
/// Every method is one short transaction. Implementations must be thread-safe
/// (Send + Sync) and must never let stock go negative.
#[async_trait]
pub trait ShopStore: Send + Sync {
    /// Inserts a new product (`draft.id == None`) or replaces an existing one.
    ///
    /// Fails with `ProductNotFound` when replacing an id that does not exist.
    async fn upsert_product(&self, draft: ProductDraft) -> Result<Product>;

    /// Deletes a product together with the cart lines and favorites that refer to it.
    ///
    /// Orders keep their snapshotted lines.
    async fn delete_product(&self, id: ProductId) -> Result<()>;

    /// Retrieves a product, or None if it doesn't exist.
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>>;

    /// Lists all products ordered by id.
    async fn list_products(&self) -> Result<Vec<Product>>;

    /// Adds `delta` (possibly negative) to the stock of a product.
    ///
    /// Fails with `InsufficientStock` if the result would be negative; the
    /// stock is then left untouched.
    async fn adjust_stock(&self, id: ProductId, delta: i64) -> Result<Product>;

    /// Adds `quantity` units to a cart line, creating it if needed.
    ///
    /// Fails with `InsufficientStock` if the resulting line would exceed the
    /// product's live stock.
    async fn add_to_cart(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartLine>;

    /// Sets a cart line to exactly `quantity` (> 0) units, creating it if needed.
    async fn set_cart_quantity(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartLine>;

    /// Removes a cart line. Returns false if there was none.
    async fn remove_from_cart(&self, user_id: UserId, product_id: ProductId) -> Result<bool>;

    /// Returns the user's cart joined with live product data, in insertion order.
    async fn cart_items(&self, user_id: UserId) -> Result<Vec<CartItem>>;

    /// Removes every cart line of the user. Returns how many were removed.
    async fn clear_cart(&self, user_id: UserId) -> Result<u64>;

    /// Commits an order atomically.
    ///
    /// In one transaction: checks that the user's cart still holds exactly the
    /// order's lines (`StaleCart` otherwise), decrements stock for every line
    /// (`InsufficientStock` for the first line that cannot be served), inserts
    /// the order in `Pending` status and clears the cart. Either all of it
    /// happens or none of it does.
    async fn commit_order(&self, order: NewOrder) -> Result<Order>;

    /// Retrieves an order, or None if it doesn't exist.
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;

    /// Lists the orders of a user, newest first.
    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>>;

    /// Lists all orders, optionally filtered by status, newest first.
    async fn list_orders(&self, status: Option<OrderStatus>) -> Result<Vec<Order>>;

    /// Compare-and-set of an order's status.
    ///
    /// Fails with `StatusConflict` if the current status is not `expected`.
    async fn update_order_status(
        &self,
        id: OrderId,
        expected: OrderStatus,
        status: OrderStatus,
    ) -> Result<Order>;

    /// Records the handle of the message announcing an order.
    async fn set_notification_handle(&self, id: OrderId, handle: MessageHandle) -> Result<()>;

    /// Adds a product to the user's favorites. Returns false if it was already there.
    async fn add_favorite(&self, user_id: UserId, product_id: ProductId) -> Result<bool>;

    /// Removes a product from the user's favorites. Returns false if it wasn't there.
    async fn remove_favorite(&self, user_id: UserId, product_id: ProductId) -> Result<bool>;

    /// Lists the user's favorite products in the order they were added.
    async fn favorites(&self, user_id: UserId) -> Result<Vec<Product>>;

    /// Loads the user's conversation state.
    async fn load_session(&self, user_id: UserId) -> Result<Option<SessionRecord>>;

    /// Stores the user's conversation state, replacing any previous one.
    async fn save_session(&self, user_id: UserId, session: SessionRecord) -> Result<()>;

    /// Forgets the user's conversation state.
    async fn clear_session(&self, user_id: UserId) -> Result<()>;
}

/// Extension trait providing convenience methods for shop stores.
#[async_trait]
pub trait ShopStoreExt: ShopStore {
    /// Retrieves a product, failing with `ProductNotFound` if it doesn't exist.
    async fn require_product(&self, id: ProductId) -> Result<Product> {
        self.get_product(id)
            .await?
            .ok_or(StoreError::ProductNotFound(id))
    }

    /// Retrieves an order, failing with `OrderNotFound` if it doesn't exist.
    async fn require_order(&self, id: OrderId) -> Result<Order> {
        self.get_order(id).await?.ok_or(StoreError::OrderNotFound(id))
    }

    /// Sum of the cart's line totals at current prices.
    async fn cart_total(&self, user_id: UserId) -> Result<Money> {
        let items = self.cart_items(user_id).await?;
        sum_line_totals(items.iter().map(CartItem::line_total))
    }
}

// Blanket implementation for all ShopStore implementations
impl<T: ShopStore + ?Sized> ShopStoreExt for T {}

/// Validates an order before committing it.
pub fn validate_new_order(order: &NewOrder) -> Result<()> {
    if order.lines.is_empty() {
        return Err(StoreError::InvalidRecord(
            "Cannot commit an order without lines".to_string(),
        ));
    }

    if order.contact.trim().is_empty() {
        return Err(StoreError::InvalidRecord(
            "Order contact must not be empty".to_string(),
        ));
    }

    let mut seen = HashSet::with_capacity(order.lines.len());
    for line in &order.lines {
        if line.quantity == 0 {
            return Err(StoreError::InvalidRecord(format!(
                "Order line for product {} has zero quantity",
                line.product_id
            )));
        }
        if !seen.insert(line.product_id) {
            return Err(StoreError::InvalidRecord(format!(
                "Product {} appears twice in the order",
                line.product_id
            )));
        }
    }

    let expected_total = sum_line_totals(order.lines.iter().map(OrderLine::line_total))?;
    if expected_total != order.total {
        return Err(StoreError::InvalidRecord(format!(
            "Order total {} does not match its lines ({expected_total})",
            order.total
        )));
    }

    Ok(())
}

/// Returns true if the order's lines equal the cart as it reads now.
///
/// Lines are compared whole: a product renamed or repriced since the order
/// was built makes the cart stale just like a changed quantity.
pub(crate) fn cart_matches(order: &NewOrder, live: &[OrderLine]) -> bool {
    live.len() == order.lines.len() && order.lines.iter().all(|line| live.contains(line))
}
