use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    CartItem, CartLine, MessageHandle, NewOrder, Order, OrderId, OrderLine, OrderStatus,
    Product, ProductDraft, ProductId, Result, SessionRecord, StoreError, UserId,
    store::{ShopStore, cart_matches, validate_new_order},
};

#[derive(Debug, Default)]
struct ShopState {
    products: BTreeMap<ProductId, Product>,
    last_product_id: i64,
    /// Cart lines per user, in insertion order.
    carts: HashMap<UserId, Vec<CartLine>>,
    orders: BTreeMap<OrderId, Order>,
    last_order_id: i64,
    favorites: HashMap<UserId, Vec<ProductId>>,
    sessions: HashMap<UserId, SessionRecord>,
    /// Number of upcoming commits to reject with `Busy`.
    injected_conflicts: u32,
}

impl ShopState {
    fn product(&self, id: ProductId) -> Result<&Product> {
        self.products.get(&id).ok_or(StoreError::ProductNotFound(id))
    }

    fn cart_quantity(&self, user_id: UserId, product_id: ProductId) -> u32 {
        self.carts
            .get(&user_id)
            .and_then(|lines| lines.iter().find(|l| l.product_id == product_id))
            .map(|l| l.quantity)
            .unwrap_or(0)
    }

    fn put_cart_line(&mut self, line: CartLine) {
        let lines = self.carts.entry(line.user_id).or_default();
        match lines.iter_mut().find(|l| l.product_id == line.product_id) {
            Some(existing) => existing.quantity = line.quantity,
            None => lines.push(line),
        }
    }
}

/// In-memory shop store for tests and benchmarks.
///
/// A single lock guards the whole state, so every operation is serializable.
#[derive(Clone, Default)]
pub struct InMemoryShopStore {
    state: Arc<RwLock<ShopState>>,
}

impl InMemoryShopStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` calls to `commit_order` fail with `Busy`.
    pub async fn inject_conflicts(&self, count: u32) {
        self.state.write().await.injected_conflicts = count;
    }

    /// Returns the total number of committed orders.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }
}

#[async_trait]
impl ShopStore for InMemoryShopStore {
    async fn upsert_product(&self, draft: ProductDraft) -> Result<Product> {
        let mut state = self.state.write().await;

        let id = match draft.id {
            Some(id) => {
                state.product(id)?;
                id
            }
            None => {
                state.last_product_id += 1;
                ProductId::new(state.last_product_id)
            }
        };

        let product = draft.into_product(id);
        state.products.insert(id, product.clone());
        Ok(product)
    }

    async fn delete_product(&self, id: ProductId) -> Result<()> {
        let mut state = self.state.write().await;
        if state.products.remove(&id).is_none() {
            return Err(StoreError::ProductNotFound(id));
        }

        for lines in state.carts.values_mut() {
            lines.retain(|l| l.product_id != id);
        }
        for favorites in state.favorites.values_mut() {
            favorites.retain(|p| *p != id);
        }
        Ok(())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.state.read().await.products.get(&id).cloned())
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        Ok(self.state.read().await.products.values().cloned().collect())
    }

    async fn adjust_stock(&self, id: ProductId, delta: i64) -> Result<Product> {
        let mut state = self.state.write().await;
        let product = state
            .products
            .get_mut(&id)
            .ok_or(StoreError::ProductNotFound(id))?;

        let new_stock = i64::from(product.stock) + delta;
        if new_stock < 0 {
            return Err(StoreError::InsufficientStock {
                product_id: id,
                requested: u32::try_from(delta.unsigned_abs()).unwrap_or(u32::MAX),
                available: product.stock,
            });
        }
        product.stock = u32::try_from(new_stock)
            .map_err(|_| StoreError::InvalidRecord(format!("Stock overflow for product {id}")))?;
        Ok(product.clone())
    }

    async fn add_to_cart(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartLine> {
        let mut state = self.state.write().await;
        let available = state.product(product_id)?.stock;
        let requested = state
            .cart_quantity(user_id, product_id)
            .saturating_add(quantity);

        if requested > available {
            return Err(StoreError::InsufficientStock {
                product_id,
                requested,
                available,
            });
        }

        let line = CartLine {
            user_id,
            product_id,
            quantity: requested,
        };
        state.put_cart_line(line);
        Ok(line)
    }

    async fn set_cart_quantity(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartLine> {
        let mut state = self.state.write().await;
        let available = state.product(product_id)?.stock;

        if quantity > available {
            return Err(StoreError::InsufficientStock {
                product_id,
                requested: quantity,
                available,
            });
        }

        let line = CartLine {
            user_id,
            product_id,
            quantity,
        };
        state.put_cart_line(line);
        Ok(line)
    }

    async fn remove_from_cart(&self, user_id: UserId, product_id: ProductId) -> Result<bool> {
        let mut state = self.state.write().await;
        let Some(lines) = state.carts.get_mut(&user_id) else {
            return Ok(false);
        };
        let before = lines.len();
        lines.retain(|l| l.product_id != product_id);
        Ok(lines.len() != before)
    }

    async fn cart_items(&self, user_id: UserId) -> Result<Vec<CartItem>> {
        let state = self.state.read().await;
        let Some(lines) = state.carts.get(&user_id) else {
            return Ok(Vec::new());
        };

        Ok(lines
            .iter()
            .filter_map(|line| {
                state
                    .products
                    .get(&line.product_id)
                    .map(|product| CartItem::new(product, line.quantity))
            })
            .collect())
    }

    async fn clear_cart(&self, user_id: UserId) -> Result<u64> {
        let mut state = self.state.write().await;
        Ok(state
            .carts
            .remove(&user_id)
            .map(|lines| lines.len() as u64)
            .unwrap_or(0))
    }

    async fn commit_order(&self, order: NewOrder) -> Result<Order> {
        validate_new_order(&order)?;

        let mut state = self.state.write().await;

        if state.injected_conflicts > 0 {
            state.injected_conflicts -= 1;
            return Err(StoreError::Busy);
        }

        // The cart as it reads now, priced and named from the live catalog.
        let live: Vec<OrderLine> = state
            .carts
            .get(&order.user_id)
            .map(|lines| {
                lines
                    .iter()
                    .filter_map(|line| {
                        let product = state.products.get(&line.product_id)?;
                        Some(OrderLine::from(&CartItem::new(product, line.quantity)))
                    })
                    .collect()
            })
            .unwrap_or_default();
        if !cart_matches(&order, &live) {
            return Err(StoreError::StaleCart(order.user_id));
        }

        // Validate every line before touching any stock.
        for line in &order.lines {
            let available = state.product(line.product_id)?.stock;
            if line.quantity > available {
                return Err(StoreError::InsufficientStock {
                    product_id: line.product_id,
                    requested: line.quantity,
                    available,
                });
            }
        }

        for line in &order.lines {
            if let Some(product) = state.products.get_mut(&line.product_id) {
                product.stock -= line.quantity;
            }
        }

        state.last_order_id += 1;
        let id = OrderId::new(state.last_order_id);
        state.carts.remove(&order.user_id);

        let order = order.into_order(id);
        state.orders.insert(id, order.clone());
        Ok(order)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(&id).cloned())
    }

    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .values()
            .rev()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn list_orders(&self, status: Option<OrderStatus>) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .values()
            .rev()
            .filter(|o| status.is_none_or(|s| o.status == s))
            .cloned()
            .collect())
    }

    async fn update_order_status(
        &self,
        id: OrderId,
        expected: OrderStatus,
        status: OrderStatus,
    ) -> Result<Order> {
        let mut state = self.state.write().await;
        let order = state
            .orders
            .get_mut(&id)
            .ok_or(StoreError::OrderNotFound(id))?;

        if order.status != expected {
            return Err(StoreError::StatusConflict {
                order_id: id,
                expected,
                actual: order.status,
            });
        }

        order.status = status;
        Ok(order.clone())
    }

    async fn set_notification_handle(&self, id: OrderId, handle: MessageHandle) -> Result<()> {
        let mut state = self.state.write().await;
        let order = state
            .orders
            .get_mut(&id)
            .ok_or(StoreError::OrderNotFound(id))?;
        order.notification_handle = Some(handle);
        Ok(())
    }

    async fn add_favorite(&self, user_id: UserId, product_id: ProductId) -> Result<bool> {
        let mut state = self.state.write().await;
        state.product(product_id)?;

        let favorites = state.favorites.entry(user_id).or_default();
        if favorites.contains(&product_id) {
            return Ok(false);
        }
        favorites.push(product_id);
        Ok(true)
    }

    async fn remove_favorite(&self, user_id: UserId, product_id: ProductId) -> Result<bool> {
        let mut state = self.state.write().await;
        let Some(favorites) = state.favorites.get_mut(&user_id) else {
            return Ok(false);
        };
        let before = favorites.len();
        favorites.retain(|p| *p != product_id);
        Ok(favorites.len() != before)
    }

    async fn favorites(&self, user_id: UserId) -> Result<Vec<Product>> {
        let state = self.state.read().await;
        Ok(state
            .favorites
            .get(&user_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| state.products.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn load_session(&self, user_id: UserId) -> Result<Option<SessionRecord>> {
        Ok(self.state.read().await.sessions.get(&user_id).cloned())
    }

    async fn save_session(&self, user_id: UserId, session: SessionRecord) -> Result<()> {
        self.state.write().await.sessions.insert(user_id, session);
        Ok(())
    }

    async fn clear_session(&self, user_id: UserId) -> Result<()> {
        self.state.write().await.sessions.remove(&user_id);
        Ok(())
    }
}
