//! Converting carts into orders.

use std::time::Instant;

use chrono::Utc;
use common::UserId;
use store::{NewOrder, Order, ShopStore};

use crate::{Notifier, Result, ShopError, ShopEvent};

/// Turns a user's cart into a committed order.
///
/// The commit itself is one store transaction: stock for every line is taken,
/// the order is recorded and the cart is cleared, or nothing happens.
pub struct OrderEngine<S: ShopStore, N: Notifier> {
    store: S,
    notifier: N,
}

impl<S: ShopStore, N: Notifier> OrderEngine<S, N> {
    pub fn new(store: S, notifier: N) -> Self {
        Self { store, notifier }
    }

    /// Places an order for everything in the user's cart.
    ///
    /// A checkout that loses a race against a concurrent cart change is
    /// retried once against the fresh cart before the conflict is surfaced.
    #[tracing::instrument(skip(self, contact))]
    pub async fn checkout(&self, user_id: UserId, contact: &str) -> Result<Order> {
        let started = Instant::now();

        let result = match self.commit(user_id, contact).await {
            Err(e) if e.is_conflict() => {
                tracing::warn!(error = %e, "Checkout conflict, retrying");
                self.commit(user_id, contact).await
            }
            other => other,
        };

        metrics::histogram!("checkout_duration_seconds").record(started.elapsed().as_secs_f64());

        match result {
            Ok(order) => {
                metrics::counter!("checkouts_total").increment(1);
                tracing::info!(order_id = %order.id, total = %order.total, "Order placed");
                Ok(self.announce(order).await)
            }
            Err(e) => {
                metrics::counter!("checkout_failures_total", "reason" => e.kind()).increment(1);
                tracing::info!(error = %e, "Checkout failed");
                Err(e)
            }
        }
    }

    async fn commit(&self, user_id: UserId, contact: &str) -> Result<Order> {
        let contact = contact.trim();
        if contact.is_empty() {
            return Err(ShopError::Validation(
                "A contact phone number is required".to_string(),
            ));
        }

        let items = self.store.cart_items(user_id).await?;
        if items.is_empty() {
            return Err(ShopError::EmptyCart);
        }

        // Cheap early rejection; the store re-checks under its write lock.
        if let Some(item) = items.iter().find(|item| item.quantity > item.stock) {
            return Err(ShopError::InsufficientStock {
                product_id: item.product_id,
                requested: item.quantity,
                available: item.stock,
            });
        }

        let order = NewOrder::from_cart(user_id, contact, &items, Utc::now())?;
        Ok(self.store.commit_order(order).await?)
    }

    /// Publishes `OrderPlaced` and stores the announcement handle.
    ///
    /// The order is already committed; delivery problems are only logged.
    async fn announce(&self, mut order: Order) -> Order {
        let handle = match self
            .notifier
            .notify(ShopEvent::OrderPlaced(order.clone()))
            .await
        {
            Ok(Some(handle)) => handle,
            Ok(None) => return order,
            Err(e) => {
                tracing::error!(order_id = %order.id, error = %e, "Failed to announce order");
                return order;
            }
        };

        match self.store.set_notification_handle(order.id, handle).await {
            Ok(()) => order.notification_handle = Some(handle),
            Err(e) => {
                tracing::error!(order_id = %order.id, error = %e, "Failed to store announcement handle")
            }
        }
        order
    }
}
