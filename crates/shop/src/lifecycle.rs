//! Order status transitions and order queries.

use common::{OrderId, OrderStatus, UserId};
use store::{Order, ShopStore, ShopStoreExt, StoreError};

use crate::{Actor, Notifier, Result, ShopError, ShopEvent};

/// Moves orders through their lifecycle and tells subscribers about it.
pub struct OrderLifecycle<S: ShopStore, N: Notifier> {
    store: S,
    notifier: N,
}

impl<S: ShopStore, N: Notifier> OrderLifecycle<S, N> {
    pub fn new(store: S, notifier: N) -> Self {
        Self { store, notifier }
    }

    /// Sets the status of an order. Administrators only.
    ///
    /// The update is a compare-and-set on the status that was read; if another
    /// administrator changed it in between, the transition is re-checked once
    /// against the fresh status.
    #[tracing::instrument(skip(self, actor), fields(actor = %actor.user_id))]
    pub async fn set_status(
        &self,
        order_id: OrderId,
        status: OrderStatus,
        actor: &Actor,
    ) -> Result<Order> {
        actor.require_admin("change order status")?;

        let mut retried = false;
        let (previous, order) = loop {
            let current = self.store.require_order(order_id).await?;
            if !current.status.can_transition_to(status) {
                return Err(ShopError::InvalidTransition {
                    from: current.status,
                    to: status,
                });
            }

            match self
                .store
                .update_order_status(order_id, current.status, status)
                .await
            {
                Ok(order) => break (current.status, order),
                Err(StoreError::StatusConflict { actual, .. }) if !retried => {
                    tracing::warn!(%actual, "Order status changed concurrently, retrying");
                    retried = true;
                }
                Err(e) => return Err(e.into()),
            }
        };

        metrics::counter!("order_status_changes_total", "status" => status.as_str()).increment(1);
        tracing::info!(%previous, %status, "Order status changed");

        let event = ShopEvent::StatusChanged {
            order_id,
            user_id: order.user_id,
            previous,
            status,
            handle: order.notification_handle,
        };
        if let Err(e) = self.notifier.notify(event).await {
            tracing::error!(error = %e, "Failed to publish status change");
        }

        Ok(order)
    }

    /// Retrieves an order visible to the actor: their own, or any for administrators.
    pub async fn get(&self, order_id: OrderId, actor: &Actor) -> Result<Order> {
        let order = self.store.require_order(order_id).await?;
        if order.user_id != actor.user_id && !actor.is_admin() {
            return Err(ShopError::Forbidden {
                action: "view another user's order",
            });
        }
        Ok(order)
    }

    /// Orders placed by a user, newest first.
    pub async fn orders_for(&self, user_id: UserId) -> Result<Vec<Order>> {
        Ok(self.store.orders_for_user(user_id).await?)
    }

    /// All orders, optionally with one status, newest first. Administrators only.
    pub async fn list(&self, actor: &Actor, status: Option<OrderStatus>) -> Result<Vec<Order>> {
        actor.require_admin("list all orders")?;
        Ok(self.store.list_orders(status).await?)
    }
}
