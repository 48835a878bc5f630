//! Per-user favorite products.

use common::{ProductId, UserId};
use store::{Product, ShopStore};

use crate::Result;

#[derive(Clone)]
pub struct Favorites<S: ShopStore> {
    store: S,
}

impl<S: ShopStore> Favorites<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Marks a product as favorite. Returns false if it already was.
    pub async fn add(&self, user_id: UserId, product_id: ProductId) -> Result<bool> {
        Ok(self.store.add_favorite(user_id, product_id).await?)
    }

    /// Returns false if the product was not a favorite.
    pub async fn remove(&self, user_id: UserId, product_id: ProductId) -> Result<bool> {
        Ok(self.store.remove_favorite(user_id, product_id).await?)
    }

    pub async fn list(&self, user_id: UserId) -> Result<Vec<Product>> {
        Ok(self.store.favorites(user_id).await?)
    }
}
