//! Catalog of products.

use common::{Money, ProductId};
use store::{Product, ProductDraft, ShopStore, ShopStoreExt};

use crate::{Result, ShopError};

/// Validates administrator input before it reaches the store.
pub fn validate_draft(draft: &ProductDraft) -> Result<()> {
    if draft.name.trim().is_empty() {
        return Err(ShopError::Validation(
            "Product name must not be empty".to_string(),
        ));
    }

    if draft.price.is_negative() {
        return Err(ShopError::Validation(format!(
            "Price must not be negative, got {}",
            draft.price
        )));
    }

    if draft.price > Money::MAX_PRICE {
        return Err(ShopError::Validation(format!(
            "Price must not exceed {}, got {}",
            Money::MAX_PRICE,
            draft.price
        )));
    }

    if let Some(discount) = draft.discount_price {
        if discount.is_negative() {
            return Err(ShopError::Validation(format!(
                "Discount price must not be negative, got {discount}"
            )));
        }
        if discount > draft.price {
            return Err(ShopError::Validation(format!(
                "Discount price {discount} exceeds base price {}",
                draft.price
            )));
        }
    }

    Ok(())
}

/// Product records: prices, discounts and stock.
#[derive(Clone)]
pub struct Catalog<S: ShopStore> {
    store: S,
}

impl<S: ShopStore> Catalog<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Inserts a new product or replaces an existing one.
    #[tracing::instrument(skip(self, draft), fields(product_id = ?draft.id, name = %draft.name))]
    pub async fn upsert(&self, draft: ProductDraft) -> Result<Product> {
        validate_draft(&draft)?;
        let product = self.store.upsert_product(draft).await?;
        tracing::info!(product_id = %product.id, "Product saved");
        Ok(product)
    }

    /// Deletes a product. Orders keep their snapshot of it.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, id: ProductId) -> Result<()> {
        self.store.delete_product(id).await?;
        tracing::info!("Product deleted");
        Ok(())
    }

    pub async fn get(&self, id: ProductId) -> Result<Product> {
        Ok(self.store.require_product(id).await?)
    }

    pub async fn list(&self) -> Result<Vec<Product>> {
        Ok(self.store.list_products().await?)
    }

    /// Adds `delta` to a product's stock; fails with `InsufficientStock` below zero.
    #[tracing::instrument(skip(self))]
    pub async fn adjust_stock(&self, id: ProductId, delta: i64) -> Result<Product> {
        Ok(self.store.adjust_stock(id, delta).await?)
    }

    /// Products on discount, largest discount first.
    pub async fn discounted(&self) -> Result<Vec<Product>> {
        let mut products: Vec<Product> = self
            .store
            .list_products()
            .await?
            .into_iter()
            .filter(|p| !p.discount().is_zero())
            .collect();
        products.sort_by(|a, b| b.discount().cmp(&a.discount()).then(a.id.cmp(&b.id)));
        Ok(products)
    }
}
