//! Records persisted by the shop store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{MessageHandle, Money, OrderId, OrderStatus, ProductId, Result, StoreError, UserId};

/// A catalog product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    /// Base price per unit.
    pub price: Money,
    /// Discounted price per unit, never above `price`.
    pub discount_price: Option<Money>,
    /// Units available for checkout.
    pub stock: u32,
    /// Image URL or transport file reference.
    pub image: Option<String>,
}

impl Product {
    /// Price a customer pays per unit: the discount price when it is set and lower.
    pub fn effective_price(&self) -> Money {
        match self.discount_price {
            Some(discount) if discount < self.price => discount,
            _ => self.price,
        }
    }

    /// Size of the discount per unit, zero when there is none.
    pub fn discount(&self) -> Money {
        self.price - self.effective_price()
    }
}

/// Product data submitted by an administrator.
///
/// `id: None` inserts a new product; `Some(id)` replaces an existing one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDraft {
    pub id: Option<ProductId>,
    pub name: String,
    pub description: String,
    pub price: Money,
    pub discount_price: Option<Money>,
    pub stock: u32,
    pub image: Option<String>,
}

impl ProductDraft {
    /// Creates a draft for a new product with no description, discount, stock or image.
    pub fn new(name: impl Into<String>, price: Money) -> Self {
        Self {
            id: None,
            name: name.into(),
            description: String::new(),
            price,
            discount_price: None,
            stock: 0,
            image: None,
        }
    }

    /// Creates a draft that replaces the given product, starting from its current data.
    pub fn from_product(product: &Product) -> Self {
        Self {
            id: Some(product.id),
            name: product.name.clone(),
            description: product.description.clone(),
            price: product.price,
            discount_price: product.discount_price,
            stock: product.stock,
            image: product.image.clone(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_discount(mut self, discount_price: Money) -> Self {
        self.discount_price = Some(discount_price);
        self
    }

    pub fn with_stock(mut self, stock: u32) -> Self {
        self.stock = stock;
        self
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    /// Builds the stored product under the given id.
    pub fn into_product(self, id: ProductId) -> Product {
        Product {
            id,
            name: self.name,
            description: self.description,
            price: self.price,
            discount_price: self.discount_price,
            stock: self.stock,
            image: self.image,
        }
    }
}

/// A raw cart row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub user_id: UserId,
    pub product_id: ProductId,
    pub quantity: u32,
}

/// A cart line joined with the live product it refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: ProductId,
    pub name: String,
    /// Effective price at the time the cart was read.
    pub unit_price: Money,
    pub quantity: u32,
    /// Live stock at the time the cart was read.
    pub stock: u32,
}

impl CartItem {
    /// Builds the item view of a cart line.
    pub fn new(product: &Product, quantity: u32) -> Self {
        Self {
            product_id: product.id,
            name: product.name.clone(),
            unit_price: product.effective_price(),
            quantity,
            stock: product.stock,
        }
    }

    pub fn line_total(&self) -> Result<Money> {
        line_total(self.unit_price, self.quantity)
    }
}

fn line_total(unit_price: Money, quantity: u32) -> Result<Money> {
    unit_price.checked_multiply(quantity).ok_or_else(|| {
        StoreError::InvalidRecord(format!("Line total of {quantity} x {unit_price} is out of range"))
    })
}

/// Sums line totals, failing if any line or the sum is out of range.
pub fn sum_line_totals(totals: impl IntoIterator<Item = Result<Money>>) -> Result<Money> {
    let totals = totals.into_iter().collect::<Result<Vec<Money>>>()?;
    Money::checked_sum(totals)
        .ok_or_else(|| StoreError::InvalidRecord("Order total is out of range".to_string()))
}

/// An order line, snapshotted from the catalog when the order was committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Money,
}

impl OrderLine {
    pub fn line_total(&self) -> Result<Money> {
        line_total(self.unit_price, self.quantity)
    }
}

impl From<&CartItem> for OrderLine {
    fn from(item: &CartItem) -> Self {
        Self {
            product_id: item.product_id,
            product_name: item.name.clone(),
            quantity: item.quantity,
            unit_price: item.unit_price,
        }
    }
}

/// A committed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    /// Customer phone number.
    pub contact: String,
    pub lines: Vec<OrderLine>,
    pub total: Money,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    /// Admin-channel announcement to edit when the status changes.
    pub notification_handle: Option<MessageHandle>,
}

impl Order {
    /// Total number of units across all lines.
    pub fn total_quantity(&self) -> u32 {
        self.lines.iter().map(|line| line.quantity).sum()
    }
}

/// An order ready to be committed by [`crate::ShopStore::commit_order`].
///
/// The lines double as the expected cart contents: the commit fails with
/// [`crate::StoreError::StaleCart`] if the cart no longer matches them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub user_id: UserId,
    pub contact: String,
    pub lines: Vec<OrderLine>,
    pub total: Money,
    pub created_at: DateTime<Utc>,
}

impl NewOrder {
    /// Snapshots the given cart items into an order.
    ///
    /// Fails with `InvalidRecord` if the total does not fit in [`Money`].
    pub fn from_cart(
        user_id: UserId,
        contact: impl Into<String>,
        items: &[CartItem],
        created_at: DateTime<Utc>,
    ) -> Result<Self> {
        let lines: Vec<OrderLine> = items.iter().map(OrderLine::from).collect();
        let total = sum_line_totals(lines.iter().map(OrderLine::line_total))?;
        Ok(Self {
            user_id,
            contact: contact.into(),
            lines,
            total,
            created_at,
        })
    }

    /// Builds the stored order under the given id, in its initial status.
    pub fn into_order(self, id: OrderId) -> Order {
        Order {
            id,
            user_id: self.user_id,
            contact: self.contact,
            lines: self.lines,
            total: self.total,
            status: OrderStatus::Pending,
            created_at: self.created_at,
            notification_handle: None,
        }
    }
}

/// Persisted conversation state of a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub state: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(price: i64, discount: Option<i64>) -> Product {
        let mut draft = ProductDraft::new("Tea", Money::from_major(price)).with_stock(3);
        if let Some(discount) = discount {
            draft = draft.with_discount(Money::from_major(discount));
        }
        draft.into_product(ProductId::new(1))
    }

    #[test]
    fn effective_price_prefers_lower_discount() {
        assert_eq!(product(100, Some(80)).effective_price(), Money::from_major(80));
        assert_eq!(product(100, Some(80)).discount(), Money::from_major(20));
    }

    #[test]
    fn effective_price_ignores_missing_or_equal_discount() {
        assert_eq!(product(100, None).effective_price(), Money::from_major(100));
        assert_eq!(product(100, Some(100)).effective_price(), Money::from_major(100));
        assert!(product(100, None).discount().is_zero());
    }

    #[test]
    fn new_order_snapshots_cart_total() {
        let tea = product(100, Some(90));
        let items = vec![CartItem::new(&tea, 3)];
        let order = NewOrder::from_cart(UserId::new(5), "+100", &items, Utc::now()).unwrap();

        assert_eq!(order.total, Money::from_major(270));
        assert_eq!(order.lines[0].product_name, "Tea");
        assert_eq!(order.lines[0].unit_price, Money::from_major(90));

        let order = order.into_order(OrderId::new(1));
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total_quantity(), 3);
    }

    #[test]
    fn new_order_rejects_total_out_of_range() {
        let pricey = ProductDraft::new("Gold", Money::from_minor(i64::MAX / 2))
            .with_stock(5)
            .into_product(ProductId::new(2));

        let overflowing = vec![CartItem::new(&pricey, 3)];
        assert!(matches!(
            NewOrder::from_cart(UserId::new(5), "+100", &overflowing, Utc::now()),
            Err(StoreError::InvalidRecord(_))
        ));

        let two_lines = vec![CartItem::new(&pricey, 1), CartItem::new(&pricey, 1)];
        assert!(CartItem::new(&pricey, 1).line_total().is_ok());
        assert!(NewOrder::from_cart(UserId::new(5), "+100", &two_lines, Utc::now()).is_ok());
    }
}
