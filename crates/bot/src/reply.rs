//! Outgoing messages and their plain-text rendering.

use common::{ChatId, Money, OrderStatus};
use serde::{Deserialize, Serialize};
use shop::CartSummary;
use store::{Order, Product, StoreError};

use crate::command::Command;

/// An inline button. Pressing it sends `callback_data` back as a callback event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub label: String,
    pub callback_data: String,
}

impl Button {
    pub fn new(label: impl Into<String>, command: &Command) -> Self {
        Self {
            label: label.into(),
            callback_data: command
                .callback_data()
                .unwrap_or_else(|| "ignore".to_string()),
        }
    }
}

/// A message for the transport to deliver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub chat_id: ChatId,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buttons: Vec<Vec<Button>>,
}

impl Reply {
    pub fn text(chat_id: ChatId, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            text: text.into(),
            photo: None,
            buttons: Vec::new(),
        }
    }

    pub fn with_photo(mut self, photo: Option<String>) -> Self {
        self.photo = photo;
        self
    }

    /// Appends a row of buttons. Empty rows are skipped.
    pub fn with_row(mut self, row: Vec<Button>) -> Self {
        if !row.is_empty() {
            self.buttons.push(row);
        }
        self
    }
}

pub const HELP_TEXT: &str = "\
Browse with /catalog or the menu.
/cart shows your cart, /checkout places the order.
/my_orders lists your orders, /favorites your saved products.
/discounts shows products on sale, /contacts how to reach us.
/cancel stops whatever you are doing.";

pub const ADMIN_HELP_TEXT: &str = "\
Admin commands:
/add_product starts a new product
/delete_product <id>
/restock <id> <change>
/stock lists stock levels
/all_orders [status]
/set_status <order> <status>";

pub fn menu_rows() -> Vec<Vec<Button>> {
    vec![
        vec![
            Button::new("Catalog", &Command::Catalog),
            Button::new("Cart", &Command::Cart),
        ],
        vec![
            Button::new("My orders", &Command::MyOrders),
            Button::new("Favorites", &Command::Favorites),
        ],
        vec![
            Button::new("Discounts", &Command::Discounts),
            Button::new("Contacts", &Command::Contacts),
        ],
    ]
}

/// One line of a product list.
pub fn product_line(product: &Product) -> String {
    match product.discount_price {
        Some(discount) => format!(
            "{}: {} (was {}), {} in stock",
            product.name, discount, product.price, product.stock
        ),
        None => format!("{}: {}, {} in stock", product.name, product.price, product.stock),
    }
}

/// The detail card of a product, with buy and favorite buttons.
pub fn product_card(chat_id: ChatId, product: &Product) -> Reply {
    let mut text = product_line(product);
    if !product.description.is_empty() {
        text.push_str("\n\n");
        text.push_str(&product.description);
    }

    let mut row = vec![Button::new("Add to cart", &Command::AddToCart(product.id))];
    row.push(Button::new("♥", &Command::AddFavorite(product.id)));

    Reply::text(chat_id, text)
        .with_photo(product.image.clone())
        .with_row(row)
}

/// A product list where each entry opens its card.
pub fn product_list(chat_id: ChatId, title: &str, products: &[Product]) -> Reply {
    let mut reply = Reply::text(chat_id, title);
    for product in products {
        reply = reply.with_row(vec![Button::new(
            product_line(product),
            &Command::ProductDetails(product.id),
        )]);
    }
    reply
}

/// Line totals were range-checked when the summary or order was built.
fn amount(total: Result<Money, StoreError>) -> String {
    total.map_or_else(|_| "?".to_string(), |total| total.to_string())
}

pub fn cart_view(chat_id: ChatId, summary: &CartSummary) -> Reply {
    if summary.items.is_empty() {
        return Reply::text(chat_id, "Your cart is empty.")
            .with_row(vec![Button::new("Catalog", &Command::Catalog)]);
    }

    let mut text = String::from("Your cart:");
    for item in &summary.items {
        text.push_str(&format!(
            "\n{} × {} = {}",
            item.name,
            item.quantity,
            amount(item.line_total())
        ));
    }
    text.push_str(&format!("\nTotal: {}", summary.total));

    let mut reply = Reply::text(chat_id, text);
    for item in &summary.items {
        reply = reply.with_row(vec![
            Button::new("−", &Command::Decrease(item.product_id)),
            Button::new(item.quantity.to_string(), &Command::Ignore),
            Button::new("+", &Command::Increase(item.product_id)),
            Button::new("✕", &Command::Remove(item.product_id)),
        ]);
    }
    reply.with_row(vec![Button::new("Checkout", &Command::Checkout)])
}

pub fn order_summary(order: &Order) -> String {
    let mut text = format!("Order #{} ({})", order.id, order.status);
    for line in &order.lines {
        text.push_str(&format!(
            "\n{} × {} = {}",
            line.product_name,
            line.quantity,
            amount(line.line_total())
        ));
    }
    text.push_str(&format!("\nTotal: {}", order.total));
    text
}

/// Announcement of an order for the admin channel.
pub fn order_announcement(order: &Order) -> String {
    format!(
        "New order #{} from user {}\nContact: {}\n{}",
        order.id,
        order.user_id,
        order.contact,
        order_summary(order)
    )
}

/// An order with one button per status it may move to.
pub fn admin_order(chat_id: ChatId, order: &Order) -> Reply {
    let row = order
        .status
        .next_statuses()
        .iter()
        .map(|status| {
            Button::new(
                status_label(*status),
                &Command::SetStatus {
                    order_id: order.id,
                    status: *status,
                },
            )
        })
        .collect();

    Reply::text(
        chat_id,
        format!("{}\nContact: {}", order_summary(order), order.contact),
    )
    .with_row(row)
}

pub fn status_label(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Pending => "Pending",
        OrderStatus::Processing => "Processing",
        OrderStatus::Shipped => "Shipped",
        OrderStatus::Completed => "Completed",
        OrderStatus::Canceled => "Canceled",
    }
}
