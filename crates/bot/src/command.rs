//! Inbound chat events and the commands they decode to.

use common::{ChatId, OrderId, OrderStatus, ProductId, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One update delivered by the chat transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub user_id: UserId,
    pub chat_id: ChatId,
    #[serde(default)]
    pub display_name: Option<String>,
    pub payload: Payload,
}

/// What the user sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    Text { text: String },
    Callback { data: String },
    Contact { phone_number: String },
    Photo {
        file_id: String,
        #[serde(default)]
        caption: Option<String>,
    },
}

/// A command argument was missing or malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("/{command} needs {argument}")]
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },

    #[error("/{command}: {value:?} is not a valid {argument}")]
    InvalidArgument {
        command: &'static str,
        argument: &'static str,
        value: String,
    },
}

/// Every action the bot can take, decoded once from an inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Catalog,
    ProductDetails(ProductId),
    AddToCart(ProductId),
    Cart,
    Increase(ProductId),
    Decrease(ProductId),
    Remove(ProductId),
    Checkout,
    ShareContact(String),
    MyOrders,
    Contacts,
    Favorites,
    AddFavorite(ProductId),
    RemoveFavorite(ProductId),
    Discounts,
    Cancel,
    AddProduct,
    DeleteProduct(ProductId),
    Restock { product_id: ProductId, delta: i64 },
    Stock,
    Orders(Option<OrderStatus>),
    SetStatus { order_id: OrderId, status: OrderStatus },
    /// Free text answering the active conversation step.
    FlowInput(String),
    /// Inert buttons, such as the quantity label in a cart row.
    Ignore,
    Unknown(String),
}

impl Command {
    /// Decodes an inbound event. `flow_active` routes free text to the active conversation.
    pub fn decode(event: &InboundEvent, flow_active: bool) -> Result<Command, CommandError> {
        match &event.payload {
            Payload::Text { text } => Self::from_text(text, flow_active),
            Payload::Callback { data } => Self::from_callback(data),
            Payload::Contact { phone_number } => {
                Ok(Command::ShareContact(phone_number.trim().to_string()))
            }
            Payload::Photo { file_id, .. } if flow_active => Ok(Command::FlowInput(file_id.clone())),
            Payload::Photo { .. } => Ok(Command::Ignore),
        }
    }

    fn from_text(text: &str, flow_active: bool) -> Result<Command, CommandError> {
        let text = text.trim();

        if let Some(invocation) = text.strip_prefix('/') {
            let mut parts = invocation.split_whitespace();
            let name = parts.next().unwrap_or_default();
            // "/start@shop_bot" addresses this bot in group chats.
            let name = name.split('@').next().unwrap_or_default();
            let args: Vec<&str> = parts.collect();
            return Ok(Self::parse(name, &args)?.unwrap_or_else(|| Command::Unknown(text.to_string())));
        }

        if flow_active {
            return Ok(Command::FlowInput(text.to_string()));
        }

        Ok(match text {
            "Catalog" => Command::Catalog,
            "Cart" => Command::Cart,
            "My orders" => Command::MyOrders,
            "Contacts" => Command::Contacts,
            "Favorites" => Command::Favorites,
            "Discounts" => Command::Discounts,
            _ => Command::Unknown(text.to_string()),
        })
    }

    fn from_callback(data: &str) -> Result<Command, CommandError> {
        let mut parts = data.split(':');
        let name = parts.next().unwrap_or_default();
        let args: Vec<&str> = parts.collect();
        Ok(Self::parse(name, &args)?.unwrap_or_else(|| Command::Unknown(data.to_string())))
    }

    /// Shared grammar of slash commands and callback data. None for unknown names.
    fn parse(name: &str, args: &[&str]) -> Result<Option<Command>, CommandError> {
        let command = match name {
            "start" => Command::Start,
            "help" => Command::Help,
            "catalog" => Command::Catalog,
            "details" => Command::ProductDetails(product_arg("details", args)?),
            "buy" => Command::AddToCart(product_arg("buy", args)?),
            "cart" => Command::Cart,
            "increase" => Command::Increase(product_arg("increase", args)?),
            "decrease" => Command::Decrease(product_arg("decrease", args)?),
            "remove" => Command::Remove(product_arg("remove", args)?),
            "checkout" => Command::Checkout,
            "my_orders" => Command::MyOrders,
            "contacts" => Command::Contacts,
            "favorites" => Command::Favorites,
            "fav_add" => Command::AddFavorite(product_arg("fav_add", args)?),
            "fav_remove" => Command::RemoveFavorite(product_arg("fav_remove", args)?),
            "discounts" => Command::Discounts,
            "cancel" => Command::Cancel,
            "add_product" => Command::AddProduct,
            "delete_product" => Command::DeleteProduct(product_arg("delete_product", args)?),
            "restock" => Command::Restock {
                product_id: product_arg("restock", args)?,
                delta: parse_arg("restock", "stock change", args.get(1).copied())?,
            },
            "stock" => Command::Stock,
            "all_orders" => Command::Orders(match args.first() {
                Some(status) => Some(parse_arg("all_orders", "status", Some(*status))?),
                None => None,
            }),
            "set_status" => Command::SetStatus {
                order_id: parse_arg("set_status", "order id", args.first().copied())?,
                status: parse_arg("set_status", "status", args.get(1).copied())?,
            },
            "ignore" => Command::Ignore,
            _ => return Ok(None),
        };
        Ok(Some(command))
    }

    /// Encodes the command as button callback data.
    ///
    /// None for commands that only come from free text or shared contacts.
    pub fn callback_data(&self) -> Option<String> {
        let data = match self {
            Command::Start => "start".to_string(),
            Command::Help => "help".to_string(),
            Command::Catalog => "catalog".to_string(),
            Command::ProductDetails(id) => format!("details:{id}"),
            Command::AddToCart(id) => format!("buy:{id}"),
            Command::Cart => "cart".to_string(),
            Command::Increase(id) => format!("increase:{id}"),
            Command::Decrease(id) => format!("decrease:{id}"),
            Command::Remove(id) => format!("remove:{id}"),
            Command::Checkout => "checkout".to_string(),
            Command::MyOrders => "my_orders".to_string(),
            Command::Contacts => "contacts".to_string(),
            Command::Favorites => "favorites".to_string(),
            Command::AddFavorite(id) => format!("fav_add:{id}"),
            Command::RemoveFavorite(id) => format!("fav_remove:{id}"),
            Command::Discounts => "discounts".to_string(),
            Command::Cancel => "cancel".to_string(),
            Command::AddProduct => "add_product".to_string(),
            Command::DeleteProduct(id) => format!("delete_product:{id}"),
            Command::Restock { product_id, delta } => format!("restock:{product_id}:{delta}"),
            Command::Stock => "stock".to_string(),
            Command::Orders(None) => "all_orders".to_string(),
            Command::Orders(Some(status)) => format!("all_orders:{status}"),
            Command::SetStatus { order_id, status } => format!("set_status:{order_id}:{status}"),
            Command::Ignore => "ignore".to_string(),
            Command::ShareContact(_) | Command::FlowInput(_) | Command::Unknown(_) => return None,
        };
        Some(data)
    }

    /// Short name used as a metrics label.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Start => "start",
            Command::Help => "help",
            Command::Catalog => "catalog",
            Command::ProductDetails(_) => "details",
            Command::AddToCart(_) => "buy",
            Command::Cart => "cart",
            Command::Increase(_) => "increase",
            Command::Decrease(_) => "decrease",
            Command::Remove(_) => "remove",
            Command::Checkout => "checkout",
            Command::ShareContact(_) => "share_contact",
            Command::MyOrders => "my_orders",
            Command::Contacts => "contacts",
            Command::Favorites => "favorites",
            Command::AddFavorite(_) => "fav_add",
            Command::RemoveFavorite(_) => "fav_remove",
            Command::Discounts => "discounts",
            Command::Cancel => "cancel",
            Command::AddProduct => "add_product",
            Command::DeleteProduct(_) => "delete_product",
            Command::Restock { .. } => "restock",
            Command::Stock => "stock",
            Command::Orders(_) => "all_orders",
            Command::SetStatus { .. } => "set_status",
            Command::FlowInput(_) => "flow_input",
            Command::Ignore => "ignore",
            Command::Unknown(_) => "unknown",
        }
    }
}

fn product_arg(command: &'static str, args: &[&str]) -> Result<ProductId, CommandError> {
    parse_arg(command, "product id", args.first().copied())
}

fn parse_arg<T: std::str::FromStr>(
    command: &'static str,
    argument: &'static str,
    value: Option<&str>,
) -> Result<T, CommandError> {
    let value = value.ok_or(CommandError::MissingArgument { command, argument })?;
    value.parse().map_err(|_| CommandError::InvalidArgument {
        command,
        argument,
        value: value.to_string(),
    })
}
