//! Shared types for the storefront crates.

pub mod money;
pub mod status;
pub mod types;

pub use money::{Money, ParseMoneyError};
pub use status::{OrderStatus, ParseStatusError};
pub use types::{ChatId, MessageHandle, OrderId, ProductId, UserId};
