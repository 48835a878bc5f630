pub mod error;
pub mod memory;
pub mod model;
pub mod sqlite;
pub mod store;

pub use common::{ChatId, MessageHandle, Money, OrderId, OrderStatus, ProductId, UserId};
pub use error::{Result, StoreError};
pub use memory::InMemoryShopStore;
pub use model::{
    CartItem, CartLine, NewOrder, Order, OrderLine, Product, ProductDraft, SessionRecord,
    sum_line_totals,
};
pub use sqlite::SqliteShopStore;
pub use store::{ShopStore, ShopStoreExt, validate_new_order};
