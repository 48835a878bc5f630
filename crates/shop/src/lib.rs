//! Storefront domain layer.
//!
//! This crate provides the components the chat front end drives:
//! - Catalog of products with stock and discounts
//! - Cart ledger validated against live stock
//! - Order engine with all-or-nothing checkout
//! - Order lifecycle state machine with notifications

pub mod access;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod error;
pub mod favorites;
pub mod lifecycle;
pub mod notify;

pub use access::{AccessPolicy, Actor, Role};
pub use cart::{CartLedger, CartSummary};
pub use catalog::{Catalog, validate_draft};
pub use checkout::OrderEngine;
pub use error::{Result, ShopError};
pub use favorites::Favorites;
pub use lifecycle::OrderLifecycle;
pub use notify::{InMemoryNotifier, Notifier, NotifyError, ShopEvent};

use store::ShopStore;

/// Every storefront component, sharing one store and one notifier.
pub struct Shop<S: ShopStore + Clone, N: Notifier + Clone> {
    pub catalog: Catalog<S>,
    pub cart: CartLedger<S>,
    pub orders: OrderEngine<S, N>,
    pub lifecycle: OrderLifecycle<S, N>,
    pub favorites: Favorites<S>,
    pub access: AccessPolicy,
}

impl<S: ShopStore + Clone, N: Notifier + Clone> Shop<S, N> {
    pub fn new(store: S, notifier: N, access: AccessPolicy) -> Self {
        Self {
            catalog: Catalog::new(store.clone()),
            cart: CartLedger::new(store.clone()),
            orders: OrderEngine::new(store.clone(), notifier.clone()),
            lifecycle: OrderLifecycle::new(store.clone(), notifier),
            favorites: Favorites::new(store),
            access,
        }
    }
}
