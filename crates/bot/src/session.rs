//! Per-user conversation state.
//!
//! A conversation is a small state machine persisted between updates:
//!
//! ```text
//! Idle ──checkout──► AwaitingContact ──contact──► Idle
//!  │
//!  └──add_product──► AddProduct(name → description → price → discount → stock → image) ──► Idle
//! ```
//!
//! `/cancel` and the idle timeout return to `Idle` from any state.

use std::time::Duration;

use chrono::Utc;
use common::{Money, ParseMoneyError, UserId};
use serde::{Deserialize, Serialize};
use store::{ProductDraft, SessionRecord, ShopStore, StoreError};
use thiserror::Error;

/// Input rejected by the active conversation step. The step is kept.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlowError {
    #[error("The name must not be empty.")]
    EmptyName,

    #[error("That is not a price ({0}). Use a number like 199 or 199.90.")]
    InvalidPrice(#[from] ParseMoneyError),

    #[error("Prices cannot be negative.")]
    NegativePrice,

    #[error("Prices cannot exceed {0}.")]
    PriceTooHigh(Money),

    #[error("The discount price {discount} is higher than the price {price}.")]
    DiscountAbovePrice { discount: Money, price: Money },

    #[error("{0:?} is not a stock quantity. Send a whole number, 0 or more.")]
    InvalidStock(String),

    #[error("{0:?} is not an image link. Send a URL, a photo or \"-\".")]
    InvalidImage(String),

    #[error("{0:?} does not look like a phone number.")]
    InvalidPhone(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormStep {
    Name,
    Description,
    Price,
    Discount,
    Stock,
    Image,
}

/// A product being entered by an administrator, one field per message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductForm {
    pub step: FormStep,
    pub name: String,
    pub description: String,
    pub price: Money,
    pub discount_price: Option<Money>,
    pub stock: u32,
}

/// Outcome of feeding one message to a form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormProgress {
    Continue(ProductForm),
    Complete(ProductDraft),
}

impl Default for ProductForm {
    fn default() -> Self {
        Self::new()
    }
}

impl ProductForm {
    pub fn new() -> Self {
        Self {
            step: FormStep::Name,
            name: String::new(),
            description: String::new(),
            price: Money::zero(),
            discount_price: None,
            stock: 0,
        }
    }

    /// The question for the current step.
    pub fn prompt(&self) -> &'static str {
        match self.step {
            FormStep::Name => "Enter the product name:",
            FormStep::Description => "Enter the description (or \"-\" to skip):",
            FormStep::Price => "Enter the price:",
            FormStep::Discount => "Enter the discount price (or \"-\" for none):",
            FormStep::Stock => "How many units are in stock?",
            FormStep::Image => "Send a photo or an image URL (or \"-\" for none):",
        }
    }

    /// Validates `input` for the current step and moves to the next one.
    pub fn accept(mut self, input: &str) -> Result<FormProgress, FlowError> {
        let input = input.trim();

        match self.step {
            FormStep::Name => {
                if input.is_empty() {
                    return Err(FlowError::EmptyName);
                }
                self.name = input.to_string();
                self.step = FormStep::Description;
            }
            FormStep::Description => {
                self.description = if input == "-" {
                    String::new()
                } else {
                    input.to_string()
                };
                self.step = FormStep::Price;
            }
            FormStep::Price => {
                let price: Money = input.parse()?;
                if price.is_negative() {
                    return Err(FlowError::NegativePrice);
                }
                if price > Money::MAX_PRICE {
                    return Err(FlowError::PriceTooHigh(Money::MAX_PRICE));
                }
                self.price = price;
                self.step = FormStep::Discount;
            }
            FormStep::Discount => {
                self.discount_price = if input == "-" {
                    None
                } else {
                    let discount: Money = input.parse()?;
                    if discount.is_negative() {
                        return Err(FlowError::NegativePrice);
                    }
                    if discount > self.price {
                        return Err(FlowError::DiscountAbovePrice {
                            discount,
                            price: self.price,
                        });
                    }
                    Some(discount)
                };
                self.step = FormStep::Stock;
            }
            FormStep::Stock => {
                self.stock = input
                    .parse()
                    .map_err(|_| FlowError::InvalidStock(input.to_string()))?;
                self.step = FormStep::Image;
            }
            FormStep::Image => {
                let image = match input {
                    "-" => None,
                    "" => return Err(FlowError::InvalidImage(input.to_string())),
                    _ if input.contains(char::is_whitespace) => {
                        return Err(FlowError::InvalidImage(input.to_string()));
                    }
                    _ => Some(input.to_string()),
                };
                return Ok(FormProgress::Complete(self.into_draft(image)));
            }
        }

        Ok(FormProgress::Continue(self))
    }

    fn into_draft(self, image: Option<String>) -> ProductDraft {
        let mut draft = ProductDraft::new(self.name, self.price)
            .with_description(self.description)
            .with_stock(self.stock);
        draft.discount_price = self.discount_price;
        draft.image = image;
        draft
    }
}

/// Checks a phone number typed by hand: digits with optional `+`, spaces, dashes and parentheses.
pub fn validate_phone(input: &str) -> Result<String, FlowError> {
    let phone = input.trim();
    let digits = phone.chars().filter(char::is_ascii_digit).count();
    let allowed = phone
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | ' ' | '-' | '(' | ')'));

    if allowed && (5..=15).contains(&digits) {
        Ok(phone.to_string())
    } else {
        Err(FlowError::InvalidPhone(phone.to_string()))
    }
}

/// The conversation state of one user.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Session {
    #[default]
    Idle,
    AwaitingContact,
    AddProduct(ProductForm),
}

impl Session {
    /// True while free text should be routed to the conversation.
    pub fn is_active(&self) -> bool {
        !matches!(self, Session::Idle)
    }
}

/// Loads and stores sessions, expiring the ones left idle too long.
#[derive(Clone)]
pub struct Sessions<S: ShopStore> {
    store: S,
    timeout: Duration,
}

impl<S: ShopStore> Sessions<S> {
    pub fn new(store: S, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Returns the user's session, or `Idle` if there is none or it has expired.
    pub async fn load(&self, user_id: UserId) -> Result<Session, StoreError> {
        let Some(record) = self.store.load_session(user_id).await? else {
            return Ok(Session::Idle);
        };

        let expired = (Utc::now() - record.updated_at)
            .to_std()
            .is_ok_and(|age| age > self.timeout);
        if expired {
            tracing::info!(%user_id, "Session expired");
            self.store.clear_session(user_id).await?;
            return Ok(Session::Idle);
        }

        match serde_json::from_value(record.state) {
            Ok(session) => Ok(session),
            Err(e) => {
                tracing::warn!(%user_id, error = %e, "Discarding unreadable session");
                self.store.clear_session(user_id).await?;
                Ok(Session::Idle)
            }
        }
    }

    /// Persists the session. Saving `Idle` forgets the user's state.
    pub async fn save(&self, user_id: UserId, session: &Session) -> Result<(), StoreError> {
        if !session.is_active() {
            return self.store.clear_session(user_id).await;
        }

        let record = SessionRecord {
            state: serde_json::to_value(session)?,
            updated_at: Utc::now(),
        };
        self.store.save_session(user_id, record).await
    }
}
