//! Order lifecycle states.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The status of a committed order.
///
/// State transitions:
/// ```text
/// Pending ──► Processing ──► Shipped ──► Completed
///    │            │
///    └────────────┴──► Canceled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Order was placed, stock is already taken out of the catalog.
    #[default]
    Pending,

    /// An administrator accepted the order and is assembling it.
    Processing,

    /// Order was handed to delivery.
    Shipped,

    /// Order was delivered (terminal state).
    Completed,

    /// Order was canceled (terminal state).
    Canceled,
}

/// Error returned when a status name is not one of the closed set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown order status: {0:?}")]
pub struct ParseStatusError(pub String);

impl OrderStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::Pending,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Completed,
        OrderStatus::Canceled,
    ];

    /// Returns true if the lifecycle has an edge from `self` to `next`.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Pending, OrderStatus::Processing)
                | (OrderStatus::Processing, OrderStatus::Shipped)
                | (OrderStatus::Shipped, OrderStatus::Completed)
                | (OrderStatus::Pending, OrderStatus::Canceled)
                | (OrderStatus::Processing, OrderStatus::Canceled)
        )
    }

    /// Statuses reachable from this one in a single step.
    pub fn next_statuses(&self) -> Vec<OrderStatus> {
        Self::ALL
            .into_iter()
            .filter(|next| self.can_transition_to(*next))
            .collect()
    }

    /// Returns true if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Canceled)
    }

    /// Returns the persisted name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Completed => "completed",
            OrderStatus::Canceled => "canceled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(OrderStatus::Pending),
            "processing" => Ok(OrderStatus::Processing),
            "shipped" => Ok(OrderStatus::Shipped),
            "completed" => Ok(OrderStatus::Completed),
            "canceled" | "cancelled" => Ok(OrderStatus::Canceled),
            _ => Err(ParseStatusError(s.to_string())),
        }
    }
}
