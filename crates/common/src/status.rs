//! Order status state machine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The status of an order in its lifecycle.
///
/// Allowed transitions:
/// ```text
/// Pending ──► Paid ──► Shipped ──► Complete
///    │         │
///    └─────────┴──► Cancel
/// ```
/// `Cancel` and `Complete` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Created, awaiting payment within the grace window.
    #[default]
    Pending,

    /// Payment confirmed by the provider.
    Paid,

    /// Handed over to the carrier.
    Shipped,

    /// Delivered (terminal).
    Complete,

    /// Cancelled, stock returned to inventory (terminal).
    Cancel,
}

/// Error returned when a status string is not one of the known values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown order status: {0:?}")]
pub struct ParseStatusError(pub String);

impl OrderStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::Pending,
        OrderStatus::Paid,
        OrderStatus::Shipped,
        OrderStatus::Complete,
        OrderStatus::Cancel,
    ];

    /// The transition table: statuses reachable in one step from `self`.
    pub fn allowed_transitions(&self) -> &'static [OrderStatus] {
        match self {
            OrderStatus::Pending => &[OrderStatus::Paid, OrderStatus::Cancel],
            OrderStatus::Paid => &[OrderStatus::Shipped, OrderStatus::Cancel],
            OrderStatus::Shipped => &[OrderStatus::Complete],
            OrderStatus::Complete | OrderStatus::Cancel => &[],
        }
    }

    /// Returns true if `next` is in the transition table for `self`.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    /// Returns true if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.allowed_transitions().is_empty()
    }

    /// Returns true if `self` is `target` or lies after it on the forward
    /// path `Pending → Paid → Shipped → Complete`.
    ///
    /// `Cancel` is off the forward path and only reaches itself.
    pub fn has_reached(&self, target: OrderStatus) -> bool {
        match (self.forward_rank(), target.forward_rank()) {
            (Some(current), Some(wanted)) => current >= wanted,
            _ => *self == target,
        }
    }

    fn forward_rank(&self) -> Option<u8> {
        match self {
            OrderStatus::Pending => Some(0),
            OrderStatus::Paid => Some(1),
            OrderStatus::Shipped => Some(2),
            OrderStatus::Complete => Some(3),
            OrderStatus::Cancel => None,
        }
    }

    /// Returns the wire/database name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Complete => "complete",
            OrderStatus::Cancel => "cancel",
        }
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ParseStatusError(s.to_string()))
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
