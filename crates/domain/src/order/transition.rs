use common::OrderStatus;
use order_store::Order;
use serde::Serialize;

use super::OrderError;

/// Checks a status change against the transition table.
pub fn check_transition(from: OrderStatus, to: OrderStatus) -> Result<(), OrderError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(OrderError::InvalidTransition { from, to })
    }
}

/// Result of a status update.
#[derive(Debug, Clone, Serialize)]
pub struct StatusChange {
    /// The order as it is after the call.
    pub order: Order,
    /// Status before the call.
    pub previous: OrderStatus,
    /// False when the call was a tolerated replay that wrote nothing.
    pub applied: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_transitions_pass() {
        assert!(check_transition(OrderStatus::Pending, OrderStatus::Paid).is_ok());
        assert!(check_transition(OrderStatus::Pending, OrderStatus::Cancel).is_ok());
        assert!(check_transition(OrderStatus::Paid, OrderStatus::Shipped).is_ok());
        assert!(check_transition(OrderStatus::Paid, OrderStatus::Cancel).is_ok());
        assert!(check_transition(OrderStatus::Shipped, OrderStatus::Complete).is_ok());
    }

    #[test]
    fn everything_else_is_invalid_transition() {
        for from in OrderStatus::ALL {
            for to in OrderStatus::ALL {
                if from.allowed_transitions().contains(&to) {
                    continue;
                }
                assert_eq!(
                    check_transition(from, to),
                    Err(OrderError::InvalidTransition { from, to }),
                    "{from} -> {to} should be rejected"
                );
            }
        }
    }
}
