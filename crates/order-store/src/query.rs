use chrono::{DateTime, Utc};
use common::{OrderStatus, UserId};

/// Builder for constructing order queries.
///
/// Filters combine with AND. Results are always ordered by order id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderQuery {
    /// Filter by owning user.
    pub user_id: Option<UserId>,

    /// Filter by current status.
    pub status: Option<OrderStatus>,

    /// Filter to orders whose payment deadline is at or before this instant.
    pub payment_expired_by: Option<DateTime<Utc>>,

    /// Maximum number of orders to return.
    pub limit: Option<usize>,
}

impl OrderQuery {
    /// Creates a new empty query (matches every order).
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a query for the orders of one user.
    pub fn for_user(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            ..Default::default()
        }
    }

    /// Creates a query for unpaid orders whose grace window closed at or before `now`.
    pub fn pending_expired(now: DateTime<Utc>) -> Self {
        Self {
            status: Some(OrderStatus::Pending),
            payment_expired_by: Some(now),
            ..Default::default()
        }
    }

    /// Filters by owning user.
    pub fn user_id(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Filters by status.
    pub fn status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Filters to orders whose payment deadline is at or before `at`.
    pub fn payment_expired_by(mut self, at: DateTime<Utc>) -> Self {
        self.payment_expired_by = Some(at);
        self
    }

    /// Limits the number of orders returned.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns true if `order` satisfies every filter of this query.
    pub fn matches(&self, order: &crate::Order) -> bool {
        if let Some(user_id) = self.user_id
            && order.user_id() != user_id
        {
            return false;
        }
        if let Some(status) = self.status
            && order.status() != status
        {
            return false;
        }
        if let Some(at) = self.payment_expired_by
            && order.payment_expire_at() > at
        {
            return false;
        }
        true
    }
}
