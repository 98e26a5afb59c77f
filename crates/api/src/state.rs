//! Shared application state.

use std::sync::Arc;

use domain::OrderService;
use payments::PaymentReconciler;

/// Shared application state accessible from all handlers.
pub struct AppState<S, C> {
    pub order_service: Arc<OrderService<S, C>>,
    pub reconciler: PaymentReconciler<S, C>,
}
