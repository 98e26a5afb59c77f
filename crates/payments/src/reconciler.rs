//! Applies payment events to orders.

use std::sync::Arc;

use common::{OrderId, OrderStatus};
use domain::OrderService;
use order_store::{Catalog, OrderStore};
use serde::Serialize;

use crate::error::Result;
use crate::event::{PaymentEvent, PaymentEventKind};

/// What handling a payment event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// The order moved to `Paid`.
    Applied { order_id: OrderId },
    /// The order had already reached `Paid`; nothing was written.
    AlreadyApplied { order_id: OrderId },
    /// A declined payment was recorded; the order is unchanged.
    PaymentFailed { order_id: Option<OrderId> },
    /// The event type is not acted on.
    Ignored,
}

impl ReconcileOutcome {
    /// Label used for metrics and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileOutcome::Applied { .. } => "applied",
            ReconcileOutcome::AlreadyApplied { .. } => "already_applied",
            ReconcileOutcome::PaymentFailed { .. } => "payment_failed",
            ReconcileOutcome::Ignored => "ignored",
        }
    }
}

/// Turns verified payment events into order status changes.
pub struct PaymentReconciler<S, C> {
    service: Arc<OrderService<S, C>>,
}

impl<S, C> Clone for PaymentReconciler<S, C> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
        }
    }
}

impl<S: OrderStore, C: Catalog> PaymentReconciler<S, C> {
    /// Creates a reconciler driving the given order service.
    pub fn new(service: Arc<OrderService<S, C>>) -> Self {
        Self { service }
    }

    /// Decodes a raw provider payload and handles it.
    pub async fn handle_json(&self, payload: &[u8]) -> Result<ReconcileOutcome> {
        let event = PaymentEvent::from_json(payload)?;
        self.handle(&event).await
    }

    /// Handles one event.
    #[tracing::instrument(skip(self, event), fields(event_id = %event.id, event_type = %event.event_type))]
    pub async fn handle(&self, event: &PaymentEvent) -> Result<ReconcileOutcome> {
        let result = self.reconcile(event).await;

        let label = match &result {
            Ok(outcome) => outcome.as_str(),
            Err(_) => "error",
        };
        metrics::counter!("payment_events_total", "outcome" => label).increment(1);

        if let Err(err) = &result {
            tracing::warn!(error = %err, "payment event rejected");
        }
        result
    }

    async fn reconcile(&self, event: &PaymentEvent) -> Result<ReconcileOutcome> {
        match event.kind() {
            PaymentEventKind::Succeeded => {
                let (order_id, user_id) = event.order_ref()?;
                let change = self
                    .service
                    .update_status_order(Some(order_id), OrderStatus::Paid, user_id)
                    .await?;

                if change.applied {
                    tracing::info!(%order_id, %user_id, "payment applied");
                    Ok(ReconcileOutcome::Applied { order_id })
                } else {
                    tracing::info!(%order_id, status = %change.order.status(), "payment already applied");
                    Ok(ReconcileOutcome::AlreadyApplied { order_id })
                }
            }
            PaymentEventKind::Failed => {
                let order_id = event.order_ref().ok().map(|(order_id, _)| order_id);
                tracing::warn!(order_id = ?order_id, "payment failed");
                Ok(ReconcileOutcome::PaymentFailed { order_id })
            }
            PaymentEventKind::Other => {
                tracing::debug!("payment event ignored");
                Ok(ReconcileOutcome::Ignored)
            }
        }
    }
}
