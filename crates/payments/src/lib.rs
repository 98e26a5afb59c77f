//! Payment provider reconciliation.
//!
//! Webhook deliveries arrive already verified. This crate decodes them into
//! [`PaymentEvent`]s and applies their effect on orders through the order
//! service:
//! - `payment_intent.succeeded` moves the order to `Paid`
//! - `payment_intent.payment_failed` is recorded, nothing changes
//! - any other event type is acknowledged and ignored
//!
//! Redelivered success events are harmless: an order that already reached
//! `Paid` is reported as [`ReconcileOutcome::AlreadyApplied`].

pub mod error;
pub mod event;
pub mod reconciler;

pub use error::{ReconcileError, Result};
pub use event::{PAYMENT_FAILED, PAYMENT_SUCCEEDED, PaymentEvent, PaymentEventKind};
pub use reconciler::{PaymentReconciler, ReconcileOutcome};
