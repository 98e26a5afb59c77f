//! Expiration sweep for unpaid orders.
//!
//! Orders are created `Pending` with a payment deadline. The sweeper
//! periodically looks for pending orders past their deadline, cancels them
//! and returns their units to stock. Each order is handled in its own
//! transaction, so one failing order never blocks the rest of a sweep.

pub mod error;
pub mod sweeper;

pub use error::{Result, SweepError};
pub use sweeper::{ExpirationSweeper, SweepReport, SweeperHandle};
