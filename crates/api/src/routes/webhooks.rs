//! Payment provider webhook.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use order_store::{Catalog, OrderStore};
use payments::ReconcileOutcome;

use crate::error::ApiError;
use crate::state::AppState;

/// POST /webhooks/payments: apply a verified provider event.
///
/// Replays answer 200 as well, so the provider stops redelivering.
#[tracing::instrument(skip(state, body), fields(bytes = body.len()))]
pub async fn payments<S: OrderStore + 'static, C: Catalog + 'static>(
    State(state): State<Arc<AppState<S, C>>>,
    body: Bytes,
) -> Result<Json<ReconcileOutcome>, ApiError> {
    let outcome = state.reconciler.handle_json(&body).await?;
    Ok(Json(outcome))
}
