//! Back-office order endpoints. Access control happens upstream.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use domain::{OrderDetails, StatusChange};
use order_store::{Catalog, OrderStore};

use super::orders::UpdateStatusRequest;
use super::parse_order_id;
use crate::error::ApiError;
use crate::state::AppState;

/// GET /admin/orders: list every order.
#[tracing::instrument(skip(state))]
pub async fn list<S: OrderStore + 'static, C: Catalog + 'static>(
    State(state): State<Arc<AppState<S, C>>>,
) -> Result<Json<Vec<OrderDetails>>, ApiError> {
    Ok(Json(state.order_service.get_all_orders_admin().await?))
}

/// PATCH /admin/orders/{id}/status: change the status of any order.
#[tracing::instrument(skip(state, req))]
pub async fn update_status<S: OrderStore + 'static, C: Catalog + 'static>(
    State(state): State<Arc<AppState<S, C>>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<StatusChange>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let status = req.parse()?;
    let change = state
        .order_service
        .update_status_by_admin(order_id, status)
        .await?;
    Ok(Json(change))
}

/// POST /admin/orders/{id}/cancel: cancel an order and return its stock.
#[tracing::instrument(skip(state))]
pub async fn cancel<S: OrderStore + 'static, C: Catalog + 'static>(
    State(state): State<Arc<AppState<S, C>>>,
    Path(id): Path<String>,
) -> Result<Json<StatusChange>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let change = state
        .order_service
        .cancel_order_and_restore_stock(order_id)
        .await?;
    Ok(Json(change))
}

/// DELETE /admin/orders/{id}: remove an order and its lines.
#[tracing::instrument(skip(state))]
pub async fn delete<S: OrderStore + 'static, C: Catalog + 'static>(
    State(state): State<Arc<AppState<S, C>>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let order_id = parse_order_id(&id)?;
    state.order_service.delete_order(order_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
