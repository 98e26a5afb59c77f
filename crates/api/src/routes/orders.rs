//! Storefront order endpoints, acting on behalf of the requesting user.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{CouponId, OrderStatus};
use domain::{CreateOrder, OrderDetails, OrderError, OrderLineRequest, StatusChange};
use order_store::{Catalog, OrderStore, ShippingInfo};
use serde::Deserialize;

use super::parse_order_id;
use crate::error::ApiError;
use crate::extract::ActingUser;
use crate::state::AppState;

// -- Request types --

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub coupon_id: Option<i64>,
    pub items: Vec<OrderLineRequest>,
    #[serde(default)]
    pub shipping: ShippingInfo,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

impl UpdateStatusRequest {
    pub(crate) fn parse(&self) -> Result<OrderStatus, ApiError> {
        Ok(self.status.parse::<OrderStatus>().map_err(OrderError::from)?)
    }
}

// -- Handlers --

/// POST /orders: place an order for the acting user.
#[tracing::instrument(skip(state, req))]
pub async fn create<S: OrderStore + 'static, C: Catalog + 'static>(
    State(state): State<Arc<AppState<S, C>>>,
    ActingUser(user_id): ActingUser,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderDetails>), ApiError> {
    let mut cmd = CreateOrder::new(user_id, req.items, req.shipping);
    if let Some(coupon_id) = req.coupon_id.and_then(CouponId::from_raw) {
        cmd = cmd.with_coupon(coupon_id);
    }

    let details = state.order_service.create_order(cmd).await?;
    Ok((StatusCode::CREATED, Json(details)))
}

/// GET /orders: list the acting user's orders.
#[tracing::instrument(skip(state))]
pub async fn list<S: OrderStore + 'static, C: Catalog + 'static>(
    State(state): State<Arc<AppState<S, C>>>,
    ActingUser(user_id): ActingUser,
) -> Result<Json<Vec<OrderDetails>>, ApiError> {
    let orders = state.order_service.get_all_orders_by_user(user_id).await?;
    Ok(Json(orders))
}

/// GET /orders/{id}: load one of the acting user's orders.
#[tracing::instrument(skip(state))]
pub async fn get<S: OrderStore + 'static, C: Catalog + 'static>(
    State(state): State<Arc<AppState<S, C>>>,
    ActingUser(user_id): ActingUser,
    Path(id): Path<String>,
) -> Result<Json<OrderDetails>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let details = state
        .order_service
        .get_order_by_id(order_id, user_id)
        .await?;
    Ok(Json(details))
}

/// PATCH /orders/{id}/status: change the status of one of the acting user's orders.
#[tracing::instrument(skip(state, req))]
pub async fn update_status<S: OrderStore + 'static, C: Catalog + 'static>(
    State(state): State<Arc<AppState<S, C>>>,
    ActingUser(user_id): ActingUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<StatusChange>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let status = req.parse()?;
    let change = state
        .order_service
        .update_status_by_user(user_id, order_id, status)
        .await?;
    Ok(Json(change))
}
