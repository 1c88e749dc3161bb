//! Order REST surface
//!
//! Submission, lookup, and cancellation. Validation and funding checks
//! run in admission before the order reaches the book; cancels flow
//! gateway → engine → book.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use market_data::OrderPayload;
use matching_engine::AddOutcome;
use settlement::NewOrder;
use types::ids::{AccountId, OrderId, PortfolioId, Symbol};
use types::numeric::{Price, Quantity};
use types::order::{Order, OrderStatus, OrderType, Side, TimeInForce};

use crate::auth::AuthenticatedUser;
use crate::error::ApiError;
use crate::state::AppState;

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub account_id: AccountId,
    pub portfolio_id: PortfolioId,
    pub symbol: String,
    pub side: Side,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub quantity: Decimal,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub stop_price: Option<Decimal>,
    #[serde(default)]
    pub time_in_force: Option<TimeInForce>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub id: String,
    pub user_id: String,
    pub account_id: String,
    pub portfolio_id: String,
    pub symbol: Symbol,
    pub side: Side,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub status: OrderStatus,
    pub time_in_force: TimeInForce,
    pub quantity: Quantity,
    pub filled_qty: Quantity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<Price>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_price: Option<Price>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_fill_price: Option<Price>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            id: order.order_id.to_string(),
            user_id: order.user_id.to_string(),
            account_id: order.account_id.to_string(),
            portfolio_id: order.portfolio_id.to_string(),
            symbol: order.symbol.clone(),
            side: order.side,
            order_type: order.order_type,
            status: order.status,
            time_in_force: order.time_in_force,
            quantity: order.quantity,
            filled_qty: order.filled_quantity,
            price: order.limit_price,
            stop_price: order.stop_price,
            avg_fill_price: order.avg_fill_price,
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

fn order_payload(order: &Order) -> OrderPayload {
    OrderPayload {
        order_id: order.order_id.to_string(),
        symbol: order.symbol.clone(),
        side: order.side,
        status: order.status,
        filled_qty: order.filled_quantity,
        avg_price: order.avg_fill_price,
    }
}

/// `POST /v1/orders`
pub async fn create_order(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let symbol = Symbol::try_new(&req.symbol)
        .ok_or_else(|| ApiError::InvalidOrderType("symbol must not be empty".to_string()))?;

    let order = state.admission.admit(
        NewOrder {
            user_id: user.user_id,
            account_id: req.account_id,
            portfolio_id: req.portfolio_id,
            symbol,
            side: req.side,
            order_type: req.order_type,
            quantity: req.quantity,
            limit_price: req.price,
            stop_price: req.stop_price,
            time_in_force: req.time_in_force,
        },
        now_millis(),
    )?;
    state.orders.insert(order.clone())?;

    let order = match state.engine.add_order(order) {
        AddOutcome::Booked(booked) => {
            state
                .orders
                .update_status(&booked.order_id, booked.status, booked.updated_at)?;
            booked
        }
        AddOutcome::StopParked(parked) => {
            // Stops need the price stream for this symbol to trigger.
            state.observe_prices_for_stops(&parked.symbol);
            parked
        }
    };

    state
        .bus
        .publish_order_update(&order.user_id, &order_payload(&order));

    Ok((StatusCode::CREATED, Json(OrderResponse::from(&order))))
}

/// `GET /v1/orders/{id}`
pub async fn get_order(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = load_owned(&state, &user, &id)?;
    Ok(Json(OrderResponse::from(&order)))
}

/// `DELETE /v1/orders/{id}`
pub async fn cancel_order(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let stored = load_owned(&state, &user, &id)?;
    if !stored.status.can_cancel() {
        return Err(ApiError::CannotCancel(format!(
            "order is {:?}",
            stored.status
        )));
    }

    // Pull the entry off the book (or the stop park); its copy carries
    // the freshest fill state.
    let removed = state.engine.cancel_order(&stored.symbol, &stored.order_id);
    let (filled, avg_price) = match removed {
        Some(entry) => (entry.filled_quantity, entry.avg_fill_price),
        None => {
            // Not on the book: the tick may have filled the order since
            // the status check above. Re-read the store and refuse to
            // cancel anything that went terminal in the meantime.
            let current = state.orders.get(&stored.order_id)?;
            if !current.status.can_cancel() {
                return Err(ApiError::CannotCancel(format!(
                    "order is {:?}",
                    current.status
                )));
            }
            (current.filled_quantity, current.avg_fill_price)
        }
    };

    state.orders.update_fill(
        &stored.order_id,
        filled,
        avg_price,
        OrderStatus::Cancelled,
        now_millis(),
    )?;
    let cancelled = state.orders.get(&stored.order_id)?;

    state
        .bus
        .publish_order_update(&cancelled.user_id, &order_payload(&cancelled));

    Ok(Json(OrderResponse::from(&cancelled)))
}

fn load_owned(state: &AppState, user: &AuthenticatedUser, id: &str) -> Result<Order, ApiError> {
    let order_id: OrderId = id
        .parse()
        .map_err(|_| ApiError::OrderNotFound(id.to_string()))?;
    let order = state.orders.get(&order_id)?;
    if order.user_id != user.user_id {
        return Err(ApiError::Unauthorized(
            "order belongs to another user".to_string(),
        ));
    }
    Ok(order)
}
