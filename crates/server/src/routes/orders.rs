//! Order API routes. All require a logged-in user.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};

use miorah_core::{AddressId, OrderId};

use crate::db::carts::CartRepository;
use crate::db::orders::OrderRepository;
use crate::error::Result;
use crate::middleware::RequireUser;
use crate::models::{Order, OrderItem};
use crate::state::AppState;

/// Request to place an order.
#[derive(Debug, Deserialize)]
pub struct PlaceOrderRequest {
    pub address_id: i32,
}

/// An order with its item snapshots.
#[derive(Debug, Serialize)]
pub struct OrderResponse {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

/// Place an order from the current cart.
///
/// POST /api/orders
///
/// Sends a confirmation email when SMTP is configured; a send failure is
/// logged and swallowed so it never fails the order.
///
/// # Errors
///
/// Returns 404 for an empty cart or foreign address, 409 on a stock shortfall.
pub async fn create(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Json(body): Json<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>)> {
    let cart = CartRepository::new(state.pool()).get_or_create(user.id).await?;

    let (order, items) = OrderRepository::new(state.pool())
        .create_from_cart(user.id, cart.id, AddressId::new(body.address_id))
        .await?;

    tracing::info!(
        order_id = order.id.as_i32(),
        user_id = user.id.as_i32(),
        total = %order.total,
        "Order placed"
    );

    if let Some(email) = state.email() {
        if let Err(e) = email
            .send_order_confirmation(user.email.as_str(), &order, &items)
            .await
        {
            tracing::warn!(
                order_id = order.id.as_i32(),
                error = %e,
                "Order confirmation email failed"
            );
        }
    }

    Ok((StatusCode::CREATED, Json(OrderResponse { order, items })))
}

/// List the current user's orders.
///
/// GET /api/orders
///
/// # Errors
///
/// Returns 500 on database failure.
pub async fn index(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
) -> Result<Json<Vec<Order>>> {
    let orders = OrderRepository::new(state.pool())
        .list_for_user(user.id)
        .await?;
    Ok(Json(orders))
}

/// Get one of the current user's orders.
///
/// GET /api/orders/{id}
///
/// # Errors
///
/// Returns 404 when the order doesn't belong to the user.
pub async fn show(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(order_id): Path<i32>,
) -> Result<Json<OrderResponse>> {
    let (order, items) = OrderRepository::new(state.pool())
        .get_for_user(user.id, OrderId::new(order_id))
        .await?;

    Ok(Json(OrderResponse { order, items }))
}
