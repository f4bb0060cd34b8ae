//! Cart API routes. All require a logged-in user.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};

use miorah_core::{CartItemId, ProductId};

use crate::db::carts::CartRepository;
use crate::error::{AppError, Result};
use crate::middleware::RequireUser;
use crate::models::{Cart, CartItem, subtotal};
use crate::state::AppState;

/// Cart with its items and running subtotal.
#[derive(Debug, Serialize)]
pub struct CartResponse {
    #[serde(flatten)]
    pub cart: Cart,
    pub items: Vec<CartItem>,
    pub subtotal: rust_decimal::Decimal,
}

/// Request to add a product to the cart.
#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub product_id: i32,
    pub quantity: i32,
}

/// Request to change a line's quantity.
#[derive(Debug, Deserialize)]
pub struct UpdateItemRequest {
    pub quantity: i32,
}

/// Get the current user's cart.
///
/// GET /api/cart
///
/// # Errors
///
/// Returns 500 on database failure.
pub async fn show(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
) -> Result<Json<CartResponse>> {
    let repo = CartRepository::new(state.pool());
    let cart = repo.get_or_create(user.id).await?;
    let items = repo.items(cart.id).await?;
    let subtotal = subtotal(&items);

    Ok(Json(CartResponse {
        cart,
        items,
        subtotal,
    }))
}

/// Add a product to the cart.
///
/// POST /api/cart
///
/// # Errors
///
/// Returns 400 for a non-positive quantity, 404 for an unknown product,
/// 409 when stock can't cover the requested quantity.
pub async fn add_item(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Json(body): Json<AddItemRequest>,
) -> Result<(StatusCode, Json<CartItem>)> {
    if body.quantity <= 0 {
        return Err(AppError::field("quantity", "Quantity must be positive"));
    }

    let repo = CartRepository::new(state.pool());
    let cart = repo.get_or_create(user.id).await?;
    let item = repo
        .add_item(cart.id, ProductId::new(body.product_id), body.quantity)
        .await?;

    Ok((StatusCode::CREATED, Json(item)))
}

/// Set the quantity of a cart line.
///
/// PUT /api/cart/items/{id}
///
/// # Errors
///
/// Returns 400 for a non-positive quantity, 404 for an unknown line,
/// 409 when stock can't cover the requested quantity.
pub async fn update_item(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(item_id): Path<i32>,
    Json(body): Json<UpdateItemRequest>,
) -> Result<Json<CartItem>> {
    if body.quantity <= 0 {
        return Err(AppError::field("quantity", "Quantity must be positive"));
    }

    let repo = CartRepository::new(state.pool());
    let cart = repo.get_or_create(user.id).await?;
    let item = repo
        .update_item(cart.id, CartItemId::new(item_id), body.quantity)
        .await?;

    Ok(Json(item))
}

/// Remove a line from the cart.
///
/// DELETE /api/cart/items/{id}
///
/// # Errors
///
/// Returns 404 for an unknown line.
pub async fn remove_item(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(item_id): Path<i32>,
) -> Result<StatusCode> {
    let repo = CartRepository::new(state.pool());
    let cart = repo.get_or_create(user.id).await?;
    repo.remove_item(cart.id, CartItemId::new(item_id)).await?;

    Ok(StatusCode::NO_CONTENT)
}
