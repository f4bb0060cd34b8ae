//! HTTP route handlers for the API.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                          - Liveness check
//! GET  /health/ready                    - Readiness check (DB ping)
//!
//! # Auth (strict rate limit)
//! POST /api/auth/register               - Create an account
//! POST /api/auth/login                  - Login
//! POST /api/auth/logout                 - Logout
//! PUT  /api/auth/password               - Change password
//! GET  /api/auth/me                     - Current user
//!
//! # CSRF
//! GET  /api/csrf-token                  - Issue a CSRF token
//!
//! # Catalog (public)
//! GET  /api/products                    - Product listing
//! GET  /api/products/{slug}             - Product detail with images
//! GET  /api/categories                  - Category listing
//! GET  /api/categories/{slug}/products  - Products in a category
//!
//! # Cart (requires auth)
//! GET  /api/cart                        - Cart with items and subtotal
//! POST /api/cart                        - Add a product
//! PUT  /api/cart/items/{id}             - Change quantity
//! DELETE /api/cart/items/{id}           - Remove a line
//!
//! # Orders (requires auth)
//! POST /api/orders                      - Place order from cart
//! GET  /api/orders                      - Order history
//! GET  /api/orders/{id}                 - Order detail
//!
//! # Addresses (requires auth)
//! GET  /api/addresses                   - List addresses
//! POST /api/addresses                   - Create address
//! PUT  /api/addresses/{id}              - Update address
//! DELETE /api/addresses/{id}            - Delete address
//! POST /api/addresses/{id}/default      - Mark as default
//!
//! # Contact
//! POST /api/contact                     - Submit contact form
//!
//! # Admin (requires admin role)
//! GET  /api/admin/dashboard             - Aggregate stats
//! POST /api/admin/products              - Create product
//! PUT  /api/admin/products/{id}         - Update product
//! DELETE /api/admin/products/{id}       - Delete product
//! POST /api/admin/products/{id}/images  - Upload image (multipart)
//! DELETE /api/admin/images/{id}         - Delete image
//! POST /api/admin/categories            - Create category
//! PUT  /api/admin/categories/{id}       - Update category
//! DELETE /api/admin/categories/{id}     - Delete category
//! GET  /api/admin/orders                - All orders
//! PUT  /api/admin/orders/{id}/status    - Update order status
//! GET  /api/admin/contact               - Contact inbox
//! POST /api/admin/contact/{id}/handled  - Mark message handled
//! ```

pub mod addresses;
pub mod admin;
pub mod auth;
pub mod cart;
pub mod categories;
pub mod contact;
pub mod csrf;
pub mod orders;
pub mod products;

use std::sync::Arc;

use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{delete, get, post, put},
};

use crate::middleware::{csrf_middleware, rate_limit_middleware};
use crate::state::AppState;

/// Auth routes, behind the strict auth rate limiter.
fn auth_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/password", put(auth::change_password))
        .route("/me", get(auth::me))
        .layer(from_fn_with_state(
            Arc::clone(state.auth_limiter()),
            rate_limit_middleware,
        ))
}

/// Storefront routes, behind the general API rate limiter.
fn storefront_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/csrf-token", get(csrf::token))
        .route("/products", get(products::index))
        .route("/products/{slug}", get(products::show))
        .route("/categories", get(categories::index))
        .route("/categories/{slug}/products", get(categories::products))
        .route("/cart", get(cart::show).post(cart::add_item))
        .route(
            "/cart/items/{id}",
            put(cart::update_item).delete(cart::remove_item),
        )
        .route("/orders", get(orders::index).post(orders::create))
        .route("/orders/{id}", get(orders::show))
        .route(
            "/addresses",
            get(addresses::index).post(addresses::create),
        )
        .route(
            "/addresses/{id}",
            put(addresses::update).delete(addresses::delete),
        )
        .route("/addresses/{id}/default", post(addresses::set_default))
        .route("/contact", post(contact::create))
        .layer(from_fn_with_state(
            Arc::clone(state.api_limiter()),
            rate_limit_middleware,
        ))
}

/// Admin routes, behind the general API rate limiter. Role checks live in
/// the `RequireAdmin` extractor on each handler.
fn admin_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(admin::dashboard))
        .route("/products", post(admin::create_product))
        .route(
            "/products/{id}",
            put(admin::update_product).delete(admin::delete_product),
        )
        .route("/products/{id}/images", post(admin::upload_image))
        .route("/images/{id}", delete(admin::delete_image))
        .route("/categories", post(admin::create_category))
        .route(
            "/categories/{id}",
            put(admin::update_category).delete(admin::delete_category),
        )
        .route("/orders", get(admin::list_orders))
        .route("/orders/{id}/status", put(admin::update_order_status))
        .route("/contact", get(admin::list_contact_messages))
        .route("/contact/{id}/handled", post(admin::mark_contact_handled))
        .layer(from_fn_with_state(
            Arc::clone(state.api_limiter()),
            rate_limit_middleware,
        ))
}

/// Assemble all `/api` routes with CSRF protection across the board.
pub fn routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .nest("/api/auth", auth_routes(state))
        .nest("/api/admin", admin_routes(state))
        .nest("/api", storefront_routes(state))
        .layer(from_fn_with_state(
            Arc::clone(state.csrf()),
            csrf_middleware,
        ))
}
