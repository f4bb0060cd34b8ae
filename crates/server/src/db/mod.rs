//! Database access for the API's `PostgreSQL` store.
//!
//! # Tables
//!
//! - `users`, `user_passwords` - Accounts and argon2 hashes
//! - `sessions` - tower-sessions storage
//! - `categories`, `products`, `product_images` - Catalog
//! - `carts`, `cart_items` - One active cart per user
//! - `orders`, `order_items` - Placed orders with item snapshots
//! - `addresses` - Shipping addresses
//! - `contact_messages` - Contact form inbox
//!
//! # Migrations
//!
//! Migrations live in `crates/server/migrations/` and run via:
//! ```bash
//! cargo run -p miorah-cli -- migrate
//! ```
//!
//! Queries use the runtime sqlx API (`query_as`) with `FromRow` models; the
//! repositories in the submodules are thin structs borrowing the pool.

pub mod addresses;
pub mod carts;
pub mod categories;
pub mod contact;
pub mod orders;
pub mod products;
pub mod users;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

/// Errors surfaced by the repositories.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique email or slug).
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// Stock cannot cover the requested quantity.
    #[error("insufficient stock for product {product}: requested {requested}")]
    InsufficientStock { product: String, requested: i32 },
}

impl RepositoryError {
    /// Map a sqlx error, turning unique violations into `Conflict`.
    pub(crate) fn from_sqlx(e: sqlx::Error, conflict_message: &str) -> Self {
        if let sqlx::Error::Database(ref db_err) = e
            && db_err.is_unique_violation()
        {
            return Self::Conflict(conflict_message.to_owned());
        }
        Self::Database(e)
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
