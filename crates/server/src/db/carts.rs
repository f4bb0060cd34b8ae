//! Cart repository.
//!
//! Each user has at most one active cart; placing an order clears it.

use sqlx::PgPool;

use miorah_core::{CartId, CartItemId, ProductId, UserId};

use super::RepositoryError;
use crate::models::{Cart, CartItem};

pub struct CartRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CartRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get the user's cart, creating an empty one if none exists.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_or_create(&self, user_id: UserId) -> Result<Cart, RepositoryError> {
        let cart = sqlx::query_as::<_, Cart>(
            "INSERT INTO carts (user_id) VALUES ($1) \
             ON CONFLICT (user_id) DO UPDATE SET updated_at = NOW() \
             RETURNING id, user_id, created_at, updated_at",
        )
        .bind(user_id)
        .fetch_one(self.pool)
        .await?;

        Ok(cart)
    }

    /// List items in a cart with product name/slug joined in.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn items(&self, cart_id: CartId) -> Result<Vec<CartItem>, RepositoryError> {
        let items = sqlx::query_as::<_, CartItem>(
            "SELECT ci.id, ci.cart_id, ci.product_id, p.name AS product_name, \
                    p.slug AS product_slug, ci.quantity, ci.unit_price \
             FROM cart_items ci \
             JOIN products p ON p.id = ci.product_id \
             WHERE ci.cart_id = $1 \
             ORDER BY ci.id ASC",
        )
        .bind(cart_id)
        .fetch_all(self.pool)
        .await?;

        Ok(items)
    }

    /// Add a product to the cart, or bump quantity if it is already there.
    ///
    /// Checks stock against the combined quantity and snapshots the current
    /// unit price on first add.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product doesn't exist.
    /// Returns `RepositoryError::InsufficientStock` if stock can't cover it.
    pub async fn add_item(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<CartItem, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let product: Option<(String, rust_decimal::Decimal, i32)> = sqlx::query_as(
            "SELECT name, price, stock FROM products WHERE id = $1 FOR UPDATE",
        )
        .bind(product_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((name, price, stock)) = product else {
            return Err(RepositoryError::NotFound);
        };

        let existing: Option<(i32,)> = sqlx::query_as(
            "SELECT quantity FROM cart_items WHERE cart_id = $1 AND product_id = $2",
        )
        .bind(cart_id)
        .bind(product_id)
        .fetch_optional(&mut *tx)
        .await?;

        let combined = existing.map_or(quantity, |(q,)| q + quantity);
        if combined > stock {
            return Err(RepositoryError::InsufficientStock {
                product: name,
                requested: combined,
            });
        }

        let (id,): (CartItemId,) = sqlx::query_as(
            "INSERT INTO cart_items (cart_id, product_id, quantity, unit_price) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (cart_id, product_id) \
             DO UPDATE SET quantity = cart_items.quantity + EXCLUDED.quantity \
             RETURNING id",
        )
        .bind(cart_id)
        .bind(product_id)
        .bind(quantity)
        .bind(price)
        .fetch_one(&mut *tx)
        .await?;

        let item = sqlx::query_as::<_, CartItem>(
            "SELECT ci.id, ci.cart_id, ci.product_id, p.name AS product_name, \
                    p.slug AS product_slug, ci.quantity, ci.unit_price \
             FROM cart_items ci \
             JOIN products p ON p.id = ci.product_id \
             WHERE ci.id = $1",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(item)
    }

    /// Set the quantity of a cart line.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the line doesn't belong to the cart.
    /// Returns `RepositoryError::InsufficientStock` if stock can't cover it.
    pub async fn update_item(
        &self,
        cart_id: CartId,
        item_id: CartItemId,
        quantity: i32,
    ) -> Result<CartItem, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row: Option<(String, i32)> = sqlx::query_as(
            "SELECT p.name, p.stock \
             FROM cart_items ci JOIN products p ON p.id = ci.product_id \
             WHERE ci.id = $1 AND ci.cart_id = $2 \
             FOR UPDATE OF p",
        )
        .bind(item_id)
        .bind(cart_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((name, stock)) = row else {
            return Err(RepositoryError::NotFound);
        };

        if quantity > stock {
            return Err(RepositoryError::InsufficientStock {
                product: name,
                requested: quantity,
            });
        }

        sqlx::query("UPDATE cart_items SET quantity = $3 WHERE id = $1 AND cart_id = $2")
            .bind(item_id)
            .bind(cart_id)
            .bind(quantity)
            .execute(&mut *tx)
            .await?;

        let item = sqlx::query_as::<_, CartItem>(
            "SELECT ci.id, ci.cart_id, ci.product_id, p.name AS product_name, \
                    p.slug AS product_slug, ci.quantity, ci.unit_price \
             FROM cart_items ci \
             JOIN products p ON p.id = ci.product_id \
             WHERE ci.id = $1",
        )
        .bind(item_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(item)
    }

    /// Remove a line from the cart.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the line doesn't belong to the cart.
    pub async fn remove_item(
        &self,
        cart_id: CartId,
        item_id: CartItemId,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM cart_items WHERE id = $1 AND cart_id = $2")
            .bind(item_id)
            .bind(cart_id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    /// Remove every line from the cart.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn clear(&self, cart_id: CartId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
            .bind(cart_id)
            .execute(self.pool)
            .await?;

        Ok(())
    }
}
