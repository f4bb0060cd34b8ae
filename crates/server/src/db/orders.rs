//! Order repository.
//!
//! Order creation is transactional: it snapshots cart lines into order
//! items, decrements stock with row locks, and clears the cart. A stock
//! shortfall aborts the whole order.

use rust_decimal::Decimal;
use sqlx::PgPool;

use miorah_core::{AddressId, CartId, OrderId, OrderStatus, PaymentStatus, UserId};

use super::RepositoryError;
use crate::models::{Order, OrderItem};

/// Flat shipping fee charged per order.
const SHIPPING_FLAT_USD: Decimal = Decimal::from_parts(500, 0, 0, false, 2);

/// Aggregate numbers for the admin dashboard.
#[derive(Debug, Clone, serde::Serialize)]
pub struct OrderStats {
    pub total_orders: i64,
    pub pending_orders: i64,
    /// Sum of totals over non-cancelled orders.
    pub revenue: Decimal,
}

pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Create an order from the user's cart.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the cart is empty or the
    /// address doesn't belong to the user.
    /// Returns `RepositoryError::InsufficientStock` if any line exceeds stock.
    pub async fn create_from_cart(
        &self,
        user_id: UserId,
        cart_id: CartId,
        address_id: AddressId,
    ) -> Result<(Order, Vec<OrderItem>), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        // Address ownership check
        let address: Option<(AddressId,)> =
            sqlx::query_as("SELECT id FROM addresses WHERE id = $1 AND user_id = $2")
                .bind(address_id)
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?;
        if address.is_none() {
            return Err(RepositoryError::NotFound);
        }

        // Lock product rows for the whole cart up front
        let lines: Vec<(i32, String, i32, i32, Decimal)> = sqlx::query_as(
            "SELECT p.id, p.name, p.stock, ci.quantity, ci.unit_price \
             FROM cart_items ci \
             JOIN products p ON p.id = ci.product_id \
             WHERE ci.cart_id = $1 \
             ORDER BY p.id \
             FOR UPDATE OF p",
        )
        .bind(cart_id)
        .fetch_all(&mut *tx)
        .await?;

        if lines.is_empty() {
            return Err(RepositoryError::NotFound);
        }

        let mut subtotal = Decimal::ZERO;
        for (_, name, stock, quantity, unit_price) in &lines {
            if quantity > stock {
                return Err(RepositoryError::InsufficientStock {
                    product: name.clone(),
                    requested: *quantity,
                });
            }
            subtotal += *unit_price * Decimal::from(*quantity);
        }

        let shipping = SHIPPING_FLAT_USD;
        let total = subtotal + shipping;

        let order = sqlx::query_as::<_, Order>(
            "INSERT INTO orders (user_id, address_id, status, payment_status, subtotal, shipping, total) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING id, user_id, address_id, status, payment_status, subtotal, shipping, total, \
                       created_at, updated_at",
        )
        .bind(user_id)
        .bind(address_id)
        .bind(OrderStatus::Pending)
        .bind(PaymentStatus::Pending)
        .bind(subtotal)
        .bind(shipping)
        .bind(total)
        .fetch_one(&mut *tx)
        .await?;

        let mut items = Vec::with_capacity(lines.len());
        for (product_id, name, _, quantity, unit_price) in &lines {
            let item = sqlx::query_as::<_, OrderItem>(
                "INSERT INTO order_items (order_id, product_id, product_name, quantity, unit_price) \
                 VALUES ($1, $2, $3, $4, $5) \
                 RETURNING order_id, product_id, product_name, quantity, unit_price",
            )
            .bind(order.id)
            .bind(product_id)
            .bind(name)
            .bind(quantity)
            .bind(unit_price)
            .fetch_one(&mut *tx)
            .await?;
            items.push(item);

            sqlx::query("UPDATE products SET stock = stock - $2 WHERE id = $1")
                .bind(product_id)
                .bind(quantity)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
            .bind(cart_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok((order, items))
    }

    /// List a user's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        let orders = sqlx::query_as::<_, Order>(
            "SELECT id, user_id, address_id, status, payment_status, subtotal, shipping, total, \
                    created_at, updated_at \
             FROM orders WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        Ok(orders)
    }

    /// Get one of the user's orders with its items.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order doesn't belong to the user.
    pub async fn get_for_user(
        &self,
        user_id: UserId,
        order_id: OrderId,
    ) -> Result<(Order, Vec<OrderItem>), RepositoryError> {
        let order = sqlx::query_as::<_, Order>(
            "SELECT id, user_id, address_id, status, payment_status, subtotal, shipping, total, \
                    created_at, updated_at \
             FROM orders WHERE id = $1 AND user_id = $2",
        )
        .bind(order_id)
        .bind(user_id)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        let items = self.items(order_id).await?;

        Ok((order, items))
    }

    /// Items for an order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn items(&self, order_id: OrderId) -> Result<Vec<OrderItem>, RepositoryError> {
        let items = sqlx::query_as::<_, OrderItem>(
            "SELECT order_id, product_id, product_name, quantity, unit_price \
             FROM order_items WHERE order_id = $1 ORDER BY product_id ASC",
        )
        .bind(order_id)
        .fetch_all(self.pool)
        .await?;

        Ok(items)
    }

    /// List all orders (admin), newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_all(&self, limit: i64, offset: i64) -> Result<Vec<Order>, RepositoryError> {
        let orders = sqlx::query_as::<_, Order>(
            "SELECT id, user_id, address_id, status, payment_status, subtotal, shipping, total, \
                    created_at, updated_at \
             FROM orders ORDER BY created_at DESC LIMIT $1 OFFSET $2",
        )
        .bind(limit.clamp(1, 100))
        .bind(offset.max(0))
        .fetch_all(self.pool)
        .await?;

        Ok(orders)
    }

    /// Set an order's status (admin).
    ///
    /// The status machine in `OrderStatus::can_transition_to` is enforced by
    /// the route layer; the repository just writes.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order doesn't exist.
    pub async fn update_status(
        &self,
        order_id: OrderId,
        status: OrderStatus,
    ) -> Result<Order, RepositoryError> {
        let order = sqlx::query_as::<_, Order>(
            "UPDATE orders SET status = $2, updated_at = NOW() WHERE id = $1 \
             RETURNING id, user_id, address_id, status, payment_status, subtotal, shipping, total, \
                       created_at, updated_at",
        )
        .bind(order_id)
        .bind(status)
        .fetch_optional(self.pool)
        .await?;

        order.ok_or(RepositoryError::NotFound)
    }

    /// Get an order by ID regardless of owner (admin).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order doesn't exist.
    pub async fn get_by_id(&self, order_id: OrderId) -> Result<Order, RepositoryError> {
        let order = sqlx::query_as::<_, Order>(
            "SELECT id, user_id, address_id, status, payment_status, subtotal, shipping, total, \
                    created_at, updated_at \
             FROM orders WHERE id = $1",
        )
        .bind(order_id)
        .fetch_optional(self.pool)
        .await?;

        order.ok_or(RepositoryError::NotFound)
    }

    /// Aggregate order stats for the admin dashboard.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn stats(&self) -> Result<OrderStats, RepositoryError> {
        let row: (i64, i64, Option<Decimal>) = sqlx::query_as(
            "SELECT COUNT(*), \
                    COUNT(*) FILTER (WHERE status = 'pending'), \
                    SUM(total) FILTER (WHERE status <> 'cancelled') \
             FROM orders",
        )
        .fetch_one(self.pool)
        .await?;

        Ok(OrderStats {
            total_orders: row.0,
            pending_orders: row.1,
            revenue: row.2.unwrap_or(Decimal::ZERO),
        })
    }
}
