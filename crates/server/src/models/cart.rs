//! Cart models.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use miorah_core::{CartId, CartItemId, ProductId, UserId};

/// A user's active cart.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Cart {
    pub id: CartId,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A line in a cart.
///
/// `unit_price` is snapshotted at add time so a later price change does not
/// silently reprice an existing cart.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CartItem {
    pub id: CartItemId,
    pub cart_id: CartId,
    pub product_id: ProductId,
    pub product_name: String,
    pub product_slug: String,
    pub quantity: i32,
    pub unit_price: Decimal,
}

impl CartItem {
    /// Line total (unit price x quantity).
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Compute the subtotal over a set of cart items.
#[must_use]
pub fn subtotal(items: &[CartItem]) -> Decimal {
    items.iter().map(CartItem::line_total).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(quantity: i32, cents: i64) -> CartItem {
        CartItem {
            id: CartItemId::new(1),
            cart_id: CartId::new(1),
            product_id: ProductId::new(1),
            product_name: "Pearl Necklace".to_string(),
            product_slug: "pearl-necklace".to_string(),
            quantity,
            unit_price: Decimal::new(cents, 2),
        }
    }

    #[test]
    fn test_line_total() {
        assert_eq!(item(3, 1050).line_total(), Decimal::new(3150, 2));
    }

    #[test]
    fn test_subtotal() {
        let items = vec![item(2, 1000), item(1, 550)];
        assert_eq!(subtotal(&items), Decimal::new(2550, 2));
    }
}
