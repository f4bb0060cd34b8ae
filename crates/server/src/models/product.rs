//! Product and product image models.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use miorah_core::{CategoryId, ProductId, ProductImageId};

/// A catalog product.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Product {
    pub id: ProductId,
    pub category_id: CategoryId,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    /// Unit price in USD.
    pub price: Decimal,
    pub stock: i32,
    pub featured: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Whether the requested quantity can currently be fulfilled.
    #[must_use]
    pub const fn has_stock(&self, quantity: i32) -> bool {
        self.stock >= quantity
    }
}

/// An image hosted by the external image provider.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ProductImage {
    pub id: ProductImageId,
    pub product_id: ProductId,
    /// Public URL served by the image host.
    pub url: String,
    /// Provider-side identifier, needed for deletion.
    pub provider_id: String,
    pub alt_text: Option<String>,
    pub position: i32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn product(stock: i32) -> Product {
        Product {
            id: ProductId::new(1),
            category_id: CategoryId::new(1),
            name: "Gold Hoop Earrings".to_string(),
            slug: "gold-hoop-earrings".to_string(),
            description: None,
            price: Decimal::new(4999, 2),
            stock,
            featured: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_has_stock() {
        assert!(product(5).has_stock(5));
        assert!(!product(4).has_stock(5));
        assert!(!product(0).has_stock(1));
    }
}
