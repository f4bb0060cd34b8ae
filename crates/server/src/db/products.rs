//! Product repository.

use rust_decimal::Decimal;
use sqlx::PgPool;

use miorah_core::{CategoryId, ProductId, ProductImageId};

use super::RepositoryError;
use crate::models::{Product, ProductImage};

/// Filter for product listings.
#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    pub category_id: Option<CategoryId>,
    pub featured: Option<bool>,
    /// Case-insensitive substring match on the name.
    pub search: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl ProductFilter {
    /// Default page size when the client does not ask for one.
    pub const DEFAULT_LIMIT: i64 = 24;
    /// Hard cap on page size.
    pub const MAX_LIMIT: i64 = 100;
}

/// Fields for creating or updating a product.
#[derive(Debug, Clone)]
pub struct ProductInput {
    pub category_id: CategoryId,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub stock: i32,
    pub featured: bool,
}

/// Escape LIKE metacharacters so a search term matches literally.
fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

pub struct ProductRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ProductRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// List products matching the filter, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self, filter: &ProductFilter) -> Result<Vec<Product>, RepositoryError> {
        let limit = if filter.limit <= 0 {
            ProductFilter::DEFAULT_LIMIT
        } else {
            filter.limit.min(ProductFilter::MAX_LIMIT)
        };

        let products = sqlx::query_as::<_, Product>(
            "SELECT id, category_id, name, slug, description, price, stock, featured, \
                    created_at, updated_at \
             FROM products \
             WHERE ($1::int IS NULL OR category_id = $1) \
               AND ($2::bool IS NULL OR featured = $2) \
               AND ($3::text IS NULL OR name ILIKE '%' || $3 || '%') \
             ORDER BY created_at DESC \
             LIMIT $4 OFFSET $5",
        )
        .bind(filter.category_id)
        .bind(filter.featured)
        .bind(filter.search.as_deref().map(escape_like))
        .bind(limit)
        .bind(filter.offset.max(0))
        .fetch_all(self.pool)
        .await?;

        Ok(products)
    }

    /// Get a product by slug.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_slug(&self, slug: &str) -> Result<Option<Product>, RepositoryError> {
        let product = sqlx::query_as::<_, Product>(
            "SELECT id, category_id, name, slug, description, price, stock, featured, \
                    created_at, updated_at \
             FROM products WHERE slug = $1",
        )
        .bind(slug)
        .fetch_optional(self.pool)
        .await?;

        Ok(product)
    }

    /// Get a product by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let product = sqlx::query_as::<_, Product>(
            "SELECT id, category_id, name, slug, description, price, stock, featured, \
                    created_at, updated_at \
             FROM products WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(product)
    }

    /// Create a product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the slug already exists.
    pub async fn create(&self, input: &ProductInput) -> Result<Product, RepositoryError> {
        let product = sqlx::query_as::<_, Product>(
            "INSERT INTO products (category_id, name, slug, description, price, stock, featured) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING id, category_id, name, slug, description, price, stock, featured, \
                       created_at, updated_at",
        )
        .bind(input.category_id)
        .bind(&input.name)
        .bind(&input.slug)
        .bind(input.description.as_deref())
        .bind(input.price)
        .bind(input.stock)
        .bind(input.featured)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::from_sqlx(e, "product slug already exists"))?;

        Ok(product)
    }

    /// Update a product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product doesn't exist.
    /// Returns `RepositoryError::Conflict` on a duplicate slug.
    pub async fn update(
        &self,
        id: ProductId,
        input: &ProductInput,
    ) -> Result<Product, RepositoryError> {
        let product = sqlx::query_as::<_, Product>(
            "UPDATE products \
             SET category_id = $2, name = $3, slug = $4, description = $5, price = $6, \
                 stock = $7, featured = $8, updated_at = NOW() \
             WHERE id = $1 \
             RETURNING id, category_id, name, slug, description, price, stock, featured, \
                       created_at, updated_at",
        )
        .bind(id)
        .bind(input.category_id)
        .bind(&input.name)
        .bind(&input.slug)
        .bind(input.description.as_deref())
        .bind(input.price)
        .bind(input.stock)
        .bind(input.featured)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| RepositoryError::from_sqlx(e, "product slug already exists"))?;

        product.ok_or(RepositoryError::NotFound)
    }

    /// Delete a product and its image rows.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product doesn't exist.
    pub async fn delete(&self, id: ProductId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    /// List images for a product, ordered by position.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_images(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<ProductImage>, RepositoryError> {
        let images = sqlx::query_as::<_, ProductImage>(
            "SELECT id, product_id, url, provider_id, alt_text, position \
             FROM product_images WHERE product_id = $1 ORDER BY position ASC",
        )
        .bind(product_id)
        .fetch_all(self.pool)
        .await?;

        Ok(images)
    }

    /// Attach an uploaded image to a product.
    ///
    /// Position is appended after the current last image.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn add_image(
        &self,
        product_id: ProductId,
        url: &str,
        provider_id: &str,
        alt_text: Option<&str>,
    ) -> Result<ProductImage, RepositoryError> {
        let image = sqlx::query_as::<_, ProductImage>(
            "INSERT INTO product_images (product_id, url, provider_id, alt_text, position) \
             VALUES ($1, $2, $3, $4, \
                     COALESCE((SELECT MAX(position) + 1 FROM product_images WHERE product_id = $1), 0)) \
             RETURNING id, product_id, url, provider_id, alt_text, position",
        )
        .bind(product_id)
        .bind(url)
        .bind(provider_id)
        .bind(alt_text)
        .fetch_one(self.pool)
        .await?;

        Ok(image)
    }

    /// Delete an image row.
    ///
    /// Returns the deleted row so the caller can also remove it from the
    /// image host.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the image doesn't exist.
    pub async fn delete_image(
        &self,
        image_id: ProductImageId,
    ) -> Result<ProductImage, RepositoryError> {
        let image = sqlx::query_as::<_, ProductImage>(
            "DELETE FROM product_images WHERE id = $1 \
             RETURNING id, product_id, url, provider_id, alt_text, position",
        )
        .bind(image_id)
        .fetch_optional(self.pool)
        .await?;

        image.ok_or(RepositoryError::NotFound)
    }

    /// Total number of products (admin dashboard).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn count(&self) -> Result<i64, RepositoryError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM products")
            .fetch_one(self.pool)
            .await?;
        Ok(count.0)
    }
}

#[cfg(test)]
mod tests {
    use super::escape_like;

    #[test]
    fn search_terms_match_literally() {
        assert_eq!(escape_like("100%"), "100\\%");
        assert_eq!(escape_like("gold_ring"), "gold\\_ring");
        assert_eq!(escape_like("a\\b"), "a\\\\b");
        assert_eq!(escape_like("plain"), "plain");
    }
}
