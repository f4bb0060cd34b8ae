//! Product catalog API routes.
//!
//! Listing responses are cached briefly; catalog reads dominate traffic and
//! tolerate a minute of staleness.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};

use crate::db::categories::CategoryRepository;
use crate::db::products::{ProductFilter, ProductRepository};
use crate::error::{AppError, Result};
use crate::models::{Product, ProductImage};
use crate::state::AppState;

/// Query parameters for product listing.
#[derive(Debug, Default, Deserialize)]
pub struct ProductsQuery {
    /// Category slug to filter by.
    pub category: Option<String>,
    pub featured: Option<bool>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// A product with its images, for detail responses.
#[derive(Debug, Serialize)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: Product,
    pub images: Vec<ProductImage>,
}

/// List products.
///
/// GET /api/products
///
/// # Errors
///
/// Returns 404 when the category filter names an unknown slug.
pub async fn index(
    State(state): State<AppState>,
    Query(query): Query<ProductsQuery>,
) -> Result<Json<serde_json::Value>> {
    let cache_key = format!(
        "products:{}:{}:{}:{}:{}",
        query.category.as_deref().unwrap_or(""),
        query.featured.map_or(String::new(), |f| f.to_string()),
        query.search.as_deref().unwrap_or(""),
        query.limit.unwrap_or(0),
        query.offset.unwrap_or(0),
    );

    if let Some(cached) = state.catalog_cache().get(&cache_key).await {
        return Ok(Json(cached));
    }

    let category_id = match query.category.as_deref() {
        Some(slug) => {
            let category = CategoryRepository::new(state.pool())
                .get_by_slug(slug)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("category {slug}")))?;
            Some(category.id)
        }
        None => None,
    };

    let filter = ProductFilter {
        category_id,
        featured: query.featured,
        search: query.search.clone(),
        limit: query.limit.unwrap_or(ProductFilter::DEFAULT_LIMIT),
        offset: query.offset.unwrap_or(0),
    };

    let products = ProductRepository::new(state.pool()).list(&filter).await?;
    let body = serde_json::json!({ "products": products });

    state.catalog_cache().insert(cache_key, body.clone()).await;

    Ok(Json(body))
}

/// Get a product by slug, with images.
///
/// GET /api/products/{slug}
///
/// # Errors
///
/// Returns 404 for an unknown slug.
pub async fn show(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<ProductDetail>> {
    let repo = ProductRepository::new(state.pool());

    let product = repo
        .get_by_slug(&slug)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("product {slug}")))?;
    let images = repo.list_images(product.id).await?;

    Ok(Json(ProductDetail { product, images }))
}
