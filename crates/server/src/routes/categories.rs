//! Category API routes.

use axum::{
    Json,
    extract::{Path, Query, State},
};

use crate::db::categories::CategoryRepository;
use crate::db::products::{ProductFilter, ProductRepository};
use crate::error::{AppError, Result};
use crate::models::Category;
use crate::routes::products::ProductsQuery;
use crate::state::AppState;

/// List all categories.
///
/// GET /api/categories
///
/// # Errors
///
/// Returns 500 on database failure.
pub async fn index(State(state): State<AppState>) -> Result<Json<Vec<Category>>> {
    let categories = CategoryRepository::new(state.pool()).list().await?;
    Ok(Json(categories))
}

/// List products in a category.
///
/// GET /api/categories/{slug}/products
///
/// # Errors
///
/// Returns 404 for an unknown slug.
pub async fn products(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(query): Query<ProductsQuery>,
) -> Result<Json<serde_json::Value>> {
    let category = CategoryRepository::new(state.pool())
        .get_by_slug(&slug)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("category {slug}")))?;

    let filter = ProductFilter {
        category_id: Some(category.id),
        featured: query.featured,
        search: query.search,
        limit: query.limit.unwrap_or(ProductFilter::DEFAULT_LIMIT),
        offset: query.offset.unwrap_or(0),
    };

    let products = ProductRepository::new(state.pool()).list(&filter).await?;

    Ok(Json(serde_json::json!({
        "category": category,
        "products": products,
    })))
}
