//! Admin API routes. All require the admin role.

use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use miorah_core::{
    CategoryId, ContactMessageId, OrderId, OrderStatus, ProductId, ProductImageId,
};

use crate::db::categories::CategoryRepository;
use crate::db::contact::ContactRepository;
use crate::db::orders::{OrderRepository, OrderStats};
use crate::db::products::{ProductInput, ProductRepository};
use crate::db::users::UserRepository;
use crate::error::{AppError, FieldError, Result};
use crate::middleware::RequireAdmin;
use crate::models::{Category, ContactMessage, Order, Product, ProductImage};
use crate::state::AppState;

const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

// =============================================================================
// Dashboard
// =============================================================================

/// Aggregate numbers shown on the admin dashboard.
#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub users: i64,
    pub products: i64,
    pub categories: i64,
    pub orders: OrderStats,
    pub unhandled_messages: i64,
}

/// Dashboard stats.
///
/// GET /api/admin/dashboard
///
/// # Errors
///
/// Returns 500 on database failure.
pub async fn dashboard(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
) -> Result<Json<DashboardResponse>> {
    let pool = state.pool();

    let users = UserRepository::new(pool).count().await?;
    let products = ProductRepository::new(pool).count().await?;
    let categories = CategoryRepository::new(pool).count().await?;
    let orders = OrderRepository::new(pool).stats().await?;
    let unhandled_messages = ContactRepository::new(pool).unhandled_count().await?;

    Ok(Json(DashboardResponse {
        users,
        products,
        categories,
        orders,
        unhandled_messages,
    }))
}

// =============================================================================
// Products
// =============================================================================

/// Request body for creating or updating a product.
#[derive(Debug, Deserialize)]
pub struct ProductRequest {
    pub category_id: i32,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub stock: i32,
    #[serde(default)]
    pub featured: bool,
}

impl ProductRequest {
    fn validate(self) -> Result<ProductInput> {
        let mut errors = Vec::new();
        if self.name.trim().is_empty() {
            errors.push(FieldError::new("name", "name is required"));
        }
        if self.slug.trim().is_empty() || !is_slug(&self.slug) {
            errors.push(FieldError::new(
                "slug",
                "slug must be lowercase letters, digits, and hyphens",
            ));
        }
        if self.price < Decimal::ZERO {
            errors.push(FieldError::new("price", "price cannot be negative"));
        }
        if self.stock < 0 {
            errors.push(FieldError::new("stock", "stock cannot be negative"));
        }

        if !errors.is_empty() {
            return Err(AppError::Validation(errors));
        }

        Ok(ProductInput {
            category_id: CategoryId::new(self.category_id),
            name: self.name.trim().to_owned(),
            slug: self.slug,
            description: self
                .description
                .map(|d| d.trim().to_owned())
                .filter(|d| !d.is_empty()),
            price: self.price,
            stock: self.stock,
            featured: self.featured,
        })
    }
}

fn is_slug(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Create a product.
///
/// POST /api/admin/products
///
/// # Errors
///
/// Returns 400 with field errors, 409 on a duplicate slug.
pub async fn create_product(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Json(body): Json<ProductRequest>,
) -> Result<(StatusCode, Json<Product>)> {
    let input = body.validate()?;
    let product = ProductRepository::new(state.pool()).create(&input).await?;

    state.catalog_cache().invalidate_all();

    Ok((StatusCode::CREATED, Json(product)))
}

/// Update a product.
///
/// PUT /api/admin/products/{id}
///
/// # Errors
///
/// Returns 404 for an unknown product, 409 on a duplicate slug.
pub async fn update_product(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Path(product_id): Path<i32>,
    Json(body): Json<ProductRequest>,
) -> Result<Json<Product>> {
    let input = body.validate()?;
    let product = ProductRepository::new(state.pool())
        .update(ProductId::new(product_id), &input)
        .await?;

    state.catalog_cache().invalidate_all();

    Ok(Json(product))
}

/// Delete a product.
///
/// DELETE /api/admin/products/{id}
///
/// # Errors
///
/// Returns 404 for an unknown product.
pub async fn delete_product(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Path(product_id): Path<i32>,
) -> Result<StatusCode> {
    ProductRepository::new(state.pool())
        .delete(ProductId::new(product_id))
        .await?;

    state.catalog_cache().invalidate_all();

    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Product images
// =============================================================================

/// Upload a product image.
///
/// POST /api/admin/products/{id}/images (multipart)
///
/// Expects an `image` file part and an optional `alt_text` text part. The
/// file is relayed to the configured image host; only the hosted URL is
/// stored.
///
/// # Errors
///
/// Returns 400 when no file part is present or it exceeds the size cap,
/// 404 for an unknown product, 502 behaviour surfaces as 500 when the host
/// rejects the upload.
pub async fn upload_image(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Path(product_id): Path<i32>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ProductImage>)> {
    let Some(images) = state.images() else {
        return Err(AppError::BadRequest(
            "image uploads are not configured".to_owned(),
        ));
    };

    let product_id = ProductId::new(product_id);
    let repo = ProductRepository::new(state.pool());
    if repo.get_by_id(product_id).await?.is_none() {
        return Err(AppError::NotFound(format!("product {}", product_id.as_i32())));
    }

    let mut file: Option<(String, String, Vec<u8>)> = None;
    let mut alt_text: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("invalid multipart body: {e}")))?
    {
        match field.name() {
            Some("image") => {
                let file_name = field.file_name().unwrap_or("upload").to_owned();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_owned();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("failed to read upload: {e}")))?;
                if bytes.len() > MAX_IMAGE_BYTES {
                    return Err(AppError::field("image", "image exceeds 5 MB"));
                }
                file = Some((file_name, content_type, bytes.to_vec()));
            }
            Some("alt_text") => {
                alt_text = field.text().await.ok().filter(|t| !t.trim().is_empty());
            }
            _ => {}
        }
    }

    let Some((file_name, content_type, bytes)) = file else {
        return Err(AppError::field("image", "an image file is required"));
    };

    let uploaded = images
        .upload(&file_name, &content_type, bytes)
        .await
        .map_err(|e| AppError::Internal(format!("image upload failed: {e}")))?;

    let image = repo
        .add_image(
            product_id,
            &uploaded.url,
            &uploaded.provider_id,
            alt_text.as_deref(),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(image)))
}

/// Delete a product image.
///
/// DELETE /api/admin/images/{id}
///
/// The host-side delete is best-effort; the local row wins.
///
/// # Errors
///
/// Returns 404 for an unknown image.
pub async fn delete_image(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Path(image_id): Path<i32>,
) -> Result<StatusCode> {
    let image = ProductRepository::new(state.pool())
        .delete_image(ProductImageId::new(image_id))
        .await?;

    if let Some(images) = state.images()
        && let Err(e) = images.delete(&image.provider_id).await
    {
        tracing::warn!(provider_id = %image.provider_id, error = %e, "Image host delete failed");
    }

    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Categories
// =============================================================================

/// Request body for creating or updating a category.
#[derive(Debug, Deserialize)]
pub struct CategoryRequest {
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
}

impl CategoryRequest {
    fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();
        if self.name.trim().is_empty() {
            errors.push(FieldError::new("name", "name is required"));
        }
        if !is_slug(&self.slug) {
            errors.push(FieldError::new(
                "slug",
                "slug must be lowercase letters, digits, and hyphens",
            ));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(errors))
        }
    }
}

/// Create a category.
///
/// POST /api/admin/categories
///
/// # Errors
///
/// Returns 400 with field errors, 409 on a duplicate name or slug.
pub async fn create_category(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Json(body): Json<CategoryRequest>,
) -> Result<(StatusCode, Json<Category>)> {
    body.validate()?;
    let category = CategoryRepository::new(state.pool())
        .create(body.name.trim(), &body.slug, body.description.as_deref())
        .await?;

    state.catalog_cache().invalidate_all();

    Ok((StatusCode::CREATED, Json(category)))
}

/// Update a category.
///
/// PUT /api/admin/categories/{id}
///
/// # Errors
///
/// Returns 404 for an unknown category, 409 on a duplicate name or slug.
pub async fn update_category(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Path(category_id): Path<i32>,
    Json(body): Json<CategoryRequest>,
) -> Result<Json<Category>> {
    body.validate()?;
    let category = CategoryRepository::new(state.pool())
        .update(
            CategoryId::new(category_id),
            body.name.trim(),
            &body.slug,
            body.description.as_deref(),
        )
        .await?;

    state.catalog_cache().invalidate_all();

    Ok(Json(category))
}

/// Delete a category.
///
/// DELETE /api/admin/categories/{id}
///
/// # Errors
///
/// Returns 404 for an unknown category, 409 while products remain in it.
pub async fn delete_category(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Path(category_id): Path<i32>,
) -> Result<StatusCode> {
    CategoryRepository::new(state.pool())
        .delete(CategoryId::new(category_id))
        .await?;

    state.catalog_cache().invalidate_all();

    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Orders
// =============================================================================

/// Paging query for admin listings.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Request to change an order's status.
#[derive(Debug, Deserialize)]
pub struct OrderStatusRequest {
    pub status: String,
}

/// List all orders.
///
/// GET /api/admin/orders
///
/// # Errors
///
/// Returns 500 on database failure.
pub async fn list_orders(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<Order>>> {
    let orders = OrderRepository::new(state.pool())
        .list_all(page.limit.unwrap_or(50), page.offset.unwrap_or(0))
        .await?;
    Ok(Json(orders))
}

/// Update an order's status.
///
/// PUT /api/admin/orders/{id}/status
///
/// # Errors
///
/// Returns 400 for an unknown status name, 404 for an unknown order,
/// 409 for a transition the status machine forbids.
pub async fn update_order_status(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Path(order_id): Path<i32>,
    Json(body): Json<OrderStatusRequest>,
) -> Result<Json<Order>> {
    let next: OrderStatus = body
        .status
        .parse()
        .map_err(|_| AppError::field("status", format!("unknown status: {}", body.status)))?;

    let order_id = OrderId::new(order_id);
    let repo = OrderRepository::new(state.pool());

    let current = repo.get_by_id(order_id).await?;
    if !current.status.can_transition_to(next) {
        return Err(AppError::Conflict(format!(
            "cannot move order from {} to {next}",
            current.status
        )));
    }

    let order = repo.update_status(order_id, next).await?;

    tracing::info!(
        order_id = order.id.as_i32(),
        from = %current.status,
        to = %order.status,
        "Order status updated"
    );

    Ok(Json(order))
}

// =============================================================================
// Contact inbox
// =============================================================================

/// List contact messages, unhandled first.
///
/// GET /api/admin/contact
///
/// # Errors
///
/// Returns 500 on database failure.
pub async fn list_contact_messages(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<ContactMessage>>> {
    let messages = ContactRepository::new(state.pool())
        .list(page.limit.unwrap_or(50), page.offset.unwrap_or(0))
        .await?;
    Ok(Json(messages))
}

/// Mark a contact message as handled.
///
/// POST /api/admin/contact/{id}/handled
///
/// # Errors
///
/// Returns 404 for an unknown message.
pub async fn mark_contact_handled(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Path(message_id): Path<i32>,
) -> Result<Json<ContactMessage>> {
    let message = ContactRepository::new(state.pool())
        .mark_handled(ContactMessageId::new(message_id))
        .await?;
    Ok(Json(message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_validation() {
        assert!(is_slug("gold-ring-2"));
        assert!(!is_slug("Gold Ring"));
        assert!(!is_slug("café"));
        assert!(!is_slug(""));
    }
}
