//! Shipping address API routes. All require a logged-in user.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;

use miorah_core::AddressId;

use crate::db::addresses::{AddressInput, AddressRepository};
use crate::error::{AppError, FieldError, Result};
use crate::middleware::RequireUser;
use crate::models::Address;
use crate::state::AppState;

/// Request body for creating or updating an address.
#[derive(Debug, Deserialize)]
pub struct AddressRequest {
    pub recipient: String,
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    pub country: String,
    pub phone: Option<String>,
}

impl AddressRequest {
    fn validate(self) -> Result<AddressInput> {
        let mut errors = Vec::new();
        for (field, value) in [
            ("recipient", &self.recipient),
            ("street", &self.street),
            ("city", &self.city),
            ("state", &self.state),
            ("zip", &self.zip),
            ("country", &self.country),
        ] {
            if value.trim().is_empty() {
                errors.push(FieldError::new(field, format!("{field} is required")));
            }
        }

        if !errors.is_empty() {
            return Err(AppError::Validation(errors));
        }

        Ok(AddressInput {
            recipient: self.recipient.trim().to_owned(),
            street: self.street.trim().to_owned(),
            city: self.city.trim().to_owned(),
            state: self.state.trim().to_owned(),
            zip: self.zip.trim().to_owned(),
            country: self.country.trim().to_owned(),
            phone: self.phone.map(|p| p.trim().to_owned()).filter(|p| !p.is_empty()),
        })
    }
}

/// List the current user's addresses.
///
/// GET /api/addresses
///
/// # Errors
///
/// Returns 500 on database failure.
pub async fn index(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
) -> Result<Json<Vec<Address>>> {
    let addresses = AddressRepository::new(state.pool())
        .list_for_user(user.id)
        .await?;
    Ok(Json(addresses))
}

/// Create an address.
///
/// POST /api/addresses
///
/// # Errors
///
/// Returns 400 with field errors when required fields are blank.
pub async fn create(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Json(body): Json<AddressRequest>,
) -> Result<(StatusCode, Json<Address>)> {
    let input = body.validate()?;
    let address = AddressRepository::new(state.pool())
        .create(user.id, &input)
        .await?;

    Ok((StatusCode::CREATED, Json(address)))
}

/// Update one of the current user's addresses.
///
/// PUT /api/addresses/{id}
///
/// # Errors
///
/// Returns 404 when the address doesn't belong to the user.
pub async fn update(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(address_id): Path<i32>,
    Json(body): Json<AddressRequest>,
) -> Result<Json<Address>> {
    let input = body.validate()?;
    let address = AddressRepository::new(state.pool())
        .update(user.id, AddressId::new(address_id), &input)
        .await?;

    Ok(Json(address))
}

/// Delete one of the current user's addresses.
///
/// DELETE /api/addresses/{id}
///
/// # Errors
///
/// Returns 404 when the address doesn't belong to the user, 409 when an
/// order still references it.
pub async fn delete(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(address_id): Path<i32>,
) -> Result<StatusCode> {
    AddressRepository::new(state.pool())
        .delete(user.id, AddressId::new(address_id))
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Mark an address as the default.
///
/// POST /api/addresses/{id}/default
///
/// # Errors
///
/// Returns 404 when the address doesn't belong to the user.
pub async fn set_default(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(address_id): Path<i32>,
) -> Result<Json<Address>> {
    let address = AddressRepository::new(state.pool())
        .set_default(user.id, AddressId::new(address_id))
        .await?;

    Ok(Json(address))
}
