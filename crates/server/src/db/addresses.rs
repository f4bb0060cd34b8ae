//! Shipping address repository.

use sqlx::PgPool;

use miorah_core::{AddressId, UserId};

use super::RepositoryError;
use crate::models::Address;

/// Fields for creating or updating an address.
#[derive(Debug, Clone)]
pub struct AddressInput {
    pub recipient: String,
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    pub country: String,
    pub phone: Option<String>,
}

pub struct AddressRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> AddressRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// List the user's addresses, default first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Address>, RepositoryError> {
        let addresses = sqlx::query_as::<_, Address>(
            "SELECT id, user_id, recipient, street, city, state, zip, country, phone, \
                    is_default, created_at, updated_at \
             FROM addresses WHERE user_id = $1 \
             ORDER BY is_default DESC, created_at DESC",
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        Ok(addresses)
    }

    /// Get one of the user's addresses.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if it doesn't belong to the user.
    pub async fn get_for_user(
        &self,
        user_id: UserId,
        address_id: AddressId,
    ) -> Result<Address, RepositoryError> {
        let address = sqlx::query_as::<_, Address>(
            "SELECT id, user_id, recipient, street, city, state, zip, country, phone, \
                    is_default, created_at, updated_at \
             FROM addresses WHERE id = $1 AND user_id = $2",
        )
        .bind(address_id)
        .bind(user_id)
        .fetch_optional(self.pool)
        .await?;

        address.ok_or(RepositoryError::NotFound)
    }

    /// Create an address. The user's first address becomes the default.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn create(
        &self,
        user_id: UserId,
        input: &AddressInput,
    ) -> Result<Address, RepositoryError> {
        let address = sqlx::query_as::<_, Address>(
            "INSERT INTO addresses (user_id, recipient, street, city, state, zip, country, phone, is_default) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, \
                     NOT EXISTS (SELECT 1 FROM addresses WHERE user_id = $1)) \
             RETURNING id, user_id, recipient, street, city, state, zip, country, phone, \
                       is_default, created_at, updated_at",
        )
        .bind(user_id)
        .bind(&input.recipient)
        .bind(&input.street)
        .bind(&input.city)
        .bind(&input.state)
        .bind(&input.zip)
        .bind(&input.country)
        .bind(input.phone.as_deref())
        .fetch_one(self.pool)
        .await?;

        Ok(address)
    }

    /// Update one of the user's addresses.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if it doesn't belong to the user.
    pub async fn update(
        &self,
        user_id: UserId,
        address_id: AddressId,
        input: &AddressInput,
    ) -> Result<Address, RepositoryError> {
        let address = sqlx::query_as::<_, Address>(
            "UPDATE addresses \
             SET recipient = $3, street = $4, city = $5, state = $6, zip = $7, \
                 country = $8, phone = $9, updated_at = NOW() \
             WHERE id = $1 AND user_id = $2 \
             RETURNING id, user_id, recipient, street, city, state, zip, country, phone, \
                       is_default, created_at, updated_at",
        )
        .bind(address_id)
        .bind(user_id)
        .bind(&input.recipient)
        .bind(&input.street)
        .bind(&input.city)
        .bind(&input.state)
        .bind(&input.zip)
        .bind(&input.country)
        .bind(input.phone.as_deref())
        .fetch_optional(self.pool)
        .await?;

        address.ok_or(RepositoryError::NotFound)
    }

    /// Delete one of the user's addresses.
    ///
    /// Orders keep their address row; deletion fails while orders reference it.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if it doesn't belong to the user.
    /// Returns `RepositoryError::Conflict` if orders still reference it.
    pub async fn delete(
        &self,
        user_id: UserId,
        address_id: AddressId,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM addresses WHERE id = $1 AND user_id = $2")
            .bind(address_id)
            .bind(user_id)
            .execute(self.pool)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.is_foreign_key_violation()
                {
                    return RepositoryError::Conflict("address is used by an order".to_owned());
                }
                RepositoryError::Database(e)
            })?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    /// Mark one of the user's addresses as the default, clearing the old one.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if it doesn't belong to the user.
    pub async fn set_default(
        &self,
        user_id: UserId,
        address_id: AddressId,
    ) -> Result<Address, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE addresses SET is_default = FALSE WHERE user_id = $1 AND is_default")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let address = sqlx::query_as::<_, Address>(
            "UPDATE addresses SET is_default = TRUE, updated_at = NOW() \
             WHERE id = $1 AND user_id = $2 \
             RETURNING id, user_id, recipient, street, city, state, zip, country, phone, \
                       is_default, created_at, updated_at",
        )
        .bind(address_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        tx.commit().await?;

        Ok(address)
    }
}
