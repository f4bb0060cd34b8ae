//! Contact message repository.

use sqlx::PgPool;

use miorah_core::{ContactMessageId, Email};

use super::RepositoryError;
use crate::models::ContactMessage;

pub struct ContactRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ContactRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Store a message submitted through the contact form.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn create(
        &self,
        name: &str,
        email: &Email,
        subject: &str,
        body: &str,
    ) -> Result<ContactMessage, RepositoryError> {
        let message = sqlx::query_as::<_, ContactMessage>(
            "INSERT INTO contact_messages (name, email, subject, body) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id, name, email, subject, body, handled, created_at",
        )
        .bind(name)
        .bind(email)
        .bind(subject)
        .bind(body)
        .fetch_one(self.pool)
        .await?;

        Ok(message)
    }

    /// List messages for the admin inbox, unhandled first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<ContactMessage>, RepositoryError> {
        let messages = sqlx::query_as::<_, ContactMessage>(
            "SELECT id, name, email, subject, body, handled, created_at \
             FROM contact_messages \
             ORDER BY handled ASC, created_at DESC \
             LIMIT $1 OFFSET $2",
        )
        .bind(limit.clamp(1, 100))
        .bind(offset.max(0))
        .fetch_all(self.pool)
        .await?;

        Ok(messages)
    }

    /// Mark a message as handled.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the message doesn't exist.
    pub async fn mark_handled(
        &self,
        id: ContactMessageId,
    ) -> Result<ContactMessage, RepositoryError> {
        let message = sqlx::query_as::<_, ContactMessage>(
            "UPDATE contact_messages SET handled = TRUE WHERE id = $1 \
             RETURNING id, name, email, subject, body, handled, created_at",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        message.ok_or(RepositoryError::NotFound)
    }

    /// Unhandled message count (admin dashboard).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn unhandled_count(&self) -> Result<i64, RepositoryError> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM contact_messages WHERE NOT handled")
                .fetch_one(self.pool)
                .await?;
        Ok(count.0)
    }
}
