//! Contact form message model.

use chrono::{DateTime, Utc};
use serde::Serialize;

use miorah_core::{ContactMessageId, Email};

/// A message submitted through the contact form.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ContactMessage {
    pub id: ContactMessageId,
    pub name: String,
    pub email: Email,
    pub subject: String,
    pub body: String,
    pub handled: bool,
    pub created_at: DateTime<Utc>,
}
