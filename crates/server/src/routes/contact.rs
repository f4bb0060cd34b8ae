//! Contact form API route.

use axum::{Json, extract::State, http::StatusCode};
use serde::Deserialize;

use miorah_core::Email;

use crate::db::contact::ContactRepository;
use crate::error::{AppError, FieldError, Result};
use crate::state::AppState;

const MAX_BODY_LENGTH: usize = 5000;

/// Contact form submission.
#[derive(Debug, Deserialize)]
pub struct ContactRequest {
    pub name: String,
    pub email: String,
    pub subject: String,
    pub body: String,
}

/// Submit a contact form message.
///
/// POST /api/contact
///
/// The message is stored; a notification email to the shop inbox is
/// best-effort and never fails the request.
///
/// # Errors
///
/// Returns 400 with field errors for blank fields or an invalid email.
pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<ContactRequest>,
) -> Result<StatusCode> {
    let mut errors = Vec::new();
    if body.name.trim().is_empty() {
        errors.push(FieldError::new("name", "name is required"));
    }
    if body.subject.trim().is_empty() {
        errors.push(FieldError::new("subject", "subject is required"));
    }
    if body.body.trim().is_empty() {
        errors.push(FieldError::new("body", "message is required"));
    }
    if body.body.len() > MAX_BODY_LENGTH {
        errors.push(FieldError::new("body", "message is too long"));
    }

    let email = match Email::parse(&body.email) {
        Ok(email) => Some(email),
        Err(_) => {
            errors.push(FieldError::new("email", "a valid email is required"));
            None
        }
    };

    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    #[allow(clippy::expect_used)] // errors is empty, so parsing succeeded
    let email = email.expect("validated above");

    let message = ContactRepository::new(state.pool())
        .create(
            body.name.trim(),
            &email,
            body.subject.trim(),
            body.body.trim(),
        )
        .await?;

    if let Some(mailer) = state.email() {
        if let Err(e) = mailer
            .send_contact_notification(
                &message.name,
                message.email.as_str(),
                &message.subject,
                &message.body,
            )
            .await
        {
            tracing::warn!(message_id = message.id.as_i32(), error = %e, "Contact notification email failed");
        }
    }

    Ok(StatusCode::CREATED)
}
