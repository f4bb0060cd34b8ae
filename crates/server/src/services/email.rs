//! Email service for order confirmations and contact notifications.
//!
//! Uses SMTP via lettre for delivery with Askama HTML templates.

use askama::Template;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::ExposeSecret;
use thiserror::Error;
use tracing::instrument;

use crate::config::EmailConfig;
use crate::models::{Order, OrderItem};

/// HTML template for order confirmation email.
#[derive(Template)]
#[template(path = "email/order_confirmation.html")]
struct OrderConfirmationHtml<'a> {
    order_id: i32,
    items: &'a [OrderItem],
    subtotal: String,
    shipping: String,
    total: String,
}

/// Plain text template for order confirmation email.
#[derive(Template)]
#[template(path = "email/order_confirmation.txt")]
struct OrderConfirmationText<'a> {
    order_id: i32,
    items: &'a [OrderItem],
    subtotal: String,
    shipping: String,
    total: String,
}

/// HTML template for contact-form notification email.
#[derive(Template)]
#[template(path = "email/contact_notification.html")]
struct ContactNotificationHtml<'a> {
    name: &'a str,
    email: &'a str,
    subject: &'a str,
    body: &'a str,
}

/// Plain text template for contact-form notification email.
#[derive(Template)]
#[template(path = "email/contact_notification.txt")]
struct ContactNotificationText<'a> {
    name: &'a str,
    email: &'a str,
    subject: &'a str,
    body: &'a str,
}

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum EmailError {
    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

/// Email service for sending transactional emails.
#[derive(Clone)]
pub struct EmailService {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
    contact_inbox: Option<String>,
}

impl EmailService {
    /// Create a new email service from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the SMTP relay host is invalid.
    pub fn new(config: &EmailConfig) -> Result<Self, SmtpError> {
        let credentials = Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.expose_secret().to_string(),
        );

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self {
            mailer,
            from_address: config.from_address.clone(),
            contact_inbox: config.contact_inbox.clone(),
        })
    }

    /// Send an order confirmation to the customer.
    ///
    /// # Errors
    ///
    /// Returns error if email fails to send or template fails to render.
    #[instrument(skip(self, order, items), fields(order_id = order.id.as_i32()))]
    pub async fn send_order_confirmation(
        &self,
        to: &str,
        order: &Order,
        items: &[OrderItem],
    ) -> Result<(), EmailError> {
        let subtotal = format!("${:.2}", order.subtotal);
        let shipping = format!("${:.2}", order.shipping);
        let total = format!("${:.2}", order.total);

        let html = OrderConfirmationHtml {
            order_id: order.id.as_i32(),
            items,
            subtotal: subtotal.clone(),
            shipping: shipping.clone(),
            total: total.clone(),
        }
        .render()?;
        let text = OrderConfirmationText {
            order_id: order.id.as_i32(),
            items,
            subtotal,
            shipping,
            total,
        }
        .render()?;

        let subject = format!("Your Miorah Collections order #{}", order.id.as_i32());
        self.send_multipart_email(to, &subject, &text, &html).await
    }

    /// Forward a contact-form submission to the configured inbox.
    ///
    /// No-op when no inbox is configured.
    ///
    /// # Errors
    ///
    /// Returns error if email fails to send or template fails to render.
    #[instrument(skip(self, body))]
    pub async fn send_contact_notification(
        &self,
        name: &str,
        email: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), EmailError> {
        let Some(inbox) = self.contact_inbox.as_deref() else {
            tracing::debug!("No contact inbox configured, skipping notification");
            return Ok(());
        };

        let html = ContactNotificationHtml {
            name,
            email,
            subject,
            body,
        }
        .render()?;
        let text = ContactNotificationText {
            name,
            email,
            subject,
            body,
        }
        .render()?;

        let mail_subject = format!("Contact form: {subject}");
        self.send_multipart_email(inbox, &mail_subject, &text, &html)
            .await
    }

    /// Send a multipart email with both plain text and HTML versions.
    async fn send_multipart_email(
        &self,
        to: &str,
        subject: &str,
        text_body: &str,
        html_body: &str,
    ) -> Result<(), EmailError> {
        let email = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|_| EmailError::InvalidAddress(self.from_address.clone()))?,
            )
            .to(to
                .parse()
                .map_err(|_| EmailError::InvalidAddress(to.to_string()))?)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text_body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body.to_string()),
                    ),
            )?;

        self.mailer.send(email).await?;

        tracing::info!(to = %to, subject = %subject, "Email sent successfully");
        Ok(())
    }
}
