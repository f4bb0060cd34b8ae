//! Hosted image provider client.
//!
//! Product photos are uploaded to an external image host over HTTP;
//! only the returned URL and provider ID are stored locally.

use std::time::Duration;

use reqwest::multipart;
use secrecy::ExposeSecret;
use thiserror::Error;
use tracing::instrument;

use crate::config::ImageHostConfig;

/// Errors that can occur when talking to the image host.
#[derive(Debug, Error)]
pub enum ImageError {
    /// HTTP transport error.
    #[error("image host request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The host accepted the request but rejected the upload.
    #[error("image host rejected upload: {status} {message}")]
    Rejected {
        status: reqwest::StatusCode,
        message: String,
    },

    /// The host's response was missing expected fields.
    #[error("unexpected image host response: {0}")]
    BadResponse(String),
}

/// An image accepted by the host.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    /// Public URL to serve the image from.
    pub url: String,
    /// Host-side identifier, kept for later deletion.
    pub provider_id: String,
}

#[derive(serde::Deserialize)]
struct UploadResponse {
    url: Option<String>,
    id: Option<String>,
}

/// Client for the hosted image provider.
#[derive(Clone)]
pub struct ImageHostClient {
    http: reqwest::Client,
    upload_url: String,
    api_key: secrecy::SecretString,
}

impl ImageHostClient {
    /// Create a new client from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built.
    pub fn new(config: &ImageHostConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            upload_url: config.upload_url.clone(),
            api_key: config.api_key.clone(),
        })
    }

    /// Upload image bytes and return the hosted URL.
    ///
    /// # Errors
    ///
    /// Returns `ImageError::Rejected` on a non-success status.
    /// Returns `ImageError::BadResponse` if the host omits the URL or ID.
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn upload(
        &self,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadedImage, ImageError> {
        let part = multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(content_type)?;
        let form = multipart::Form::new().part("image", part);

        let response = self
            .http
            .post(&self.upload_url)
            .bearer_auth(self.api_key.expose_secret())
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ImageError::Rejected { status, message });
        }

        let body: UploadResponse = response.json().await?;
        match (body.url, body.id) {
            (Some(url), Some(id)) => Ok(UploadedImage {
                url,
                provider_id: id,
            }),
            _ => Err(ImageError::BadResponse(
                "missing url or id in upload response".to_owned(),
            )),
        }
    }

    /// Delete an image from the host.
    ///
    /// Deletion failures are not fatal to the caller; the local row is
    /// already gone.
    ///
    /// # Errors
    ///
    /// Returns `ImageError::Rejected` on a non-success status.
    #[instrument(skip(self))]
    pub async fn delete(&self, provider_id: &str) -> Result<(), ImageError> {
        let url = format!("{}/{provider_id}", self.upload_url.trim_end_matches('/'));
        let response = self
            .http
            .delete(&url)
            .bearer_auth(self.api_key.expose_secret())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() && status != reqwest::StatusCode::NOT_FOUND {
            let message = response.text().await.unwrap_or_default();
            return Err(ImageError::Rejected { status, message });
        }

        Ok(())
    }
}
