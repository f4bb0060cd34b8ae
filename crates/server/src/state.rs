//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use sqlx::PgPool;

use crate::config::AppConfig;
use crate::middleware::{CsrfProtect, RateLimiter};
use crate::services::email::EmailService;
use crate::services::images::ImageHostClient;

/// How long cached catalog responses stay fresh.
const CATALOG_CACHE_TTL: Duration = Duration::from_secs(60);
const CATALOG_CACHE_CAPACITY: u64 = 512;

/// Error building application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("smtp configuration error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
    #[error("image host client error: {0}")]
    ImageHost(#[from] reqwest::Error),
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like database connections and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: AppConfig,
    pool: PgPool,
    email: Option<EmailService>,
    images: Option<ImageHostClient>,
    api_limiter: Arc<RateLimiter>,
    auth_limiter: Arc<RateLimiter>,
    csrf: Arc<CsrfProtect>,
    catalog_cache: Cache<String, serde_json::Value>,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Errors
    ///
    /// Returns an error if the SMTP relay or HTTP client cannot be built.
    pub fn new(config: AppConfig, pool: PgPool) -> Result<Self, StateError> {
        let email = config.email.as_ref().map(EmailService::new).transpose()?;
        let images = config
            .images
            .as_ref()
            .map(ImageHostClient::new)
            .transpose()?;

        let api_limiter = Arc::new(RateLimiter::from_settings(&config.rate_limit));
        let auth_limiter = Arc::new(RateLimiter::for_auth(&config.rate_limit));
        let csrf = Arc::new(CsrfProtect::from_settings(&config.csrf));

        let catalog_cache = Cache::builder()
            .max_capacity(CATALOG_CACHE_CAPACITY)
            .time_to_live(CATALOG_CACHE_TTL)
            .build();

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                email,
                images,
                api_limiter,
                auth_limiter,
                csrf,
                catalog_cache,
            }),
        })
    }

    /// Get a reference to the application configuration.
    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Email service, if SMTP is configured.
    #[must_use]
    pub fn email(&self) -> Option<&EmailService> {
        self.inner.email.as_ref()
    }

    /// Image host client, if configured.
    #[must_use]
    pub fn images(&self) -> Option<&ImageHostClient> {
        self.inner.images.as_ref()
    }

    /// Rate limiter for general API traffic.
    #[must_use]
    pub fn api_limiter(&self) -> &Arc<RateLimiter> {
        &self.inner.api_limiter
    }

    /// Strict rate limiter for auth endpoints.
    #[must_use]
    pub fn auth_limiter(&self) -> &Arc<RateLimiter> {
        &self.inner.auth_limiter
    }

    /// CSRF protection state.
    #[must_use]
    pub fn csrf(&self) -> &Arc<CsrfProtect> {
        &self.inner.csrf
    }

    /// Short-lived cache for catalog responses.
    #[must_use]
    pub fn catalog_cache(&self) -> &Cache<String, serde_json::Value> {
        &self.inner.catalog_cache
    }
}
