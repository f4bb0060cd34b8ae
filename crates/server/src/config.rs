//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `MIORAH_DATABASE_URL` - `PostgreSQL` connection string
//! - `MIORAH_BASE_URL` - Public URL for the API
//! - `MIORAH_SESSION_SECRET` - Session signing secret (min 32 chars, high entropy)
//! - `MIORAH_CSRF_SECRET` - HMAC key for CSRF tokens (min 32 chars, high entropy)
//!
//! ## Optional
//! - `MIORAH_HOST` - Bind address (default: 127.0.0.1)
//! - `MIORAH_PORT` - Listen port (default: 5000)
//! - `MIORAH_CORS_ORIGIN` - Allowed browser origin for the SPA
//! - `MIORAH_RATE_LIMIT_STRATEGY` - fixed_window | sliding_window | token_bucket | adaptive
//! - `MIORAH_RATE_LIMIT_MAX` - Requests per window for general API (default: 100)
//! - `MIORAH_RATE_LIMIT_WINDOW_SECS` - Window length in seconds (default: 60)
//! - `MIORAH_AUTH_RATE_LIMIT_MAX` - Requests per window for auth endpoints (default: 10)
//! - `MIORAH_CSRF_TOKEN_TTL_SECS` - CSRF token lifetime (default: 3600)
//! - `MIORAH_CSRF_DOUBLE_SUBMIT` - Use the double-submit-cookie variant (default: false)
//! - `MIORAH_CSRF_EXEMPT_PATHS` - Comma-separated path prefixes to skip
//! - `SMTP_HOST`, `SMTP_PORT`, `SMTP_USERNAME`, `SMTP_PASSWORD`, `EMAIL_FROM` - SMTP delivery
//! - `IMAGE_HOST_UPLOAD_URL`, `IMAGE_HOST_API_KEY` - Hosted image provider
//! - `SENTRY_DSN`, `SENTRY_ENVIRONMENT` - Sentry error tracking

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

const MIN_SECRET_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL for the API
    pub base_url: String,
    /// Session signing secret
    pub session_secret: SecretString,
    /// Allowed browser origin for CORS (the SPA)
    pub cors_origin: Option<String>,
    /// Rate limiter configuration
    pub rate_limit: RateLimitSettings,
    /// CSRF protection configuration
    pub csrf: CsrfSettings,
    /// SMTP configuration; email is disabled when absent
    pub email: Option<EmailConfig>,
    /// Hosted image provider; uploads are rejected when absent
    pub images: Option<ImageHostConfig>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name (e.g., production, staging)
    pub sentry_environment: Option<String>,
}

/// Which rate limiting strategy the API limiter uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RateLimitStrategy {
    #[default]
    FixedWindow,
    SlidingWindow,
    TokenBucket,
    Adaptive,
}

impl std::str::FromStr for RateLimitStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fixed_window" => Ok(Self::FixedWindow),
            "sliding_window" => Ok(Self::SlidingWindow),
            "token_bucket" => Ok(Self::TokenBucket),
            "adaptive" => Ok(Self::Adaptive),
            _ => Err(format!("unknown rate limit strategy: {s}")),
        }
    }
}

/// Rate limiter configuration.
#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    /// Strategy used for general API traffic.
    pub strategy: RateLimitStrategy,
    /// Max requests per window (general API).
    pub max_requests: u32,
    /// Window length.
    pub window: Duration,
    /// Max requests per window for auth endpoints (always fixed window).
    pub auth_max_requests: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            strategy: RateLimitStrategy::FixedWindow,
            max_requests: 100,
            window: Duration::from_secs(60),
            auth_max_requests: 10,
        }
    }
}

/// CSRF protection configuration.
#[derive(Clone)]
pub struct CsrfSettings {
    /// HMAC key for token hashing.
    pub secret: SecretString,
    /// Token lifetime.
    pub token_ttl: Duration,
    /// Use the double-submit-cookie variant instead of server-side storage.
    pub double_submit: bool,
    /// Path prefixes that bypass CSRF validation.
    pub exempt_paths: Vec<String>,
}

impl std::fmt::Debug for CsrfSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsrfSettings")
            .field("secret", &"[REDACTED]")
            .field("token_ttl", &self.token_ttl)
            .field("double_submit", &self.double_submit)
            .field("exempt_paths", &self.exempt_paths)
            .finish()
    }
}

/// SMTP email configuration.
///
/// Implements `Debug` manually to redact the password.
#[derive(Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: SecretString,
    /// From address for transactional mail.
    pub from_address: String,
    /// Inbox that receives contact-form notifications.
    pub contact_inbox: Option<String>,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_username", &self.smtp_username)
            .field("smtp_password", &"[REDACTED]")
            .field("from_address", &self.from_address)
            .field("contact_inbox", &self.contact_inbox)
            .finish()
    }
}

/// Hosted image provider configuration.
#[derive(Clone)]
pub struct ImageHostConfig {
    /// Upload endpoint URL.
    pub upload_url: String,
    /// Provider API key.
    pub api_key: SecretString,
}

impl std::fmt::Debug for ImageHostConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageHostConfig")
            .field("upload_url", &self.upload_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("MIORAH_DATABASE_URL")?;
        let host = get_env_or_default("MIORAH_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar("MIORAH_HOST".to_string(), e.to_string()))?;
        let port = get_env_or_default("MIORAH_PORT", "5000")
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("MIORAH_PORT".to_string(), e.to_string()))?;
        let base_url = get_required_env("MIORAH_BASE_URL")?;
        let session_secret = get_validated_secret("MIORAH_SESSION_SECRET")?;
        validate_secret_length(&session_secret, "MIORAH_SESSION_SECRET")?;

        let cors_origin = get_optional_env("MIORAH_CORS_ORIGIN");
        let rate_limit = RateLimitSettings::from_env()?;
        let csrf = CsrfSettings::from_env()?;
        let email = EmailConfig::from_env()?;
        let images = ImageHostConfig::from_env()?;
        let sentry_dsn = get_optional_env("SENTRY_DSN");
        let sentry_environment = get_optional_env("SENTRY_ENVIRONMENT");

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            session_secret,
            cors_origin,
            rate_limit,
            csrf,
            email,
            images,
            sentry_dsn,
            sentry_environment,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl RateLimitSettings {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let strategy = match get_optional_env("MIORAH_RATE_LIMIT_STRATEGY") {
            Some(raw) => raw.parse().map_err(|e: String| {
                ConfigError::InvalidEnvVar("MIORAH_RATE_LIMIT_STRATEGY".to_string(), e)
            })?,
            None => defaults.strategy,
        };

        let max_requests = parse_env_or("MIORAH_RATE_LIMIT_MAX", defaults.max_requests)?;
        let window_secs = parse_env_or("MIORAH_RATE_LIMIT_WINDOW_SECS", 60_u64)?;
        let auth_max_requests =
            parse_env_or("MIORAH_AUTH_RATE_LIMIT_MAX", defaults.auth_max_requests)?;

        Ok(Self {
            strategy,
            max_requests,
            window: Duration::from_secs(window_secs),
            auth_max_requests,
        })
    }
}

impl CsrfSettings {
    fn from_env() -> Result<Self, ConfigError> {
        let secret = get_validated_secret("MIORAH_CSRF_SECRET")?;
        validate_secret_length(&secret, "MIORAH_CSRF_SECRET")?;

        let token_ttl_secs = parse_env_or("MIORAH_CSRF_TOKEN_TTL_SECS", 3600_u64)?;
        let double_submit = parse_env_or("MIORAH_CSRF_DOUBLE_SUBMIT", false)?;
        let exempt_paths = get_optional_env("MIORAH_CSRF_EXEMPT_PATHS")
            .map(|raw| {
                raw.split(',')
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            secret,
            token_ttl: Duration::from_secs(token_ttl_secs),
            double_submit,
            exempt_paths,
        })
    }
}

impl EmailConfig {
    /// SMTP is optional: absent host disables outbound mail entirely.
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(smtp_host) = get_optional_env("SMTP_HOST") else {
            return Ok(None);
        };

        Ok(Some(Self {
            smtp_host,
            smtp_port: parse_env_or("SMTP_PORT", 587_u16)?,
            smtp_username: get_required_env("SMTP_USERNAME")?,
            smtp_password: get_required_secret("SMTP_PASSWORD")?,
            from_address: get_required_env("EMAIL_FROM")?,
            contact_inbox: get_optional_env("CONTACT_INBOX"),
        }))
    }
}

impl ImageHostConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(upload_url) = get_optional_env("IMAGE_HOST_UPLOAD_URL") else {
            return Ok(None);
        };

        Ok(Some(Self {
            upload_url,
            api_key: get_required_secret("IMAGE_HOST_API_KEY")?,
        }))
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get a required environment variable as a secret.
fn get_required_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    Ok(SecretString::from(value))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable into `T`, falling back to a default.
fn parse_env_or<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

/// Validate that a secret meets minimum length requirements.
fn validate_secret_length(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_SECRET_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)]
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    // Check blocklist
    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    // Check entropy (real secrets like API keys have high entropy)
    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_shannon_entropy_empty() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_single_char() {
        // All same character = 0 entropy
        assert!((shannon_entropy("aaaaaaa") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_high() {
        let entropy = shannon_entropy("aB3$xY9!mK2@nL5#");
        assert!(entropy > 3.3);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let result = validate_secret_strength("your-api-key-here", "TEST_VAR");
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InsecureSecret(_, _)
        ));
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", "TEST_VAR");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_secret_strength_valid() {
        let result = validate_secret_strength("aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6", "TEST_VAR");
        assert!(result.is_ok());
    }

    #[test]
    fn test_validate_secret_length_too_short() {
        let secret = SecretString::from("short");
        assert!(validate_secret_length(&secret, "TEST").is_err());
    }

    #[test]
    fn test_validate_secret_length_ok() {
        let secret = SecretString::from("a".repeat(32));
        assert!(validate_secret_length(&secret, "TEST").is_ok());
    }

    #[test]
    fn test_rate_limit_strategy_from_str() {
        assert_eq!(
            "token_bucket".parse::<RateLimitStrategy>().unwrap(),
            RateLimitStrategy::TokenBucket
        );
        assert!("leaky_bucket".parse::<RateLimitStrategy>().is_err());
    }

    #[test]
    fn test_rate_limit_defaults() {
        let settings = RateLimitSettings::default();
        assert_eq!(settings.max_requests, 100);
        assert_eq!(settings.window, Duration::from_secs(60));
        assert_eq!(settings.auth_max_requests, 10);
    }

    #[test]
    fn test_csrf_settings_debug_redacts_secret() {
        let settings = CsrfSettings {
            secret: SecretString::from("super_secret_hmac_key_value_1234"),
            token_ttl: Duration::from_secs(3600),
            double_submit: false,
            exempt_paths: vec!["/api/webhooks".to_string()],
        };
        let debug_output = format!("{settings:?}");
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_hmac_key_value_1234"));
    }
}
