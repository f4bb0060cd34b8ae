//! CSRF protection middleware.
//!
//! Tokens are random values tied to an HMAC-SHA256 hash of `salt.token`
//! under a server secret, stored in memory keyed by session/user/IP with an
//! expiry. Validation recomputes the HMAC and compares in constant time.
//!
//! A double-submit-cookie variant skips the server-side store and instead
//! compares a cookie-held token against the header-held token.
//!
//! Like the rate limiter, state is process-local: multi-instance deployment
//! needs an external store or the double-submit variant.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{
    extract::{Request, State},
    http::{HeaderMap, Method, StatusCode, header::COOKIE},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use rand::RngCore;
use secrecy::ExposeSecret;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tower_sessions::Session;

use crate::config::CsrfSettings;
use crate::middleware::rate_limit::extract_client_ip;
use crate::models::{CurrentUser, session_keys};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the client's CSRF token.
pub const CSRF_HEADER: &str = "x-csrf-token";
/// Cookie used by the double-submit variant.
pub const CSRF_COOKIE: &str = "miorah_csrf";

const TOKEN_BYTES: usize = 32;
const SALT_BYTES: usize = 16;

/// Why a request failed CSRF validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsrfRejection {
    /// No token in the request (or no cookie for double-submit).
    Missing,
    /// Token doesn't match what was issued.
    Invalid,
    /// Token was issued but its lifetime has passed.
    Expired,
}

impl CsrfRejection {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Missing => "csrf_missing",
            Self::Invalid => "csrf_invalid",
            Self::Expired => "csrf_expired",
        }
    }
}

impl IntoResponse for CsrfRejection {
    fn into_response(self) -> Response {
        let message = match self {
            Self::Missing => "CSRF token is required for this request.",
            Self::Invalid => "CSRF token is invalid.",
            Self::Expired => "CSRF token has expired; request a new one.",
        };
        (
            StatusCode::FORBIDDEN,
            axum::Json(serde_json::json!({
                "error": self.code(),
                "message": message,
            })),
        )
            .into_response()
    }
}

/// Server-side record for an issued token.
#[derive(Debug)]
struct TokenRecord {
    salt: String,
    hash: Vec<u8>,
    expires_at: Instant,
}

/// CSRF protection state shared across requests.
pub struct CsrfProtect {
    secret: Vec<u8>,
    token_ttl: Duration,
    double_submit: bool,
    exempt_paths: Vec<String>,
    tokens: Mutex<HashMap<String, TokenRecord>>,
}

impl CsrfProtect {
    #[must_use]
    pub fn from_settings(settings: &CsrfSettings) -> Self {
        Self::new(
            settings.secret.expose_secret().as_bytes(),
            settings.token_ttl,
            settings.double_submit,
            settings.exempt_paths.clone(),
        )
    }

    #[must_use]
    pub fn new(
        secret: &[u8],
        token_ttl: Duration,
        double_submit: bool,
        exempt_paths: Vec<String>,
    ) -> Self {
        Self {
            secret: secret.to_vec(),
            token_ttl,
            double_submit,
            exempt_paths,
            tokens: Mutex::new(HashMap::new()),
        }
    }

    /// Whether the double-submit-cookie variant is active.
    #[must_use]
    pub const fn double_submit(&self) -> bool {
        self.double_submit
    }

    /// Issue a fresh token for a client, replacing any prior record.
    #[must_use]
    pub fn issue(&self, client_key: &str) -> String {
        self.issue_at(client_key, Instant::now())
    }

    /// Issue at an explicit instant. Separated so tests can drive time.
    #[must_use]
    pub fn issue_at(&self, client_key: &str, now: Instant) -> String {
        let token = random_value(TOKEN_BYTES);
        let salt = random_value(SALT_BYTES);
        let hash = self.compute_hash(&salt, &token);

        #[allow(clippy::expect_used)] // lock poisoning is unrecoverable
        let mut tokens = self.tokens.lock().expect("csrf store lock poisoned");
        tokens.insert(
            client_key.to_owned(),
            TokenRecord {
                salt,
                hash,
                expires_at: now + self.token_ttl,
            },
        );

        token
    }

    /// Validate a token against the stored record for this client.
    ///
    /// # Errors
    ///
    /// Returns the rejection reason when the token is absent from the store,
    /// expired, or fails the HMAC comparison.
    pub fn validate(&self, client_key: &str, token: &str) -> Result<(), CsrfRejection> {
        self.validate_at(client_key, token, Instant::now())
    }

    /// Validate at an explicit instant.
    ///
    /// # Errors
    ///
    /// Same as [`Self::validate`].
    pub fn validate_at(
        &self,
        client_key: &str,
        token: &str,
        now: Instant,
    ) -> Result<(), CsrfRejection> {
        #[allow(clippy::expect_used)]
        let mut tokens = self.tokens.lock().expect("csrf store lock poisoned");

        let record = tokens.get(client_key).ok_or(CsrfRejection::Invalid)?;

        // Expiry wins over a correct hash
        if record.expires_at <= now {
            tokens.remove(client_key);
            return Err(CsrfRejection::Expired);
        }

        let expected = self.compute_hash(&record.salt, token);
        if expected.ct_eq(&record.hash).into() {
            Ok(())
        } else {
            Err(CsrfRejection::Invalid)
        }
    }

    /// Double-submit comparison: cookie token vs header token.
    ///
    /// # Errors
    ///
    /// Returns `CsrfRejection::Invalid` when the values differ.
    pub fn validate_pair(cookie_token: &str, header_token: &str) -> Result<(), CsrfRejection> {
        if cookie_token.as_bytes().ct_eq(header_token.as_bytes()).into() {
            Ok(())
        } else {
            Err(CsrfRejection::Invalid)
        }
    }

    /// Whether the method/path combination bypasses validation.
    #[must_use]
    pub fn is_exempt(&self, method: &Method, path: &str) -> bool {
        if matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS) {
            return true;
        }
        self.exempt_paths.iter().any(|prefix| path.starts_with(prefix))
    }

    /// Evict expired token records.
    pub fn sweep(&self) {
        self.sweep_at(Instant::now());
    }

    /// Sweep at an explicit instant.
    pub fn sweep_at(&self, now: Instant) {
        #[allow(clippy::expect_used)]
        let mut tokens = self.tokens.lock().expect("csrf store lock poisoned");
        tokens.retain(|_, record| record.expires_at > now);
    }

    /// Number of live token records.
    #[must_use]
    pub fn stored_tokens(&self) -> usize {
        #[allow(clippy::expect_used)]
        let tokens = self.tokens.lock().expect("csrf store lock poisoned");
        tokens.len()
    }

    /// Spawn a background task that sweeps expired records periodically.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        let csrf = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                csrf.sweep();
                tracing::debug!(stored = csrf.stored_tokens(), "CSRF store swept");
            }
        })
    }

    fn compute_hash(&self, salt: &str, token: &str) -> Vec<u8> {
        #[allow(clippy::expect_used)] // HMAC accepts keys of any length
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts any key length");
        mac.update(salt.as_bytes());
        mac.update(b".");
        mac.update(token.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }
}

fn random_value(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

// =============================================================================
// Middleware
// =============================================================================

/// CSRF validation middleware function.
///
/// Safe methods and configured exempt path prefixes pass through untouched.
pub async fn csrf_middleware(
    State(csrf): State<Arc<CsrfProtect>>,
    request: Request,
    next: Next,
) -> Response {
    if csrf.is_exempt(request.method(), request.uri().path()) {
        return next.run(request).await;
    }

    let header_token = request
        .headers()
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let Some(token) = header_token else {
        return CsrfRejection::Missing.into_response();
    };

    let result = if csrf.double_submit() {
        match cookie_value(request.headers(), CSRF_COOKIE) {
            Some(cookie_token) => CsrfProtect::validate_pair(&cookie_token, &token),
            None => Err(CsrfRejection::Missing),
        }
    } else {
        let session = request.extensions().get::<Session>().cloned();
        let ip = extract_client_ip(&request);
        let key = client_key(session, ip).await;
        csrf.validate(&key, &token)
    };

    match result {
        Ok(()) => next.run(request).await,
        Err(rejection) => {
            tracing::warn!(
                code = rejection.code(),
                path = %request.uri().path(),
                "CSRF validation failed"
            );
            rejection.into_response()
        }
    }
}

/// Key used to store issued tokens: session id first, then user, then IP.
///
/// Session and IP are taken by value so no request borrow is held across
/// the session read. The IP comes from [`extract_client_ip`], so direct
/// connections fall back to the socket address rather than one shared key.
pub async fn client_key(session: Option<Session>, ip: IpAddr) -> String {
    if let Some(session) = session {
        if let Some(id) = session.id() {
            return format!("session:{id}");
        }
        if let Ok(Some(user)) = session.get::<CurrentUser>(session_keys::CURRENT_USER).await {
            return format!("user:{}", user.id.as_i32());
        }
    }

    format!("ip:{ip}")
}

/// Pull a cookie value out of the `Cookie` header.
fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let header = headers.get(COOKIE)?.to_str().ok()?;
    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then(|| value.to_owned())
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn protect(ttl_secs: u64) -> CsrfProtect {
        CsrfProtect::new(
            b"test-hmac-secret-key-0123456789abcdef",
            Duration::from_secs(ttl_secs),
            false,
            vec!["/api/webhooks".to_owned()],
        )
    }

    #[test]
    fn issued_token_validates() {
        let csrf = protect(3600);
        let token = csrf.issue("session:abc");
        assert!(csrf.validate("session:abc", &token).is_ok());
    }

    #[test]
    fn tampered_token_rejected() {
        let csrf = protect(3600);
        let token = csrf.issue("session:abc");
        let mut tampered = token;
        tampered.push('x');
        assert_eq!(
            csrf.validate("session:abc", &tampered),
            Err(CsrfRejection::Invalid)
        );
    }

    #[test]
    fn token_for_other_client_rejected() {
        let csrf = protect(3600);
        let token = csrf.issue("session:abc");
        assert_eq!(
            csrf.validate("session:other", &token),
            Err(CsrfRejection::Invalid)
        );
    }

    #[test]
    fn expired_token_fails_even_with_correct_hash() {
        let csrf = protect(60);
        let start = Instant::now();
        let token = csrf.issue_at("session:abc", start);

        // Valid right up to the boundary
        assert!(csrf
            .validate_at("session:abc", &token, start + Duration::from_secs(59))
            .is_ok());

        // The same correct token fails after expiry
        let csrf = protect(60);
        let token = csrf.issue_at("session:abc", start);
        assert_eq!(
            csrf.validate_at("session:abc", &token, start + Duration::from_secs(61)),
            Err(CsrfRejection::Expired)
        );
    }

    #[test]
    fn reissue_replaces_previous_token() {
        let csrf = protect(3600);
        let first = csrf.issue("session:abc");
        let second = csrf.issue("session:abc");
        assert_eq!(
            csrf.validate("session:abc", &first),
            Err(CsrfRejection::Invalid)
        );
        assert!(csrf.validate("session:abc", &second).is_ok());
    }

    #[test]
    fn safe_methods_and_exempt_paths_bypass() {
        let csrf = protect(3600);
        assert!(csrf.is_exempt(&Method::GET, "/api/cart"));
        assert!(csrf.is_exempt(&Method::HEAD, "/api/cart"));
        assert!(csrf.is_exempt(&Method::OPTIONS, "/api/cart"));
        assert!(csrf.is_exempt(&Method::POST, "/api/webhooks/payment"));
        assert!(!csrf.is_exempt(&Method::POST, "/api/cart"));
        assert!(!csrf.is_exempt(&Method::DELETE, "/api/cart/items/1"));
    }

    #[test]
    fn double_submit_pair_comparison() {
        assert!(CsrfProtect::validate_pair("same-token", "same-token").is_ok());
        assert_eq!(
            CsrfProtect::validate_pair("token-a", "token-b"),
            Err(CsrfRejection::Invalid)
        );
        assert_eq!(
            CsrfProtect::validate_pair("token", "token-longer"),
            Err(CsrfRejection::Invalid)
        );
    }

    #[test]
    fn sweep_evicts_expired_records() {
        let csrf = protect(60);
        let start = Instant::now();
        let _ = csrf.issue_at("a", start);
        let _ = csrf.issue_at("b", start);
        assert_eq!(csrf.stored_tokens(), 2);

        csrf.sweep_at(start + Duration::from_secs(30));
        assert_eq!(csrf.stored_tokens(), 2);

        csrf.sweep_at(start + Duration::from_secs(61));
        assert_eq!(csrf.stored_tokens(), 0);
    }

    #[test]
    fn cookie_value_parsing() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            "miorah_session=xyz; miorah_csrf=the-token".parse().unwrap(),
        );
        assert_eq!(
            cookie_value(&headers, "miorah_csrf").as_deref(),
            Some("the-token")
        );
        assert_eq!(cookie_value(&headers, "missing"), None);
    }
}
