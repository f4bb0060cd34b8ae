//! HTTP middleware.

pub mod auth;
pub mod csrf;
pub mod rate_limit;
pub mod request_id;
pub mod security_headers;
pub mod session;

pub use auth::{RequireAdmin, RequireUser};
pub use csrf::{CSRF_COOKIE, CSRF_HEADER, CsrfProtect, csrf_middleware};
pub use rate_limit::{RateLimiter, rate_limit_middleware};
pub use request_id::request_id_middleware;
pub use security_headers::security_headers_middleware;
pub use session::create_session_layer;
