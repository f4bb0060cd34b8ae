//! CSRF token issuance route.

use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderValue, header::SET_COOKIE},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use tower_sessions::Session;

use crate::error::{AppError, Result};
use crate::middleware::rate_limit::extract_client_ip;
use crate::middleware::{CSRF_COOKIE, csrf};
use crate::state::AppState;

/// Response carrying a freshly issued token.
#[derive(Debug, Serialize)]
pub struct CsrfTokenResponse {
    pub csrf_token: String,
}

/// Issue a CSRF token for the calling client.
///
/// GET /api/csrf-token
///
/// In double-submit mode the token is also set as a cookie; the client
/// must echo it back in the `x-csrf-token` header on unsafe requests.
///
/// # Errors
///
/// Returns 500 if the cookie value cannot be encoded.
pub async fn token(State(state): State<AppState>, request: Request) -> Result<Response> {
    let session = request.extensions().get::<Session>().cloned();
    let ip = extract_client_ip(&request);
    let key = csrf::client_key(session, ip).await;
    let token = state.csrf().issue(&key);

    let secure = if state.config().base_url.starts_with("https://") {
        "; Secure"
    } else {
        ""
    };

    let mut response = Json(CsrfTokenResponse {
        csrf_token: token.clone(),
    })
    .into_response();

    if state.csrf().double_submit() {
        let cookie = format!("{CSRF_COOKIE}={token}; Path=/; SameSite=Lax{secure}");
        let value = HeaderValue::from_str(&cookie)
            .map_err(|e| AppError::Internal(format!("cookie encoding: {e}")))?;
        response.headers_mut().insert(SET_COOKIE, value);
    }

    Ok(response)
}
