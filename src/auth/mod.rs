pub mod verifier;

pub use verifier::{AuthUser, TokenVerifier};

use axum::http;

/// Locate a bearer token on an incoming request.
///
/// Checked in order: explicit `token` query parameter (the usual path for
/// WebSocket clients), `Authorization` header, `auth_token` cookie.
pub fn extract_token(
    headers: &http::HeaderMap,
    query_token: Option<&str>,
) -> Result<String, String> {
    // 1. Query parameter
    if let Some(token) = query_token {
        if !token.is_empty() {
            return Ok(token.to_string());
        }
    }

    // 2. Authorization header
    if let Some(auth_header) = headers.get(http::header::AUTHORIZATION) {
        let auth_str = auth_header
            .to_str()
            .map_err(|_| "Invalid Authorization header".to_string())?;
        return Ok(auth_str
            .strip_prefix("Bearer ")
            .unwrap_or(auth_str)
            .to_string());
    }

    // 3. Cookies
    let cookie_header = headers
        .get(http::header::COOKIE)
        .ok_or_else(|| "Missing authentication token".to_string())?
        .to_str()
        .map_err(|_| "Invalid Cookie header".to_string())?;

    for cookie in cookie::Cookie::split_parse(cookie_header).flatten() {
        if cookie.name() == "auth_token" {
            return Ok(cookie.value().to_string());
        }
    }
    Err("auth_token cookie not found".to_string())
}
