//! Bearer token extraction from the Authorization header.

use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;

use crate::error::AuthError;

/// Extract a bearer token from the `Authorization` header.
///
/// The scheme match is case-insensitive and surrounding whitespace on the
/// token is trimmed; an empty token is rejected.
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let header = headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingHeader)?
        .to_str()
        .map_err(|_| AuthError::MalformedHeader)?;

    let (scheme, token) = header.split_once(' ').ok_or(AuthError::MalformedHeader)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::MalformedHeader);
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::EmptyToken);
    }

    Ok(token)
}
