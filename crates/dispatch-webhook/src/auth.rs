use axum::http::{header, HeaderMap};

/// Extract the bearer token from `Authorization: Bearer <token>`, or
/// `None` if the header is absent, non-UTF8, or the wrong scheme.
/// Absence is treated identically to a wrong token downstream — see
/// `JobStore::authenticate` (spec §4.4, no information leakage).
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}
