//! Route handlers.

pub mod records;
pub mod workflows;

use axum::http::HeaderMap;

/// Header naming the user on whose behalf a request is made.
pub const ACTING_USER_HEADER: &str = "x-user-id";

pub(crate) fn acting_user(headers: &HeaderMap) -> Option<String> {
    headers
        .get(ACTING_USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
