//! HTTP handlers.
//!
//! Handlers validate input, call into the services layer, and wrap results
//! in the `{success, data?, message?}` envelope. Health, readiness, and
//! metrics endpoints live in `startup.rs` next to the router.

pub mod collective;
pub mod epos;
pub mod wallets;
pub mod withdrawals;

use axum::http::HeaderMap;

/// Acting admin for audit stamps, taken from the `x-admin-user` header set
/// by the admin frontend.
pub(crate) fn acting_admin(headers: &HeaderMap) -> String {
    headers
        .get("x-admin-user")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| "admin".to_string())
}
