//! Admin gate for ledger mutations (void/edit).

use crate::AppState;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;

pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    let api_key = headers
        .get("X-Admin-Api-Key")
        .and_then(|value| value.to_str().ok());

    match api_key {
        Some(key) if key == state.config.security.admin_api_key => next.run(request).await,
        _ => {
            tracing::warn!("Rejected unprivileged ledger mutation attempt");
            (
                StatusCode::FORBIDDEN,
                Json(json!({
                    "success": false,
                    "message": "Admin privileges are required for this operation"
                })),
            )
                .into_response()
        }
    }
}
