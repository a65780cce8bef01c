//! Collective billing handlers.

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::{ApiResponse, CollectivePaymentResponse, CreateCollectivePaymentRequest},
    handlers::acting_admin,
    models::{CollectivePayment, TargetRule},
    services::collective::NewCollectivePayment,
    AppState,
};

/// Create a billing batch and attempt immediate settlement of every item.
pub async fn create_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateCollectivePaymentRequest>,
) -> Result<Json<ApiResponse<CollectivePaymentResponse>>, AppError> {
    payload.validate()?;
    let target_rule = TargetRule::from_string(&payload.target_rule).ok_or_else(|| {
        AppError::BadRequest(anyhow::anyhow!(
            "Unknown target rule '{}'",
            payload.target_rule
        ))
    })?;

    let (payment, items) = state
        .db
        .create_collective_payment(NewCollectivePayment {
            title: payload.title,
            amount_per_santri: payload.amount_per_santri,
            target_rule,
            target_class: payload.target_class,
            santri_ids: payload.santri_ids,
            created_by: Some(acting_admin(&headers)),
        })
        .await?;

    Ok(Json(ApiResponse::success_with_message(
        CollectivePaymentResponse { payment, items },
        "Billing batch created",
    )))
}

/// List billing batches, newest first.
pub async fn list_payments(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<CollectivePayment>>>, AppError> {
    let payments = state.db.list_collective_payments().await?;
    Ok(Json(ApiResponse::success(payments)))
}

/// One batch with its per-santri items.
pub async fn get_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<ApiResponse<CollectivePaymentResponse>>, AppError> {
    let (payment, items) = state
        .db
        .get_collective_payment(payment_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Billing batch not found")))?;

    Ok(Json(ApiResponse::success(CollectivePaymentResponse {
        payment,
        items,
    })))
}

/// Re-attempt every pending item in a batch.
pub async fn retry_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<ApiResponse<CollectivePaymentResponse>>, AppError> {
    let (payment, items) = state.db.retry_collective_payment(payment_id).await?;

    Ok(Json(ApiResponse::success_with_message(
        CollectivePaymentResponse { payment, items },
        "Billing batch retried",
    )))
}
