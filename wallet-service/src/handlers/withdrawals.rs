//! Withdrawal handlers: the ePOS pool withdrawal workflow and the
//! bank-to-cash bucket transfer.

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::{
        ApiResponse, ApproveWithdrawalRequest, CashWithdrawalRequest, CreateWithdrawalRequest,
        RejectWithdrawalRequest,
    },
    handlers::acting_admin,
    models::{CashWithdrawal, EposWithdrawal, PaymentMethod},
    AppState,
};

/// Fire the post-commit ePOS callback without holding the response open.
fn notify_epos(state: &AppState, withdrawal: &EposWithdrawal) {
    let client = state.epos.clone();
    let withdrawal = withdrawal.clone();
    tokio::spawn(async move {
        client.notify_withdrawal(&withdrawal).await;
    });
}

/// Request a withdrawal from the settlement pool.
pub async fn create_withdrawal(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateWithdrawalRequest>,
) -> Result<Json<ApiResponse<EposWithdrawal>>, AppError> {
    payload.validate()?;

    let requested_by = payload
        .requested_by
        .unwrap_or_else(|| acting_admin(&headers));
    let withdrawal = state
        .db
        .create_epos_withdrawal(payload.amount, Some(&requested_by))
        .await?;

    Ok(Json(ApiResponse::success_with_message(
        withdrawal,
        "Withdrawal requested",
    )))
}

/// List pool withdrawals, newest first.
pub async fn list_withdrawals(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<EposWithdrawal>>>, AppError> {
    let withdrawals = state.db.list_epos_withdrawals().await?;
    Ok(Json(ApiResponse::success(withdrawals)))
}

/// Approve a pending withdrawal, debiting the pool from the chosen bucket.
/// The ePOS system is notified after the deduction commits.
pub async fn approve_withdrawal(
    State(state): State<AppState>,
    Path(withdrawal_id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<ApproveWithdrawalRequest>,
) -> Result<Json<ApiResponse<EposWithdrawal>>, AppError> {
    payload.validate()?;
    let method = PaymentMethod::from_string(&payload.payment_method).ok_or_else(|| {
        AppError::BadRequest(anyhow::anyhow!(
            "Unknown payment method '{}'",
            payload.payment_method
        ))
    })?;
    let admin = acting_admin(&headers);

    let approved = state
        .db
        .approve_epos_withdrawal(withdrawal_id, method, &admin)
        .await?;

    notify_epos(&state, &approved);

    Ok(Json(ApiResponse::success_with_message(
        approved,
        "Withdrawal approved",
    )))
}

/// Reject a pending withdrawal (admin, by id).
pub async fn reject_withdrawal(
    State(state): State<AppState>,
    Path(withdrawal_id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<RejectWithdrawalRequest>,
) -> Result<Json<ApiResponse<EposWithdrawal>>, AppError> {
    payload.validate()?;
    let admin = acting_admin(&headers);

    let rejected = state
        .db
        .reject_epos_withdrawal(withdrawal_id, &admin, &payload.reason)
        .await?;

    notify_epos(&state, &rejected);

    Ok(Json(ApiResponse::success_with_message(
        rejected,
        "Withdrawal rejected",
    )))
}

/// Reject a pending withdrawal addressed by its external number. Used by
/// the ePOS system itself to cancel a request it issued.
pub async fn reject_withdrawal_by_number(
    State(state): State<AppState>,
    Path(withdrawal_number): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<RejectWithdrawalRequest>,
) -> Result<Json<ApiResponse<EposWithdrawal>>, AppError> {
    payload.validate()?;
    let actor = acting_admin(&headers);

    let rejected = state
        .db
        .reject_epos_withdrawal_by_number(&withdrawal_number, &actor, &payload.reason)
        .await?;

    Ok(Json(ApiResponse::success_with_message(
        rejected,
        "Withdrawal rejected",
    )))
}

/// Mark an approved withdrawal completed, once the ePOS side confirms the
/// payout landed.
pub async fn complete_withdrawal_by_number(
    State(state): State<AppState>,
    Path(withdrawal_number): Path<String>,
) -> Result<Json<ApiResponse<EposWithdrawal>>, AppError> {
    let completed = state
        .db
        .complete_epos_withdrawal_by_number(&withdrawal_number)
        .await?;

    Ok(Json(ApiResponse::success_with_message(
        completed,
        "Withdrawal completed",
    )))
}

/// Current status of a withdrawal, addressed by its external number.
pub async fn withdrawal_status(
    State(state): State<AppState>,
    Path(withdrawal_number): Path<String>,
) -> Result<Json<ApiResponse<EposWithdrawal>>, AppError> {
    let withdrawal = state
        .db
        .get_epos_withdrawal_by_number(&withdrawal_number)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Withdrawal not found")))?;

    Ok(Json(ApiResponse::success(withdrawal)))
}

/// Move value from the bank bucket to the cash drawer.
pub async fn cash_withdrawal(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CashWithdrawalRequest>,
) -> Result<Json<ApiResponse<CashWithdrawal>>, AppError> {
    payload.validate()?;

    let requested_by = payload
        .requested_by
        .unwrap_or_else(|| acting_admin(&headers));
    let withdrawal = state
        .db
        .create_cash_withdrawal(payload.amount, Some(&requested_by))
        .await?;

    Ok(Json(ApiResponse::success_with_message(
        withdrawal,
        "Cash withdrawal recorded",
    )))
}
