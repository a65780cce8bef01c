//! Wallet ledger handlers: topup, debit, transaction listing, admin
//! void/edit, and the school-wide balance report.

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
        ApiResponse, DebitRequest, EditResponse, EditTransactionRequest, PostEntryResponse,
        TopupRequest, TransactionView, VoidResponse, WalletTransactionsResponse,
    },
    handlers::acting_admin,
    models::{Direction, Method, PostEntry},
    services::balances::SchoolBalances,
    services::ledger::EditEntry,
    AppState,
};

/// Parse a client-supplied method string. Internal reversal methods are
/// reserved for the void engine and cannot be posted directly.
fn parse_method(method: Option<&str>) -> Result<Method, AppError> {
    let Some(s) = method else {
        return Ok(Method::Cash);
    };
    let parsed = Method::from_string(s)
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Unknown method '{}'", s)))?;
    if parsed.is_internal() {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Method '{}' is reserved for reversals",
            s
        )));
    }
    Ok(parsed)
}

fn parse_direction(direction: Option<&str>) -> Result<Option<Direction>, AppError> {
    direction
        .map(|s| {
            Direction::from_string(s)
                .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Unknown direction '{}'", s)))
        })
        .transpose()
}

/// Credit a santri's wallet.
pub async fn topup(
    State(state): State<AppState>,
    Path(santri_id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<TopupRequest>,
) -> Result<Json<ApiResponse<PostEntryResponse>>, AppError> {
    payload.validate()?;
    let method = parse_method(payload.method.as_deref())?;

    tracing::info!(santri_id = %santri_id, amount = %payload.amount, method = %method, "Topup requested");

    let wallet = state.db.get_or_create_wallet(santri_id).await?;
    let entry = state
        .db
        .post_entry(
            wallet.wallet_id,
            PostEntry {
                direction: Direction::Credit,
                amount: payload.amount,
                method,
                description: payload.description,
                reference: None,
                created_by: Some(acting_admin(&headers)),
                reversal_of: None,
            },
        )
        .await?;

    let balance = entry.balance_after;
    Ok(Json(ApiResponse::success(PostEntryResponse {
        transaction: TransactionView::from(entry),
        balance,
    })))
}

/// Debit a santri's wallet. Guarded by the school-wide cash bucket when
/// `method=cash`; the wallet itself may go negative on this path.
pub async fn debit(
    State(state): State<AppState>,
    Path(santri_id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<DebitRequest>,
) -> Result<Json<ApiResponse<PostEntryResponse>>, AppError> {
    payload.validate()?;
    let method = parse_method(payload.method.as_deref())?;

    tracing::info!(santri_id = %santri_id, amount = %payload.amount, method = %method, "Debit requested");

    let wallet = state.db.get_or_create_wallet(santri_id).await?;
    let entry = state
        .db
        .post_debit_guarded(
            wallet.wallet_id,
            PostEntry {
                direction: Direction::Debit,
                amount: payload.amount,
                method,
                description: payload.description,
                reference: None,
                created_by: Some(acting_admin(&headers)),
                reversal_of: None,
            },
        )
        .await?;

    let balance = entry.balance_after;
    Ok(Json(ApiResponse::success(PostEntryResponse {
        transaction: TransactionView::from(entry),
        balance,
    })))
}

/// List a wallet's ledger entries, newest first. A pure read: a santri
/// whose wallet has not been opened yet gets an empty listing, not a new
/// wallet row.
pub async fn list_transactions(
    State(state): State<AppState>,
    Path(santri_id): Path<Uuid>,
) -> Result<Json<ApiResponse<WalletTransactionsResponse>>, AppError> {
    state
        .db
        .get_santri(santri_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Santri not found")))?;

    let Some(wallet) = state.db.get_wallet(santri_id).await? else {
        return Ok(Json(ApiResponse::success(WalletTransactionsResponse {
            wallet_id: None,
            balance: rust_decimal::Decimal::ZERO,
            transactions: Vec::new(),
        })));
    };

    let entries = state.db.list_wallet_transactions(wallet.wallet_id).await?;

    Ok(Json(ApiResponse::success(WalletTransactionsResponse {
        wallet_id: Some(wallet.wallet_id),
        balance: wallet.balance,
        transactions: entries.into_iter().map(TransactionView::from).collect(),
    })))
}

/// Admin edit: void the original and repost with the edited values, in one
/// transaction.
pub async fn edit_transaction(
    State(state): State<AppState>,
    Path(transaction_id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<EditTransactionRequest>,
) -> Result<Json<ApiResponse<EditResponse>>, AppError> {
    payload.validate()?;
    let method = payload
        .method
        .as_deref()
        .map(|s| parse_method(Some(s)))
        .transpose()?;
    let direction = parse_direction(payload.direction.as_deref())?;
    let admin = acting_admin(&headers);

    tracing::info!(transaction_id = %transaction_id, admin = %admin, "Transaction edit requested");

    let (original, reversal, replacement) = state
        .db
        .edit_entry(
            transaction_id,
            &admin,
            EditEntry {
                amount: payload.amount,
                description: payload.description,
                method,
                direction,
            },
        )
        .await?;

    let balance = replacement.balance_after;
    Ok(Json(ApiResponse::success_with_message(
        EditResponse {
            original: TransactionView::from(original),
            reversal: TransactionView::from(reversal),
            replacement: TransactionView::from(replacement),
            balance,
        },
        "Transaction edited",
    )))
}

/// Admin void: post a compensating reversal and flag the original.
pub async fn void_transaction(
    State(state): State<AppState>,
    Path(transaction_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<VoidResponse>>, AppError> {
    let admin = acting_admin(&headers);

    tracing::info!(transaction_id = %transaction_id, admin = %admin, "Transaction void requested");

    let (original, reversal) = state.db.void_entry(transaction_id, &admin).await?;

    let balance = reversal.balance_after;
    Ok(Json(ApiResponse::success_with_message(
        VoidResponse {
            original: TransactionView::from(original),
            reversal: TransactionView::from(reversal),
            balance,
        },
        "Transaction voided",
    )))
}

/// School-wide cash/bank/total balances, replayed from the ledger.
pub async fn school_balances(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<SchoolBalances>>, AppError> {
    let balances = state.db.school_balances().await?;
    Ok(Json(ApiResponse::success(balances)))
}
