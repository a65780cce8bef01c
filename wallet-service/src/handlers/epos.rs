//! ePOS terminal handlers: point-of-sale debits and the settlement pool
//! balance.

use axum::{extract::State, Json};
use service_core::error::AppError;
use validator::Validate;

use crate::{
    dtos::{ApiResponse, EposTransactionRequest, EposTransactionResponse, PoolBalanceResponse, TransactionView},
    AppState,
};

/// Process a sale from an ePOS terminal: debit the santri's wallet, credit
/// the settlement pool. The santri is addressed by id or by the RFID tag
/// presented at the terminal.
pub async fn process_transaction(
    State(state): State<AppState>,
    Json(payload): Json<EposTransactionRequest>,
) -> Result<Json<ApiResponse<EposTransactionResponse>>, AppError> {
    payload.validate()?;

    let santri = match payload.santri_id {
        Some(id) => state
            .db
            .get_santri(id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Santri not found")))?,
        None => {
            // Validation guarantees uid is present when santri_id is absent.
            let uid = payload.uid.as_deref().unwrap_or_default();
            state
                .db
                .find_santri_by_rfid(uid)
                .await?
                .ok_or_else(|| {
                    AppError::NotFound(anyhow::anyhow!("RFID tag '{}' is not registered", uid))
                })?
        }
    };

    tracing::info!(
        santri_id = %santri.santri_id,
        amount = %payload.amount,
        epos_txn_id = ?payload.epos_txn_id,
        "ePOS sale"
    );

    // An ePOS transaction id doubles as an idempotency key via the unique
    // reference column.
    let reference = payload
        .epos_txn_id
        .as_deref()
        .map(|id| format!("EPOS-{}", id));

    let mut description = format!("ePOS purchase by {}", santri.name);
    if let Some(meta) = &payload.meta {
        description.push_str(&format!(" | {}", meta));
    }

    let (entry, wallet, pool) = state
        .db
        .process_epos_sale(santri.santri_id, payload.amount, reference, description)
        .await?;

    Ok(Json(ApiResponse::success(EposTransactionResponse {
        transaction: TransactionView::from(entry),
        wallet_balance: wallet.balance,
        pool_balance: pool.balance,
    })))
}

/// Current settlement pool balance.
pub async fn pool_balance(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<PoolBalanceResponse>>, AppError> {
    let pool = state.db.get_or_create_epos_pool().await?;
    Ok(Json(ApiResponse::success(PoolBalanceResponse {
        pool_id: pool.pool_id,
        name: pool.name,
        balance: pool.balance,
    })))
}
