//! Aggregate balance calculator.
//!
//! School-wide cash-on-hand and bank-on-hand are derived by replaying the
//! ledger with method/void filters, never from a running-total column, so
//! they self-heal from any individually corrected entry. Callers that use a
//! total as a precondition for a write must take [`lock_books`] and call
//! these functions on the same transaction that performs the write, so two
//! such transactions cannot both read the same stale total.

use crate::services::database::Database;
use crate::services::metrics::DB_QUERY_DURATION;
use rust_decimal::Decimal;
use serde::Serialize;
use service_core::error::AppError;
use sqlx::PgConnection;
use tracing::instrument;

/// Snapshot of the school-wide buckets.
#[derive(Debug, Clone, Serialize)]
pub struct SchoolBalances {
    pub cash_balance: Decimal,
    pub bank_balance: Decimal,
    pub total_balance: Decimal,
}

// Fixed advisory key for the school books. The buckets are derived sums,
// not rows, so there is nothing to `FOR UPDATE`; every check-then-write
// path against an aggregate takes this lock instead.
const BOOKS_LOCK_KEY: i64 = 0x77_6c_6c_74; // "wllt"

/// Serialize aggregate check-then-write sequences across transactions.
/// The lock is transaction-scoped and releases on commit or rollback.
pub(crate) async fn lock_books(conn: &mut PgConnection) -> Result<(), AppError> {
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(BOOKS_LOCK_KEY)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to lock school books: {}", e))
        })?;
    Ok(())
}

/// Cash on hand: signed cash-method ledger movements, plus completed
/// bank-to-cash transfers, minus pool withdrawals paid out in cash.
/// Reversal entries carry an internal method, so the `method = 'cash'`
/// filter excludes them by construction.
pub async fn total_cash(conn: &mut PgConnection) -> Result<Decimal, AppError> {
    let total: Decimal = sqlx::query_scalar(
        r#"
        SELECT
            COALESCE((
                SELECT SUM(CASE WHEN direction = 'credit' THEN amount ELSE -amount END)
                FROM wallet_transactions
                WHERE method = 'cash' AND NOT voided
            ), 0)
            + COALESCE((
                SELECT SUM(amount) FROM wallet_withdrawals WHERE status = 'done'
            ), 0)
            - COALESCE((
                SELECT SUM(amount) FROM epos_withdrawals
                WHERE status IN ('approved', 'completed') AND payment_method = 'cash'
            ), 0)
        "#,
    )
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to compute cash total: {}", e)))?;

    Ok(total)
}

/// Bank on hand: signed transfer-method ledger movements, minus completed
/// bank-to-cash transfers, minus pool withdrawals paid out by transfer.
pub async fn total_bank(conn: &mut PgConnection) -> Result<Decimal, AppError> {
    let total: Decimal = sqlx::query_scalar(
        r#"
        SELECT
            COALESCE((
                SELECT SUM(CASE WHEN direction = 'credit' THEN amount ELSE -amount END)
                FROM wallet_transactions
                WHERE method = 'transfer' AND NOT voided
            ), 0)
            - COALESCE((
                SELECT SUM(amount) FROM wallet_withdrawals WHERE status = 'done'
            ), 0)
            - COALESCE((
                SELECT SUM(amount) FROM epos_withdrawals
                WHERE status IN ('approved', 'completed') AND payment_method = 'transfer'
            ), 0)
        "#,
    )
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to compute bank total: {}", e)))?;

    Ok(total)
}

impl Database {
    /// Compute both buckets. Recomputed per call; never cached.
    #[instrument(skip(self))]
    pub async fn school_balances(&self) -> Result<SchoolBalances, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["school_balances"])
            .start_timer();

        let mut conn = self
            .pool()
            .acquire()
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to acquire conn: {}", e)))?;

        let cash_balance = total_cash(&mut conn).await?;
        let bank_balance = total_bank(&mut conn).await?;

        timer.observe_duration();

        Ok(SchoolBalances {
            cash_balance,
            bank_balance,
            total_balance: cash_balance + bank_balance,
        })
    }
}
