//! Withdrawal workflow: the pool withdrawal state machine and bank-to-cash
//! bucket transfers.
//!
//! Availability checks and balance deductions run inside the same
//! transaction with the relevant rows locked, so the check can never go
//! stale between read and write.

use crate::models::{
    new_reference, CashWithdrawal, EposWithdrawal, PaymentMethod, WithdrawalStatus,
};
use crate::services::balances;
use crate::services::database::Database;
use crate::services::metrics::{DB_QUERY_DURATION, WITHDRAWALS_TOTAL};
use rust_decimal::Decimal;
use serde_json::json;
use service_core::error::AppError;
use sqlx::PgConnection;
use tracing::{info, instrument};
use uuid::Uuid;

const WITHDRAWAL_COLUMNS: &str = "withdrawal_id, withdrawal_number, pool_id, amount, status, \
     requested_by, approved_by, approved_utc, rejected_by, rejected_utc, \
     rejection_reason, payment_method, created_utc";

impl Database {
    /// Record a pending request to move funds out of the settlement pool.
    #[instrument(skip(self), fields(amount = %amount))]
    pub async fn create_epos_withdrawal(
        &self,
        amount: Decimal,
        requested_by: Option<&str>,
    ) -> Result<EposWithdrawal, AppError> {
        if amount <= Decimal::ZERO {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Withdrawal amount must be positive"
            )));
        }

        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_epos_withdrawal"])
            .start_timer();

        let pool = self.get_or_create_epos_pool().await?;

        let withdrawal = sqlx::query_as::<_, EposWithdrawal>(&format!(
            r#"
            INSERT INTO epos_withdrawals
                (withdrawal_id, withdrawal_number, pool_id, amount, status, requested_by)
            VALUES ($1, $2, $3, $4, 'pending', $5)
            RETURNING {WITHDRAWAL_COLUMNS}
            "#,
        ))
        .bind(Uuid::new_v4())
        .bind(new_reference("EWD"))
        .bind(pool.pool_id)
        .bind(amount)
        .bind(requested_by)
        .fetch_one(self.pool())
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to create withdrawal: {}", e))
        })?;

        timer.observe_duration();
        WITHDRAWALS_TOTAL.with_label_values(&["pending"]).inc();

        info!(
            withdrawal_number = %withdrawal.withdrawal_number,
            "Pool withdrawal requested"
        );

        Ok(withdrawal)
    }

    /// Approve a pending withdrawal: inside one transaction, lock the
    /// withdrawal and pool rows, recheck both the pool balance and the
    /// chosen bucket aggregate, then debit the pool. The caller notifies the
    /// ePOS system after this commits.
    #[instrument(skip(self), fields(withdrawal_id = %withdrawal_id, method = %payment_method.as_str()))]
    pub async fn approve_epos_withdrawal(
        &self,
        withdrawal_id: Uuid,
        payment_method: PaymentMethod,
        approved_by: &str,
    ) -> Result<EposWithdrawal, AppError> {
        let mut tx = self.pool().begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let withdrawal = Self::lock_withdrawal(&mut tx, withdrawal_id).await?;

        if withdrawal.parsed_status() != Some(WithdrawalStatus::Pending) {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Withdrawal {} is already processed",
                withdrawal.withdrawal_number
            )));
        }

        let pool = Self::lock_pool(&mut tx, withdrawal.pool_id).await?;
        if pool.balance < withdrawal.amount {
            return Err(AppError::InsufficientFunds {
                message: "Insufficient pool balance".to_string(),
                details: json!({
                    "pool_balance": pool.balance,
                    "requested": withdrawal.amount,
                    "shortage": withdrawal.amount - pool.balance,
                }),
            });
        }

        balances::lock_books(&mut tx).await?;
        let available = match payment_method {
            PaymentMethod::Cash => balances::total_cash(&mut tx).await?,
            PaymentMethod::Transfer => balances::total_bank(&mut tx).await?,
        };
        if available < withdrawal.amount {
            return Err(AppError::InsufficientFunds {
                message: format!(
                    "Insufficient {} funds for this withdrawal",
                    payment_method.as_str()
                ),
                details: json!({
                    "available": available,
                    "requested": withdrawal.amount,
                    "shortage": withdrawal.amount - available,
                    "payment_method": payment_method.as_str(),
                }),
            });
        }

        Self::adjust_pool_balance(&mut tx, withdrawal.pool_id, -withdrawal.amount).await?;

        let approved = sqlx::query_as::<_, EposWithdrawal>(&format!(
            r#"
            UPDATE epos_withdrawals
            SET status = 'approved', approved_by = $2, approved_utc = now(),
                payment_method = $3
            WHERE withdrawal_id = $1
            RETURNING {WITHDRAWAL_COLUMNS}
            "#,
        ))
        .bind(withdrawal_id)
        .bind(approved_by)
        .bind(payment_method.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to approve withdrawal: {}", e))
        })?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        WITHDRAWALS_TOTAL.with_label_values(&["approved"]).inc();

        info!(
            withdrawal_number = %approved.withdrawal_number,
            amount = %approved.amount,
            "Pool withdrawal approved"
        );

        Ok(approved)
    }

    /// Reject a pending withdrawal. No balance change; the reason is
    /// mandatory and validated by the caller.
    #[instrument(skip(self, reason), fields(withdrawal_id = %withdrawal_id))]
    pub async fn reject_epos_withdrawal(
        &self,
        withdrawal_id: Uuid,
        rejected_by: &str,
        reason: &str,
    ) -> Result<EposWithdrawal, AppError> {
        let mut tx = self.pool().begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let withdrawal = Self::lock_withdrawal(&mut tx, withdrawal_id).await?;
        let rejected = Self::reject_on(&mut tx, &withdrawal, rejected_by, reason).await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        WITHDRAWALS_TOTAL.with_label_values(&["rejected"]).inc();

        Ok(rejected)
    }

    /// Reject a pending withdrawal addressed by its external number (the
    /// ePOS system does not know internal ids).
    #[instrument(skip(self, reason), fields(withdrawal_number = %withdrawal_number))]
    pub async fn reject_epos_withdrawal_by_number(
        &self,
        withdrawal_number: &str,
        rejected_by: &str,
        reason: &str,
    ) -> Result<EposWithdrawal, AppError> {
        let mut tx = self.pool().begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let withdrawal = Self::lock_withdrawal_by_number(&mut tx, withdrawal_number).await?;
        let rejected = Self::reject_on(&mut tx, &withdrawal, rejected_by, reason).await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        WITHDRAWALS_TOTAL.with_label_values(&["rejected"]).inc();

        Ok(rejected)
    }

    /// Mark an approved withdrawal completed once the ePOS side confirms the
    /// payout landed.
    #[instrument(skip(self), fields(withdrawal_number = %withdrawal_number))]
    pub async fn complete_epos_withdrawal_by_number(
        &self,
        withdrawal_number: &str,
    ) -> Result<EposWithdrawal, AppError> {
        let mut tx = self.pool().begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let withdrawal = Self::lock_withdrawal_by_number(&mut tx, withdrawal_number).await?;

        if withdrawal.parsed_status() != Some(WithdrawalStatus::Approved) {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Withdrawal {} is not awaiting completion",
                withdrawal.withdrawal_number
            )));
        }

        let completed = sqlx::query_as::<_, EposWithdrawal>(&format!(
            r#"
            UPDATE epos_withdrawals
            SET status = 'completed'
            WHERE withdrawal_id = $1
            RETURNING {WITHDRAWAL_COLUMNS}
            "#,
        ))
        .bind(withdrawal.withdrawal_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to complete withdrawal: {}", e))
        })?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        WITHDRAWALS_TOTAL.with_label_values(&["completed"]).inc();

        Ok(completed)
    }

    /// Look up a withdrawal by its external number.
    #[instrument(skip(self), fields(withdrawal_number = %withdrawal_number))]
    pub async fn get_epos_withdrawal_by_number(
        &self,
        withdrawal_number: &str,
    ) -> Result<Option<EposWithdrawal>, AppError> {
        let withdrawal = sqlx::query_as::<_, EposWithdrawal>(&format!(
            "SELECT {WITHDRAWAL_COLUMNS} FROM epos_withdrawals WHERE withdrawal_number = $1",
        ))
        .bind(withdrawal_number)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get withdrawal: {}", e)))?;

        Ok(withdrawal)
    }

    /// List pool withdrawals, newest first.
    #[instrument(skip(self))]
    pub async fn list_epos_withdrawals(&self) -> Result<Vec<EposWithdrawal>, AppError> {
        let withdrawals = sqlx::query_as::<_, EposWithdrawal>(&format!(
            "SELECT {WITHDRAWAL_COLUMNS} FROM epos_withdrawals ORDER BY created_utc DESC",
        ))
        .fetch_all(self.pool())
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list withdrawals: {}", e))
        })?;

        Ok(withdrawals)
    }

    /// Bank-to-cash bucket transfer: verify the bank aggregate covers the
    /// amount, then record a settled (`done`) withdrawal row in the same
    /// transaction. The row feeds directly into the aggregate formulas.
    #[instrument(skip(self), fields(amount = %amount))]
    pub async fn create_cash_withdrawal(
        &self,
        amount: Decimal,
        requested_by: Option<&str>,
    ) -> Result<CashWithdrawal, AppError> {
        if amount <= Decimal::ZERO {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Withdrawal amount must be positive"
            )));
        }

        let mut tx = self.pool().begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        balances::lock_books(&mut tx).await?;
        let available_bank = balances::total_bank(&mut tx).await?;
        if available_bank < amount {
            return Err(AppError::InsufficientFunds {
                message: "Insufficient bank balance for cash withdrawal".to_string(),
                details: json!({
                    "available_bank": available_bank,
                    "requested": amount,
                    "shortage": amount - available_bank,
                }),
            });
        }

        let withdrawal = sqlx::query_as::<_, CashWithdrawal>(
            r#"
            INSERT INTO wallet_withdrawals
                (withdrawal_id, reference, amount, status, requested_by)
            VALUES ($1, $2, $3, 'done', $4)
            RETURNING withdrawal_id, reference, amount, status, requested_by, created_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new_reference("CW"))
        .bind(amount)
        .bind(requested_by)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to record cash withdrawal: {}", e))
        })?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        WITHDRAWALS_TOTAL.with_label_values(&["done"]).inc();

        info!(reference = %withdrawal.reference, amount = %amount, "Cash withdrawal recorded");

        Ok(withdrawal)
    }

    async fn lock_withdrawal(
        conn: &mut PgConnection,
        withdrawal_id: Uuid,
    ) -> Result<EposWithdrawal, AppError> {
        sqlx::query_as::<_, EposWithdrawal>(&format!(
            "SELECT {WITHDRAWAL_COLUMNS} FROM epos_withdrawals WHERE withdrawal_id = $1 FOR UPDATE",
        ))
        .bind(withdrawal_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to lock withdrawal: {}", e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Withdrawal not found")))
    }

    async fn lock_withdrawal_by_number(
        conn: &mut PgConnection,
        withdrawal_number: &str,
    ) -> Result<EposWithdrawal, AppError> {
        sqlx::query_as::<_, EposWithdrawal>(&format!(
            "SELECT {WITHDRAWAL_COLUMNS} FROM epos_withdrawals WHERE withdrawal_number = $1 FOR UPDATE",
        ))
        .bind(withdrawal_number)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to lock withdrawal: {}", e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Withdrawal not found")))
    }

    async fn reject_on(
        conn: &mut PgConnection,
        withdrawal: &EposWithdrawal,
        rejected_by: &str,
        reason: &str,
    ) -> Result<EposWithdrawal, AppError> {
        if withdrawal.parsed_status() != Some(WithdrawalStatus::Pending) {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Withdrawal {} is already processed",
                withdrawal.withdrawal_number
            )));
        }

        let rejected = sqlx::query_as::<_, EposWithdrawal>(&format!(
            r#"
            UPDATE epos_withdrawals
            SET status = 'rejected', rejected_by = $2, rejected_utc = now(),
                rejection_reason = $3
            WHERE withdrawal_id = $1
            RETURNING {WITHDRAWAL_COLUMNS}
            "#,
        ))
        .bind(withdrawal.withdrawal_id)
        .bind(rejected_by)
        .bind(reason)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to reject withdrawal: {}", e))
        })?;

        info!(
            withdrawal_number = %rejected.withdrawal_number,
            "Pool withdrawal rejected"
        );

        Ok(rejected)
    }
}
