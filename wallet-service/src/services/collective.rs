//! Collective billing: fan-out debit batches against many wallets with
//! per-item outcome tracking and retry.
//!
//! A whole batch runs in one transaction. An individual santri's
//! insufficient balance is an expected outcome recorded on the item, not an
//! error; anything else rolls the batch back.

use crate::models::{
    new_reference, CollectivePayment, CollectivePaymentItem, CollectiveStatus, Direction, Method,
    PostEntry, TargetRule,
};
use crate::services::database::Database;
use crate::services::metrics::COLLECTIVE_ITEMS_TOTAL;
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::PgConnection;
use tracing::{info, instrument};
use uuid::Uuid;

const PAYMENT_COLUMNS: &str = "payment_id, title, amount_per_santri, target_rule, target_class, \
     total_santri, collected_amount, outstanding_amount, status, created_by, \
     created_utc, updated_utc";

const ITEM_COLUMNS: &str = "item_id, payment_id, santri_id, wallet_id, amount, status, \
     failure_reason, transaction_id, created_utc, updated_utc";

/// Input for a new billing batch.
#[derive(Debug, Clone)]
pub struct NewCollectivePayment {
    pub title: String,
    pub amount_per_santri: Decimal,
    pub target_rule: TargetRule,
    pub target_class: Option<String>,
    pub santri_ids: Vec<Uuid>,
    pub created_by: Option<String>,
}

impl Database {
    /// Create a billing batch: resolve the target rule to a santri set,
    /// create one item per santri, then attempt to settle each item
    /// immediately. All inside one transaction.
    #[instrument(skip(self, batch), fields(title = %batch.title, rule = %batch.target_rule.as_str()))]
    pub async fn create_collective_payment(
        &self,
        batch: NewCollectivePayment,
    ) -> Result<(CollectivePayment, Vec<CollectivePaymentItem>), AppError> {
        if batch.amount_per_santri <= Decimal::ZERO {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Amount per santri must be positive"
            )));
        }

        let mut tx = self.pool().begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let targets = Self::resolve_targets(&mut tx, &batch).await?;
        if targets.is_empty() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "No valid targets for this billing batch"
            )));
        }

        let payment = sqlx::query_as::<_, CollectivePayment>(&format!(
            r#"
            INSERT INTO collective_payments
                (payment_id, title, amount_per_santri, target_rule, target_class,
                 total_santri, collected_amount, outstanding_amount, status, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, 0, $7, 'active', $8)
            RETURNING {PAYMENT_COLUMNS}
            "#,
        ))
        .bind(Uuid::new_v4())
        .bind(&batch.title)
        .bind(batch.amount_per_santri)
        .bind(batch.target_rule.as_str())
        .bind(&batch.target_class)
        .bind(targets.len() as i32)
        .bind(batch.amount_per_santri * Decimal::from(targets.len() as i64))
        .bind(&batch.created_by)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to create billing batch: {}", e))
        })?;

        // Create every item up front, then attempt payment.
        for santri_id in &targets {
            let wallet = Self::get_or_create_wallet_on(&mut tx, *santri_id).await?;
            sqlx::query(
                r#"
                INSERT INTO collective_payment_items
                    (item_id, payment_id, santri_id, wallet_id, amount, status)
                VALUES ($1, $2, $3, $4, $5, 'pending')
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(payment.payment_id)
            .bind(santri_id)
            .bind(wallet.wallet_id)
            .bind(batch.amount_per_santri)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to create batch item: {}", e))
            })?;
        }

        let payment = Self::settle_pending_items(&mut tx, &payment).await?;
        let items = Self::items_on(&mut tx, payment.payment_id).await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        info!(
            payment_id = %payment.payment_id,
            total_santri = payment.total_santri,
            collected = %payment.collected_amount,
            outstanding = %payment.outstanding_amount,
            "Billing batch created"
        );

        Ok((payment, items))
    }

    /// Re-attempt every `pending` item in a batch, typically after balances
    /// have been topped up. Totals are recomputed from per-item statuses
    /// rather than incremented, so partial retries never double-count.
    #[instrument(skip(self), fields(payment_id = %payment_id))]
    pub async fn retry_collective_payment(
        &self,
        payment_id: Uuid,
    ) -> Result<(CollectivePayment, Vec<CollectivePaymentItem>), AppError> {
        let mut tx = self.pool().begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let payment = sqlx::query_as::<_, CollectivePayment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM collective_payments WHERE payment_id = $1 FOR UPDATE",
        ))
        .bind(payment_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to lock batch: {}", e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Billing batch not found")))?;

        if payment.parsed_status() == Some(CollectiveStatus::Completed) {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Billing batch '{}' is already completed",
                payment.title
            )));
        }

        let payment = Self::settle_pending_items(&mut tx, &payment).await?;
        let items = Self::items_on(&mut tx, payment.payment_id).await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        info!(
            payment_id = %payment.payment_id,
            collected = %payment.collected_amount,
            outstanding = %payment.outstanding_amount,
            "Billing batch retried"
        );

        Ok((payment, items))
    }

    #[instrument(skip(self), fields(payment_id = %payment_id))]
    pub async fn get_collective_payment(
        &self,
        payment_id: Uuid,
    ) -> Result<Option<(CollectivePayment, Vec<CollectivePaymentItem>)>, AppError> {
        let payment = sqlx::query_as::<_, CollectivePayment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM collective_payments WHERE payment_id = $1",
        ))
        .bind(payment_id)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get batch: {}", e)))?;

        let Some(payment) = payment else {
            return Ok(None);
        };

        let mut conn = self.pool().acquire().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to acquire conn: {}", e))
        })?;
        let items = Self::items_on(&mut conn, payment_id).await?;

        Ok(Some((payment, items)))
    }

    /// List batches, newest first.
    #[instrument(skip(self))]
    pub async fn list_collective_payments(&self) -> Result<Vec<CollectivePayment>, AppError> {
        let payments = sqlx::query_as::<_, CollectivePayment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM collective_payments ORDER BY created_utc DESC",
        ))
        .fetch_all(self.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list batches: {}", e)))?;

        Ok(payments)
    }

    /// Resolve the target rule to a concrete santri id set.
    async fn resolve_targets(
        conn: &mut PgConnection,
        batch: &NewCollectivePayment,
    ) -> Result<Vec<Uuid>, AppError> {
        let targets = match batch.target_rule {
            TargetRule::All => sqlx::query_scalar::<_, Uuid>("SELECT santri_id FROM santri")
                .fetch_all(&mut *conn)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to resolve targets: {}", e))
                })?,
            TargetRule::Class => {
                let class = batch.target_class.as_deref().ok_or_else(|| {
                    AppError::BadRequest(anyhow::anyhow!(
                        "target_class is required for class-targeted batches"
                    ))
                })?;
                sqlx::query_scalar::<_, Uuid>("SELECT santri_id FROM santri WHERE class_name = $1")
                    .bind(class)
                    .fetch_all(&mut *conn)
                    .await
                    .map_err(|e| {
                        AppError::DatabaseError(anyhow::anyhow!("Failed to resolve targets: {}", e))
                    })?
            }
            TargetRule::Individual => {
                if batch.santri_ids.is_empty() {
                    Vec::new()
                } else {
                    sqlx::query_scalar::<_, Uuid>(
                        "SELECT santri_id FROM santri WHERE santri_id = ANY($1)",
                    )
                    .bind(&batch.santri_ids)
                    .fetch_all(&mut *conn)
                    .await
                    .map_err(|e| {
                        AppError::DatabaseError(anyhow::anyhow!("Failed to resolve targets: {}", e))
                    })?
                }
            }
        };

        Ok(targets)
    }

    /// Attempt payment for every `pending` item of a batch, then recompute
    /// the batch totals from the per-item statuses.
    async fn settle_pending_items(
        conn: &mut PgConnection,
        payment: &CollectivePayment,
    ) -> Result<CollectivePayment, AppError> {
        let pending = sqlx::query_as::<_, CollectivePaymentItem>(&format!(
            "SELECT {ITEM_COLUMNS} FROM collective_payment_items \
             WHERE payment_id = $1 AND status = 'pending' ORDER BY created_utc",
        ))
        .bind(payment.payment_id)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to load pending items: {}", e))
        })?;

        for item in pending {
            let wallet = Self::lock_wallet(&mut *conn, item.wallet_id).await?;

            if wallet.balance < item.amount {
                sqlx::query(
                    "UPDATE collective_payment_items \
                     SET failure_reason = $2, updated_utc = now() WHERE item_id = $1",
                )
                .bind(item.item_id)
                .bind(format!(
                    "Insufficient wallet balance: has {}, needs {}",
                    wallet.balance, item.amount
                ))
                .execute(&mut *conn)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to update item: {}", e))
                })?;

                COLLECTIVE_ITEMS_TOTAL.with_label_values(&["pending"]).inc();
                continue;
            }

            let entry = Self::post_entry_on(
                &mut *conn,
                item.wallet_id,
                PostEntry {
                    direction: Direction::Debit,
                    amount: item.amount,
                    method: Method::Cash,
                    description: Some(format!("Collective payment: {}", payment.title)),
                    reference: Some(new_reference("CLP")),
                    created_by: payment.created_by.clone(),
                    reversal_of: None,
                },
            )
            .await?;

            sqlx::query(
                "UPDATE collective_payment_items \
                 SET status = 'paid', failure_reason = NULL, transaction_id = $2, \
                     updated_utc = now() \
                 WHERE item_id = $1",
            )
            .bind(item.item_id)
            .bind(entry.transaction_id)
            .execute(&mut *conn)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update item: {}", e)))?;

            COLLECTIVE_ITEMS_TOTAL.with_label_values(&["paid"]).inc();
        }

        Self::recompute_totals(conn, payment.payment_id).await
    }

    /// Derive `collected`/`outstanding`/`status` from the item rows. Sums
    /// are recomputed, never incremented, so retries cannot double-count.
    async fn recompute_totals(
        conn: &mut PgConnection,
        payment_id: Uuid,
    ) -> Result<CollectivePayment, AppError> {
        sqlx::query_as::<_, CollectivePayment>(&format!(
            r#"
            UPDATE collective_payments p
            SET collected_amount = totals.collected,
                outstanding_amount = totals.outstanding,
                status = CASE WHEN totals.outstanding = 0 THEN 'completed' ELSE 'active' END,
                updated_utc = now()
            FROM (
                SELECT
                    COALESCE(SUM(amount) FILTER (WHERE status = 'paid'), 0) AS collected,
                    COALESCE(SUM(amount) FILTER (WHERE status = 'pending'), 0) AS outstanding
                FROM collective_payment_items
                WHERE payment_id = $1
            ) AS totals
            WHERE p.payment_id = $1
            RETURNING {PAYMENT_COLUMNS}
            "#,
        ))
        .bind(payment_id)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to recompute batch totals: {}", e))
        })
    }

    async fn items_on(
        conn: &mut PgConnection,
        payment_id: Uuid,
    ) -> Result<Vec<CollectivePaymentItem>, AppError> {
        sqlx::query_as::<_, CollectivePaymentItem>(&format!(
            "SELECT {ITEM_COLUMNS} FROM collective_payment_items \
             WHERE payment_id = $1 ORDER BY created_utc",
        ))
        .bind(payment_id)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load batch items: {}", e)))
    }
}
