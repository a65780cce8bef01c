//! Ledger entry store and wallet registry.
//!
//! Every operation here runs its read-modify-write sequence inside one
//! database transaction with the wallet row locked, so concurrent movements
//! against the same wallet serialize instead of interleaving.

use crate::models::{new_reference, Direction, Method, Pool, PostEntry, Wallet, WalletTransaction};
use crate::services::database::Database;
use crate::services::metrics::{DB_QUERY_DURATION, LEDGER_ENTRIES_TOTAL, REVERSALS_TOTAL};
use crate::services::balances;
use rust_decimal::Decimal;
use serde_json::json;
use service_core::error::AppError;
use sqlx::PgConnection;
use tracing::{info, instrument};
use uuid::Uuid;

/// Edited values for an existing entry; `None` keeps the original value.
#[derive(Debug, Clone)]
pub struct EditEntry {
    pub amount: Decimal,
    pub description: Option<String>,
    pub method: Option<Method>,
    pub direction: Option<Direction>,
}

impl Database {
    // -------------------------------------------------------------------------
    // Wallet Registry
    // -------------------------------------------------------------------------

    /// Get a santri's wallet if one exists.
    #[instrument(skip(self), fields(santri_id = %santri_id))]
    pub async fn get_wallet(&self, santri_id: Uuid) -> Result<Option<Wallet>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_wallet"])
            .start_timer();

        let wallet = sqlx::query_as::<_, Wallet>(
            r#"
            SELECT wallet_id, santri_id, balance, created_utc, updated_utc
            FROM wallets
            WHERE santri_id = $1
            "#,
        )
        .bind(santri_id)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get wallet: {}", e)))?;

        timer.observe_duration();

        Ok(wallet)
    }

    /// Get or lazily create a santri's wallet. Idempotent and safe under
    /// concurrent first access: the unique constraint on `santri_id`
    /// arbitrates, and the loser fetches the winner's row.
    #[instrument(skip(self), fields(santri_id = %santri_id))]
    pub async fn get_or_create_wallet(&self, santri_id: Uuid) -> Result<Wallet, AppError> {
        self.get_santri(santri_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Santri not found")))?;

        let mut conn = self
            .pool()
            .acquire()
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to acquire conn: {}", e)))?;

        Self::get_or_create_wallet_on(&mut conn, santri_id).await
    }

    /// Transaction-composable variant of [`Self::get_or_create_wallet`].
    /// Uses `ON CONFLICT DO NOTHING` so the race loser does not abort an
    /// enclosing transaction.
    pub(crate) async fn get_or_create_wallet_on(
        conn: &mut PgConnection,
        santri_id: Uuid,
    ) -> Result<Wallet, AppError> {
        sqlx::query(
            r#"
            INSERT INTO wallets (wallet_id, santri_id, balance)
            VALUES ($1, $2, 0)
            ON CONFLICT (santri_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(santri_id)
        .execute(&mut *conn)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create wallet: {}", e)))?;

        sqlx::query_as::<_, Wallet>(
            r#"
            SELECT wallet_id, santri_id, balance, created_utc, updated_utc
            FROM wallets
            WHERE santri_id = $1
            "#,
        )
        .bind(santri_id)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to fetch wallet: {}", e)))
    }

    /// Lock a wallet row for the duration of the enclosing transaction.
    pub(crate) async fn lock_wallet(
        conn: &mut PgConnection,
        wallet_id: Uuid,
    ) -> Result<Wallet, AppError> {
        sqlx::query_as::<_, Wallet>(
            r#"
            SELECT wallet_id, santri_id, balance, created_utc, updated_utc
            FROM wallets
            WHERE wallet_id = $1
            FOR UPDATE
            "#,
        )
        .bind(wallet_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to lock wallet: {}", e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Wallet not found")))
    }

    // -------------------------------------------------------------------------
    // Ledger Entry Store
    // -------------------------------------------------------------------------

    /// Append one entry to a wallet's ledger on an open transaction: lock the
    /// wallet, compute the new balance (credits add, debits subtract; a
    /// negative result is allowed unless a caller-level guard rejected it
    /// first), write the wallet cache, and insert the entry with its
    /// `balance_after` snapshot.
    pub(crate) async fn post_entry_on(
        conn: &mut PgConnection,
        wallet_id: Uuid,
        entry: PostEntry,
    ) -> Result<WalletTransaction, AppError> {
        if entry.amount <= Decimal::ZERO {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Entry amount must be positive"
            )));
        }

        let wallet = Self::lock_wallet(&mut *conn, wallet_id).await?;

        let new_balance = match entry.direction {
            Direction::Credit => wallet.balance + entry.amount,
            Direction::Debit => wallet.balance - entry.amount,
        };

        sqlx::query("UPDATE wallets SET balance = $2, updated_utc = now() WHERE wallet_id = $1")
            .bind(wallet_id)
            .bind(new_balance)
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to update wallet balance: {}", e))
            })?;

        let reference = entry
            .reference
            .unwrap_or_else(|| new_reference("TRX"));

        let inserted = sqlx::query_as::<_, WalletTransaction>(
            r#"
            INSERT INTO wallet_transactions
                (transaction_id, wallet_id, direction, amount, balance_after,
                 description, reference, method, created_by, reversal_of)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING transaction_id, wallet_id, direction, amount, balance_after,
                      description, reference, method, created_by, reversal_of,
                      voided, voided_by, created_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(wallet_id)
        .bind(entry.direction.as_str())
        .bind(entry.amount)
        .bind(new_balance)
        .bind(&entry.description)
        .bind(&reference)
        .bind(entry.method.as_str())
        .bind(&entry.created_by)
        .bind(entry.reversal_of)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!(
                    "Transaction reference '{}' already exists",
                    reference
                ))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to insert entry: {}", e)),
        })?;

        LEDGER_ENTRIES_TOTAL
            .with_label_values(&[entry.direction.as_str(), entry.method.as_str()])
            .inc();

        Ok(inserted)
    }

    /// Post a single entry in its own transaction.
    #[instrument(skip(self, entry), fields(wallet_id = %wallet_id, direction = %entry.direction, amount = %entry.amount))]
    pub async fn post_entry(
        &self,
        wallet_id: Uuid,
        entry: PostEntry,
    ) -> Result<WalletTransaction, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["post_entry"])
            .start_timer();

        let mut tx = self.pool().begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let inserted = Self::post_entry_on(&mut tx, wallet_id, entry).await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();

        info!(
            transaction_id = %inserted.transaction_id,
            balance_after = %inserted.balance_after,
            "Ledger entry posted"
        );

        Ok(inserted)
    }

    /// Post a debit guarded by the school-wide bucket for the chosen method.
    /// Per current product behavior, ad hoc debits check only the aggregate
    /// bucket (the wallet itself may go negative, e.g. administrative
    /// corrections); the ePOS and collective paths check the wallet's own
    /// balance instead.
    #[instrument(skip(self, entry), fields(wallet_id = %wallet_id, amount = %entry.amount))]
    pub async fn post_debit_guarded(
        &self,
        wallet_id: Uuid,
        entry: PostEntry,
    ) -> Result<WalletTransaction, AppError> {
        let mut tx = self.pool().begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        if entry.method == Method::Cash {
            balances::lock_books(&mut tx).await?;
            let available_cash = balances::total_cash(&mut tx).await?;
            if available_cash < entry.amount {
                return Err(AppError::InsufficientFunds {
                    message: "Insufficient cash on hand for this debit".to_string(),
                    details: json!({
                        "available_cash": available_cash,
                        "requested": entry.amount,
                        "shortage": entry.amount - available_cash,
                        "hint": "Top up the cash bucket from the bank first",
                    }),
                });
            }
        }

        let inserted = Self::post_entry_on(&mut tx, wallet_id, entry).await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        Ok(inserted)
    }

    /// Get a single ledger entry.
    #[instrument(skip(self), fields(transaction_id = %transaction_id))]
    pub async fn get_transaction(
        &self,
        transaction_id: Uuid,
    ) -> Result<Option<WalletTransaction>, AppError> {
        let entry = sqlx::query_as::<_, WalletTransaction>(
            r#"
            SELECT transaction_id, wallet_id, direction, amount, balance_after,
                   description, reference, method, created_by, reversal_of,
                   voided, voided_by, created_utc
            FROM wallet_transactions
            WHERE transaction_id = $1
            "#,
        )
        .bind(transaction_id)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get entry: {}", e)))?;

        Ok(entry)
    }

    /// List a wallet's ledger entries, newest first. Voided entries stay
    /// visible for audit.
    #[instrument(skip(self), fields(wallet_id = %wallet_id))]
    pub async fn list_wallet_transactions(
        &self,
        wallet_id: Uuid,
    ) -> Result<Vec<WalletTransaction>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_wallet_transactions"])
            .start_timer();

        let entries = sqlx::query_as::<_, WalletTransaction>(
            r#"
            SELECT transaction_id, wallet_id, direction, amount, balance_after,
                   description, reference, method, created_by, reversal_of,
                   voided, voided_by, created_utc
            FROM wallet_transactions
            WHERE wallet_id = $1
            ORDER BY created_utc DESC, transaction_id DESC
            "#,
        )
        .bind(wallet_id)
        .fetch_all(self.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list entries: {}", e)))?;

        timer.observe_duration();

        Ok(entries)
    }

    // -------------------------------------------------------------------------
    // Reversal / Void Engine
    // -------------------------------------------------------------------------

    /// Void a posted entry: post a compensating entry of the opposite
    /// direction tagged `admin_reverse`, then flip `voided`/`voided_by` on
    /// the original. The original's amount, direction, and `balance_after`
    /// are never touched.
    #[instrument(skip(self), fields(transaction_id = %transaction_id, admin = %admin))]
    pub async fn void_entry(
        &self,
        transaction_id: Uuid,
        admin: &str,
    ) -> Result<(WalletTransaction, WalletTransaction), AppError> {
        let mut tx = self.pool().begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let (original, reversal) = Self::void_entry_on(&mut tx, transaction_id, admin).await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        REVERSALS_TOTAL.with_label_values(&["void"]).inc();

        info!(
            transaction_id = %transaction_id,
            reversal_id = %reversal.transaction_id,
            "Ledger entry voided"
        );

        Ok((original, reversal))
    }

    pub(crate) async fn void_entry_on(
        conn: &mut PgConnection,
        transaction_id: Uuid,
        admin: &str,
    ) -> Result<(WalletTransaction, WalletTransaction), AppError> {
        let original = sqlx::query_as::<_, WalletTransaction>(
            r#"
            SELECT transaction_id, wallet_id, direction, amount, balance_after,
                   description, reference, method, created_by, reversal_of,
                   voided, voided_by, created_utc
            FROM wallet_transactions
            WHERE transaction_id = $1
            FOR UPDATE
            "#,
        )
        .bind(transaction_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load entry: {}", e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Transaction not found")))?;

        if original.voided {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Transaction is already voided"
            )));
        }

        let direction = original.parsed_direction().ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!(
                "Stored direction '{}' is not recognized",
                original.direction
            ))
        })?;

        let display_ref = original
            .reference
            .clone()
            .unwrap_or_else(|| original.transaction_id.to_string());

        let reversal = Self::post_entry_on(
            &mut *conn,
            original.wallet_id,
            PostEntry {
                direction: direction.opposite(),
                amount: original.amount,
                method: Method::AdminReverse,
                description: Some(format!("Reversal of {}", display_ref)),
                reference: Some(new_reference("RVS")),
                created_by: Some(admin.to_string()),
                reversal_of: Some(original.transaction_id),
            },
        )
        .await?;

        let voided = sqlx::query_as::<_, WalletTransaction>(
            r#"
            UPDATE wallet_transactions
            SET voided = true, voided_by = $2
            WHERE transaction_id = $1
            RETURNING transaction_id, wallet_id, direction, amount, balance_after,
                      description, reference, method, created_by, reversal_of,
                      voided, voided_by, created_utc
            "#,
        )
        .bind(transaction_id)
        .bind(admin)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to mark voided: {}", e)))?;

        Ok((voided, reversal))
    }

    /// Edit a posted entry: void it, then post a brand-new entry with the
    /// edited values in the same transaction. Same direction as the original
    /// unless explicitly overridden.
    #[instrument(skip(self, edit), fields(transaction_id = %transaction_id, admin = %admin))]
    pub async fn edit_entry(
        &self,
        transaction_id: Uuid,
        admin: &str,
        edit: EditEntry,
    ) -> Result<(WalletTransaction, WalletTransaction, WalletTransaction), AppError> {
        if edit.amount <= Decimal::ZERO {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Entry amount must be positive"
            )));
        }

        let mut tx = self.pool().begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let (original, reversal) = Self::void_entry_on(&mut tx, transaction_id, admin).await?;

        let direction = edit
            .direction
            .or_else(|| original.parsed_direction())
            .ok_or_else(|| {
                AppError::InternalError(anyhow::anyhow!("Original direction is not recognized"))
            })?;
        let method = edit
            .method
            .or_else(|| original.parsed_method())
            .unwrap_or(Method::Cash);

        let replacement = Self::post_entry_on(
            &mut tx,
            original.wallet_id,
            PostEntry {
                direction,
                amount: edit.amount,
                method,
                description: edit.description.or_else(|| original.description.clone()),
                reference: None,
                created_by: Some(admin.to_string()),
                reversal_of: None,
            },
        )
        .await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        REVERSALS_TOTAL.with_label_values(&["edit"]).inc();

        info!(
            transaction_id = %transaction_id,
            replacement_id = %replacement.transaction_id,
            "Ledger entry edited"
        );

        Ok((original, reversal, replacement))
    }

    // -------------------------------------------------------------------------
    // ePOS sales
    // -------------------------------------------------------------------------

    /// Process a point-of-sale purchase: debit the santri's wallet (guarded
    /// by its own balance) and credit the settlement pool, atomically.
    #[instrument(skip(self, description), fields(santri_id = %santri_id, amount = %amount))]
    pub async fn process_epos_sale(
        &self,
        santri_id: Uuid,
        amount: Decimal,
        reference: Option<String>,
        description: String,
    ) -> Result<(WalletTransaction, Wallet, Pool), AppError> {
        if amount <= Decimal::ZERO {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Entry amount must be positive"
            )));
        }

        // Lazy pool creation happens outside the financial transaction so a
        // conflicting concurrent create cannot abort it.
        let pool = self.get_or_create_epos_pool().await?;

        let mut tx = self.pool().begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let wallet = Self::get_or_create_wallet_on(&mut tx, santri_id).await?;
        let locked = Self::lock_wallet(&mut tx, wallet.wallet_id).await?;

        if locked.balance < amount {
            return Err(AppError::InsufficientFunds {
                message: "Insufficient wallet balance".to_string(),
                details: json!({
                    "wallet_balance": locked.balance,
                    "requested": amount,
                    "shortage": amount - locked.balance,
                }),
            });
        }

        let entry = Self::post_entry_on(
            &mut tx,
            wallet.wallet_id,
            PostEntry {
                direction: Direction::Debit,
                amount,
                method: Method::Epos,
                description: Some(description),
                reference,
                created_by: Some("epos".to_string()),
                reversal_of: None,
            },
        )
        .await?;

        Self::lock_pool(&mut tx, pool.pool_id).await?;
        let pool = Self::adjust_pool_balance(&mut tx, pool.pool_id, amount).await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        let wallet = Wallet {
            balance: entry.balance_after,
            updated_utc: entry.created_utc,
            ..wallet
        };

        Ok((entry, wallet, pool))
    }

    // -------------------------------------------------------------------------
    // Reconciliation
    // -------------------------------------------------------------------------

    /// Recompute a wallet's cached balance by replaying its full ledger.
    /// Every entry moved the cache when it was posted, including voided
    /// originals and the reversals that compensate them, so the sum runs
    /// over all entries unconditionally. The cache must always equal this
    /// sum; running the routine is a no-op on a healthy wallet.
    #[instrument(skip(self), fields(wallet_id = %wallet_id))]
    pub async fn reconcile_wallet_balance(&self, wallet_id: Uuid) -> Result<Decimal, AppError> {
        let mut tx = self.pool().begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        Self::lock_wallet(&mut tx, wallet_id).await?;

        let ledger_sum: Decimal = sqlx::query_scalar(
            r#"
            SELECT COALESCE(
                SUM(CASE WHEN direction = 'credit' THEN amount ELSE -amount END),
                0
            )
            FROM wallet_transactions
            WHERE wallet_id = $1
            "#,
        )
        .bind(wallet_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to sum ledger: {}", e)))?;

        sqlx::query("UPDATE wallets SET balance = $2, updated_utc = now() WHERE wallet_id = $1")
            .bind(wallet_id)
            .bind(ledger_sum)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to write balance: {}", e))
            })?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        Ok(ledger_sum)
    }
}
