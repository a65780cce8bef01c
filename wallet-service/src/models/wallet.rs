//! Wallet model: one balance-bearing account per santri.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A santri's e-money wallet. Created lazily on first movement; the unique
/// constraint on `santri_id` arbitrates concurrent first access. `balance`
/// is a cache of the non-voided ledger sum and must always match it.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Wallet {
    pub wallet_id: Uuid,
    pub santri_id: Uuid,
    pub balance: Decimal,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}
