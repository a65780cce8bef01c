//! Pool account model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Default pool credited by point-of-sale transactions.
pub const EPOS_POOL_NAME: &str = "epos";

/// A named aggregate account, independent of any single wallet. The ePOS
/// settlement pool is credited by terminal sales and debited by approved
/// withdrawals.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Pool {
    pub pool_id: Uuid,
    pub name: String,
    pub balance: Decimal,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}
