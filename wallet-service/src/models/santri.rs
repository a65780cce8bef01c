//! Santri (student) read model.
//!
//! Santri records are owned by the surrounding admin system; the ledger
//! reads them for wallet creation, RFID lookup, and billing target
//! resolution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Santri {
    pub santri_id: Uuid,
    pub name: String,
    pub class_name: Option<String>,
    pub created_utc: DateTime<Utc>,
}
