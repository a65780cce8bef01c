//! Wallet ledger entry model.
//!
//! Entries are append-only: once posted they are never updated or deleted,
//! except for the `voided`/`voided_by` audit stamp set when a reversal is
//! posted against them.

use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Entry direction (credit increases the wallet balance, debit decreases it).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Credit,
    Debit,
}

impl Direction {
    /// Get string representation for database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Credit => "credit",
            Self::Debit => "debit",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "credit" => Some(Self::Credit),
            "debit" => Some(Self::Debit),
            _ => None,
        }
    }

    /// The direction that reverses this one.
    pub fn opposite(&self) -> Self {
        match self {
            Self::Credit => Self::Debit,
            Self::Debit => Self::Credit,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Funding method of an entry. `AdminVoid` and `AdminReverse` are internal
/// tags used by the reversal engine; aggregate balance calculations exclude
/// them so that a void never distorts cash/bank totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    Cash,
    Transfer,
    Epos,
    AdminVoid,
    AdminReverse,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::Transfer => "transfer",
            Self::Epos => "epos",
            Self::AdminVoid => "admin_void",
            Self::AdminReverse => "admin_reverse",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "cash" => Some(Self::Cash),
            "transfer" => Some(Self::Transfer),
            "epos" => Some(Self::Epos),
            "admin_void" => Some(Self::AdminVoid),
            "admin_reverse" => Some(Self::AdminReverse),
            _ => None,
        }
    }

    /// Internal methods belong to the reversal engine, not to money that
    /// entered or left the school.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::AdminVoid | Self::AdminReverse)
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Single wallet ledger entry.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct WalletTransaction {
    pub transaction_id: Uuid,
    pub wallet_id: Uuid,
    pub direction: String,
    pub amount: Decimal,
    pub balance_after: Decimal,
    pub description: Option<String>,
    pub reference: Option<String>,
    pub method: Option<String>,
    pub created_by: Option<String>,
    pub reversal_of: Option<Uuid>,
    pub voided: bool,
    pub voided_by: Option<String>,
    pub created_utc: DateTime<Utc>,
}

impl WalletTransaction {
    pub fn parsed_direction(&self) -> Option<Direction> {
        Direction::from_string(&self.direction)
    }

    pub fn parsed_method(&self) -> Option<Method> {
        self.method.as_deref().and_then(Method::from_string)
    }

    /// Signed amount (positive for credit, negative for debit).
    pub fn signed_amount(&self) -> Decimal {
        match self.parsed_direction() {
            Some(Direction::Credit) => self.amount,
            Some(Direction::Debit) => -self.amount,
            None => Decimal::ZERO,
        }
    }
}

/// Input for posting a single ledger entry.
#[derive(Debug, Clone)]
pub struct PostEntry {
    pub direction: Direction,
    pub amount: Decimal,
    pub method: Method,
    pub description: Option<String>,
    pub reference: Option<String>,
    pub created_by: Option<String>,
    pub reversal_of: Option<Uuid>,
}

/// Generate a collision-resistant reference code, e.g. `TRX-20260830143015-K3QZ7A`.
/// Upstream systems (the ePOS terminal) pass their own ids instead.
pub fn new_reference(prefix: &str) -> String {
    const CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ0123456789";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..6)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect();
    format!("{}-{}-{}", prefix, Utc::now().format("%Y%m%d%H%M%S"), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn direction_round_trips_and_opposes() {
        assert_eq!(Direction::from_string("credit"), Some(Direction::Credit));
        assert_eq!(Direction::from_string("debit"), Some(Direction::Debit));
        assert_eq!(Direction::from_string("bogus"), None);
        assert_eq!(Direction::Credit.opposite(), Direction::Debit);
        assert_eq!(Direction::Debit.opposite(), Direction::Credit);
    }

    #[test]
    fn internal_methods_are_flagged() {
        assert!(Method::AdminVoid.is_internal());
        assert!(Method::AdminReverse.is_internal());
        assert!(!Method::Cash.is_internal());
        assert!(!Method::Transfer.is_internal());
        assert!(!Method::Epos.is_internal());
    }

    #[test]
    fn method_parses_stored_strings() {
        for method in [
            Method::Cash,
            Method::Transfer,
            Method::Epos,
            Method::AdminVoid,
            Method::AdminReverse,
        ] {
            assert_eq!(Method::from_string(method.as_str()), Some(method));
        }
    }

    #[test]
    fn signed_amount_carries_direction() {
        let mut entry = WalletTransaction {
            transaction_id: Uuid::new_v4(),
            wallet_id: Uuid::new_v4(),
            direction: "credit".to_string(),
            amount: dec!(50000),
            balance_after: dec!(50000),
            description: None,
            reference: None,
            method: Some("cash".to_string()),
            created_by: None,
            reversal_of: None,
            voided: false,
            voided_by: None,
            created_utc: Utc::now(),
        };
        assert_eq!(entry.signed_amount(), dec!(50000));
        entry.direction = "debit".to_string();
        assert_eq!(entry.signed_amount(), dec!(-50000));
    }

    #[test]
    fn references_are_prefixed_and_distinct() {
        let a = new_reference("TRX");
        let b = new_reference("TRX");
        assert!(a.starts_with("TRX-"));
        assert_ne!(a, b);
    }
}
