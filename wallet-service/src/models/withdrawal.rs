//! Withdrawal models: the pool withdrawal state machine and bank-to-cash
//! bucket transfers.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Pool withdrawal lifecycle: `pending -> approved -> completed`, or
/// `pending -> rejected` (terminal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStatus {
    Pending,
    Approved,
    Rejected,
    Completed,
}

impl WithdrawalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Completed => "completed",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    /// A resolved withdrawal must never be processed again.
    pub fn is_resolved(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Bucket a withdrawal is paid from at approval time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Transfer,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::Transfer => "transfer",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "cash" => Some(Self::Cash),
            "transfer" => Some(Self::Transfer),
            _ => None,
        }
    }
}

/// Request to move funds out of an ePOS settlement pool.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct EposWithdrawal {
    pub withdrawal_id: Uuid,
    pub withdrawal_number: String,
    pub pool_id: Uuid,
    pub amount: Decimal,
    pub status: String,
    pub requested_by: Option<String>,
    pub approved_by: Option<String>,
    pub approved_utc: Option<DateTime<Utc>>,
    pub rejected_by: Option<String>,
    pub rejected_utc: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub payment_method: Option<String>,
    pub created_utc: DateTime<Utc>,
}

impl EposWithdrawal {
    pub fn parsed_status(&self) -> Option<WithdrawalStatus> {
        WithdrawalStatus::from_string(&self.status)
    }
}

/// A settled bank-to-cash bucket transfer. No approval step; recorded
/// directly as `done` and fed into the aggregate balance formulas.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CashWithdrawal {
    pub withdrawal_id: Uuid,
    pub reference: String,
    pub amount: Decimal,
    pub status: String,
    pub requested_by: Option<String>,
    pub created_utc: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_pending_is_unresolved() {
        assert!(!WithdrawalStatus::Pending.is_resolved());
        assert!(WithdrawalStatus::Approved.is_resolved());
        assert!(WithdrawalStatus::Rejected.is_resolved());
        assert!(WithdrawalStatus::Completed.is_resolved());
    }

    #[test]
    fn status_round_trips() {
        for status in [
            WithdrawalStatus::Pending,
            WithdrawalStatus::Approved,
            WithdrawalStatus::Rejected,
            WithdrawalStatus::Completed,
        ] {
            assert_eq!(WithdrawalStatus::from_string(status.as_str()), Some(status));
        }
        assert_eq!(WithdrawalStatus::from_string("done"), None);
    }

    #[test]
    fn payment_method_parses() {
        assert_eq!(PaymentMethod::from_string("cash"), Some(PaymentMethod::Cash));
        assert_eq!(
            PaymentMethod::from_string("transfer"),
            Some(PaymentMethod::Transfer)
        );
        assert_eq!(PaymentMethod::from_string("epos"), None);
    }
}
