//! Collective billing models: a batch of per-santri debits with per-item
//! success tracking.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// How a batch resolves its target santri set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetRule {
    All,
    Class,
    Individual,
}

impl TargetRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Class => "class",
            Self::Individual => "individual",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "all" => Some(Self::All),
            "class" => Some(Self::Class),
            "individual" => Some(Self::Individual),
            _ => None,
        }
    }
}

/// Batch status: `active` while any item is unpaid, `completed` once all
/// items settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectiveStatus {
    Active,
    Completed,
}

impl CollectiveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

/// Per-item status within a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    Paid,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "paid" => Some(Self::Paid),
            _ => None,
        }
    }
}

/// A billing batch. Invariant: `collected_amount + outstanding_amount ==
/// total_santri * amount_per_santri` after any batch operation settles.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CollectivePayment {
    pub payment_id: Uuid,
    pub title: String,
    pub amount_per_santri: Decimal,
    pub target_rule: String,
    pub target_class: Option<String>,
    pub total_santri: i32,
    pub collected_amount: Decimal,
    pub outstanding_amount: Decimal,
    pub status: String,
    pub created_by: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl CollectivePayment {
    pub fn parsed_status(&self) -> Option<CollectiveStatus> {
        CollectiveStatus::from_string(&self.status)
    }
}

/// One targeted santri within a batch. Once paid, `transaction_id` links to
/// the ledger entry that satisfied it.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CollectivePaymentItem {
    pub item_id: Uuid,
    pub payment_id: Uuid,
    pub santri_id: Uuid,
    pub wallet_id: Uuid,
    pub amount: Decimal,
    pub status: String,
    pub failure_reason: Option<String>,
    pub transaction_id: Option<Uuid>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_rule_round_trips() {
        for rule in [TargetRule::All, TargetRule::Class, TargetRule::Individual] {
            assert_eq!(TargetRule::from_string(rule.as_str()), Some(rule));
        }
        assert_eq!(TargetRule::from_string("group"), None);
    }

    #[test]
    fn statuses_parse_stored_strings() {
        assert_eq!(
            CollectiveStatus::from_string("active"),
            Some(CollectiveStatus::Active)
        );
        assert_eq!(
            CollectiveStatus::from_string("completed"),
            Some(CollectiveStatus::Completed)
        );
        assert_eq!(ItemStatus::from_string("pending"), Some(ItemStatus::Pending));
        assert_eq!(ItemStatus::from_string("paid"), Some(ItemStatus::Paid));
    }
}
