//! Request and response shapes for the HTTP API.
//!
//! Every response body is wrapped in the `{success, data?, message?}`
//! envelope; error bodies (with `errors`) are produced by `AppError`.

use crate::models::{CollectivePayment, CollectivePaymentItem, WalletTransaction};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Monetary inputs must be strictly positive.
fn validate_positive_amount(amount: &Decimal) -> Result<(), ValidationError> {
    if *amount <= Decimal::ZERO {
        let mut err = ValidationError::new("positive_amount");
        err.message = Some("Amount must be greater than zero".into());
        return Err(err);
    }
    Ok(())
}

/// An ePOS sale must address the santri by id or by RFID uid.
fn validate_epos_target(req: &EposTransactionRequest) -> Result<(), ValidationError> {
    if req.santri_id.is_none() && req.uid.as_deref().map_or(true, str::is_empty) {
        let mut err = ValidationError::new("missing_target");
        err.message = Some("Either santri_id or uid is required".into());
        return Err(err);
    }
    Ok(())
}

/// Standard success envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn success_with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: Some(message.into()),
        }
    }
}

// -----------------------------------------------------------------------------
// ePOS
// -----------------------------------------------------------------------------

/// Sale from an ePOS terminal. The santri is addressed either directly by id
/// or by the RFID tag presented at the terminal.
#[derive(Debug, Deserialize, Validate)]
#[validate(schema(function = validate_epos_target))]
pub struct EposTransactionRequest {
    pub santri_id: Option<Uuid>,
    pub uid: Option<String>,
    #[validate(custom(function = validate_positive_amount))]
    pub amount: Decimal,
    pub epos_txn_id: Option<String>,
    pub meta: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct EposTransactionResponse {
    pub transaction: TransactionView,
    pub wallet_balance: Decimal,
    pub pool_balance: Decimal,
}

#[derive(Debug, Serialize)]
pub struct PoolBalanceResponse {
    pub pool_id: Uuid,
    pub name: String,
    pub balance: Decimal,
}

// -----------------------------------------------------------------------------
// Wallet ledger
// -----------------------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
pub struct TopupRequest {
    #[validate(custom(function = validate_positive_amount))]
    pub amount: Decimal,
    pub description: Option<String>,
    pub method: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct DebitRequest {
    #[validate(custom(function = validate_positive_amount))]
    pub amount: Decimal,
    pub description: Option<String>,
    pub method: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct EditTransactionRequest {
    #[validate(custom(function = validate_positive_amount))]
    pub amount: Decimal,
    pub description: Option<String>,
    pub method: Option<String>,
    pub direction: Option<String>,
}

/// Ledger entry as rendered to API clients. Legacy rows can carry null
/// reference/method/author; those are rendered with derived display values
/// instead of nulls.
#[derive(Debug, Serialize)]
pub struct TransactionView {
    pub transaction_id: Uuid,
    pub wallet_id: Uuid,
    pub direction: String,
    pub amount: Decimal,
    pub balance_after: Decimal,
    pub description: Option<String>,
    pub reference: String,
    pub method: String,
    pub created_by: String,
    pub reversal_of: Option<Uuid>,
    pub voided: bool,
    pub voided_by: Option<String>,
    pub created_utc: DateTime<Utc>,
}

impl From<WalletTransaction> for TransactionView {
    fn from(t: WalletTransaction) -> Self {
        let reference = t
            .reference
            .clone()
            .unwrap_or_else(|| format!("LEGACY-{}", &t.transaction_id.simple().to_string()[..8]));
        let method = t.method.clone().unwrap_or_else(|| "cash".to_string());
        let created_by = t.created_by.clone().unwrap_or_else(|| "system".to_string());

        Self {
            transaction_id: t.transaction_id,
            wallet_id: t.wallet_id,
            direction: t.direction,
            amount: t.amount,
            balance_after: t.balance_after,
            description: t.description,
            reference,
            method,
            created_by,
            reversal_of: t.reversal_of,
            voided: t.voided,
            voided_by: t.voided_by,
            created_utc: t.created_utc,
        }
    }
}

/// `wallet_id` is null for a santri whose wallet has not been opened yet;
/// listing is a pure read and never opens one.
#[derive(Debug, Serialize)]
pub struct WalletTransactionsResponse {
    pub wallet_id: Option<Uuid>,
    pub balance: Decimal,
    pub transactions: Vec<TransactionView>,
}

#[derive(Debug, Serialize)]
pub struct PostEntryResponse {
    pub transaction: TransactionView,
    pub balance: Decimal,
}

/// Void response: the voided original plus the compensating reversal entry.
#[derive(Debug, Serialize)]
pub struct VoidResponse {
    pub original: TransactionView,
    pub reversal: TransactionView,
    pub balance: Decimal,
}

/// Edit response: void artifacts plus the replacement entry.
#[derive(Debug, Serialize)]
pub struct EditResponse {
    pub original: TransactionView,
    pub reversal: TransactionView,
    pub replacement: TransactionView,
    pub balance: Decimal,
}

// -----------------------------------------------------------------------------
// Withdrawals
// -----------------------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
pub struct CreateWithdrawalRequest {
    #[validate(custom(function = validate_positive_amount))]
    pub amount: Decimal,
    pub requested_by: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ApproveWithdrawalRequest {
    #[validate(length(min = 1, message = "payment_method is required"))]
    pub payment_method: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RejectWithdrawalRequest {
    #[validate(length(min = 5, message = "Rejection reason must be at least 5 characters"))]
    pub reason: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CashWithdrawalRequest {
    #[validate(custom(function = validate_positive_amount))]
    pub amount: Decimal,
    pub requested_by: Option<String>,
}

// -----------------------------------------------------------------------------
// Collective billing
// -----------------------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCollectivePaymentRequest {
    #[validate(length(min = 1, message = "Title is required"))]
    pub title: String,
    #[validate(custom(function = validate_positive_amount))]
    pub amount_per_santri: Decimal,
    #[validate(length(min = 1, message = "target_rule is required"))]
    pub target_rule: String,
    pub target_class: Option<String>,
    #[serde(default)]
    pub santri_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct CollectivePaymentResponse {
    #[serde(flatten)]
    pub payment: CollectivePayment,
    pub items: Vec<CollectivePaymentItem>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WalletTransaction;
    use rust_decimal_macros::dec;

    fn legacy_entry() -> WalletTransaction {
        WalletTransaction {
            transaction_id: Uuid::new_v4(),
            wallet_id: Uuid::new_v4(),
            direction: "credit".to_string(),
            amount: dec!(10000),
            balance_after: dec!(10000),
            description: None,
            reference: None,
            method: None,
            created_by: None,
            reversal_of: None,
            voided: false,
            voided_by: None,
            created_utc: Utc::now(),
        }
    }

    #[test]
    fn legacy_nulls_get_display_values() {
        let entry = legacy_entry();
        let id = entry.transaction_id;
        let view = TransactionView::from(entry);

        assert!(view.reference.starts_with("LEGACY-"));
        assert_eq!(view.reference.len(), "LEGACY-".len() + 8);
        assert!(id.simple().to_string().starts_with(&view.reference[7..]));
        assert_eq!(view.method, "cash");
        assert_eq!(view.created_by, "system");
    }

    #[test]
    fn stored_values_pass_through() {
        let mut entry = legacy_entry();
        entry.reference = Some("TRX-20260101120000-ABC123".to_string());
        entry.method = Some("transfer".to_string());
        entry.created_by = Some("admin".to_string());

        let view = TransactionView::from(entry);
        assert_eq!(view.reference, "TRX-20260101120000-ABC123");
        assert_eq!(view.method, "transfer");
        assert_eq!(view.created_by, "admin");
    }

    #[test]
    fn non_positive_amounts_fail_validation() {
        let req = TopupRequest {
            amount: dec!(0),
            description: None,
            method: None,
        };
        assert!(req.validate().is_err());

        let req = TopupRequest {
            amount: dec!(-5),
            description: None,
            method: None,
        };
        assert!(req.validate().is_err());

        let req = TopupRequest {
            amount: dec!(50000),
            description: None,
            method: None,
        };
        assert!(req.validate().is_ok());
    }

    #[test]
    fn epos_request_needs_a_target() {
        let req = EposTransactionRequest {
            santri_id: None,
            uid: None,
            amount: dec!(5000),
            epos_txn_id: None,
            meta: None,
        };
        assert!(req.validate().is_err());

        let req = EposTransactionRequest {
            santri_id: None,
            uid: Some("04:A3:22:B1".to_string()),
            amount: dec!(5000),
            epos_txn_id: None,
            meta: None,
        };
        assert!(req.validate().is_ok());
    }

    #[test]
    fn reject_reason_length_is_enforced() {
        let short = RejectWithdrawalRequest {
            reason: "no".to_string(),
        };
        assert!(short.validate().is_err());

        let ok = RejectWithdrawalRequest {
            reason: "duplicate request".to_string(),
        };
        assert!(ok.validate().is_ok());
    }
}
