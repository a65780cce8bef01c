//! ePOS callback client.
//!
//! Notifies the ePOS system after withdrawal decisions commit. Delivery is
//! best-effort: the money movement has already committed, so callback
//! failures are logged and never propagated to the caller.

use crate::config::EposConfig;
use crate::models::EposWithdrawal;
use crate::services::metrics::ERRORS_TOTAL;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

/// Client for the ePOS system's withdrawal-status callback endpoint.
#[derive(Clone)]
pub struct EposClient {
    client: Client,
    config: EposConfig,
}

/// Payload posted to the ePOS callback endpoint.
#[derive(Debug, Serialize)]
pub struct WithdrawalNotification<'a> {
    pub withdrawal_number: &'a str,
    pub status: &'a str,
    pub amount: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<&'a str>,
}

impl EposClient {
    pub fn new(config: EposConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.callback_timeout_ms))
            .build()
            .unwrap_or_default();

        Self { client, config }
    }

    /// Tell the ePOS system a withdrawal was resolved. Call after the
    /// database transaction has committed.
    pub async fn notify_withdrawal(&self, withdrawal: &EposWithdrawal) {
        let Some(url) = self.config.callback_url.as_deref() else {
            return;
        };

        let payload = WithdrawalNotification {
            withdrawal_number: &withdrawal.withdrawal_number,
            status: &withdrawal.status,
            amount: withdrawal.amount.to_string(),
            payment_method: withdrawal.payment_method.as_deref(),
            rejection_reason: withdrawal.rejection_reason.as_deref(),
        };

        match self.client.post(url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                info!(
                    withdrawal_number = %withdrawal.withdrawal_number,
                    status = %withdrawal.status,
                    "Notified ePOS of withdrawal decision"
                );
            }
            Ok(response) => {
                ERRORS_TOTAL.with_label_values(&["notify_error"]).inc();
                warn!(
                    withdrawal_number = %withdrawal.withdrawal_number,
                    status_code = %response.status(),
                    "ePOS callback returned an error status"
                );
            }
            Err(e) => {
                ERRORS_TOTAL.with_label_values(&["notify_error"]).inc();
                warn!(
                    withdrawal_number = %withdrawal.withdrawal_number,
                    error = %e,
                    "Failed to deliver ePOS callback"
                );
            }
        }
    }
}
