//! Aggregate balance calculator integration tests.

mod common;

use common::{as_decimal, TestApp};
use reqwest::Client;
use rust_decimal_macros::dec;

async fn get_balances(app: &TestApp, client: &Client) -> serde_json::Value {
    let response = client
        .get(format!("{}/wallets/balances", app.address))
        .send()
        .await
        .expect("Failed to execute request");
    assert!(response.status().is_success());
    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    body["data"].clone()
}

#[tokio::test]
async fn buckets_track_methods_separately() {
    let app = TestApp::spawn().await;
    let client = Client::new();
    let santri_a = app.seed_santri("Lina", None).await;
    let santri_b = app.seed_santri("Mira", None).await;

    app.topup(&client, santri_a, "50000", "cash").await;
    app.topup(&client, santri_b, "30000", "transfer").await;

    let balances = get_balances(&app, &client).await;
    assert_eq!(as_decimal(&balances["cash_balance"]), dec!(50000));
    assert_eq!(as_decimal(&balances["bank_balance"]), dec!(30000));
    assert_eq!(as_decimal(&balances["total_balance"]), dec!(80000));

    app.cleanup().await;
}

#[tokio::test]
async fn cash_withdrawal_moves_value_from_bank_to_cash() {
    let app = TestApp::spawn().await;
    let client = Client::new();
    let santri_id = app.seed_santri("Nanda", None).await;

    app.topup(&client, santri_id, "40000", "transfer").await;

    let response = client
        .post(format!("{}/wallets/cash-withdrawal", app.address))
        .json(&serde_json::json!({ "amount": "15000" }))
        .send()
        .await
        .expect("Failed to execute request");
    assert!(response.status().is_success());
    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["data"]["status"], "done");
    assert!(body["data"]["reference"]
        .as_str()
        .expect("reference")
        .starts_with("CW-"));

    let balances = get_balances(&app, &client).await;
    assert_eq!(as_decimal(&balances["cash_balance"]), dec!(15000));
    assert_eq!(as_decimal(&balances["bank_balance"]), dec!(25000));
    assert_eq!(as_decimal(&balances["total_balance"]), dec!(40000));

    app.cleanup().await;
}

#[tokio::test]
async fn cash_withdrawal_rejected_when_bank_is_short() {
    let app = TestApp::spawn().await;
    let client = Client::new();
    let santri_id = app.seed_santri("Omar", None).await;

    app.topup(&client, santri_id, "5000", "transfer").await;

    let response = client
        .post(format!("{}/wallets/cash-withdrawal", app.address))
        .json(&serde_json::json!({ "amount": "8000" }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 422);

    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(as_decimal(&body["errors"]["available_bank"]), dec!(5000));
    assert_eq!(as_decimal(&body["errors"]["shortage"]), dec!(3000));

    // Totals untouched.
    let balances = get_balances(&app, &client).await;
    assert_eq!(as_decimal(&balances["bank_balance"]), dec!(5000));
    assert_eq!(as_decimal(&balances["cash_balance"]), dec!(0));

    app.cleanup().await;
}

#[tokio::test]
async fn voided_entries_do_not_distort_the_buckets() {
    let app = TestApp::spawn().await;
    let client = Client::new();
    let santri_id = app.seed_santri("Putri", None).await;

    let body = app.topup(&client, santri_id, "20000", "cash").await;
    let first_id = body["data"]["transaction"]["transaction_id"]
        .as_str()
        .expect("id")
        .to_string();
    app.topup(&client, santri_id, "10000", "cash").await;

    let response = client
        .post(format!("{}/wallets/transactions/{}/void", app.address, first_id))
        .header("X-Admin-Api-Key", common::TEST_ADMIN_API_KEY)
        .send()
        .await
        .expect("Failed to execute request");
    assert!(response.status().is_success());

    // The voided credit is excluded; the reversal entry carries an internal
    // method and is excluded as well.
    let balances = get_balances(&app, &client).await;
    assert_eq!(as_decimal(&balances["cash_balance"]), dec!(10000));

    app.cleanup().await;
}

#[tokio::test]
async fn reconcile_is_a_noop_after_a_void() {
    let app = TestApp::spawn().await;
    let client = Client::new();
    let santri_id = app.seed_santri("Rahma", None).await;

    let body = app.topup(&client, santri_id, "10000", "cash").await;
    let transaction_id = body["data"]["transaction"]["transaction_id"]
        .as_str()
        .expect("id")
        .to_string();

    let response = client
        .post(format!(
            "{}/wallets/transactions/{}/void",
            app.address, transaction_id
        ))
        .header("X-Admin-Api-Key", common::TEST_ADMIN_API_KEY)
        .send()
        .await
        .expect("Failed to execute request");
    assert!(response.status().is_success());

    let wallet = app
        .db
        .get_wallet(santri_id)
        .await
        .expect("get wallet")
        .expect("wallet exists");
    assert_eq!(wallet.balance, dec!(0));

    // The voided credit and its reversal cancel; replaying the ledger must
    // land on the same zero the cache already holds.
    let recomputed = app
        .db
        .reconcile_wallet_balance(wallet.wallet_id)
        .await
        .expect("reconcile");
    assert_eq!(recomputed, dec!(0));

    let wallet = app
        .db
        .get_wallet(santri_id)
        .await
        .expect("get wallet")
        .expect("wallet exists");
    assert_eq!(wallet.balance, dec!(0));

    app.cleanup().await;
}

#[tokio::test]
async fn concurrent_cash_withdrawals_cannot_overdraw_the_bank() {
    let app = TestApp::spawn().await;
    let client = Client::new();
    let santri_id = app.seed_santri("Salim", None).await;

    app.topup(&client, santri_id, "10000", "transfer").await;

    let url = format!("{}/wallets/cash-withdrawal", app.address);
    let payload = serde_json::json!({ "amount": "10000" });
    let (first, second) = tokio::join!(
        client.post(&url).json(&payload).send(),
        client.post(&url).json(&payload).send(),
    );
    let first = first.expect("Failed to execute request");
    let second = second.expect("Failed to execute request");

    let successes = [first.status(), second.status()]
        .iter()
        .filter(|s| s.is_success())
        .count();
    assert_eq!(successes, 1, "exactly one withdrawal may pass the bank check");

    let balances = get_balances(&app, &client).await;
    assert_eq!(as_decimal(&balances["bank_balance"]), dec!(0));
    assert_eq!(as_decimal(&balances["cash_balance"]), dec!(10000));

    app.cleanup().await;
}

#[tokio::test]
async fn wallet_balance_equals_ledger_replay() {
    let app = TestApp::spawn().await;
    let client = Client::new();
    let santri_id = app.seed_santri("Qori", None).await;

    app.topup(&client, santri_id, "10000", "cash").await;
    app.topup(&client, santri_id, "2500", "transfer").await;
    let response = client
        .post(format!("{}/wallets/{}/debit", app.address, santri_id))
        .json(&serde_json::json!({ "amount": "4000", "method": "cash" }))
        .send()
        .await
        .expect("Failed to execute request");
    assert!(response.status().is_success());

    let wallet = app
        .db
        .get_wallet(santri_id)
        .await
        .expect("get wallet")
        .expect("wallet exists");
    let recomputed = app
        .db
        .reconcile_wallet_balance(wallet.wallet_id)
        .await
        .expect("reconcile");

    assert_eq!(wallet.balance, dec!(8500));
    assert_eq!(recomputed, dec!(8500));

    app.cleanup().await;
}
