//! Void and edit (reversal engine) integration tests.

mod common;

use common::{as_decimal, TestApp, TEST_ADMIN_API_KEY};
use reqwest::Client;
use rust_decimal_macros::dec;

#[tokio::test]
async fn void_round_trips_the_balance() {
    let app = TestApp::spawn().await;
    let client = Client::new();
    let santri_id = app.seed_santri("Hana", None).await;

    let body = app.topup(&client, santri_id, "10000", "cash").await;
    let transaction_id = body["data"]["transaction"]["transaction_id"]
        .as_str()
        .expect("transaction id")
        .to_string();

    let response = client
        .post(format!(
            "{}/wallets/transactions/{}/void",
            app.address, transaction_id
        ))
        .header("X-Admin-Api-Key", TEST_ADMIN_API_KEY)
        .header("x-admin-user", "ustadz.rahmat")
        .send()
        .await
        .expect("Failed to execute request");
    assert!(response.status().is_success());

    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["data"]["original"]["voided"], true);
    assert_eq!(body["data"]["original"]["voided_by"], "ustadz.rahmat");
    // The original's amount and balance_after are untouched.
    assert_eq!(as_decimal(&body["data"]["original"]["amount"]), dec!(10000));
    assert_eq!(
        as_decimal(&body["data"]["original"]["balance_after"]),
        dec!(10000)
    );
    // The compensating entry has the opposite direction and same amount.
    assert_eq!(body["data"]["reversal"]["direction"], "debit");
    assert_eq!(body["data"]["reversal"]["method"], "admin_reverse");
    assert_eq!(as_decimal(&body["data"]["reversal"]["amount"]), dec!(10000));
    assert_eq!(
        body["data"]["reversal"]["reversal_of"].as_str(),
        Some(transaction_id.as_str())
    );
    assert_eq!(as_decimal(&body["data"]["balance"]), dec!(0));

    app.cleanup().await;
}

#[tokio::test]
async fn double_void_is_a_conflict() {
    let app = TestApp::spawn().await;
    let client = Client::new();
    let santri_id = app.seed_santri("Intan", None).await;

    let body = app.topup(&client, santri_id, "5000", "cash").await;
    let transaction_id = body["data"]["transaction"]["transaction_id"]
        .as_str()
        .expect("transaction id")
        .to_string();

    let url = format!("{}/wallets/transactions/{}/void", app.address, transaction_id);
    let response = client
        .post(&url)
        .header("X-Admin-Api-Key", TEST_ADMIN_API_KEY)
        .send()
        .await
        .expect("Failed to execute request");
    assert!(response.status().is_success());

    let response = client
        .post(&url)
        .header("X-Admin-Api-Key", TEST_ADMIN_API_KEY)
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 409);

    app.cleanup().await;
}

#[tokio::test]
async fn edit_voids_and_reposts_in_one_step() {
    let app = TestApp::spawn().await;
    let client = Client::new();
    let santri_id = app.seed_santri("Joko", None).await;

    let body = app.topup(&client, santri_id, "10000", "cash").await;
    let transaction_id = body["data"]["transaction"]["transaction_id"]
        .as_str()
        .expect("transaction id")
        .to_string();

    let response = client
        .put(format!(
            "{}/wallets/transactions/{}",
            app.address, transaction_id
        ))
        .header("X-Admin-Api-Key", TEST_ADMIN_API_KEY)
        .json(&serde_json::json!({ "amount": "15000" }))
        .send()
        .await
        .expect("Failed to execute request");
    assert!(response.status().is_success());

    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["data"]["original"]["voided"], true);
    assert_eq!(body["data"]["reversal"]["direction"], "debit");
    assert_eq!(body["data"]["replacement"]["direction"], "credit");
    assert_eq!(
        as_decimal(&body["data"]["replacement"]["amount"]),
        dec!(15000)
    );
    assert_eq!(as_decimal(&body["data"]["balance"]), dec!(15000));

    // Ledger now holds original (voided) + reversal + replacement.
    let response = client
        .get(format!("{}/wallets/{}/transactions", app.address, santri_id))
        .send()
        .await
        .expect("Failed to execute request");
    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["data"]["transactions"].as_array().expect("array").len(), 3);
    assert_eq!(as_decimal(&body["data"]["balance"]), dec!(15000));

    app.cleanup().await;
}

#[tokio::test]
async fn void_without_admin_key_is_forbidden() {
    let app = TestApp::spawn().await;
    let client = Client::new();
    let santri_id = app.seed_santri("Kiki", None).await;

    let body = app.topup(&client, santri_id, "5000", "cash").await;
    let transaction_id = body["data"]["transaction"]["transaction_id"]
        .as_str()
        .expect("transaction id");

    let response = client
        .post(format!(
            "{}/wallets/transactions/{}/void",
            app.address, transaction_id
        ))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 403);

    // Nothing was voided.
    let response = client
        .get(format!("{}/wallets/{}/transactions", app.address, santri_id))
        .send()
        .await
        .expect("Failed to execute request");
    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["data"]["transactions"][0]["voided"], false);

    app.cleanup().await;
}

#[tokio::test]
async fn void_of_unknown_transaction_is_404() {
    let app = TestApp::spawn().await;
    let client = Client::new();

    let response = client
        .post(format!(
            "{}/wallets/transactions/{}/void",
            app.address,
            uuid::Uuid::new_v4()
        ))
        .header("X-Admin-Api-Key", TEST_ADMIN_API_KEY)
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 404);

    app.cleanup().await;
}
