//! Collective billing integration tests.

mod common;

use common::{as_decimal, TestApp};
use reqwest::Client;
use rust_decimal_macros::dec;

#[tokio::test]
async fn partial_failure_then_retry_completes_the_batch() {
    let app = TestApp::spawn().await;
    let client = Client::new();
    let santri_a = app.seed_santri("Vina", Some("9A")).await;
    let santri_b = app.seed_santri("Wawan", Some("9A")).await;
    let santri_c = app.seed_santri("Xena", Some("9A")).await;

    app.topup(&client, santri_a, "10000", "cash").await;
    app.topup(&client, santri_b, "10000", "cash").await;
    // santri_c has no balance.

    let response = client
        .post(format!("{}/collective-payments", app.address))
        .header("x-admin-user", "bendahara")
        .json(&serde_json::json!({
            "title": "Iuran kegiatan",
            "amount_per_santri": "5000",
            "target_rule": "individual",
            "santri_ids": [santri_a, santri_b, santri_c]
        }))
        .send()
        .await
        .expect("Failed to execute request");
    assert!(response.status().is_success());

    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    let data = &body["data"];
    assert_eq!(data["status"], "active");
    assert_eq!(data["total_santri"], 3);
    assert_eq!(as_decimal(&data["collected_amount"]), dec!(10000));
    assert_eq!(as_decimal(&data["outstanding_amount"]), dec!(5000));

    let items = data["items"].as_array().expect("items");
    assert_eq!(items.len(), 3);
    let paid = items.iter().filter(|i| i["status"] == "paid").count();
    let pending: Vec<_> = items.iter().filter(|i| i["status"] == "pending").collect();
    assert_eq!(paid, 2);
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0]["santri_id"].as_str(), Some(santri_c.to_string().as_str()));
    assert!(pending[0]["failure_reason"].is_string());
    let payment_id = data["payment_id"].as_str().expect("payment id").to_string();

    // Top up the failing santri and retry.
    app.topup(&client, santri_c, "5000", "cash").await;

    let response = client
        .post(format!(
            "{}/collective-payments/{}/retry",
            app.address, payment_id
        ))
        .send()
        .await
        .expect("Failed to execute request");
    assert!(response.status().is_success());

    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    let data = &body["data"];
    assert_eq!(data["status"], "completed");
    assert_eq!(as_decimal(&data["collected_amount"]), dec!(15000));
    assert_eq!(as_decimal(&data["outstanding_amount"]), dec!(0));
    assert!(data["items"]
        .as_array()
        .expect("items")
        .iter()
        .all(|i| i["status"] == "paid" && i["transaction_id"].is_string()));

    // Retrying a completed batch is a conflict.
    let response = client
        .post(format!(
            "{}/collective-payments/{}/retry",
            app.address, payment_id
        ))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 409);

    app.cleanup().await;
}

#[tokio::test]
async fn batch_invariant_holds_after_create() {
    let app = TestApp::spawn().await;
    let client = Client::new();
    let santri_a = app.seed_santri("Yani", Some("7C")).await;
    let _santri_b = app.seed_santri("Zain", Some("7C")).await;
    app.topup(&client, santri_a, "3000", "cash").await;

    let response = client
        .post(format!("{}/collective-payments", app.address))
        .json(&serde_json::json!({
            "title": "Buku tahunan",
            "amount_per_santri": "3000",
            "target_rule": "class",
            "target_class": "7C"
        }))
        .send()
        .await
        .expect("Failed to execute request");
    assert!(response.status().is_success());

    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    let data = &body["data"];
    let collected = as_decimal(&data["collected_amount"]);
    let outstanding = as_decimal(&data["outstanding_amount"]);
    let total = data["total_santri"].as_i64().expect("total");

    // collected + outstanding == total_santri * amount_per_santri
    assert_eq!(collected + outstanding, dec!(3000) * rust_decimal::Decimal::from(total));
    assert_eq!(collected, dec!(3000));
    assert_eq!(outstanding, dec!(3000));

    app.cleanup().await;
}

#[tokio::test]
async fn empty_target_set_is_rejected() {
    let app = TestApp::spawn().await;
    let client = Client::new();

    let response = client
        .post(format!("{}/collective-payments", app.address))
        .json(&serde_json::json!({
            "title": "Iuran kosong",
            "amount_per_santri": "1000",
            "target_rule": "class",
            "target_class": "no-such-class"
        }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 400);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM collective_payments")
        .fetch_one(app.db.pool())
        .await
        .expect("count batches");
    assert_eq!(count, 0);

    app.cleanup().await;
}

#[tokio::test]
async fn all_rule_targets_every_santri() {
    let app = TestApp::spawn().await;
    let client = Client::new();
    let santri_a = app.seed_santri("Alya", Some("7A")).await;
    let santri_b = app.seed_santri("Bima", Some("8B")).await;
    app.topup(&client, santri_a, "2000", "cash").await;
    app.topup(&client, santri_b, "2000", "cash").await;

    let response = client
        .post(format!("{}/collective-payments", app.address))
        .json(&serde_json::json!({
            "title": "Infaq jumat",
            "amount_per_santri": "2000",
            "target_rule": "all"
        }))
        .send()
        .await
        .expect("Failed to execute request");
    assert!(response.status().is_success());

    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["data"]["total_santri"], 2);
    assert_eq!(body["data"]["status"], "completed");
    assert_eq!(as_decimal(&body["data"]["collected_amount"]), dec!(4000));

    // Each paid item links to the ledger entry that satisfied it, and those
    // entries survive a listing round-trip.
    let response = client
        .get(format!("{}/wallets/{}/transactions", app.address, santri_a))
        .send()
        .await
        .expect("Failed to execute request");
    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(as_decimal(&body["data"]["balance"]), dec!(0));
    let newest = &body["data"]["transactions"][0];
    assert_eq!(newest["direction"], "debit");
    assert!(newest["description"]
        .as_str()
        .expect("description")
        .contains("Infaq jumat"));

    app.cleanup().await;
}

#[tokio::test]
async fn batch_listing_and_detail() {
    let app = TestApp::spawn().await;
    let client = Client::new();
    let santri_id = app.seed_santri("Cahya", None).await;
    app.topup(&client, santri_id, "5000", "cash").await;

    let response = client
        .post(format!("{}/collective-payments", app.address))
        .json(&serde_json::json!({
            "title": "Kas kelas",
            "amount_per_santri": "5000",
            "target_rule": "individual",
            "santri_ids": [santri_id]
        }))
        .send()
        .await
        .expect("Failed to execute request");
    assert!(response.status().is_success());
    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    let payment_id = body["data"]["payment_id"].as_str().expect("id").to_string();

    let response = client
        .get(format!("{}/collective-payments", app.address))
        .send()
        .await
        .expect("Failed to execute request");
    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["data"].as_array().expect("array").len(), 1);

    let response = client
        .get(format!("{}/collective-payments/{}", app.address, payment_id))
        .send()
        .await
        .expect("Failed to execute request");
    assert!(response.status().is_success());
    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["data"]["title"], "Kas kelas");
    assert_eq!(body["data"]["items"].as_array().expect("items").len(), 1);

    app.cleanup().await;
}
