//! HTTP surface: health endpoints, actor headers, payload validation, and
//! response shapes.

mod common;

use billing_service::models::InvoiceStatus;
use billing_service::services::{InvoiceStore, UserStore};
use common::{build_invoice, build_user, days_ago, days_ahead, TestApp, ADMIN_ID};
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn health_endpoints_need_no_actor_headers() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .get(format!("{}/health", app.address))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.expect("Failed to parse body");
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "billing-service");
    assert!(body["version"].is_string());

    let response = app
        .client
        .get(format!("{}/ready", app.address))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn metrics_endpoint_exposes_prometheus_text() {
    let app = TestApp::spawn().await;
    let user = build_user("Ximena Navarrete", 5001);
    app.stores
        .users
        .insert(&user)
        .await
        .expect("Failed to seed user");

    // Touch a counter so the exposition has something to show.
    let response = app
        .admin_post("/invoices")
        .json(&json!({
            "userId": user.id,
            "period": "2025-08",
            "dueDate": "2025-09-15T00:00:00Z",
            "previousReading": 230,
            "currentReading": 241,
            "tariff": {"fixedCharge": 4_500, "pricePerM3": 750}
        }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 201);

    let response = app
        .client
        .get(format!("{}/metrics", app.address))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 200);
    let body = response.text().await.expect("Failed to read body");
    assert!(body.contains("billing_invoices_total"), "{body}");
}

#[tokio::test]
async fn requests_without_actor_headers_are_rejected() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .get(format!("{}/invoices", app.address))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 401);

    let response = app
        .client
        .post(format!("{}/admin/invoices/sweep", app.address))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn admin_routes_reject_plain_users() {
    let app = TestApp::spawn().await;

    let response = app
        .user_post("/admin/invoices/sweep")
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 403);
    let body: serde_json::Value = response.json().await.expect("Failed to parse body");
    assert_eq!(body["error"], "administrator role required");

    let response = app
        .user_post("/invoices")
        .json(&json!({
            "userId": Uuid::new_v4(),
            "period": "2025-08",
            "dueDate": "2025-09-15T00:00:00Z",
            "previousReading": 0,
            "currentReading": 5,
            "tariff": {"fixedCharge": 4_500, "pricePerM3": 750}
        }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 403);
}

#[tokio::test]
async fn create_invoice_round_trip() {
    let app = TestApp::spawn().await;
    let user = build_user("Patricio Uribe", 5002);
    app.stores
        .users
        .insert(&user)
        .await
        .expect("Failed to seed user");

    let response = app
        .admin_post("/invoices")
        .json(&json!({
            "userId": user.id,
            "period": "2025-08",
            "dueDate": "2025-09-10T00:00:00Z",
            "previousReading": 1_200,
            "currentReading": 1_215,
            "tariff": {
                "fixedCharge": 5_000,
                "pricePerM3": 800,
                "otherCharges": 1_000,
                "discounts": 500,
                "surcharges": 0,
                "calculation": {"tramo": "residencial", "m3": 15}
            }
        }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 201);
    let body: serde_json::Value = response.json().await.expect("Failed to parse body");
    assert_eq!(body["folio"], "2025-08-1");
    assert_eq!(body["status"], "pendiente");
    assert_eq!(body["paid"], false);
    assert_eq!(body["consumptionM3"], 15);
    // 5000 + 15 * 800 + 1000 - 500
    assert_eq!(body["totalAmount"], 17_500);
    assert_eq!(body["detail"]["tariffCalculation"]["tramo"], "residencial");

    let id = body["id"].as_str().expect("invoice id missing");
    let response = app
        .user_get(&format!("/invoices/{}", id))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 200);
    let fetched: serde_json::Value = response.json().await.expect("Failed to parse body");
    assert_eq!(fetched["folio"], "2025-08-1");
    assert_eq!(fetched["userId"], user.id.to_string());

    let response = app
        .user_get(&format!("/invoices?userId={}&status=pendiente", user.id))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 200);
    let listed: serde_json::Value = response.json().await.expect("Failed to parse body");
    assert_eq!(listed.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn create_invoice_validates_the_payload() {
    let app = TestApp::spawn().await;

    let response = app
        .admin_post("/invoices")
        .json(&json!({
            "userId": Uuid::new_v4(),
            "period": "2025",
            "dueDate": "2025-09-10T00:00:00Z",
            "previousReading": 10,
            "currentReading": 20,
            "tariff": {"fixedCharge": 5_000, "pricePerM3": 800}
        }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 422);
    let body: serde_json::Value = response.json().await.expect("Failed to parse body");
    assert_eq!(body["error"], "Validation error");
}

#[tokio::test]
async fn unknown_ids_return_not_found() {
    let app = TestApp::spawn().await;

    let response = app
        .user_get(&format!("/invoices/{}", Uuid::new_v4()))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 404);

    let response = app
        .user_get(&format!("/payments/{}", Uuid::new_v4()))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 404);

    let response = app
        .user_get(&format!("/users/{}/debt", Uuid::new_v4()))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 404);

    // Invoices cannot be issued against a user that does not exist.
    let response = app
        .admin_post("/invoices")
        .json(&json!({
            "userId": Uuid::new_v4(),
            "period": "2025-08",
            "dueDate": "2025-09-10T00:00:00Z",
            "previousReading": 10,
            "currentReading": 20,
            "tariff": {"fixedCharge": 5_000, "pricePerM3": 800}
        }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn listing_rejects_unknown_status_values() {
    let app = TestApp::spawn().await;

    let response = app
        .user_get("/invoices?status=bogus")
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await.expect("Failed to parse body");
    assert!(
        body["error"]
            .as_str()
            .unwrap()
            .contains("unknown invoice status"),
        "{body}"
    );
}

#[tokio::test]
async fn single_invoice_status_override() {
    let app = TestApp::spawn().await;
    let user = build_user("Lorena Ulloa", 5003);
    app.stores
        .users
        .insert(&user)
        .await
        .expect("Failed to seed user");
    let invoice = build_invoice(
        user.id,
        "2025-08",
        1,
        10_000,
        InvoiceStatus::Pending,
        days_ahead(10),
    );
    app.stores
        .invoices
        .insert(&invoice)
        .await
        .expect("Failed to seed invoice");

    // Plain users cannot touch invoice status.
    let response = app
        .client
        .patch(format!("{}/invoices/{}/status", app.address, invoice.id))
        .header("x-actor-id", "user-tester")
        .header("x-actor-role", "user")
        .json(&json!({"newStatus": "anulada"}))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 403);

    let response = app
        .client
        .patch(format!("{}/invoices/{}/status", app.address, invoice.id))
        .header("x-actor-id", ADMIN_ID)
        .header("x-actor-role", "admin")
        .json(&json!({"newStatus": "bogus"}))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 400);

    let response = app
        .client
        .patch(format!("{}/invoices/{}/status", app.address, invoice.id))
        .header("x-actor-id", ADMIN_ID)
        .header("x-actor-role", "admin")
        .json(&json!({"newStatus": "anulada"}))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.expect("Failed to parse body");
    assert_eq!(body["status"], "anulada");
    assert_eq!(
        app.stores.invoices.get(invoice.id).unwrap().status,
        InvoiceStatus::Voided
    );
}

#[tokio::test]
async fn user_debt_lists_only_outstanding_invoices() {
    let app = TestApp::spawn().await;
    let user = build_user("Griselda Pavez", 5004);
    app.stores
        .users
        .insert(&user)
        .await
        .expect("Failed to seed user");

    let overdue = build_invoice(
        user.id,
        "2025-06",
        1,
        20_000,
        InvoiceStatus::Overdue,
        days_ago(70),
    );
    let pending = build_invoice(
        user.id,
        "2025-08",
        2,
        12_000,
        InvoiceStatus::Pending,
        days_ahead(8),
    );
    let paid = build_invoice(
        user.id,
        "2025-07",
        1,
        15_000,
        InvoiceStatus::Paid,
        days_ago(40),
    );
    for invoice in [&overdue, &pending, &paid] {
        app.stores
            .invoices
            .insert(invoice)
            .await
            .expect("Failed to seed invoice");
    }
    app.stores
        .users
        .adjust_debt(user.id, 20_000)
        .await
        .expect("Failed to seed debt");

    let response = app
        .user_get(&format!("/users/{}/debt", user.id))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.expect("Failed to parse body");
    assert_eq!(body["userId"], user.id.to_string());
    assert_eq!(body["name"], "Griselda Pavez");
    assert_eq!(body["serviceNumber"], 5004);
    assert_eq!(body["debtTotal"], 20_000);
    assert_eq!(body["balance"], 0);

    let invoices = body["invoices"].as_array().unwrap();
    assert_eq!(invoices.len(), 2, "paid invoices must not show up: {body}");
    assert!(invoices
        .iter()
        .all(|entry| entry["status"] != "pagada"));
}

#[tokio::test]
async fn audit_log_returns_recent_records_newest_first() {
    let app = TestApp::spawn().await;
    let user = build_user("Aurora Fritz", 5005);
    app.stores
        .users
        .insert(&user)
        .await
        .expect("Failed to seed user");

    let first = build_invoice(
        user.id,
        "2025-07",
        1,
        9_000,
        InvoiceStatus::Pending,
        days_ago(5),
    );
    let second = build_invoice(
        user.id,
        "2025-07",
        2,
        9_000,
        InvoiceStatus::Pending,
        days_ago(5),
    );
    for invoice in [&first, &second] {
        app.stores
            .invoices
            .insert(invoice)
            .await
            .expect("Failed to seed invoice");
    }

    for (id, reason) in [(first.id, "boleta duplicada"), (second.id, "error de lectura")] {
        let response = app
            .admin_post("/admin/invoices/status")
            .json(&json!({
                "invoiceIds": [id],
                "newStatus": "anulada",
                "reason": reason
            }))
            .send()
            .await
            .expect("Failed to execute request");
        assert_eq!(response.status(), 200);
    }

    let response = app
        .admin_get("/admin/audit?limit=1")
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.expect("Failed to parse body");
    let records = body.as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["action"], "bulk_status_update");
    assert_eq!(records[0]["actorId"], ADMIN_ID);
    assert_eq!(records[0]["detail"]["reason"], "error de lectura");
    assert_eq!(records[0]["changes"][0]["folio"], "2025-07-2");

    let response = app
        .admin_get("/admin/audit")
        .send()
        .await
        .expect("Failed to execute request");
    let body: serde_json::Value = response.json().await.expect("Failed to parse body");
    assert_eq!(body.as_array().unwrap().len(), 2);
}
