//! Client CRUD integration tests for invoicing-service.

mod common;

use common::{amount, line, TestApp};
use reqwest::StatusCode;
use rust_decimal_macros::dec;
use serde_json::{json, Value};

#[tokio::test]
async fn create_client_returns_created_client() {
    let app = TestApp::spawn().await;

    let response = app
        .post(
            "/clients",
            &json!({
                "name": "  Dupont SARL ",
                "email": "contact@dupont.test",
                "tax_id": "73282932000074",
                "creation_date": "2024-03-01"
            }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["name"], "Dupont SARL");
    assert_eq!(body["tax_id"], "73282932000074");
    assert_eq!(body["creation_date"], "2024-03-01");
}

#[tokio::test]
async fn creation_date_defaults_to_today() {
    let app = TestApp::spawn().await;
    let client_id = app.create_client("Acme", "acme@x.test", None).await;

    let body: Value = app
        .get(&format!("/clients/{client_id}"))
        .await
        .json()
        .await
        .unwrap();

    let today = chrono::Utc::now().date_naive().to_string();
    assert_eq!(body["creation_date"], today);
    assert_eq!(body["invoice_count"], 0);
}

#[tokio::test]
async fn invalid_fields_are_reported_together() {
    let app = TestApp::spawn().await;

    let response = app
        .post(
            "/clients",
            &json!({ "name": "", "email": "nope", "tax_id": "1234" }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = response.json().await.unwrap();
    for field in ["name", "email", "tax_id"] {
        assert!(body["fields"][field].is_array(), "missing {field}");
    }
}

#[tokio::test]
async fn non_digit_tax_id_is_rejected() {
    let app = TestApp::spawn().await;

    let response = app
        .post(
            "/clients",
            &json!({ "name": "Acme", "email": "a@x.test", "tax_id": "7328293200007A" }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn duplicate_email_and_tax_id_are_field_conflicts() {
    let app = TestApp::spawn().await;
    app.create_client("First", "dup@x.test", Some("11111111111111"))
        .await;

    let response = app
        .post(
            "/clients",
            &json!({ "name": "Second", "email": "dup@x.test", "tax_id": "11111111111111" }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body: Value = response.json().await.unwrap();
    assert!(body["fields"]["email"].is_array());
    assert!(body["fields"]["tax_id"].is_array());
}

#[tokio::test]
async fn update_keeps_absent_fields_and_checks_uniqueness() {
    let app = TestApp::spawn().await;
    let first = app.create_client("First", "first@x.test", None).await;
    app.create_client("Second", "second@x.test", None).await;

    let response = app
        .put(&format!("/clients/{first}"), &json!({ "name": "Renamed" }))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["name"], "Renamed");
    assert_eq!(body["email"], "first@x.test");

    // Re-submitting the client's own email is not a conflict.
    let response = app
        .put(
            &format!("/clients/{first}"),
            &json!({ "email": "first@x.test" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .put(
            &format!("/clients/{first}"),
            &json!({ "email": "second@x.test" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn unknown_client_is_not_found() {
    let app = TestApp::spawn().await;

    let response = app
        .get(&format!("/clients/{}", uuid::Uuid::new_v4()))
        .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn client_with_invoices_cannot_be_deleted() {
    let app = TestApp::spawn().await;
    let client_id = app.create_client("Acme", "acme@x.test", None).await;
    let invoice = app
        .create_invoice(&client_id, "2024-01-15", json!([line("Work", "1", "10", "0")]))
        .await;

    let response = app.delete(&format!("/clients/{client_id}")).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let invoice_id = invoice["invoice_id"].as_str().unwrap();
    app.delete(&format!("/invoices/{invoice_id}")).await;

    let response = app.delete(&format!("/clients/{client_id}")).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let response = app.get(&format!("/clients/{client_id}")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn search_and_paginate_clients() {
    let app = TestApp::spawn().await;
    for (name, email) in [
        ("Alpha Conseil", "alpha@x.test"),
        ("Beta Industrie", "beta@x.test"),
        ("Gamma Conseil", "gamma@x.test"),
    ] {
        app.create_client(name, email, None).await;
    }

    let body: Value = app
        .get("/clients?search=conseil")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["total"], 2);
    assert_eq!(body["data"][0]["name"], "Alpha Conseil");

    let body: Value = app
        .get("/clients?page=2&per_page=2")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["current_page"], 2);
    assert_eq!(body["last_page"], 2);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["name"], "Gamma Conseil");
}

#[tokio::test]
async fn client_detail_and_statistics_include_revenue() {
    let app = TestApp::spawn().await;
    let big = app.create_client("Big", "big@x.test", None).await;
    let small = app.create_client("Small", "small@x.test", None).await;
    app.create_client("Idle", "idle@x.test", None).await;

    app.create_invoice(&big, "2024-01-10", json!([line("A", "10", "100", "20")]))
        .await;
    app.create_invoice(&big, "2024-02-10", json!([line("B", "1", "50", "0")]))
        .await;
    app.create_invoice(&small, "2024-01-20", json!([line("C", "1", "10", "0")]))
        .await;

    let detail: Value = app
        .get(&format!("/clients/{big}"))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(detail["invoice_count"], 2);
    assert_eq!(amount(&detail["revenue"]), dec!(1250.00));
    assert_eq!(detail["last_invoice_date"], "2024-02-10");

    let stats: Value = app.get("/clients/stats").await.json().await.unwrap();
    assert_eq!(stats["total_clients"], 3);
    assert_eq!(stats["clients_with_invoices"], 2);
    assert_eq!(stats["clients_without_invoices"], 1);
    assert_eq!(stats["top_clients"][0]["name"], "Big");
    assert_eq!(stats["top_clients"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn client_invoices_are_newest_first() {
    let app = TestApp::spawn().await;
    let client_id = app.create_client("Acme", "acme@x.test", None).await;
    let other = app.create_client("Other", "other@x.test", None).await;
    app.create_invoice(&client_id, "2024-01-05", json!([line("Old", "1", "1", "0")]))
        .await;
    app.create_invoice(&client_id, "2024-03-05", json!([line("New", "1", "1", "0")]))
        .await;
    app.create_invoice(&other, "2024-02-05", json!([line("X", "1", "1", "0")]))
        .await;

    let body: Value = app
        .get(&format!("/clients/{client_id}/invoices"))
        .await
        .json()
        .await
        .unwrap();

    assert_eq!(body["total"], 2);
    assert_eq!(body["data"][0]["invoice_date"], "2024-03-05");
    assert_eq!(body["data"][0]["lines"][0]["description"], "New");
}

#[tokio::test]
async fn email_uniqueness_ignores_case() {
    let app = TestApp::spawn().await;
    let response = app
        .post(
            "/clients",
            &json!({ "name": "First", "email": " billing@x.TEST " }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["email"], "billing@x.test");

    let response = app
        .post(
            "/clients",
            &json!({ "name": "Second", "email": "Billing@X.test" }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body: Value = response.json().await.unwrap();
    assert!(body["fields"]["email"].is_array());
}

#[tokio::test]
async fn tax_id_can_be_removed_with_null() {
    let app = TestApp::spawn().await;
    let client_id = app
        .create_client("Acme", "acme@x.test", Some("12345678901234"))
        .await;

    let body: Value = app
        .put(&format!("/clients/{client_id}"), &json!({ "name": "Acme SA" }))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["tax_id"], "12345678901234");

    let response = app
        .put(&format!("/clients/{client_id}"), &json!({ "tax_id": null }))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert!(body["tax_id"].is_null());

    // The freed tax ID can be used by another client.
    app.create_client("Other", "other@x.test", Some("12345678901234"))
        .await;
}
