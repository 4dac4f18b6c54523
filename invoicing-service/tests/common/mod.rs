//! Common test utilities for invoicing-service integration tests.

use invoicing_service::config::InvoicingConfig;
use invoicing_service::services::{InvoiceStore, MemoryStore};
use invoicing_service::startup::Application;
use reqwest::{Response, StatusCode};
use serde_json::{json, Value};
use std::sync::{Arc, Once};

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("warn,invoicing_service=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Test application wrapper.
pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub http: reqwest::Client,
}

#[allow(dead_code)]
impl TestApp {
    /// Spawn the application on a random port over a fresh in-memory store.
    pub async fn spawn() -> Self {
        Self::spawn_with_store(Arc::new(MemoryStore::new())).await
    }

    pub async fn spawn_with_store(store: Arc<dyn InvoiceStore>) -> Self {
        init_tracing();

        let app = Application::build_with_store(InvoicingConfig::in_memory(0), store)
            .await
            .expect("Failed to build test application");
        let port = app.port();

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        TestApp {
            address: format!("http://127.0.0.1:{}", port),
            port,
            http: reqwest::Client::new(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub async fn get(&self, path: &str) -> Response {
        self.http
            .get(self.url(path))
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn post(&self, path: &str, body: &Value) -> Response {
        self.http
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn put(&self, path: &str, body: &Value) -> Response {
        self.http
            .put(self.url(path))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn delete(&self, path: &str) -> Response {
        self.http
            .delete(self.url(path))
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Creates a client and returns its id.
    pub async fn create_client(&self, name: &str, email: &str, tax_id: Option<&str>) -> String {
        let response = self
            .post(
                "/clients",
                &json!({ "name": name, "email": email, "tax_id": tax_id }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body: Value = response.json().await.expect("Invalid JSON");
        body["client_id"].as_str().expect("Missing client_id").to_string()
    }

    /// Creates an invoice and returns the response body.
    pub async fn create_invoice(&self, client_id: &str, date: &str, lines: Value) -> Value {
        let response = self
            .post(
                "/invoices",
                &json!({ "client_id": client_id, "invoice_date": date, "lines": lines }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        response.json().await.expect("Invalid JSON")
    }
}

/// A line payload.
#[allow(dead_code)]
pub fn line(description: &str, quantity: &str, unit_price: &str, tax_rate: &str) -> Value {
    json!({
        "description": description,
        "quantity": quantity,
        "unit_price": unit_price,
        "tax_rate": tax_rate,
    })
}

/// Parses a decimal serialized as a JSON string.
#[allow(dead_code)]
pub fn amount(value: &Value) -> rust_decimal::Decimal {
    value
        .as_str()
        .expect("amount is not a string")
        .parse()
        .expect("amount is not a decimal")
}
