//! Test utilities for cashbacker-core
//!
//! A mock bank network server speaking the same JSON as the real one, plus a
//! `/classify` endpoint for the HTTP categorizer.

use axum::{
    extract::{Json, Query},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use tokio::sync::oneshot;

/// Mock bank network for testing and development
pub struct MockBankServer {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockBankServer {
    /// The single account the mock knows about
    pub const ACCOUNT_NUMBER: &'static str = "40817810000000000123";
    /// The user owning that account
    pub const USER_ID: &'static str = "user-1";

    /// Start the mock server on an available port
    pub async fn start() -> Self {
        let app = Router::new()
            .route("/transactions", post(handle_transactions))
            .route("/accounts", get(handle_accounts))
            .route("/cashbacks", post(handle_cashbacks))
            .route("/classify", post(handle_classify));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get the base URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockBankServer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[derive(Deserialize)]
struct TransactionsRequest {
    account_number: String,
    start_datetime: Option<chrono::DateTime<chrono::Utc>>,
}

/// Transactions of the mock account, bound inclusive like the real bank
async fn handle_transactions(Json(request): Json<TransactionsRequest>) -> Json<Value> {
    let all = [
        ("MB-1", "Supermarket bread and milk", -540, "2024-03-01T09:00:00Z"),
        ("MB-2", "Coffee house", -250, "2024-03-02T10:00:00Z"),
        ("MB-3", "Laptop charger", -1990, "2024-03-03T12:00:00Z"),
    ];

    let transactions: Vec<Value> = if request.account_number == MockBankServer::ACCOUNT_NUMBER {
        all.iter()
            .filter(|(_, _, _, time)| {
                let time: chrono::DateTime<chrono::Utc> = time.parse().unwrap();
                request.start_datetime.map_or(true, |s| time >= s)
            })
            .map(|(id, name, value, time)| json!({"id": id, "name": name, "value": value, "time": time}))
            .collect()
    } else {
        Vec::new()
    };

    Json(json!({
        "account_number": request.account_number,
        "transactions": transactions,
    }))
}

#[derive(Deserialize)]
struct AccountsQuery {
    user_id: String,
}

async fn handle_accounts(Query(query): Query<AccountsQuery>) -> (StatusCode, Json<Value>) {
    if query.user_id != MockBankServer::USER_ID {
        return (StatusCode::NOT_FOUND, Json(json!({"detail": "user not found"})));
    }
    (
        StatusCode::OK,
        Json(json!([{
            "number": MockBankServer::ACCOUNT_NUMBER,
            "bank": "center-invest",
            "cards": [{"card_number": "4081781234561234"}],
        }])),
    )
}

async fn handle_cashbacks(Json(request): Json<Value>) -> Json<Value> {
    let cashbacks = if request["account_number"] == MockBankServer::ACCOUNT_NUMBER {
        json!([{"product_type": "drinks", "value": 5}])
    } else {
        json!([])
    };
    Json(json!({ "cashbacks": cashbacks }))
}

#[derive(Deserialize)]
struct ClassifyRequest {
    descriptions: Vec<String>,
}

/// Keyword classifier used to exercise the HTTP categorizer
async fn handle_classify(Json(request): Json<ClassifyRequest>) -> Json<Value> {
    let categories: Vec<&str> = request
        .descriptions
        .iter()
        .map(|d| {
            let d = d.to_lowercase();
            if d.contains("coffee") {
                "drinks"
            } else if d.contains("bread") {
                "groceries"
            } else {
                "other"
            }
        })
        .collect();
    Json(json!({ "categories": categories }))
}
