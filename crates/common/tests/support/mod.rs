//! Shared test utilities for ledger client integration tests
#![allow(dead_code)]

use common::ledger::{RpcLedger, RpcLedgerConfig};
use common::types::Address;
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub fn contract() -> Address {
    "0x5fbdb2315678afecb367f032d93f642f64180aa3".parse().unwrap()
}

pub fn account(n: u8) -> Address {
    Address::from_bytes([n; 20])
}

/// Set up a ledger client pointed at a fresh mock node
pub async fn setup_rpc_ledger() -> (RpcLedger, MockServer) {
    let server = MockServer::start().await;
    let config = RpcLedgerConfig::new(server.uri().parse().unwrap(), contract());
    (RpcLedger::new(config).unwrap(), server)
}

/// Answer every call to `rpc_method` with `result`
pub async fn mock_result(server: &MockServer, rpc_method: &str, result: Value) {
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": rpc_method })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": result,
        })))
        .mount(server)
        .await;
}

/// Answer every call to `rpc_method` with a JSON-RPC error object
pub async fn mock_error(server: &MockServer, rpc_method: &str, code: i64, message: &str) {
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": rpc_method })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "code": code, "message": message },
        })))
        .mount(server)
        .await;
}

pub fn hex_data(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}
