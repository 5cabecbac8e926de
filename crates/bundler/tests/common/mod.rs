#![allow(dead_code)]

use std::time::Duration;

use alloy_primitives::B256;
use keyway_bundler::{BundlerClient, BundlerClientConfig, HttpTransport, PollConfig, RetryPolicy};
use keyway_core::{ENTRY_POINT_V07, EntryPointVersion};
use serde_json::{Value, json};
use wiremock::matchers::{body_partial_json, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const CHAIN_ID: u64 = 84532;

/// Config with delays short enough for real-time tests.
pub fn fast_config() -> BundlerClientConfig {
    let mut config = BundlerClientConfig::new(EntryPointVersion::V07, CHAIN_ID);
    config.poll = PollConfig { timeout: Duration::from_secs(2), interval: Duration::from_millis(20) };
    config.retry = RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
        ..RetryPolicy::default()
    };
    config
}

pub fn client_for(server: &MockServer) -> BundlerClient {
    BundlerClient::http(server.uri().parse().unwrap(), fast_config()).unwrap()
}

pub fn client_with_timeout(server: &MockServer, timeout: Duration) -> BundlerClient {
    let transport = HttpTransport::with_timeout(server.uri().parse().unwrap(), timeout).unwrap();
    BundlerClient::new(transport, fast_config())
}

pub fn rpc_result(result: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "jsonrpc": "2.0", "id": 1, "result": result }))
}

pub fn rpc_error(code: i64, message: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "jsonrpc": "2.0",
        "id": 1,
        "error": { "code": code, "message": message }
    }))
}

/// Matches POSTs for one JSON-RPC method.
pub fn rpc_method(name: &str) -> wiremock::MockBuilder {
    Mock::given(method("POST")).and(body_partial_json(json!({ "method": name })))
}

pub fn receipt(user_op_hash: B256, success: bool) -> Value {
    json!({
        "userOpHash": user_op_hash,
        "entryPoint": ENTRY_POINT_V07,
        "sender": "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
        "nonce": "0x5",
        "actualGasCost": "0x5af3107a4000",
        "actualGasUsed": "0x186a0",
        "success": success,
        "logs": [],
        "receipt": {
            "transactionHash": "0x3333333333333333333333333333333333333333333333333333333333333333",
            "blockNumber": "0x1b4"
        }
    })
}
