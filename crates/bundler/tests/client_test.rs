mod common;

use std::time::Duration;

use alloy_primitives::U256;
use common::*;
use keyway_bundler::BundlerRequestState;
use keyway_core::test_utils::sample_user_operation;
use keyway_core::{
    BundlerError, ENTRY_POINT_V07, EntryPointVersion, ErrorKind, TransportErrorKind,
    classify_bundler,
};
use serde_json::{Value, json};
use wiremock::{MockServer, ResponseTemplate};

fn expected_hash() -> alloy_primitives::B256 {
    sample_user_operation().hash(ENTRY_POINT_V07, CHAIN_ID, EntryPointVersion::V07)
}

#[tokio::test]
async fn test_submit_sends_the_unpacked_wire_schema() {
    let server = MockServer::start().await;
    rpc_method("eth_sendUserOperation")
        .respond_with(rpc_result(json!(expected_hash())))
        .expect(1)
        .mount(&server)
        .await;

    let hash = client_for(&server).submit(&sample_user_operation()).await.unwrap();
    assert_eq!(hash, expected_hash());

    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["jsonrpc"], "2.0");
    let op = &body["params"][0];
    assert_eq!(body["params"][1], json!(ENTRY_POINT_V07));
    assert_eq!(op["nonce"], "0x5");
    assert_eq!(op["verificationGasLimit"], "0x249f0");
    assert_eq!(op["callGasLimit"], "0x30d40");
    assert_eq!(op["maxPriorityFeePerGas"], "0x3b9aca00");
    assert_eq!(op["maxFeePerGas"], "0x77359400");
    for absent in ["factory", "factoryData", "paymaster", "paymasterData"] {
        assert!(op.get(absent).is_none(), "{absent} should be omitted");
    }
}

#[tokio::test]
async fn test_rate_limited_submission_is_retried_until_included() {
    let server = MockServer::start().await;
    let hash = expected_hash();
    rpc_method("eth_sendUserOperation")
        .respond_with(ResponseTemplate::new(429).set_body_string("Too Many Requests"))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    rpc_method("eth_sendUserOperation")
        .respond_with(rpc_result(json!(hash)))
        .expect(1)
        .mount(&server)
        .await;
    rpc_method("eth_getUserOperationReceipt")
        .respond_with(rpc_result(Value::Null))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    rpc_method("eth_getUserOperationReceipt")
        .respond_with(rpc_result(receipt(hash, true)))
        .mount(&server)
        .await;

    let receipt = client_for(&server)
        .submit_and_wait(&sample_user_operation(), Duration::from_secs(2), true)
        .await
        .unwrap();

    assert!(receipt.success);
    assert_eq!(receipt.actual_gas_used, U256::from(100_000));
    assert!(receipt.transaction_hash().is_some());
}

#[tokio::test]
async fn test_validation_code_in_server_error_is_not_retried() {
    let server = MockServer::start().await;
    rpc_method("eth_sendUserOperation")
        .respond_with(
            ResponseTemplate::new(500)
                .set_body_string("FailedOp(0, \"AA21 didn't pay prefund\")"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let state = client_for(&server)
        .submit_and_track(&sample_user_operation(), Duration::from_secs(2), true)
        .await;

    match state {
        BundlerRequestState::Failed(err) => {
            assert_eq!(err.kind, ErrorKind::InsufficientFunds);
            assert_eq!(err.validation_code.as_deref(), Some("AA21"));
            assert!(!err.retryable);
        }
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_json_rpc_error_keeps_method_and_params() {
    let server = MockServer::start().await;
    rpc_method("eth_estimateUserOperationGas")
        .respond_with(rpc_error(-32602, "invalid userop: missing signature"))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .estimate_user_operation_gas(&sample_user_operation())
        .await
        .unwrap_err();

    match &err {
        BundlerError::Rpc { method, params, code, .. } => {
            assert_eq!(method, "eth_estimateUserOperationGas");
            assert_eq!(*code, -32602);
            assert_eq!(params[1], json!(ENTRY_POINT_V07));
        }
        other => panic!("expected rpc error, got {other:?}"),
    }
    assert_eq!(classify_bundler(&err).kind, ErrorKind::InvalidRequest);
}

#[tokio::test]
async fn test_slow_relay_is_a_retryable_transport_timeout() {
    let server = MockServer::start().await;
    rpc_method("eth_supportedEntryPoints")
        .respond_with(rpc_result(json!([ENTRY_POINT_V07])).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let err = client_with_timeout(&server, Duration::from_millis(100))
        .supported_entry_points()
        .await
        .unwrap_err();

    assert!(matches!(err, BundlerError::Transport { kind: TransportErrorKind::Timeout, .. }));
    let classified = classify_bundler(&err);
    assert_eq!(classified.kind, ErrorKind::Network);
    assert!(classified.retryable);
}

#[tokio::test]
async fn test_garbage_body_is_an_invalid_response() {
    let server = MockServer::start().await;
    rpc_method("eth_getUserOperationReceipt")
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
        .mount(&server)
        .await;

    let err = client_for(&server).get_user_operation_receipt(expected_hash()).await.unwrap_err();
    assert_eq!(classify_bundler(&err).kind, ErrorKind::InvalidResponse);
}

#[tokio::test]
async fn test_pending_receipt_is_none() {
    let server = MockServer::start().await;
    rpc_method("eth_getUserOperationReceipt")
        .respond_with(rpc_result(Value::Null))
        .mount(&server)
        .await;

    let receipt = client_for(&server).get_user_operation_receipt(expected_hash()).await.unwrap();
    assert!(receipt.is_none());
}

#[tokio::test]
async fn test_operation_lookup_decodes_the_wire_schema() {
    let server = MockServer::start().await;
    let op = sample_user_operation().to_rpc().unwrap();
    rpc_method("eth_getUserOperationByHash")
        .respond_with(rpc_result(json!({
            "userOperation": op,
            "entryPoint": ENTRY_POINT_V07,
            "blockNumber": "0x1b4",
            "blockHash": null,
            "transactionHash": "0x3333333333333333333333333333333333333333333333333333333333333333"
        })))
        .mount(&server)
        .await;

    let lookup = client_for(&server)
        .get_user_operation_by_hash(expected_hash())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(lookup.user_operation, op);
    assert_eq!(lookup.block_number, Some(U256::from(0x1b4)));
    assert_eq!(lookup.block_hash, None);
}

#[tokio::test]
async fn test_supported_entry_point_check() {
    let server = MockServer::start().await;
    rpc_method("eth_supportedEntryPoints")
        .respond_with(rpc_result(json!([ENTRY_POINT_V07])))
        .mount(&server)
        .await;

    client_for(&server).ensure_entry_point_supported().await.unwrap();
}

#[tokio::test]
async fn test_gas_price_extension_uses_the_vendor_namespace() {
    let server = MockServer::start().await;
    rpc_method("pimlico_getUserOperationGasPrice")
        .respond_with(rpc_result(json!({
            "slow": { "maxFeePerGas": "0x3b9aca00", "maxPriorityFeePerGas": "0x5f5e100" },
            "standard": { "maxFeePerGas": "0x77359400", "maxPriorityFeePerGas": "0xbebc200" },
            "fast": { "maxFeePerGas": "0xb2d05e00", "maxPriorityFeePerGas": "0x11e1a300" }
        })))
        .mount(&server)
        .await;

    let mut config = fast_config();
    config.gas_price_namespace = Some("pimlico".to_string());
    let client = keyway_bundler::BundlerClient::http(server.uri().parse().unwrap(), config).unwrap();

    let tiers = client.get_user_operation_gas_price().await.unwrap();
    assert_eq!(tiers.standard.max_fee_per_gas, U256::from(2_000_000_000u64));
}

#[tokio::test]
async fn test_gas_price_extension_absent_is_not_fatal() {
    let server = MockServer::start().await;
    rpc_method("pimlico_getUserOperationGasPrice")
        .respond_with(rpc_error(-32601, "the method pimlico_getUserOperationGasPrice does not exist"))
        .mount(&server)
        .await;

    let mut config = fast_config();
    config.gas_price_namespace = Some("pimlico".to_string());
    let client = keyway_bundler::BundlerClient::http(server.uri().parse().unwrap(), config).unwrap();

    assert_eq!(client.get_user_operation_gas_price().await, None);
}
