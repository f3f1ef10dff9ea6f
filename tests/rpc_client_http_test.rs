//! `SolanaNodeClient` against a mock JSON-RPC node

use std::time::Duration;

use mockito::Matcher;
use priority_transfer::rpc_manager::{
    ConfirmationLevel, NodeClient, RpcManagerError, SolanaNodeClient,
};
use serde_json::json;
use solana_sdk::signature::Signature;

fn client(url: String) -> SolanaNodeClient {
    SolanaNodeClient::new(url, Duration::from_secs(5))
}

#[tokio::test]
async fn test_block_height_uses_requested_commitment() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({
            "method": "getBlockHeight",
            "params": [{ "commitment": "finalized" }]
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"jsonrpc":"2.0","result":284290,"id":1}"#)
        .create_async()
        .await;

    let height = client(server.url())
        .block_height(ConfirmationLevel::Finalized)
        .await
        .unwrap();

    assert_eq!(height, 284_290);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_unknown_signature_is_none() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({ "method": "getSignatureStatuses" })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"jsonrpc":"2.0","result":{"context":{"slot":10},"value":[null]},"id":1}"#)
        .create_async()
        .await;

    let status = client(server.url())
        .signature_status(&Signature::default())
        .await
        .unwrap();

    assert!(status.is_none());
}

#[tokio::test]
async fn test_empty_status_list_is_malformed() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({ "method": "getSignatureStatuses" })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"jsonrpc":"2.0","result":{"context":{"slot":10},"value":[]},"id":1}"#)
        .create_async()
        .await;

    let err = client(server.url())
        .signature_status(&Signature::default())
        .await
        .unwrap_err();

    assert!(matches!(err, RpcManagerError::MalformedResponse(_)));
    assert!(!err.is_retryable());
}
