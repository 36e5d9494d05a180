mod support;

use common::abi;
use common::ledger::{
    contract, decode_register_file_call, Call, Ledger, LedgerError, LedgerEvent,
    ProvenanceRecord, ReceiptStatus,
};
use common::types::{ProvenanceId, TxReference};
use serde_json::json;
use wiremock::matchers::method;
use wiremock::{Mock, ResponseTemplate};

use support::{account, contract as registry, hex_data, mock_error, mock_result, setup_rpc_ledger};

fn tx() -> TxReference {
    TxReference::from_bytes([0xab; 32])
}

#[tokio::test]
async fn transaction_payload_is_recovered() {
    let (ledger, server) = setup_rpc_ledger().await;
    let input = Call::RegisterFile {
        file_name: "résumé 📄.pdf".to_string(),
        encryption_key: "a2V5LW1hdGVyaWFs".to_string(),
    }
    .encode();

    mock_result(
        &server,
        "eth_getTransactionByHash",
        json!({
            "hash": tx().to_hex(),
            "from": account(2).to_hex(),
            "to": registry().to_hex(),
            "input": hex_data(&input),
            "blockNumber": "0x1f",
        }),
    )
    .await;

    let transaction = ledger.transaction(&tx()).await.unwrap().unwrap();
    assert_eq!(transaction.from, account(2));
    assert_eq!(transaction.to, Some(ledger.registry_address()));
    assert_eq!(ledger.registry_address(), registry());
    assert_eq!(transaction.block, Some(31));

    let call = decode_register_file_call(&transaction.input).unwrap();
    assert_eq!(call.file_name, "résumé 📄.pdf");
    assert_eq!(call.encryption_key, "a2V5LW1hdGVyaWFs");
}

#[tokio::test]
async fn unknown_transaction_is_none() {
    let (ledger, server) = setup_rpc_ledger().await;
    mock_result(&server, "eth_getTransactionByHash", json!(null)).await;
    assert!(ledger.transaction(&tx()).await.unwrap().is_none());
}

#[tokio::test]
async fn receipt_carries_registered_id() {
    let (ledger, server) = setup_rpc_ledger().await;
    let id = ProvenanceId::from_bytes([7; 32]);
    let registered = LedgerEvent::FileRegistered {
        id,
        uploader: account(2),
        file_name: "a.txt".to_string(),
        encryption_key: "k".to_string(),
    }
    .to_log();
    let foreign = LedgerEvent::UploaderAdded {
        uploader: account(9),
    }
    .to_log();

    mock_result(
        &server,
        "eth_getTransactionReceipt",
        json!({
            "transactionHash": tx().to_hex(),
            "status": "0x1",
            "blockNumber": "0x20",
            "logs": [
                {
                    "address": account(8).to_hex(),
                    "topics": foreign.topics.iter().map(|t| hex_data(t)).collect::<Vec<_>>(),
                    "data": hex_data(&foreign.data),
                },
                {
                    "address": registry().to_hex(),
                    "topics": registered.topics.iter().map(|t| hex_data(t)).collect::<Vec<_>>(),
                    "data": hex_data(&registered.data),
                },
            ],
        }),
    )
    .await;

    let receipt = ledger.receipt(&tx()).await.unwrap().unwrap();
    assert_eq!(receipt.status, ReceiptStatus::Success);
    assert_eq!(receipt.block, 32);
    // only the registry's own logs are decoded
    assert_eq!(receipt.events.len(), 1);
    assert_eq!(receipt.registered_id(), Some(id));
}

#[tokio::test]
async fn reverted_receipt() {
    let (ledger, server) = setup_rpc_ledger().await;
    mock_result(
        &server,
        "eth_getTransactionReceipt",
        json!({ "status": "0x0", "blockNumber": "0x2", "logs": [] }),
    )
    .await;

    let receipt = ledger.receipt(&tx()).await.unwrap().unwrap();
    assert_eq!(receipt.status, ReceiptStatus::Reverted);
    assert!(receipt.registered_id().is_none());
}

#[tokio::test]
async fn pending_receipt_is_none() {
    let (ledger, server) = setup_rpc_ledger().await;
    mock_result(&server, "eth_getTransactionReceipt", json!(null)).await;
    assert!(ledger.receipt(&tx()).await.unwrap().is_none());
}

#[tokio::test]
async fn server_errors_are_transient() {
    let (ledger, server) = setup_rpc_ledger().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = ledger.receipt(&tx()).await.unwrap_err();
    assert!(matches!(err, LedgerError::Unavailable(_)));
    assert!(err.is_transient());
}

#[tokio::test]
async fn unreachable_node_is_transient() {
    let (ledger, server) = setup_rpc_ledger().await;
    drop(server);

    let err = ledger.transaction(&tx()).await.unwrap_err();
    assert!(err.is_transient(), "unexpected error {:?}", err);
}

#[tokio::test]
async fn submission_returns_tx_reference() {
    let (ledger, server) = setup_rpc_ledger().await;
    mock_result(&server, "eth_sendTransaction", json!(tx().to_hex())).await;

    let submitted = ledger
        .register_file(&account(2), "a.txt", "a2V5")
        .await
        .unwrap();
    assert_eq!(submitted, tx());

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let sent = &body["params"][0];
    assert_eq!(sent["from"], account(2).to_hex());
    assert_eq!(sent["to"], registry().to_hex());
    let data = sent["data"].as_str().unwrap().trim_start_matches("0x");
    let call = decode_register_file_call(&hex::decode(data).unwrap()).unwrap();
    assert_eq!(call.file_name, "a.txt");
}

#[tokio::test]
async fn authorization_revert_is_unauthorized() {
    let (ledger, server) = setup_rpc_ledger().await;
    mock_error(
        &server,
        "eth_sendTransaction",
        -32000,
        "VM Exception while processing transaction: revert Not an uploader",
    )
    .await;

    let err = ledger
        .register_file(&account(3), "a.txt", "a2V5")
        .await
        .unwrap_err();
    assert_eq!(err, LedgerError::Unauthorized(account(3)));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn other_revert_is_reverted() {
    let (ledger, server) = setup_rpc_ledger().await;
    mock_error(
        &server,
        "eth_sendTransaction",
        -32000,
        "VM Exception while processing transaction: revert File already archived",
    )
    .await;

    let err = ledger
        .archive_file(&account(3), &ProvenanceId::default())
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Reverted(_)));
}

#[tokio::test]
async fn file_metadata_view() {
    let (ledger, server) = setup_rpc_ledger().await;
    let record = ProvenanceRecord {
        id: ProvenanceId::from_bytes([4; 32]),
        uploader: account(2),
        upload_timestamp: 1_700_000_000,
        file_name: "a.txt".to_string(),
        encryption_key: "a2V5".to_string(),
        is_active: false,
    };
    mock_result(
        &server,
        "eth_call",
        json!(hex_data(&contract::encode_metadata_return(&record))),
    )
    .await;

    assert_eq!(ledger.file_metadata(&record.id).await.unwrap(), record);

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let data = body["params"][0]["data"].as_str().unwrap();
    assert!(data.starts_with(&hex_data(&abi::selector(contract::GET_FILE_METADATA))));
}

#[tokio::test]
async fn missing_record_reads_back_as_not_found() {
    let (ledger, server) = setup_rpc_ledger().await;
    let empty = ProvenanceRecord {
        id: ProvenanceId::default(),
        uploader: Default::default(),
        upload_timestamp: 0,
        file_name: String::new(),
        encryption_key: String::new(),
        is_active: false,
    };
    mock_result(
        &server,
        "eth_call",
        json!(hex_data(&contract::encode_metadata_return(&empty))),
    )
    .await;

    let id = ProvenanceId::from_bytes([5; 32]);
    assert_eq!(
        ledger.file_metadata(&id).await,
        Err(LedgerError::NotFound(id))
    );
}

#[tokio::test]
async fn user_files_view() {
    let (ledger, server) = setup_rpc_ledger().await;
    let ids = vec![
        ProvenanceId::from_bytes([1; 32]),
        ProvenanceId::from_bytes([2; 32]),
    ];
    let encoded = abi::encode(&[abi::Token::Array(
        ids.iter()
            .map(|id| abi::Token::FixedBytes32(*id.as_bytes()))
            .collect(),
    )]);
    mock_result(&server, "eth_call", json!(hex_data(&encoded))).await;

    assert_eq!(ledger.user_files(&account(2)).await.unwrap(), ids);
}
