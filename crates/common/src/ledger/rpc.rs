use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use url::Url;

use super::contract::{self, Call, EventLog};
use super::{
    Ledger, LedgerError, LedgerEvent, LedgerTransaction, ProvenanceRecord, Receipt,
    ReceiptStatus, UploaderProfile,
};
use crate::abi::{self, Token};
use crate::types::{Address, ProvenanceId, TxReference};

const DEFAULT_GAS: u64 = 3_000_000;
const DEFAULT_TIMEOUT_SECS: u64 = 10;

fn default_gas() -> u64 {
    DEFAULT_GAS
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// Where the registry contract lives and how to reach it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcLedgerConfig {
    /// JSON-RPC endpoint of the node
    pub url: Url,
    /// Address of the deployed registry contract
    pub contract: Address,
    /// Gas limit sent with every transaction
    #[serde(default = "default_gas")]
    pub gas: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl RpcLedgerConfig {
    pub fn new(url: Url, contract: Address) -> Self {
        Self {
            url,
            contract,
            gas: DEFAULT_GAS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Client for a registry deployed on an Ethereum-style JSON-RPC node
///
/// Transactions are submitted with `eth_sendTransaction`, so the node must
///  hold unlocked accounts for every uploader identity. That is how a local
///  development node runs; a production deployment would sign locally.
#[derive(Debug)]
pub struct RpcLedger {
    client: reqwest::Client,
    config: RpcLedgerConfig,
    request_id: AtomicU64,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    status: Option<String>,
    block_number: String,
    #[serde(default)]
    logs: Vec<RawLog>,
}

#[derive(Debug, Deserialize)]
struct RawLog {
    address: String,
    #[serde(default)]
    topics: Vec<String>,
    #[serde(default)]
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTransaction {
    from: String,
    to: Option<String>,
    input: String,
    block_number: Option<String>,
}

fn strip_hex(s: &str) -> &str {
    s.strip_prefix("0x").unwrap_or(s)
}

fn parse_hex_bytes(s: &str) -> Result<Vec<u8>, LedgerError> {
    hex::decode(strip_hex(s)).map_err(|e| LedgerError::Protocol(format!("invalid hex data: {}", e)))
}

fn parse_quantity(s: &str) -> Result<u64, LedgerError> {
    u64::from_str_radix(strip_hex(s), 16)
        .map_err(|e| LedgerError::Protocol(format!("invalid quantity {:?}: {}", s, e)))
}

fn parse_word(s: &str) -> Result<[u8; abi::WORD], LedgerError> {
    let bytes = parse_hex_bytes(s)?;
    bytes
        .try_into()
        .map_err(|_| LedgerError::Protocol(format!("expected a 32 byte word, got {}", s)))
}

fn parse_address(s: &str) -> Result<Address, LedgerError> {
    s.parse()
        .map_err(|e| LedgerError::Protocol(format!("invalid address {:?}: {}", s, e)))
}

impl RpcLedger {
    pub fn new(config: RpcLedgerConfig) -> Result<Self, LedgerError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LedgerError::Protocol(format!("failed to build http client: {}", e)))?;
        Ok(Self {
            client,
            config,
            request_id: AtomicU64::new(1),
        })
    }

    pub fn config(&self) -> &RpcLedgerConfig {
        &self.config
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, LedgerError> {
        let id = self.request_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(self.config.url.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| LedgerError::Unavailable(format!("{}: {}", method, e)))?;

        let status = response.status();
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(LedgerError::Unavailable(format!(
                "{}: node answered {}",
                method, status
            )));
        }
        if !status.is_success() {
            return Err(LedgerError::Protocol(format!(
                "{}: node answered {}",
                method, status
            )));
        }

        let response: RpcResponse = response
            .json()
            .await
            .map_err(|e| LedgerError::Protocol(format!("{}: invalid response: {}", method, e)))?;

        if let Some(error) = response.error {
            return Err(classify_error(method, error));
        }

        serde_json::from_value(response.result.unwrap_or(Value::Null))
            .map_err(|e| LedgerError::Protocol(format!("{}: unexpected result: {}", method, e)))
    }

    async fn call(&self, from: Option<&Address>, data: Vec<u8>) -> Result<Vec<u8>, LedgerError> {
        let mut call = json!({
            "to": self.config.contract.to_hex(),
            "data": format!("0x{}", hex::encode(data)),
        });
        if let Some(from) = from {
            call["from"] = json!(from.to_hex());
        }
        let result: String = self.request("eth_call", json!([call, "latest"])).await?;
        parse_hex_bytes(&result)
    }

    async fn send(&self, from: &Address, call: Call) -> Result<TxReference, LedgerError> {
        let input = call.encode();
        if input.len() > abi::MAX_CALL_PAYLOAD {
            return Err(abi::AbiError::PayloadTooLarge {
                len: input.len(),
                max: abi::MAX_CALL_PAYLOAD,
            }
            .into());
        }

        let transaction = json!({
            "from": from.to_hex(),
            "to": self.config.contract.to_hex(),
            "gas": format!("0x{:x}", self.config.gas),
            "data": format!("0x{}", hex::encode(input)),
        });

        let result: String = self
            .request("eth_sendTransaction", json!([transaction]))
            .await
            .map_err(|e| match e {
                LedgerError::Reverted(reason) if names_authorization(&reason) => {
                    LedgerError::Unauthorized(*from)
                }
                other => other,
            })?;

        tracing::debug!(tx = %result, %from, call = call.signature(), "submitted ledger transaction");
        Ok(TxReference::from_bytes(parse_word(&result)?))
    }
}

/// Revert reasons the registry uses for its access modifiers
fn names_authorization(reason: &str) -> bool {
    let reason = reason.to_ascii_lowercase();
    ["only owner", "not the owner", "not authorized", "not an uploader", "unauthorized"]
        .iter()
        .any(|needle| reason.contains(needle))
}

fn classify_error(method: &str, error: RpcErrorObject) -> LedgerError {
    let message = error.message;
    if message.to_ascii_lowercase().contains("revert") {
        return LedgerError::Reverted(message);
    }
    match error.code {
        // limit exceeded / resource unavailable
        -32005 | -32002 => LedgerError::Unavailable(format!("{}: {}", method, message)),
        code => LedgerError::Protocol(format!("{}: rpc error {}: {}", method, code, message)),
    }
}

#[async_trait]
impl Ledger for RpcLedger {
    fn registry_address(&self) -> Address {
        self.config.contract
    }

    async fn owner(&self) -> Result<Address, LedgerError> {
        let data = self.call(None, abi::encode_call(contract::OWNER, &[])).await?;
        Ok(contract::decode_address_return(&data)?)
    }

    async fn total_files(&self) -> Result<u64, LedgerError> {
        let data = self
            .call(None, abi::encode_call(contract::TOTAL_FILES, &[]))
            .await?;
        Ok(contract::decode_uint_return(&data)?)
    }

    async fn is_uploader(&self, identity: &Address) -> Result<bool, LedgerError> {
        let data = self
            .call(
                None,
                abi::encode_call(contract::IS_UPLOADER, &[Token::Address(*identity)]),
            )
            .await?;
        Ok(contract::decode_bool_return(&data)?)
    }

    async fn user_profile(&self, identity: &Address) -> Result<UploaderProfile, LedgerError> {
        let data = self
            .call(
                None,
                abi::encode_call(contract::USER_PROFILES, &[Token::Address(*identity)]),
            )
            .await?;
        Ok(contract::decode_profile_return(&data)?)
    }

    async fn add_uploader(
        &self,
        from: &Address,
        uploader: &Address,
    ) -> Result<TxReference, LedgerError> {
        self.send(from, Call::AddUploader(*uploader)).await
    }

    async fn remove_uploader(
        &self,
        from: &Address,
        uploader: &Address,
    ) -> Result<TxReference, LedgerError> {
        self.send(from, Call::RemoveUploader(*uploader)).await
    }

    async fn transfer_ownership(
        &self,
        from: &Address,
        new_owner: &Address,
    ) -> Result<TxReference, LedgerError> {
        self.send(from, Call::TransferOwnership(*new_owner)).await
    }

    async fn register_file(
        &self,
        from: &Address,
        file_name: &str,
        encryption_key: &str,
    ) -> Result<TxReference, LedgerError> {
        self.send(
            from,
            Call::RegisterFile {
                file_name: file_name.to_string(),
                encryption_key: encryption_key.to_string(),
            },
        )
        .await
    }

    async fn archive_file(
        &self,
        from: &Address,
        id: &ProvenanceId,
    ) -> Result<TxReference, LedgerError> {
        self.send(from, Call::ArchiveFile(*id)).await
    }

    async fn receipt(&self, tx: &TxReference) -> Result<Option<Receipt>, LedgerError> {
        let raw: Option<RawReceipt> = self
            .request("eth_getTransactionReceipt", json!([tx.to_hex()]))
            .await?;
        let Some(raw) = raw else {
            return Ok(None);
        };

        let status = match raw.status.as_deref().map(parse_quantity).transpose()? {
            Some(0) => ReceiptStatus::Reverted,
            _ => ReceiptStatus::Success,
        };

        let mut events = Vec::new();
        for log in raw.logs {
            // logs from other contracts touched by the same transaction
            if parse_address(&log.address)? != self.config.contract {
                continue;
            }
            let log = EventLog {
                topics: log
                    .topics
                    .iter()
                    .map(|t| parse_word(t))
                    .collect::<Result<_, _>>()?,
                data: parse_hex_bytes(&log.data)?,
            };
            if let Some(event) = LedgerEvent::from_log(&log)? {
                events.push(event);
            }
        }

        Ok(Some(Receipt {
            tx: *tx,
            status,
            block: parse_quantity(&raw.block_number)?,
            events,
        }))
    }

    async fn transaction(
        &self,
        tx: &TxReference,
    ) -> Result<Option<LedgerTransaction>, LedgerError> {
        let raw: Option<RawTransaction> = self
            .request("eth_getTransactionByHash", json!([tx.to_hex()]))
            .await?;
        let Some(raw) = raw else {
            return Ok(None);
        };

        Ok(Some(LedgerTransaction {
            tx: *tx,
            from: parse_address(&raw.from)?,
            to: raw.to.as_deref().map(parse_address).transpose()?,
            input: parse_hex_bytes(&raw.input)?,
            block: raw.block_number.as_deref().map(parse_quantity).transpose()?,
        }))
    }

    async fn file_metadata(&self, id: &ProvenanceId) -> Result<ProvenanceRecord, LedgerError> {
        let data = self
            .call(
                None,
                abi::encode_call(
                    contract::GET_FILE_METADATA,
                    &[Token::FixedBytes32(*id.as_bytes())],
                ),
            )
            .await
            .map_err(|e| match e {
                LedgerError::Reverted(_) => LedgerError::NotFound(*id),
                other => other,
            })?;

        let record = contract::decode_metadata_return(*id, &data)?;
        // unset storage reads back as zeroes
        if record.uploader == Address::default() {
            return Err(LedgerError::NotFound(*id));
        }
        Ok(record)
    }

    async fn user_files(&self, identity: &Address) -> Result<Vec<ProvenanceId>, LedgerError> {
        let data = self
            .call(
                Some(identity),
                abi::encode_call(contract::GET_USER_FILES, &[]),
            )
            .await?;
        Ok(contract::decode_ids_return(&data)?)
    }

    async fn encryption_key(
        &self,
        from: &Address,
        id: &ProvenanceId,
    ) -> Result<String, LedgerError> {
        let data = self
            .call(
                Some(from),
                abi::encode_call(
                    contract::GET_ENCRYPTION_KEY,
                    &[Token::FixedBytes32(*id.as_bytes())],
                ),
            )
            .await
            .map_err(|e| match e {
                LedgerError::Reverted(reason) if names_authorization(&reason) => {
                    LedgerError::Unauthorized(*from)
                }
                other => other,
            })?;
        Ok(contract::decode_string_return(&data)?)
    }
}
