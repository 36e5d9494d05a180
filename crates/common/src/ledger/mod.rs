//! The provenance ledger
//!
//! An append-only, publicly readable log where every encryption event is
//!  anchored by a `registerFile(name, key)` call on the registry contract.
//!  The ledger is treated as an opaque ordered log: we submit calls, wait
//!  for receipts and read back the raw call payloads, nothing more.
//!
//! Two implementations are provided:
//!  - [`MemoryLedger`], an in-process ledger that executes the registry's
//!    state machine over ABI-encoded call payloads, for tests and local runs
//!  - [`RpcLedger`], a JSON-RPC client for an Ethereum-style node hosting
//!    the deployed registry contract

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::abi::AbiError;
use crate::types::{Address, ProvenanceId, TxReference};

pub mod contract;
mod memory;
mod registry;
mod rpc;

pub use contract::{decode_register_file_call, Call, EventLog, RegisterFileCall};
pub use memory::MemoryLedger;
pub use registry::Registry;
pub use rpc::{RpcLedger, RpcLedgerConfig};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// The caller is not whitelisted, not the owner, or not the uploader
    #[error("{0} is not authorized to make this call")]
    Unauthorized(Address),
    #[error("provenance record not found: {0}")]
    NotFound(ProvenanceId),
    #[error("provenance record already archived: {0}")]
    AlreadyArchived(ProvenanceId),
    #[error("{uploader} archived {name:?}; the name cannot be registered again")]
    NameArchived { uploader: Address, name: String },
    /// Execution failed for a reason the registry does not name
    #[error("transaction reverted: {0}")]
    Reverted(String),
    /// The node could not be reached or failed to answer. The only
    ///  transient ledger error.
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
    #[error("malformed ledger data: {0}")]
    Decode(#[from] AbiError),
    #[error("unexpected ledger response: {0}")]
    Protocol(String),
}

impl LedgerError {
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Unavailable(_))
    }
}

/// The on-ledger record written by `registerFile`
///
/// Immutable once written except for `is_active`, which only ever goes
///  from `true` to `false`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    pub id: ProvenanceId,
    pub uploader: Address,
    /// Seconds since the unix epoch
    pub upload_timestamp: u64,
    pub file_name: String,
    /// The wrapped key exactly as submitted
    pub encryption_key: String,
    pub is_active: bool,
}

/// Per-account view of the uploader whitelist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UploaderProfile {
    pub is_uploader: bool,
    pub total_files_uploaded: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    FileRegistered {
        id: ProvenanceId,
        uploader: Address,
        file_name: String,
        encryption_key: String,
    },
    FileArchived {
        id: ProvenanceId,
    },
    UploaderAdded {
        uploader: Address,
    },
    UploaderRemoved {
        uploader: Address,
    },
    OwnershipTransferred {
        previous_owner: Address,
        new_owner: Address,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceiptStatus {
    Success,
    Reverted,
}

/// Proof that a submitted transaction was included in a block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub tx: TxReference,
    pub status: ReceiptStatus,
    pub block: u64,
    pub events: Vec<LedgerEvent>,
}

impl Receipt {
    pub fn is_success(&self) -> bool {
        self.status == ReceiptStatus::Success
    }

    /// The record id assigned by a successful `registerFile`
    pub fn registered_id(&self) -> Option<ProvenanceId> {
        if !self.is_success() {
            return None;
        }
        self.events.iter().find_map(|event| match event {
            LedgerEvent::FileRegistered { id, .. } => Some(*id),
            _ => None,
        })
    }
}

/// A transaction as the ledger recorded it, including the raw call payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerTransaction {
    pub tx: TxReference,
    pub from: Address,
    /// The called account. `None` for contract creation.
    pub to: Option<Address>,
    /// Selector followed by the ABI-encoded arguments
    pub input: Vec<u8>,
    /// `None` until the transaction is included in a block
    pub block: Option<u64>,
}

/// Read/write access to the provenance registry
///
/// Write calls return as soon as the ledger accepted the transaction; they
///  do not wait for confirmation. Poll [`Ledger::receipt`] for that.
#[async_trait]
pub trait Ledger: Send + Sync + std::fmt::Debug + 'static {
    /// Address of the registry contract every call is sent to
    fn registry_address(&self) -> Address;

    async fn owner(&self) -> Result<Address, LedgerError>;

    async fn total_files(&self) -> Result<u64, LedgerError>;

    async fn is_uploader(&self, identity: &Address) -> Result<bool, LedgerError>;

    async fn user_profile(&self, identity: &Address) -> Result<UploaderProfile, LedgerError>;

    /// Owner only
    async fn add_uploader(
        &self,
        from: &Address,
        uploader: &Address,
    ) -> Result<TxReference, LedgerError>;

    /// Owner only
    async fn remove_uploader(
        &self,
        from: &Address,
        uploader: &Address,
    ) -> Result<TxReference, LedgerError>;

    /// Owner only
    async fn transfer_ownership(
        &self,
        from: &Address,
        new_owner: &Address,
    ) -> Result<TxReference, LedgerError>;

    /// Anchor a new provenance record
    ///
    /// # Errors
    ///
    /// * `LedgerError::Unauthorized` - `from` is not on the uploader whitelist
    /// * `LedgerError::NameArchived` - `from` archived a record under `file_name`
    async fn register_file(
        &self,
        from: &Address,
        file_name: &str,
        encryption_key: &str,
    ) -> Result<TxReference, LedgerError>;

    /// Flip a record's `is_active` to false. Original uploader or owner only.
    async fn archive_file(
        &self,
        from: &Address,
        id: &ProvenanceId,
    ) -> Result<TxReference, LedgerError>;

    /// `Ok(None)` while the transaction is unconfirmed
    async fn receipt(&self, tx: &TxReference) -> Result<Option<Receipt>, LedgerError>;

    /// `Ok(None)` if the ledger has never seen `tx`
    async fn transaction(&self, tx: &TxReference)
        -> Result<Option<LedgerTransaction>, LedgerError>;

    async fn file_metadata(&self, id: &ProvenanceId) -> Result<ProvenanceRecord, LedgerError>;

    /// Record ids registered by `identity`, in registration order
    async fn user_files(&self, identity: &Address) -> Result<Vec<ProvenanceId>, LedgerError>;

    /// Uploader or owner only
    async fn encryption_key(
        &self,
        from: &Address,
        id: &ProvenanceId,
    ) -> Result<String, LedgerError>;
}
