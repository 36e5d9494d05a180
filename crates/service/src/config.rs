use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use anchor_object_store::ObjectStoreConfig;
use common::access::AccessPolicy;
use common::ledger::RpcLedgerConfig;
use common::types::{Address, Priority, Role};

use crate::ingest::ConfirmationPolicy;
use crate::retry::RetryPolicy;

/// Which ledger the vault anchors to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerBackend {
    /// An in-process ledger; its records last as long as the process
    Memory {
        owner: Address,
        /// Whitelisted by the owner at startup
        #[serde(default)]
        uploaders: Vec<Address>,
    },
    /// A registry contract on a JSON-RPC node
    Rpc(RpcLedgerConfig),
}

impl Default for LedgerBackend {
    fn default() -> Self {
        LedgerBackend::Memory {
            owner: Address::default(),
            uploaders: Vec::new(),
        }
    }
}

/// One row of the membership table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberEntry {
    pub identity: Address,
    pub role: Role,
    pub priority_ceiling: Priority,
}

#[derive(Debug, Clone)]
pub struct Config {
    // data store configuration
    /// a path to a sqlite database, if not set then an
    ///  in-memory database will be used
    pub sqlite_path: Option<PathBuf>,
    /// where ciphertext blobs go
    pub blob_store: ObjectStoreConfig,

    // ledger configuration
    pub ledger: LedgerBackend,
    pub retry: RetryPolicy,
    pub confirmation: ConfirmationPolicy,
    /// pending escrow older than this is orphaned by reconciliation
    pub reconcile_stale_after: Duration,
    /// how often the background reconciler runs,
    ///  if not set then it only runs on demand
    pub reconcile_interval: Option<Duration>,

    // access control
    pub members: Vec<MemberEntry>,
    pub access_policy: AccessPolicy,

    // http server configuration
    /// address for the API server to listen on.
    ///  if not set then 0.0.0.0:5080 will be used
    pub api_listen_addr: Option<SocketAddr>,

    // misc
    pub log_level: tracing::Level,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sqlite_path: None,
            blob_store: ObjectStoreConfig::Memory,
            ledger: LedgerBackend::default(),
            retry: RetryPolicy::default(),
            confirmation: ConfirmationPolicy::default(),
            reconcile_stale_after: Duration::from_secs(15 * 60),
            reconcile_interval: Some(Duration::from_secs(60)),
            members: Vec::new(),
            access_policy: AccessPolicy::default(),
            api_listen_addr: Some(SocketAddr::new(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)), 5080)),
            log_level: tracing::Level::INFO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_backend_is_tagged() {
        let memory: LedgerBackend = serde_json::from_str(
            r#"{"type":"memory","owner":"0x0000000000000000000000000000000000000001"}"#,
        )
        .unwrap();
        assert!(matches!(memory, LedgerBackend::Memory { ref uploaders, .. } if uploaders.is_empty()));

        let rpc: LedgerBackend = serde_json::from_str(
            r#"{"type":"rpc","url":"http://127.0.0.1:8545","contract":"0x00000000000000000000000000000000000000aa"}"#,
        )
        .unwrap();
        let LedgerBackend::Rpc(config) = rpc else {
            panic!("expected rpc backend");
        };
        assert_eq!(config.url.as_str(), "http://127.0.0.1:8545/");
        assert_eq!(config.gas, 3_000_000);
    }

    #[test]
    fn test_member_entry() {
        let entry: MemberEntry = serde_json::from_str(
            r#"{"identity":"0x0000000000000000000000000000000000000002","role":"admin","priority_ceiling":2}"#,
        )
        .unwrap();
        assert_eq!(entry.role, Role::Admin);
        assert_eq!(entry.priority_ceiling, Priority::Admin);
    }
}
