use std::{fs, path::PathBuf};

use serde::{Deserialize, Serialize};

use anchor_object_store::ObjectStoreConfig;
use service::{LedgerBackend, MemberEntry, RetryPolicy};

pub const APP_NAME: &str = "anchor";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DB_FILE_NAME: &str = "db.sqlite";
pub const BLOBS_DIR_NAME: &str = "blobs";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Port for the API server
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    /// Where ciphertext blobs are stored
    #[serde(default)]
    pub blob_store: ObjectStoreConfig,
    /// Which ledger provenance records are anchored to
    #[serde(default)]
    pub ledger: LedgerBackend,
    #[serde(default)]
    pub retry: RetryPolicy,
    /// How long an upload waits for its registration to confirm
    #[serde(default = "default_confirmation_timeout_secs")]
    pub confirmation_timeout_secs: u64,
    #[serde(default = "default_confirmation_poll_ms")]
    pub confirmation_poll_ms: u64,
    /// Pending escrow older than this is orphaned by reconciliation
    #[serde(default = "default_reconcile_stale_after_secs")]
    pub reconcile_stale_after_secs: u64,
    /// Background reconciliation period; 0 disables the background job
    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,
    #[serde(default)]
    pub members: Vec<MemberEntry>,
}

fn default_api_port() -> u16 {
    5080
}

fn default_confirmation_timeout_secs() -> u64 {
    30
}

fn default_confirmation_poll_ms() -> u64 {
    500
}

fn default_reconcile_stale_after_secs() -> u64 {
    15 * 60
}

fn default_reconcile_interval_secs() -> u64 {
    60
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            blob_store: ObjectStoreConfig::default(),
            ledger: LedgerBackend::default(),
            retry: RetryPolicy::default(),
            confirmation_timeout_secs: default_confirmation_timeout_secs(),
            confirmation_poll_ms: default_confirmation_poll_ms(),
            reconcile_stale_after_secs: default_reconcile_stale_after_secs(),
            reconcile_interval_secs: default_reconcile_interval_secs(),
            members: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the anchor directory (~/.anchor)
    pub anchor_dir: PathBuf,
    /// Path to the escrow database
    pub db_path: PathBuf,
    /// Path to the blobs directory (used by the `local` blob store)
    pub blobs_path: PathBuf,
    /// Path to the config file
    pub config_path: PathBuf,
    /// Loaded configuration
    pub config: AppConfig,
}

impl AppState {
    /// Get the anchor directory path (custom or default ~/.anchor)
    pub fn anchor_dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }

        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    /// Initialize a new anchor state directory
    pub fn init(
        custom_path: Option<PathBuf>,
        config: Option<AppConfig>,
    ) -> Result<Self, StateError> {
        let anchor_dir = Self::anchor_dir(custom_path)?;

        if anchor_dir.exists() {
            return Err(StateError::AlreadyInitialized);
        }

        fs::create_dir_all(&anchor_dir)?;

        let blobs_path = anchor_dir.join(BLOBS_DIR_NAME);
        fs::create_dir_all(&blobs_path)?;

        let config = config.unwrap_or_default();
        let config_path = anchor_dir.join(CONFIG_FILE_NAME);
        let config_toml = toml::to_string_pretty(&config)?;
        fs::write(&config_path, config_toml)?;

        // the service runs migrations against it on startup
        let db_path = anchor_dir.join(DB_FILE_NAME);
        fs::write(&db_path, "")?;

        Ok(Self {
            anchor_dir,
            db_path,
            blobs_path,
            config_path,
            config,
        })
    }

    /// Load existing state from the anchor directory
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let anchor_dir = Self::anchor_dir(custom_path)?;

        if !anchor_dir.exists() {
            return Err(StateError::NotInitialized);
        }

        let db_path = anchor_dir.join(DB_FILE_NAME);
        let blobs_path = anchor_dir.join(BLOBS_DIR_NAME);
        let config_path = anchor_dir.join(CONFIG_FILE_NAME);

        if !db_path.exists() {
            return Err(StateError::MissingFile(DB_FILE_NAME.to_string()));
        }
        if !config_path.exists() {
            return Err(StateError::MissingFile(CONFIG_FILE_NAME.to_string()));
        }

        let config_toml = fs::read_to_string(&config_path)?;
        let config: AppConfig = toml::from_str(&config_toml)?;

        Ok(Self {
            anchor_dir,
            db_path,
            blobs_path,
            config_path,
            config,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("anchor directory not initialized. Run 'anchor init' first")]
    NotInitialized,

    #[error("anchor directory already initialized")]
    AlreadyInitialized,

    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("missing required file: {0}")]
    MissingFile(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use common::types::{Address, Priority, Role};

    use super::*;

    #[test]
    fn test_init_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("anchor");

        let config = AppConfig {
            api_port: 6000,
            members: vec![MemberEntry {
                identity: Address::from_bytes([7; 20]),
                role: Role::Admin,
                priority_ceiling: Priority::Admin,
            }],
            ..Default::default()
        };
        let created = AppState::init(Some(path.clone()), Some(config.clone())).unwrap();
        assert!(created.db_path.exists());
        assert!(created.blobs_path.is_dir());

        let loaded = AppState::load(Some(path)).unwrap();
        assert_eq!(loaded.config, config);
    }

    #[test]
    fn test_init_twice_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("anchor");
        AppState::init(Some(path.clone()), None).unwrap();
        assert!(matches!(
            AppState::init(Some(path), None),
            Err(StateError::AlreadyInitialized)
        ));
    }

    #[test]
    fn test_load_uninitialized() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            AppState::load(Some(dir.path().join("missing"))),
            Err(StateError::NotInitialized)
        ));
    }

    #[test]
    fn test_sparse_config_uses_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            api_port = 7000

            [ledger]
            type = "rpc"
            url = "http://127.0.0.1:8545"
            contract = "0x00000000000000000000000000000000000000aa"

            [retry]
            attempts = 5
            initial_backoff_ms = 100
            max_backoff_ms = 1000

            [[members]]
            identity = "0x0000000000000000000000000000000000000002"
            role = "super_admin"
            priority_ceiling = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.api_port, 7000);
        assert_eq!(config.blob_store, ObjectStoreConfig::Memory);
        assert!(matches!(config.ledger, LedgerBackend::Rpc(_)));
        assert_eq!(config.retry.attempts, 5);
        assert_eq!(config.confirmation_timeout_secs, 30);
        assert_eq!(config.members[0].role, Role::SuperAdmin);
    }
}
