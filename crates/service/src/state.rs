use std::sync::Arc;

use url::Url;

use anchor_object_store::ObjectBlobStore;
use common::access::{Membership, StaticDirectory};
use common::blob::BlobStore;
use common::ledger::{Ledger, MemoryLedger, RpcLedger};

use super::config::{Config, LedgerBackend};
use super::database::{Database, DatabaseSetupError};
use super::vault::{Vault, VaultOptions};

/// Main service state - owns the vault and everything it is built on
#[derive(Clone, Debug)]
pub struct State {
    vault: Vault,
}

impl State {
    pub async fn from_config(config: &Config) -> Result<Self, StateSetupError> {
        // 1. Setup database
        let sqlite_database_url = match config.sqlite_path {
            Some(ref path) => {
                // check that the directory holding the database exists
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() && !parent.exists() {
                        return Err(StateSetupError::DatabasePathDoesNotExist);
                    }
                }
                Url::parse(&format!("sqlite://{}", path.display()))
                    .map_err(|_| StateSetupError::InvalidDatabaseUrl)
            }
            // otherwise just set up an in-memory database
            None => Url::parse("sqlite::memory:").map_err(|_| StateSetupError::InvalidDatabaseUrl),
        }?;
        tracing::info!("Database URL: {:?}", sqlite_database_url);
        let database = Database::connect(&sqlite_database_url).await?;

        // 2. Setup blob store
        tracing::debug!("ServiceState::from_config - loading blob store");
        let blobs: Arc<dyn BlobStore> = Arc::new(
            ObjectBlobStore::new(config.blob_store.clone())
                .await
                .map_err(|e| StateSetupError::BlobStoreError(e.to_string()))?,
        );

        // 3. Setup ledger
        let ledger = Self::ledger(&config.ledger).await?;

        // 4. Membership directory
        let directory: StaticDirectory = config
            .members
            .iter()
            .map(|m| (m.identity, Membership::new(m.role, m.priority_ceiling)))
            .collect();
        tracing::info!(members = directory.len(), "membership directory loaded");

        let options = VaultOptions {
            access_policy: config.access_policy,
            retry: config.retry,
            confirmation: config.confirmation,
            reconcile_stale_after: config.reconcile_stale_after,
        };
        let vault = Vault::new(database, blobs, ledger, Arc::new(directory), options);

        Ok(Self { vault })
    }

    async fn ledger(backend: &LedgerBackend) -> Result<Arc<dyn Ledger>, StateSetupError> {
        match backend {
            LedgerBackend::Memory { owner, uploaders } => {
                let ledger = MemoryLedger::new(*owner);
                for uploader in uploaders {
                    ledger
                        .add_uploader(owner, uploader)
                        .await
                        .map_err(|e| StateSetupError::LedgerError(e.to_string()))?;
                }
                tracing::warn!(
                    %owner,
                    "using an in-memory ledger, provenance records will not outlive this process"
                );
                Ok(Arc::new(ledger))
            }
            LedgerBackend::Rpc(config) => {
                let ledger = RpcLedger::new(config.clone())
                    .map_err(|e| StateSetupError::LedgerError(e.to_string()))?;
                tracing::info!(url = %config.url, contract = %config.contract, "using JSON-RPC ledger");
                Ok(Arc::new(ledger))
            }
        }
    }

    pub fn vault(&self) -> &Vault {
        &self.vault
    }

    pub fn database(&self) -> &Database {
        self.vault.database()
    }
}

impl AsRef<Vault> for State {
    fn as_ref(&self) -> &Vault {
        &self.vault
    }
}

impl AsRef<Database> for State {
    fn as_ref(&self) -> &Database {
        self.database()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateSetupError {
    #[error("Database path does not exist")]
    DatabasePathDoesNotExist,
    #[error("Database setup error")]
    DatabaseSetupError(#[from] DatabaseSetupError),
    #[error("Invalid database URL")]
    InvalidDatabaseUrl,
    #[error("Blob store error: {0}")]
    BlobStoreError(String),
    #[error("Ledger error: {0}")]
    LedgerError(String),
}

#[cfg(test)]
mod tests {
    use common::types::{Address, Priority, Role};

    use super::*;
    use crate::config::MemberEntry;

    #[tokio::test]
    async fn test_from_default_config() {
        let owner = Address::from_bytes([1; 20]);
        let uploader = Address::from_bytes([2; 20]);
        let config = Config {
            ledger: LedgerBackend::Memory {
                owner,
                uploaders: vec![uploader],
            },
            members: vec![MemberEntry {
                identity: uploader,
                role: Role::User,
                priority_ceiling: Priority::User,
            }],
            ..Default::default()
        };

        let state = State::from_config(&config).await.unwrap();
        assert!(state.vault().is_uploader(&uploader).await.unwrap());
        let requester = state.vault().requester(uploader).await.unwrap();
        assert_eq!(requester.membership.map(|m| m.role), Some(Role::User));
    }

    #[tokio::test]
    async fn test_sqlite_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            sqlite_path: Some(dir.path().join("db.sqlite")),
            ..Default::default()
        };
        State::from_config(&config).await.unwrap();
        assert!(dir.path().join("db.sqlite").exists());
    }

    #[tokio::test]
    async fn test_missing_database_directory() {
        let config = Config {
            sqlite_path: Some("/definitely/not/here/db.sqlite".into()),
            ..Default::default()
        };
        assert!(matches!(
            State::from_config(&config).await,
            Err(StateSetupError::DatabasePathDoesNotExist)
        ));
    }
}
