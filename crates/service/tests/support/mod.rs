#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use uuid::Uuid;

use common::access::StaticDirectory;
use common::blob::{BlobError, BlobLocator, BlobStore};
use common::ledger::{
    Ledger, LedgerError, LedgerTransaction, MemoryLedger, ProvenanceRecord, Receipt,
    UploaderProfile,
};
use common::types::{Address, Priority, ProvenanceId, Role, TxReference};
use service::{ConfirmationPolicy, Database, RetryPolicy, Vault, VaultOptions};

pub fn account(n: u8) -> Address {
    let mut bytes = [0u8; 20];
    bytes[19] = n;
    Address::from_bytes(bytes)
}

pub const OWNER: u8 = 1;
pub const UPLOADER: u8 = 2;
pub const SECOND_UPLOADER: u8 = 3;
pub const USER: u8 = 10;
pub const ADMIN: u8 = 11;
pub const SUPERADMIN: u8 = 12;
pub const OUTSIDER: u8 = 99;

/// In-memory blob store that counts reads and lets tests corrupt blobs
#[derive(Debug, Default)]
pub struct CountingBlobStore {
    blobs: Mutex<HashMap<String, Bytes>>,
    puts: AtomicUsize,
    gets: AtomicUsize,
}

impl CountingBlobStore {
    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().unwrap().len()
    }

    /// Flip one bit of a stored blob
    pub fn tamper(&self, locator: &BlobLocator, index: usize) {
        let mut blobs = self.blobs.lock().unwrap();
        let blob = blobs.get_mut(locator.as_str()).unwrap();
        let mut bytes = blob.to_vec();
        bytes[index] ^= 0x01;
        *blob = Bytes::from(bytes);
    }
}

#[async_trait]
impl BlobStore for CountingBlobStore {
    async fn put(&self, data: Bytes) -> Result<BlobLocator, BlobError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        let locator = format!("mem/{}", Uuid::new_v4());
        self.blobs.lock().unwrap().insert(locator.clone(), data);
        Ok(BlobLocator::new(locator))
    }

    async fn get(&self, locator: &BlobLocator) -> Result<Bytes, BlobError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.blobs
            .lock()
            .unwrap()
            .get(locator.as_str())
            .cloned()
            .ok_or_else(|| BlobError::NotFound(locator.clone()))
    }
}

/// A memory ledger whose answers can be bent: registrations that land but
///  report the node unreachable, and transactions that appear addressed to
///  some other contract
#[derive(Debug)]
pub struct ScriptedLedger {
    inner: MemoryLedger,
    lose_registration_responses: AtomicBool,
    destination: Mutex<Option<Address>>,
}

impl ScriptedLedger {
    pub fn new(inner: MemoryLedger) -> Self {
        Self {
            inner,
            lose_registration_responses: AtomicBool::new(false),
            destination: Mutex::new(None),
        }
    }

    pub fn lose_registration_responses(&self, lose: bool) {
        self.lose_registration_responses.store(lose, Ordering::SeqCst);
    }

    /// Report every transaction as sent to `to`
    pub fn redirect_transactions(&self, to: Option<Address>) {
        *self.destination.lock().unwrap() = to;
    }
}

#[async_trait]
impl Ledger for ScriptedLedger {
    fn registry_address(&self) -> Address {
        self.inner.registry_address()
    }

    async fn owner(&self) -> Result<Address, LedgerError> {
        self.inner.owner().await
    }

    async fn total_files(&self) -> Result<u64, LedgerError> {
        self.inner.total_files().await
    }

    async fn is_uploader(&self, identity: &Address) -> Result<bool, LedgerError> {
        self.inner.is_uploader(identity).await
    }

    async fn user_profile(&self, identity: &Address) -> Result<UploaderProfile, LedgerError> {
        self.inner.user_profile(identity).await
    }

    async fn add_uploader(
        &self,
        from: &Address,
        uploader: &Address,
    ) -> Result<TxReference, LedgerError> {
        self.inner.add_uploader(from, uploader).await
    }

    async fn remove_uploader(
        &self,
        from: &Address,
        uploader: &Address,
    ) -> Result<TxReference, LedgerError> {
        self.inner.remove_uploader(from, uploader).await
    }

    async fn transfer_ownership(
        &self,
        from: &Address,
        new_owner: &Address,
    ) -> Result<TxReference, LedgerError> {
        self.inner.transfer_ownership(from, new_owner).await
    }

    async fn register_file(
        &self,
        from: &Address,
        file_name: &str,
        encryption_key: &str,
    ) -> Result<TxReference, LedgerError> {
        let tx = self.inner.register_file(from, file_name, encryption_key).await?;
        if self.lose_registration_responses.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable(format!("response to {} lost", tx)));
        }
        Ok(tx)
    }

    async fn archive_file(
        &self,
        from: &Address,
        id: &ProvenanceId,
    ) -> Result<TxReference, LedgerError> {
        self.inner.archive_file(from, id).await
    }

    async fn receipt(&self, tx: &TxReference) -> Result<Option<Receipt>, LedgerError> {
        self.inner.receipt(tx).await
    }

    async fn transaction(
        &self,
        tx: &TxReference,
    ) -> Result<Option<LedgerTransaction>, LedgerError> {
        let destination = *self.destination.lock().unwrap();
        let transaction = self.inner.transaction(tx).await?;
        Ok(match destination {
            Some(to) => transaction.map(|t| LedgerTransaction { to: Some(to), ..t }),
            None => transaction,
        })
    }

    async fn file_metadata(&self, id: &ProvenanceId) -> Result<ProvenanceRecord, LedgerError> {
        self.inner.file_metadata(id).await
    }

    async fn user_files(&self, identity: &Address) -> Result<Vec<ProvenanceId>, LedgerError> {
        self.inner.user_files(identity).await
    }

    async fn encryption_key(
        &self,
        from: &Address,
        id: &ProvenanceId,
    ) -> Result<String, LedgerError> {
        self.inner.encryption_key(from, id).await
    }
}

pub struct Harness {
    pub vault: Vault,
    pub ledger: MemoryLedger,
    pub blobs: Arc<CountingBlobStore>,
}

impl Harness {
    pub fn db(&self) -> &Database {
        self.vault.database()
    }

    pub fn ledger_arc(&self) -> Arc<dyn Ledger> {
        Arc::new(self.ledger.clone())
    }
}

/// Options with short waits, so tests never sit in a backoff
pub fn fast_options() -> VaultOptions {
    VaultOptions {
        retry: RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(5)),
        confirmation: ConfirmationPolicy {
            timeout: Duration::from_millis(50),
            poll_interval: Duration::from_millis(5),
        },
        reconcile_stale_after: Duration::from_secs(3600),
        ..Default::default()
    }
}

pub async fn setup() -> Harness {
    setup_with(fast_options()).await
}

pub async fn setup_with(options: VaultOptions) -> Harness {
    let ledger = whitelisted_ledger().await;
    build(ledger.clone(), Arc::new(ledger), options).await
}

/// A harness whose vault talks to the ledger through a [`ScriptedLedger`]
pub async fn setup_scripted() -> (Harness, Arc<ScriptedLedger>) {
    let ledger = whitelisted_ledger().await;
    let scripted = Arc::new(ScriptedLedger::new(ledger.clone()));
    let harness = build(ledger, scripted.clone(), fast_options()).await;
    (harness, scripted)
}

async fn whitelisted_ledger() -> MemoryLedger {
    let ledger = MemoryLedger::new(account(OWNER));
    for uploader in [UPLOADER, SECOND_UPLOADER] {
        ledger
            .add_uploader(&account(OWNER), &account(uploader))
            .await
            .unwrap();
    }
    ledger
}

async fn build(ledger: MemoryLedger, vault_ledger: Arc<dyn Ledger>, options: VaultOptions) -> Harness {
    let directory = StaticDirectory::new()
        .with(account(UPLOADER), Role::User, Priority::User)
        .with(account(USER), Role::User, Priority::User)
        .with(account(ADMIN), Role::Admin, Priority::Admin)
        .with(account(SUPERADMIN), Role::SuperAdmin, Priority::SuperAdmin);

    let db = Database::in_memory().await.unwrap();
    let blobs = Arc::new(CountingBlobStore::default());
    let vault = Vault::new(db, blobs.clone(), vault_ledger, Arc::new(directory), options);

    Harness {
        vault,
        ledger,
        blobs,
    }
}

/// Deterministic, non-repeating document bytes
pub fn document(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}
