use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::contract::Call;
use super::registry::Registry;
use super::{
    Ledger, LedgerError, LedgerEvent, LedgerTransaction, ProvenanceRecord, Receipt,
    ReceiptStatus, UploaderProfile,
};
use crate::abi;
use crate::types::{Address, ProvenanceId, TxReference};

/// In-process ledger executing the registry over ABI-encoded payloads
///
/// By default every submitted transaction is mined into its own block
///  immediately. With auto-mining off, transactions wait in a pool until
///  [`MemoryLedger::mine`] is called, and are re-validated at that point:
///  a call that was valid on submission can still revert.
#[derive(Debug, Clone)]
pub struct MemoryLedger {
    /// Where the registry is deployed, derived from its owner
    registry_address: Address,
    inner: Arc<RwLock<MemoryLedgerInner>>,
    /// Calls left to fail with `Unavailable`
    failures: Arc<AtomicU32>,
}

#[derive(Debug)]
struct MemoryLedgerInner {
    registry: Registry,
    transactions: HashMap<TxReference, StoredTransaction>,
    /// Submitted but not yet mined, in submission order
    pool: Vec<TxReference>,
    height: u64,
    nonce: u64,
    auto_mine: bool,
    subscribers: Vec<flume::Sender<LedgerEvent>>,
}

#[derive(Debug, Clone)]
struct StoredTransaction {
    from: Address,
    input: Vec<u8>,
    receipt: Option<Receipt>,
}

fn now() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default()
}

impl MemoryLedger {
    /// A ledger with the registry deployed by `owner`
    pub fn new(owner: Address) -> Self {
        let mut preimage = owner.as_bytes().to_vec();
        preimage.extend_from_slice(b"registry");
        let digest = abi::keccak256(&preimage);
        let mut registry_address = [0u8; 20];
        registry_address.copy_from_slice(&digest[12..]);

        Self {
            registry_address: Address::from_bytes(registry_address),
            inner: Arc::new(RwLock::new(MemoryLedgerInner {
                registry: Registry::new(owner),
                transactions: HashMap::new(),
                pool: Vec::new(),
                height: 0,
                nonce: 0,
                auto_mine: true,
                subscribers: Vec::new(),
            })),
            failures: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Toggle whether submissions are mined immediately
    pub fn set_auto_mine(&self, auto_mine: bool) {
        self.inner.write().auto_mine = auto_mine;
    }

    /// Make the next `count` calls fail as if the node were unreachable
    pub fn fail_next(&self, count: u32) {
        self.failures.store(count, Ordering::SeqCst);
    }

    /// Number of submitted transactions waiting to be mined
    pub fn pending(&self) -> usize {
        self.inner.read().pool.len()
    }

    pub fn height(&self) -> u64 {
        self.inner.read().height
    }

    /// Receive every event emitted from now on
    pub fn subscribe(&self) -> flume::Receiver<LedgerEvent> {
        let (tx, rx) = flume::unbounded();
        self.inner.write().subscribers.push(tx);
        rx
    }

    /// Mine every pooled transaction into one block, in submission order
    pub fn mine(&self) -> Vec<Receipt> {
        let mut inner = self.inner.write();
        if inner.pool.is_empty() {
            return Vec::new();
        }
        inner.height += 1;
        let block = inner.height;
        let timestamp = now();

        let pool = std::mem::take(&mut inner.pool);
        let mut receipts = Vec::with_capacity(pool.len());
        for tx in pool {
            let Some(stored) = inner.transactions.get(&tx).cloned() else {
                continue;
            };
            let receipt = inner.execute(tx, &stored, block, timestamp);
            receipts.push(receipt);
        }
        receipts
    }

    fn check_available(&self) -> Result<(), LedgerError> {
        let outcome = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match outcome {
            Ok(_) => Err(LedgerError::Unavailable(
                "injected memory ledger failure".to_string(),
            )),
            Err(_) => Ok(()),
        }
    }

    fn submit(&self, from: &Address, call: Call) -> Result<TxReference, LedgerError> {
        self.check_available()?;
        let input = call.encode();
        if input.len() > abi::MAX_CALL_PAYLOAD {
            return Err(abi::AbiError::PayloadTooLarge {
                len: input.len(),
                max: abi::MAX_CALL_PAYLOAD,
            }
            .into());
        }

        let mut inner = self.inner.write();
        let timestamp = now();

        // reject calls that cannot succeed against the current state, the
        //  way a node refuses a transaction that fails gas estimation
        inner.registry.validate(from, &input)?;

        inner.nonce += 1;
        let mut preimage = from.as_bytes().to_vec();
        preimage.extend_from_slice(&inner.nonce.to_be_bytes());
        preimage.extend_from_slice(&input);
        let tx = TxReference::from_bytes(abi::keccak256(&preimage));

        let stored = StoredTransaction {
            from: *from,
            input,
            receipt: None,
        };
        inner.transactions.insert(tx, stored.clone());

        if inner.auto_mine {
            inner.height += 1;
            let block = inner.height;
            inner.execute(tx, &stored, block, timestamp);
        } else {
            inner.pool.push(tx);
        }

        tracing::debug!(%tx, %from, "memory ledger accepted transaction");
        Ok(tx)
    }
}

impl MemoryLedgerInner {
    fn execute(
        &mut self,
        tx: TxReference,
        stored: &StoredTransaction,
        block: u64,
        timestamp: u64,
    ) -> Receipt {
        let receipt = match self.registry.execute(&stored.from, &stored.input, timestamp) {
            Ok(events) => Receipt {
                tx,
                status: ReceiptStatus::Success,
                block,
                events,
            },
            Err(e) => {
                tracing::debug!(%tx, error = %e, "memory ledger transaction reverted");
                Receipt {
                    tx,
                    status: ReceiptStatus::Reverted,
                    block,
                    events: Vec::new(),
                }
            }
        };

        for event in &receipt.events {
            self.subscribers
                .retain(|subscriber| subscriber.send(event.clone()).is_ok());
        }
        if let Some(entry) = self.transactions.get_mut(&tx) {
            entry.receipt = Some(receipt.clone());
        }
        receipt
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    fn registry_address(&self) -> Address {
        self.registry_address
    }

    async fn owner(&self) -> Result<Address, LedgerError> {
        self.check_available()?;
        Ok(self.inner.read().registry.owner())
    }

    async fn total_files(&self) -> Result<u64, LedgerError> {
        self.check_available()?;
        Ok(self.inner.read().registry.total_files())
    }

    async fn is_uploader(&self, identity: &Address) -> Result<bool, LedgerError> {
        self.check_available()?;
        Ok(self.inner.read().registry.is_uploader(identity))
    }

    async fn user_profile(&self, identity: &Address) -> Result<UploaderProfile, LedgerError> {
        self.check_available()?;
        Ok(self.inner.read().registry.profile(identity))
    }

    async fn add_uploader(
        &self,
        from: &Address,
        uploader: &Address,
    ) -> Result<TxReference, LedgerError> {
        self.submit(from, Call::AddUploader(*uploader))
    }

    async fn remove_uploader(
        &self,
        from: &Address,
        uploader: &Address,
    ) -> Result<TxReference, LedgerError> {
        self.submit(from, Call::RemoveUploader(*uploader))
    }

    async fn transfer_ownership(
        &self,
        from: &Address,
        new_owner: &Address,
    ) -> Result<TxReference, LedgerError> {
        self.submit(from, Call::TransferOwnership(*new_owner))
    }

    async fn register_file(
        &self,
        from: &Address,
        file_name: &str,
        encryption_key: &str,
    ) -> Result<TxReference, LedgerError> {
        self.submit(
            from,
            Call::RegisterFile {
                file_name: file_name.to_string(),
                encryption_key: encryption_key.to_string(),
            },
        )
    }

    async fn archive_file(
        &self,
        from: &Address,
        id: &ProvenanceId,
    ) -> Result<TxReference, LedgerError> {
        self.submit(from, Call::ArchiveFile(*id))
    }

    async fn receipt(&self, tx: &TxReference) -> Result<Option<Receipt>, LedgerError> {
        self.check_available()?;
        Ok(self
            .inner
            .read()
            .transactions
            .get(tx)
            .and_then(|stored| stored.receipt.clone()))
    }

    async fn transaction(
        &self,
        tx: &TxReference,
    ) -> Result<Option<LedgerTransaction>, LedgerError> {
        self.check_available()?;
        Ok(self
            .inner
            .read()
            .transactions
            .get(tx)
            .map(|stored| LedgerTransaction {
                tx: *tx,
                from: stored.from,
                to: Some(self.registry_address),
                input: stored.input.clone(),
                block: stored.receipt.as_ref().map(|r| r.block),
            }))
    }

    async fn file_metadata(&self, id: &ProvenanceId) -> Result<ProvenanceRecord, LedgerError> {
        self.check_available()?;
        self.inner.read().registry.record(id).cloned()
    }

    async fn user_files(&self, identity: &Address) -> Result<Vec<ProvenanceId>, LedgerError> {
        self.check_available()?;
        Ok(self.inner.read().registry.user_files(identity))
    }

    async fn encryption_key(
        &self,
        from: &Address,
        id: &ProvenanceId,
    ) -> Result<String, LedgerError> {
        self.check_available()?;
        self.inner.read().registry.encryption_key(from, id)
    }
}
