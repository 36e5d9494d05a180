use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use common::access::{AccessGate, AccessPolicy, MembershipDirectory, RequesterContext};
use common::blob::{BlobLocator, BlobStore};
use common::crypto::AlgorithmTag;
use common::ledger::{Ledger, ProvenanceRecord};
use common::types::{Address, FileId, Priority, ProvenanceId, TxReference};

use crate::database::{Database, EscrowStatus};
use crate::error::VaultError;
use crate::ingest::{ConfirmationPolicy, UploadPipeline, UploadReceipt, UploadRequest};
use crate::reconcile::{ReconcileReport, Reconciler};
use crate::recovery::RecoveryCoordinator;
use crate::retry::RetryPolicy;

/// Tunables shared by the vault's components
#[derive(Debug, Clone, Copy)]
pub struct VaultOptions {
    pub access_policy: AccessPolicy,
    pub retry: RetryPolicy,
    pub confirmation: ConfirmationPolicy,
    /// Pending rows older than this are orphaned by reconciliation
    pub reconcile_stale_after: Duration,
}

impl Default for VaultOptions {
    fn default() -> Self {
        Self {
            access_policy: AccessPolicy::default(),
            retry: RetryPolicy::default(),
            confirmation: ConfirmationPolicy::default(),
            reconcile_stale_after: Duration::from_secs(15 * 60),
        }
    }
}

/// What escrow knows about a file, without the key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowView {
    pub file_id: FileId,
    pub file_name: String,
    pub owner_uploader: Address,
    pub priority: Priority,
    pub blob_locator: BlobLocator,
    /// `None` if the registration was never submitted
    pub tx_reference: Option<TxReference>,
    /// Standard base64
    pub nonce: String,
    pub algorithm: AlgorithmTag,
    pub status: EscrowStatus,
    pub provenance_id: Option<ProvenanceId>,
}

/// The vault: upload, recovery, archival and reconciliation over one
///  escrow database, blob store and ledger
#[derive(Debug, Clone)]
pub struct Vault {
    db: Database,
    ledger: Arc<dyn Ledger>,
    directory: Arc<dyn MembershipDirectory>,
    retry: RetryPolicy,
    uploads: UploadPipeline,
    recovery: RecoveryCoordinator,
    reconciler: Reconciler,
}

impl Vault {
    pub fn new(
        db: Database,
        blobs: Arc<dyn BlobStore>,
        ledger: Arc<dyn Ledger>,
        directory: Arc<dyn MembershipDirectory>,
        options: VaultOptions,
    ) -> Self {
        let uploads = UploadPipeline::new(
            db.clone(),
            blobs.clone(),
            ledger.clone(),
            options.retry,
            options.confirmation,
        );
        let recovery = RecoveryCoordinator::new(
            db.clone(),
            blobs,
            ledger.clone(),
            AccessGate::new(options.access_policy),
            options.retry,
        );
        let reconciler = Reconciler::new(
            db.clone(),
            ledger.clone(),
            options.retry,
            options.reconcile_stale_after,
        );

        Self {
            db,
            ledger,
            directory,
            retry: options.retry,
            uploads,
            recovery,
            reconciler,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn ledger(&self) -> &Arc<dyn Ledger> {
        &self.ledger
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Look up who `identity` is in the membership directory
    pub async fn requester(&self, identity: Address) -> Result<RequesterContext, VaultError> {
        Ok(RequesterContext::resolve(identity, self.directory.as_ref()).await?)
    }

    pub async fn upload(&self, request: UploadRequest) -> Result<UploadReceipt, VaultError> {
        self.uploads.upload(request).await
    }

    pub async fn recover(&self, file_id: &FileId, requester: Address) -> Result<Bytes, VaultError> {
        let requester = self.requester(requester).await?;
        self.recovery.recover_and_decrypt(file_id, &requester).await
    }

    /// Archive a file's provenance record on the ledger
    ///
    /// The ledger decides who may archive (the original uploader or the
    ///  owner). The file stays recoverable; archiving only stops the uploader
    ///  from registering the same name again.
    pub async fn archive(&self, file_id: &FileId, from: Address) -> Result<TxReference, VaultError> {
        let escrow = self.db.get_escrow(file_id).await?;
        let provenance_id = match (escrow.status, escrow.provenance_id) {
            (EscrowStatus::Active | EscrowStatus::Revoked, Some(id)) => id,
            (status, _) => {
                return Err(VaultError::EscrowNotFound {
                    file_id: *file_id,
                    status: Some(status),
                })
            }
        };

        let tx = self
            .ledger
            .archive_file(&from, &provenance_id)
            .await
            .map_err(|e| VaultError::from_ledger(e, 1))?;
        tracing::info!(%file_id, %provenance_id, %tx, "provenance record archived");
        Ok(tx)
    }

    /// Withdraw a file from recovery. Leaves the ledger untouched.
    pub async fn revoke(&self, file_id: &FileId) -> Result<bool, VaultError> {
        let changed = self.db.mark_revoked(file_id).await?;
        if changed {
            tracing::info!(%file_id, "escrow revoked");
        }
        Ok(changed)
    }

    pub async fn reconcile(&self) -> Result<ReconcileReport, VaultError> {
        self.reconciler.run_once().await
    }

    pub async fn escrow_view(&self, file_id: &FileId) -> Result<EscrowView, VaultError> {
        let file = self.db.get_file(file_id).await?;
        let escrow = self.db.get_escrow(file_id).await?;
        Ok(EscrowView {
            file_id: file.file_id,
            file_name: file.file_name,
            owner_uploader: file.owner_uploader,
            priority: file.priority,
            blob_locator: escrow.blob_locator,
            tx_reference: escrow.ledger_tx,
            nonce: escrow.nonce.encode(),
            algorithm: escrow.algorithm,
            status: escrow.status,
            provenance_id: escrow.provenance_id,
        })
    }

    /// The ledger's record for a confirmed file
    pub async fn provenance(&self, file_id: &FileId) -> Result<ProvenanceRecord, VaultError> {
        let escrow = self.db.get_escrow(file_id).await?;
        let Some(provenance_id) = escrow.provenance_id else {
            return Err(VaultError::EscrowNotFound {
                file_id: *file_id,
                status: Some(escrow.status),
            });
        };

        self.retry
            .run("file_metadata", || self.ledger.file_metadata(&provenance_id))
            .await
            .map_err(|e| VaultError::from_ledger(e.error, e.attempts))
    }

    pub async fn is_uploader(&self, identity: &Address) -> Result<bool, VaultError> {
        self.retry
            .run("is_uploader", || self.ledger.is_uploader(identity))
            .await
            .map_err(|e| VaultError::from_ledger(e.error, e.attempts))
    }

    /// Owner only
    pub async fn add_uploader(
        &self,
        from: Address,
        uploader: Address,
    ) -> Result<TxReference, VaultError> {
        self.ledger
            .add_uploader(&from, &uploader)
            .await
            .map_err(|e| VaultError::from_ledger(e, 1))
    }

    /// Owner only
    pub async fn remove_uploader(
        &self,
        from: Address,
        uploader: Address,
    ) -> Result<TxReference, VaultError> {
        self.ledger
            .remove_uploader(&from, &uploader)
            .await
            .map_err(|e| VaultError::from_ledger(e, 1))
    }
}
