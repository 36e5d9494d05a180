//! The upload pipeline
//!
//! encrypt -> store ciphertext -> escrow the key (pending) -> register on
//!  the ledger -> attach the transaction to the escrow row -> wait (bounded)
//!  for the registration to confirm.
//!
//! The key is escrowed before anything is submitted, so stored ciphertext
//!  always has a row pointing at it. A submission that fails leaves that
//!  row orphaned for manual reconciliation.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use common::blob::{BlobLocator, BlobStore};
use common::crypto::{self, AlgorithmTag, Key, Nonce};
use common::ledger::{Ledger, LedgerError};
use common::types::{Address, FileId, Priority, ProvenanceId, TxReference};

use crate::database::{Database, EscrowStatus, NewEscrow, WrappedKey};
use crate::error::VaultError;
use crate::reconcile::{settle_pending, Resolution};
use crate::retry::RetryPolicy;

/// Longest file name accepted, in bytes
pub const MAX_FILE_NAME_BYTES: usize = 255;

/// A document as handed to the vault
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub file_name: String,
    pub uploader: Address,
    pub priority: Priority,
    pub content: Bytes,
}

impl UploadRequest {
    pub fn new(
        file_name: impl Into<String>,
        uploader: Address,
        priority: Priority,
        content: impl Into<Bytes>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            uploader,
            priority,
            content: content.into(),
        }
    }
}

/// Reduce whatever the client sent as a name to a bare file name
///
/// Directory components (either separator) are dropped and surrounding
///  whitespace trimmed. Empty names, names with control characters and
///  names over [`MAX_FILE_NAME_BYTES`] are refused.
pub fn normalize_file_name(raw: &str) -> Result<String, VaultError> {
    let name = raw
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    if name.is_empty() || name == "." || name == ".." {
        return Err(VaultError::InvalidRequest(format!(
            "invalid file name {:?}",
            raw
        )));
    }
    if name.chars().any(char::is_control) {
        return Err(VaultError::InvalidRequest(
            "file name contains control characters".to_string(),
        ));
    }
    if name.len() > MAX_FILE_NAME_BYTES {
        return Err(VaultError::InvalidRequest(format!(
            "file name is {} bytes, the limit is {}",
            name.len(),
            MAX_FILE_NAME_BYTES
        )));
    }
    Ok(name.to_string())
}

/// How long an upload waits for its registration to confirm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationPolicy {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub file_id: FileId,
    pub file_name: String,
    pub blob_locator: BlobLocator,
    pub tx_reference: TxReference,
    /// Known once the registration confirmed
    pub provenance_id: Option<ProvenanceId>,
    /// `active` on confirmation, `pending` if the wait timed out, `orphaned`
    ///  if the registration reverted
    pub status: EscrowStatus,
}

#[derive(Debug, Clone)]
pub struct UploadPipeline {
    db: Database,
    blobs: Arc<dyn BlobStore>,
    ledger: Arc<dyn Ledger>,
    retry: RetryPolicy,
    confirmation: ConfirmationPolicy,
}

impl UploadPipeline {
    pub fn new(
        db: Database,
        blobs: Arc<dyn BlobStore>,
        ledger: Arc<dyn Ledger>,
        retry: RetryPolicy,
        confirmation: ConfirmationPolicy,
    ) -> Self {
        Self {
            db,
            blobs,
            ledger,
            retry,
            confirmation,
        }
    }

    #[tracing::instrument(skip(self, request), fields(uploader = %request.uploader, size = request.content.len()))]
    pub async fn upload(&self, request: UploadRequest) -> Result<UploadReceipt, VaultError> {
        let file_name = normalize_file_name(&request.file_name)?;
        let uploader = request.uploader;

        // refuse early rather than strand ciphertext nobody can anchor
        let whitelisted = self
            .retry
            .run("is_uploader", || self.ledger.is_uploader(&uploader))
            .await
            .map_err(|e| VaultError::from_ledger(e.error, e.attempts))?;
        if !whitelisted {
            tracing::info!("upload refused, uploader is not whitelisted");
            return Err(VaultError::LedgerUnauthorized(uploader));
        }

        let key = Key::generate().map_err(VaultError::EncryptionFailure)?;
        let nonce = Nonce::generate().map_err(VaultError::EncryptionFailure)?;
        let sealed =
            crypto::encrypt(&request.content, &key, &nonce).map_err(VaultError::EncryptionFailure)?;

        let blob_locator = self.blobs.put(Bytes::from(sealed.to_blob())).await?;

        let file_id = FileId::generate();
        let escrow = NewEscrow {
            file_id,
            file_name: file_name.clone(),
            owner_uploader: uploader,
            priority: request.priority,
            wrapped_key: WrappedKey::from(&key),
            nonce,
            algorithm: AlgorithmTag::Aes256Gcm,
            blob_locator: blob_locator.clone(),
            ledger_tx: None,
        };
        if let Err(e) = self.db.put_escrow(&escrow).await {
            tracing::error!(
                %file_id,
                locator = %blob_locator,
                "ciphertext stored but its key could not be escrowed: {}",
                e
            );
            return Err(e.into());
        }

        // a submission is not idempotent, so it is never retried
        let ledger_tx = match self
            .ledger
            .register_file(&uploader, &file_name, escrow.wrapped_key.as_str())
            .await
        {
            Ok(tx) => tx,
            Err(e) => {
                self.orphan_unsubmitted(&file_id, &blob_locator, &e).await;
                return Err(VaultError::from_ledger(e, 1));
            }
        };

        if let Err(e) = self.db.set_ledger_tx(&file_id, &ledger_tx).await {
            tracing::error!(
                %file_id,
                tx = %ledger_tx,
                "registration submitted but could not be attached to its escrow: {}",
                e
            );
            return Err(e.into());
        }
        tracing::info!(%file_id, tx = %ledger_tx, "registration submitted, escrow pending");

        let (status, provenance_id) = self.await_confirmation(file_id, ledger_tx).await?;

        Ok(UploadReceipt {
            file_id,
            file_name,
            blob_locator,
            tx_reference: ledger_tx,
            provenance_id,
            status,
        })
    }

    /// Poll until the registration settles or the timeout passes. A row
    ///  that times out stays pending for the reconciler.
    async fn await_confirmation(
        &self,
        file_id: FileId,
        ledger_tx: TxReference,
    ) -> Result<(EscrowStatus, Option<ProvenanceId>), VaultError> {
        let deadline = tokio::time::Instant::now() + self.confirmation.timeout;
        let record = self.db.get_escrow(&file_id).await?;

        loop {
            let resolution =
                match settle_pending(&self.db, self.ledger.as_ref(), &self.retry, &record).await {
                    Ok(resolution) => resolution,
                    Err(e) if e.kind().is_retryable() => {
                        tracing::warn!(%file_id, "stopped waiting for confirmation: {}", e);
                        return Ok((EscrowStatus::Pending, None));
                    }
                    Err(e) => return Err(e),
                };

            match resolution {
                Resolution::Active(provenance_id) => {
                    tracing::info!(%file_id, %provenance_id, "registration confirmed");
                    return Ok((EscrowStatus::Active, Some(provenance_id)));
                }
                Resolution::Orphaned => {
                    tracing::warn!(
                        %file_id,
                        tx = %ledger_tx,
                        "registration reverted, escrow orphaned"
                    );
                    return Ok((EscrowStatus::Orphaned, None));
                }
                Resolution::Revoked => return Ok((EscrowStatus::Revoked, None)),
                Resolution::Pending => {}
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                tracing::warn!(
                    %file_id,
                    timeout = ?self.confirmation.timeout,
                    "registration not confirmed in time, escrow left pending"
                );
                return Ok((EscrowStatus::Pending, None));
            }
            tokio::time::sleep(self.confirmation.poll_interval.min(deadline - now)).await;
        }
    }

    /// The ledger never accepted the registration, or its answer was lost.
    ///  Either way nothing anchors this key, so the row is flagged.
    async fn orphan_unsubmitted(&self, file_id: &FileId, locator: &BlobLocator, cause: &LedgerError) {
        tracing::warn!(
            %file_id,
            %locator,
            "registration failed, escrow orphaned for manual reconciliation: {}",
            cause
        );
        if let Err(e) = self.db.mark_orphaned(file_id).await {
            tracing::error!(%file_id, "could not orphan unanchored escrow: {}", e);
        }
    }
}
