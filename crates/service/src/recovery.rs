//! Recovery: resolve a file's escrow, re-derive its key from the ledger,
//!  verify the two agree, and only then decrypt.
//!
//! There is exactly one path to plaintext and it runs through the
//!  verification gate. A key the ledger does not vouch for is never used,
//!  and nothing is fetched from the blob store until the key has been
//!  verified.
//!
//! The ledger vouches for a key only if the escrowed transaction is a
//!  successful `registerFile` call on the registry, its receipt names the
//!  escrowed record id, and that record (written by the same sender) holds
//!  the same key as both the call payload and escrow.

use std::sync::Arc;

use bytes::Bytes;

use common::access::{AccessGate, RequesterContext};
use common::blob::BlobStore;
use common::crypto::{self, Key, Sealed};
use common::ledger::{decode_register_file_call, Ledger, LedgerError};
use common::types::FileId;

use crate::database::{Database, EscrowRecord, EscrowStatus, FileRecord};
use crate::error::VaultError;
use crate::reconcile::{settle_pending, Resolution};
use crate::retry::RetryPolicy;

#[derive(Debug, Clone)]
pub struct RecoveryCoordinator {
    db: Database,
    blobs: Arc<dyn BlobStore>,
    ledger: Arc<dyn Ledger>,
    gate: AccessGate,
    retry: RetryPolicy,
}

impl RecoveryCoordinator {
    pub fn new(
        db: Database,
        blobs: Arc<dyn BlobStore>,
        ledger: Arc<dyn Ledger>,
        gate: AccessGate,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            db,
            blobs,
            ledger,
            gate,
            retry,
        }
    }

    /// Recover the plaintext of `file_id` on behalf of `requester`
    ///
    /// Read-only apart from settling a pending escrow row, and safe to call
    ///  concurrently: every successful call returns the same bytes.
    ///
    /// # Errors
    ///
    /// * `AccessDenied` - the requester's ceiling is below the file's priority
    /// * `EscrowNotFound` - no escrow, or escrow that is revoked or still unconfirmed
    /// * `EscrowOrphaned` - the registration never confirmed
    /// * `LedgerUnavailable` - the ledger did not answer within the retry budget
    /// * `DecodeMismatch` - the ledger's record of the key does not match escrow
    /// * `DecryptionIntegrityFailure` - the stored ciphertext was altered
    #[tracing::instrument(skip(self, requester), fields(requester = %requester.identity))]
    pub async fn recover_and_decrypt(
        &self,
        file_id: &FileId,
        requester: &RequesterContext,
    ) -> Result<Bytes, VaultError> {
        let file = self.db.get_file(file_id).await?;

        if let Err(denied) = self.gate.check(requester, file.priority) {
            tracing::info!(priority = %file.priority, "recovery denied: {}", denied);
            return Err(denied.into());
        }

        let escrow = self.active_escrow(file_id).await?;
        let key = self.verify(&file, &escrow).await?;

        let blob = self.blobs.get(&escrow.blob_locator).await?;
        let plaintext = Sealed::from_blob(&blob)
            .and_then(|sealed| crypto::decrypt(&sealed.ciphertext, &sealed.tag, &key, &escrow.nonce))
            .map_err(|_| {
                tracing::error!(
                    %file_id,
                    locator = %escrow.blob_locator,
                    "ciphertext failed authentication, stored blob was tampered with"
                );
                VaultError::DecryptionIntegrityFailure(*file_id)
            })?;

        tracing::debug!(size = plaintext.len(), "file recovered");
        Ok(Bytes::from(plaintext))
    }

    /// The escrow row, if it may be recovered from. A pending row gets one
    ///  look at the ledger before giving up.
    async fn active_escrow(&self, file_id: &FileId) -> Result<EscrowRecord, VaultError> {
        let escrow = self.db.get_escrow(file_id).await?;
        let status = match escrow.status {
            EscrowStatus::Active => return Ok(escrow),
            EscrowStatus::Pending => {
                match settle_pending(&self.db, self.ledger.as_ref(), &self.retry, &escrow).await? {
                    Resolution::Active(_) => return Ok(self.db.get_escrow(file_id).await?),
                    Resolution::Orphaned => EscrowStatus::Orphaned,
                    Resolution::Pending => EscrowStatus::Pending,
                    Resolution::Revoked => EscrowStatus::Revoked,
                }
            }
            other => other,
        };

        match status {
            EscrowStatus::Orphaned => Err(VaultError::EscrowOrphaned(*file_id)),
            status => Err(VaultError::EscrowNotFound {
                file_id: *file_id,
                status: Some(status),
            }),
        }
    }

    /// Prove the escrowed transaction anchored this file's record, then
    ///  check the key it carries against escrow
    async fn verify(&self, file: &FileRecord, escrow: &EscrowRecord) -> Result<Key, VaultError> {
        let file_id = &file.file_id;
        let (Some(ledger_tx), Some(provenance_id)) = (escrow.ledger_tx, escrow.provenance_id)
        else {
            return Err(self.mismatch(
                file_id,
                "active escrow carries no confirmed anchor".to_string(),
            ));
        };

        let receipt = self
            .retry
            .run("receipt", || self.ledger.receipt(&ledger_tx))
            .await
            .map_err(|e| VaultError::from_ledger(e.error, e.attempts))?
            .ok_or_else(|| {
                self.mismatch(
                    file_id,
                    format!("anchoring transaction {} has no receipt", ledger_tx),
                )
            })?;
        if !receipt.is_success() {
            return Err(self.mismatch(
                file_id,
                format!("anchoring transaction {} reverted", ledger_tx),
            ));
        }
        if receipt.registered_id() != Some(provenance_id) {
            return Err(self.mismatch(
                file_id,
                format!(
                    "anchoring transaction {} did not register record {}",
                    ledger_tx, provenance_id
                ),
            ));
        }

        let transaction = self
            .retry
            .run("transaction", || self.ledger.transaction(&ledger_tx))
            .await
            .map_err(|e| VaultError::from_ledger(e.error, e.attempts))?
            .ok_or_else(|| {
                self.mismatch(
                    file_id,
                    format!("anchoring transaction {} is unknown to the ledger", ledger_tx),
                )
            })?;
        let registry = self.ledger.registry_address();
        if transaction.to != Some(registry) {
            return Err(self.mismatch(
                file_id,
                format!("anchoring transaction was not sent to the registry at {}", registry),
            ));
        }

        let record = self
            .retry
            .run("file_metadata", || self.ledger.file_metadata(&provenance_id))
            .await
            .map_err(|e| match e.error {
                LedgerError::NotFound(id) => {
                    self.mismatch(file_id, format!("provenance record {} does not exist", id))
                }
                other => VaultError::from_ledger(other, e.attempts),
            })?;
        if record.uploader != transaction.from {
            return Err(self.mismatch(
                file_id,
                format!(
                    "provenance record {} was written by {}, not the transaction sender {}",
                    provenance_id, record.uploader, transaction.from
                ),
            ));
        }

        let call = decode_register_file_call(&transaction.input).map_err(|e| {
            self.mismatch(
                file_id,
                format!("anchoring transaction is not a registration: {}", e),
            )
        })?;

        if call.file_name != file.file_name {
            tracing::warn!(
                %file_id,
                ledger_name = %call.file_name,
                escrow_name = %file.file_name,
                "file name on the ledger differs from the file record"
            );
        }
        if transaction.from != file.owner_uploader {
            tracing::warn!(
                %file_id,
                ledger_sender = %transaction.from,
                owner = %file.owner_uploader,
                "registration was sent by someone other than the recorded owner"
            );
        }

        let ledger_key = Key::unwrap(&call.encryption_key)
            .map_err(|e| self.mismatch(file_id, format!("ledger key is unreadable: {}", e)))?;
        let record_key = Key::unwrap(&record.encryption_key).map_err(|e| {
            self.mismatch(file_id, format!("provenance record key is unreadable: {}", e))
        })?;
        let escrow_key = escrow
            .wrapped_key
            .unwrap_key()
            .map_err(|e| self.mismatch(file_id, format!("escrow key is unreadable: {}", e)))?;

        if record_key != ledger_key {
            return Err(self.mismatch(
                file_id,
                "provenance record key differs from the registration payload".to_string(),
            ));
        }
        if ledger_key != escrow_key {
            return Err(self.mismatch(
                file_id,
                "escrow key does not match the key registered on the ledger".to_string(),
            ));
        }

        Ok(escrow_key)
    }

    fn mismatch(&self, file_id: &FileId, reason: String) -> VaultError {
        tracing::error!(%file_id, "verification failed, refusing to decrypt: {}", reason);
        VaultError::DecodeMismatch {
            file_id: *file_id,
            reason,
        }
    }
}
