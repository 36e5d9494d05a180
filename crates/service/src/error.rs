//! The error every vault operation surfaces
//!
//! Each variant maps to exactly one [`ErrorKind`], so callers can tell
//!  "try again" apart from "this is a security problem" without matching
//!  on messages.

use common::access::{AccessDenied, DirectoryError};
use common::blob::BlobError;
use common::crypto::CryptoError;
use common::ledger::LedgerError;
use common::types::{Address, FileId};

use crate::database::{EscrowError, EscrowStatus};

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// Key/nonce generation or sealing failed
    #[error("encryption failed: {0}")]
    EncryptionFailure(CryptoError),

    #[error("{0} is not authorized on the ledger")]
    LedgerUnauthorized(Address),

    #[error("ledger unavailable after {attempts} attempt(s): {source}")]
    LedgerUnavailable {
        attempts: u32,
        #[source]
        source: LedgerError,
    },

    /// The ledger answered and refused the call
    #[error("ledger rejected the call: {0}")]
    LedgerRejected(LedgerError),

    /// The ledger's record of the key does not match escrow
    #[error("ledger record for file {file_id} does not verify: {reason}")]
    DecodeMismatch { file_id: FileId, reason: String },

    #[error("access denied: {0}")]
    AccessDenied(#[from] AccessDenied),

    #[error("{}", escrow_not_found_message(.file_id, .status))]
    EscrowNotFound {
        file_id: FileId,
        /// The status the row was found in, if there was a row at all
        status: Option<EscrowStatus>,
    },

    #[error("file {0} is orphaned: its ledger registration never confirmed, run reconciliation")]
    EscrowOrphaned(FileId),

    #[error("ciphertext for file {0} failed authentication")]
    DecryptionIntegrityFailure(FileId),

    #[error("escrow database error: {0}")]
    Database(EscrowError),

    #[error("blob store error: {0}")]
    BlobStore(#[from] BlobError),

    #[error("membership lookup failed: {0}")]
    Directory(#[from] DirectoryError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

fn escrow_not_found_message(file_id: &FileId, status: &Option<EscrowStatus>) -> String {
    match status {
        Some(status) => format!(
            "no active escrow for file {} (status {}), run reconciliation",
            file_id, status
        ),
        None => format!("no escrow for file {}", file_id),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    EncryptionFailure,
    LedgerUnauthorized,
    LedgerUnavailable,
    LedgerRejected,
    DecodeMismatch,
    AccessDenied,
    EscrowNotFound,
    EscrowOrphaned,
    DecryptionIntegrityFailure,
    Internal,
    InvalidRequest,
}

impl ErrorKind {
    /// Worth trying again later
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::LedgerUnavailable)
    }

    /// Evidence of tampering; never auto-resolved
    pub fn is_security_incident(&self) -> bool {
        matches!(
            self,
            ErrorKind::DecodeMismatch | ErrorKind::DecryptionIntegrityFailure
        )
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::EncryptionFailure => "encryption_failure",
            ErrorKind::LedgerUnauthorized => "ledger_unauthorized",
            ErrorKind::LedgerUnavailable => "ledger_unavailable",
            ErrorKind::LedgerRejected => "ledger_rejected",
            ErrorKind::DecodeMismatch => "decode_mismatch",
            ErrorKind::AccessDenied => "access_denied",
            ErrorKind::EscrowNotFound => "escrow_not_found",
            ErrorKind::EscrowOrphaned => "escrow_orphaned",
            ErrorKind::DecryptionIntegrityFailure => "decryption_integrity_failure",
            ErrorKind::Internal => "internal",
            ErrorKind::InvalidRequest => "invalid_request",
        }
    }
}

impl VaultError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VaultError::EncryptionFailure(_) => ErrorKind::EncryptionFailure,
            VaultError::LedgerUnauthorized(_) => ErrorKind::LedgerUnauthorized,
            VaultError::LedgerUnavailable { .. } => ErrorKind::LedgerUnavailable,
            VaultError::LedgerRejected(_) => ErrorKind::LedgerRejected,
            VaultError::DecodeMismatch { .. } => ErrorKind::DecodeMismatch,
            VaultError::AccessDenied(_) => ErrorKind::AccessDenied,
            VaultError::EscrowNotFound { .. } => ErrorKind::EscrowNotFound,
            VaultError::EscrowOrphaned(_) => ErrorKind::EscrowOrphaned,
            VaultError::DecryptionIntegrityFailure(_) => ErrorKind::DecryptionIntegrityFailure,
            VaultError::Database(_) | VaultError::BlobStore(_) | VaultError::Directory(_) => {
                ErrorKind::Internal
            }
            VaultError::InvalidRequest(_) => ErrorKind::InvalidRequest,
        }
    }

    /// Classify a ledger failure that survived `attempts` tries
    pub fn from_ledger(error: LedgerError, attempts: u32) -> Self {
        match error {
            LedgerError::Unauthorized(identity) => VaultError::LedgerUnauthorized(identity),
            LedgerError::Unavailable(_) => VaultError::LedgerUnavailable {
                attempts,
                source: error,
            },
            other => VaultError::LedgerRejected(other),
        }
    }
}

impl From<EscrowError> for VaultError {
    fn from(error: EscrowError) -> Self {
        match error {
            EscrowError::NotFound(file_id) => VaultError::EscrowNotFound {
                file_id,
                status: None,
            },
            EscrowError::InvalidTransition { .. } => VaultError::InvalidRequest(error.to_string()),
            other => VaultError::Database(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_unavailable_is_retryable() {
        let unavailable =
            VaultError::from_ledger(LedgerError::Unavailable("connection refused".into()), 3);
        assert_eq!(unavailable.kind(), ErrorKind::LedgerUnavailable);
        assert!(unavailable.kind().is_retryable());

        let unauthorized = VaultError::from_ledger(LedgerError::Unauthorized(Address::default()), 1);
        assert_eq!(unauthorized.kind(), ErrorKind::LedgerUnauthorized);
        assert!(!unauthorized.kind().is_retryable());

        let reverted = VaultError::from_ledger(LedgerError::Reverted("nope".into()), 1);
        assert_eq!(reverted.kind(), ErrorKind::LedgerRejected);
    }

    #[test]
    fn test_security_incidents() {
        let file_id = FileId::generate();
        assert!(VaultError::DecryptionIntegrityFailure(file_id)
            .kind()
            .is_security_incident());
        assert!(VaultError::DecodeMismatch {
            file_id,
            reason: "key mismatch".into()
        }
        .kind()
        .is_security_incident());
        assert!(!VaultError::EscrowOrphaned(file_id).kind().is_security_incident());
    }

    #[test]
    fn test_missing_escrow_row_is_not_found() {
        let file_id = FileId::generate();
        let error = VaultError::from(EscrowError::NotFound(file_id));
        assert!(matches!(
            error,
            VaultError::EscrowNotFound { status: None, .. }
        ));
        assert!(error.to_string().contains(&file_id.to_string()));
    }
}
