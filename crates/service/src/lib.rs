//! The vault service.
//!
//! This crate ties the encryption engine, ledger and blob store together:
//! - Key escrow (SQLite, one row per file, compare-and-set status changes)
//! - Upload pipeline (encrypt, store, anchor, escrow, await confirmation)
//! - Recovery coordinator (access gate, ledger decode, verification, decrypt)
//! - Reconciliation of registrations that never confirmed
//! - State management (ServiceState built from Config)

pub mod config;
pub mod database;
pub mod error;
pub mod ingest;
pub mod reconcile;
pub mod recovery;
pub mod retry;
pub mod state;
pub mod vault;

// Re-export key types for convenience
pub use config::{Config, LedgerBackend, MemberEntry};
pub use database::{Database, DatabaseSetupError, EscrowStatus};
pub use error::{ErrorKind, VaultError};
pub use ingest::{ConfirmationPolicy, UploadReceipt, UploadRequest};
pub use reconcile::{ReconcileReport, Reconciler};
pub use recovery::RecoveryCoordinator;
pub use retry::RetryPolicy;
pub use state::{State as ServiceState, StateSetupError};
pub use vault::{EscrowView, Vault, VaultOptions};
