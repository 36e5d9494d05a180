/**
 * ABI encoding and decoding of ledger call payloads.
 * Recovers the (name, key) pair a file was
 *  registered with straight from the raw transaction.
 */
pub mod abi;
/**
 * Priority-tiered access policy. Decides who
 *  may trigger a recovery, before any ledger or
 *  decryption work happens.
 */
pub mod access;
/**
 * Blob store boundary: `put(bytes) -> locator`
 *  and `get(locator) -> bytes`. No encryption
 *  responsibility lives behind it.
 */
pub mod blob;
/**
 * Authenticated symmetric encryption.
 *  - Key and nonce generation
 *  - AES-256-GCM with a detached tag
 *  - Key wrapping for escrow and ledger storage
 */
pub mod crypto;
/**
 * The append-only provenance ledger: the registry
 *  contract's state machine, an in-memory ledger
 *  and a JSON-RPC client for a real node.
 */
pub mod ledger;
/**
 * Identifiers shared by every layer
 *  (addresses, record ids, file ids, priorities).
 */
pub mod types;

pub mod prelude {
    pub use crate::access::{AccessGate, AccessPolicy, Membership, MembershipDirectory, RequesterContext};
    pub use crate::blob::{BlobError, BlobLocator, BlobStore};
    pub use crate::crypto::{Key, Nonce, Sealed, Tag};
    pub use crate::ledger::{Ledger, LedgerError, MemoryLedger, ProvenanceRecord, Receipt};
    pub use crate::types::{Address, FileId, Priority, ProvenanceId, Role, TxReference};
}
