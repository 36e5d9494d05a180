//! Authenticated symmetric encryption for documents
//!
//! This module is the vault's encryption engine:
//!
//! - **Key generation**: a fresh 256-bit `Key` per document, drawn from the OS CSPRNG
//! - **Nonce generation**: a fresh 96-bit `Nonce` per encryption call
//! - **Encryption**: AES-256-GCM with a detached 128-bit `Tag`
//!
//! # Storage formats
//!
//! Keys and nonces leave the process as standard base64 strings. The wrapped
//! key string is exactly what gets stored in escrow *and* submitted to the
//! ledger, so the two copies can be compared byte for byte after unwrapping.
//!
//! Ciphertext blobs are laid out as `ciphertext || tag`, the same layout a
//! browser's WebCrypto AES-GCM produces, so documents encrypted client side
//! can be decrypted here unchanged.
//!
//! # Nonce reuse
//!
//! Reusing a nonce under the same key is a caller error and is not detected
//! here. The upload pipeline generates a new key for every document, which
//! makes reuse impossible in practice.

mod cipher;
mod secret;

pub use cipher::{decrypt, encrypt, Sealed};
pub use secret::{AlgorithmTag, Key, Nonce, Tag, KEY_SIZE, NONCE_SIZE, TAG_SIZE};

/// Errors that can occur during key handling or encryption/decryption
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    /// The OS random number generator failed
    #[error("random number generator failure: {0}")]
    Rng(String),
    /// Key material could not be unwrapped
    #[error("invalid key material: {0}")]
    InvalidKey(String),
    /// Nonce material could not be decoded
    #[error("invalid nonce: {0}")]
    InvalidNonce(String),
    /// The AEAD refused to seal the payload
    #[error("encryption failed")]
    Encrypt,
    /// Tag mismatch, truncated input or wrong key. Never retried.
    #[error("integrity check failed")]
    Integrity,
}
