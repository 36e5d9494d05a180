//! AES-256-GCM sealing and opening with a detached tag

use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::Aes256Gcm;
use zeroize::Zeroize;

use super::secret::{Key, Nonce, Tag, TAG_SIZE};
use super::CryptoError;

/// Ciphertext paired with its authentication tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub ciphertext: Vec<u8>,
    pub tag: Tag,
}

impl Sealed {
    /// Serialize as `ciphertext || tag`
    pub fn to_blob(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.ciphertext.len() + TAG_SIZE);
        out.extend_from_slice(&self.ciphertext);
        out.extend_from_slice(self.tag.bytes());
        out
    }

    /// Split a `ciphertext || tag` blob
    ///
    /// # Errors
    ///
    /// A blob too short to hold a tag can only be the result of truncation,
    /// so it is reported as an integrity failure.
    pub fn from_blob(blob: &[u8]) -> Result<Self, CryptoError> {
        if blob.len() < TAG_SIZE {
            return Err(CryptoError::Integrity);
        }
        let split = blob.len() - TAG_SIZE;
        Ok(Self {
            ciphertext: blob[..split].to_vec(),
            tag: Tag::from_slice(&blob[split..])?,
        })
    }
}

fn cipher(key: &Key) -> Aes256Gcm {
    Aes256Gcm::new(GenericArray::from_slice(key.bytes()))
}

/// Encrypt `plaintext` under `key` and `nonce`
///
/// Pure transform: no state is kept between calls. The caller owns nonce
/// uniqueness.
pub fn encrypt(plaintext: &[u8], key: &Key, nonce: &Nonce) -> Result<Sealed, CryptoError> {
    let mut buffer = plaintext.to_vec();
    let tag = cipher(key)
        .encrypt_in_place_detached(GenericArray::from_slice(nonce.bytes()), b"", &mut buffer)
        .map_err(|_| CryptoError::Encrypt)?;

    Ok(Sealed {
        ciphertext: buffer,
        tag: Tag::from_slice(tag.as_slice())?,
    })
}

/// Decrypt and authenticate `ciphertext`
///
/// # Errors
///
/// Returns `CryptoError::Integrity` on any tag mismatch, corrupted
/// ciphertext or wrong key/nonce. The working buffer is wiped before
/// returning so no unauthenticated plaintext ever escapes.
pub fn decrypt(
    ciphertext: &[u8],
    tag: &Tag,
    key: &Key,
    nonce: &Nonce,
) -> Result<Vec<u8>, CryptoError> {
    let mut buffer = ciphertext.to_vec();
    match cipher(key).decrypt_in_place_detached(
        GenericArray::from_slice(nonce.bytes()),
        b"",
        &mut buffer,
        GenericArray::from_slice(tag.bytes()),
    ) {
        Ok(()) => Ok(buffer),
        Err(_) => {
            buffer.zeroize();
            Err(CryptoError::Integrity)
        }
    }
}
