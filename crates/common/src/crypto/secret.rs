//! Key, nonce and tag material for AES-256-GCM

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::CryptoError;

/// Size of an AES-256 key in bytes
pub const KEY_SIZE: usize = 32;
/// Size of an AES-GCM nonce in bytes (96 bits)
pub const NONCE_SIZE: usize = 12;
/// Size of an AES-GCM authentication tag in bytes (128 bits)
pub const TAG_SIZE: usize = 16;

fn fill_random(buf: &mut [u8]) -> Result<(), CryptoError> {
    getrandom::getrandom(buf).map_err(|e| CryptoError::Rng(e.to_string()))
}

/// A 256-bit symmetric document key
///
/// Zeroed on drop. `Debug` never prints the key bytes.
///
/// # Examples
///
/// ```ignore
/// let key = Key::generate()?;
/// let wrapped = key.wrap();              // base64, goes to escrow and ledger
/// let same = Key::unwrap(&wrapped)?;
/// assert_eq!(key, same);
/// ```
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Key([u8; KEY_SIZE]);

impl Key {
    /// Generate a new random key using the OS CSPRNG
    pub fn generate() -> Result<Self, CryptoError> {
        let mut buff = [0u8; KEY_SIZE];
        fill_random(&mut buff)?;
        Ok(Self(buff))
    }

    /// Create a key from a byte slice
    ///
    /// # Errors
    ///
    /// Returns an error if the slice length is not exactly `KEY_SIZE` bytes.
    pub fn from_slice(data: &[u8]) -> Result<Self, CryptoError> {
        if data.len() != KEY_SIZE {
            return Err(CryptoError::InvalidKey(format!(
                "invalid key size, expected {}, got {}",
                KEY_SIZE,
                data.len()
            )));
        }
        let mut buff = [0u8; KEY_SIZE];
        buff.copy_from_slice(data);
        Ok(Self(buff))
    }

    pub fn bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Encode the key for storage (standard base64)
    pub fn wrap(&self) -> String {
        STANDARD.encode(self.0)
    }

    /// Decode a wrapped key
    pub fn unwrap(wrapped: &str) -> Result<Self, CryptoError> {
        let mut raw = STANDARD
            .decode(wrapped.trim())
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        let key = Self::from_slice(&raw);
        raw.zeroize();
        key
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        // no early exit on the first differing byte
        self.0
            .iter()
            .zip(other.0.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl Eq for Key {}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Key(..)")
    }
}

/// A 96-bit AES-GCM nonce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nonce([u8; NONCE_SIZE]);

impl Nonce {
    /// Generate a new random nonce. Must never be reused with the same key.
    pub fn generate() -> Result<Self, CryptoError> {
        let mut buff = [0u8; NONCE_SIZE];
        fill_random(&mut buff)?;
        Ok(Self(buff))
    }

    pub fn from_slice(data: &[u8]) -> Result<Self, CryptoError> {
        if data.len() != NONCE_SIZE {
            return Err(CryptoError::InvalidNonce(format!(
                "invalid nonce size, expected {}, got {}",
                NONCE_SIZE,
                data.len()
            )));
        }
        let mut buff = [0u8; NONCE_SIZE];
        buff.copy_from_slice(data);
        Ok(Self(buff))
    }

    pub fn bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }

    pub fn encode(&self) -> String {
        STANDARD.encode(self.0)
    }

    pub fn decode(encoded: &str) -> Result<Self, CryptoError> {
        let raw = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CryptoError::InvalidNonce(e.to_string()))?;
        Self::from_slice(&raw)
    }
}

/// A 128-bit AES-GCM authentication tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag(pub(crate) [u8; TAG_SIZE]);

impl Tag {
    pub fn from_slice(data: &[u8]) -> Result<Self, CryptoError> {
        if data.len() != TAG_SIZE {
            return Err(CryptoError::Integrity);
        }
        let mut buff = [0u8; TAG_SIZE];
        buff.copy_from_slice(data);
        Ok(Self(buff))
    }

    pub fn bytes(&self) -> &[u8; TAG_SIZE] {
        &self.0
    }
}

/// The only algorithm the vault writes. Stored on every escrow row so a
/// future algorithm can be introduced without guessing what old rows used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AlgorithmTag {
    #[default]
    #[serde(rename = "AES-256-GCM")]
    Aes256Gcm,
}

impl AlgorithmTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlgorithmTag::Aes256Gcm => "AES-256-GCM",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "AES-256-GCM" => Some(AlgorithmTag::Aes256Gcm),
            _ => None,
        }
    }
}

impl fmt::Display for AlgorithmTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_key_wrap_unwrap() {
        let key = Key::generate().unwrap();
        let wrapped = key.wrap();
        // 32 bytes -> 44 base64 chars with padding
        assert_eq!(wrapped.len(), 44);
        assert_eq!(Key::unwrap(&wrapped).unwrap(), key);
    }

    #[test]
    fn test_key_size_validation() {
        assert!(Key::from_slice(&[1u8; 16]).is_err());
        assert!(Key::from_slice(&[1u8; 64]).is_err());
        assert!(Key::from_slice(&[1u8; KEY_SIZE]).is_ok());

        let short = STANDARD.encode([1u8; 16]);
        assert!(matches!(
            Key::unwrap(&short),
            Err(CryptoError::InvalidKey(_))
        ));
        assert!(matches!(
            Key::unwrap("not base64 !!"),
            Err(CryptoError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_generated_keys_differ() {
        let a = Key::generate().unwrap();
        let b = Key::generate().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_key_debug_is_redacted() {
        let key = Key::from_slice(&[0xAB; KEY_SIZE]).unwrap();
        let printed = format!("{:?}", key);
        assert_eq!(printed, "Key(..)");
    }

    #[test]
    fn test_nonce_encode_decode() {
        let nonce = Nonce::generate().unwrap();
        assert_eq!(Nonce::decode(&nonce.encode()).unwrap(), nonce);
        assert!(Nonce::from_slice(&[0u8; 16]).is_err());
    }

    #[test]
    fn test_algorithm_tag() {
        let tag = AlgorithmTag::default();
        assert_eq!(tag.as_str(), "AES-256-GCM");
        assert_eq!(AlgorithmTag::parse(tag.as_str()), Some(tag));
        assert_eq!(AlgorithmTag::parse("ChaCha20-Poly1305"), None);
    }
}
