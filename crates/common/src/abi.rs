//! Contract ABI encoding for ledger call payloads
//!
//! Implements the subset of the Solidity ABI the registry contract uses:
//! `address`, `uint256` (restricted to values that fit a `u128`), `bool`,
//! `bytes32`, `string`, dynamic arrays and tuples, using the standard
//! head/tail layout.
//!
//! Decoding treats its input as hostile. Every offset and length is checked
//! against the buffer before use, padding of narrow types is validated and
//! strings must be valid UTF-8. Nothing in here panics on malformed input.

use sha3::{Digest, Keccak256};

use crate::types::{Address, ADDRESS_SIZE};

/// Size of an ABI word in bytes
pub const WORD: usize = 32;
/// Size of a function selector in bytes
pub const SELECTOR_SIZE: usize = 4;
/// Largest call payload the ledger accepts (128 KiB transaction limit)
pub const MAX_CALL_PAYLOAD: usize = 128 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AbiError {
    #[error("payload of {len} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { len: usize, max: usize },
    #[error("payload too short: need {needed} bytes at position {at}, have {len}")]
    OutOfBounds { at: usize, needed: usize, len: usize },
    #[error("selector mismatch: expected 0x{expected}, got 0x{got}")]
    SelectorMismatch { expected: String, got: String },
    #[error("offset or length does not fit in a machine word")]
    LengthOverflow,
    #[error("invalid bool encoding")]
    InvalidBool,
    #[error("integer wider than 128 bits")]
    ValueOverflow,
    #[error("non-zero padding in address word")]
    InvalidAddressPadding,
    #[error("string is not valid utf-8")]
    InvalidUtf8,
    #[error("unexpected token, expected {0}")]
    UnexpectedToken(&'static str),
}

/// A parameter type, used to drive decoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamType {
    Address,
    Uint,
    Bool,
    FixedBytes32,
    String,
    Array(Box<ParamType>),
    Tuple(Vec<ParamType>),
}

impl ParamType {
    pub fn is_dynamic(&self) -> bool {
        match self {
            ParamType::String | ParamType::Array(_) => true,
            ParamType::Tuple(components) => components.iter().any(ParamType::is_dynamic),
            _ => false,
        }
    }

    /// Bytes this type occupies in the head of its enclosing tuple
    fn head_size(&self) -> usize {
        match self {
            ParamType::Tuple(components) if !self.is_dynamic() => {
                components.iter().map(ParamType::head_size).sum()
            }
            _ => WORD,
        }
    }
}

/// A decoded or to-be-encoded value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Address(Address),
    Uint(u128),
    Bool(bool),
    FixedBytes32([u8; WORD]),
    String(String),
    Array(Vec<Token>),
    Tuple(Vec<Token>),
}

impl Token {
    pub fn is_dynamic(&self) -> bool {
        match self {
            Token::String(_) | Token::Array(_) => true,
            Token::Tuple(components) => components.iter().any(Token::is_dynamic),
            _ => false,
        }
    }

    pub fn into_string(self) -> Result<String, AbiError> {
        match self {
            Token::String(s) => Ok(s),
            _ => Err(AbiError::UnexpectedToken("string")),
        }
    }

    pub fn into_address(self) -> Result<Address, AbiError> {
        match self {
            Token::Address(a) => Ok(a),
            _ => Err(AbiError::UnexpectedToken("address")),
        }
    }

    pub fn into_uint(self) -> Result<u128, AbiError> {
        match self {
            Token::Uint(v) => Ok(v),
            _ => Err(AbiError::UnexpectedToken("uint256")),
        }
    }

    pub fn into_bool(self) -> Result<bool, AbiError> {
        match self {
            Token::Bool(b) => Ok(b),
            _ => Err(AbiError::UnexpectedToken("bool")),
        }
    }

    pub fn into_fixed_bytes(self) -> Result<[u8; WORD], AbiError> {
        match self {
            Token::FixedBytes32(b) => Ok(b),
            _ => Err(AbiError::UnexpectedToken("bytes32")),
        }
    }

    pub fn into_array(self) -> Result<Vec<Token>, AbiError> {
        match self {
            Token::Array(items) => Ok(items),
            _ => Err(AbiError::UnexpectedToken("array")),
        }
    }

    pub fn into_tuple(self) -> Result<Vec<Token>, AbiError> {
        match self {
            Token::Tuple(items) => Ok(items),
            _ => Err(AbiError::UnexpectedToken("tuple")),
        }
    }
}

pub fn keccak256(data: &[u8]) -> [u8; WORD] {
    Keccak256::digest(data).into()
}

/// First four bytes of the Keccak-256 of a canonical function signature,
///  e.g. `registerFile(string,string)`
pub fn selector(signature: &str) -> [u8; SELECTOR_SIZE] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Topic 0 of an event log, e.g. `FileArchived(bytes32)`
pub fn event_topic(signature: &str) -> [u8; WORD] {
    keccak256(signature.as_bytes())
}

// ---------------------------------------------------------------------------
// encoding

fn uint_word(value: u128) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

fn encode_body(token: &Token, out: &mut Vec<u8>) {
    match token {
        Token::Address(address) => {
            out.extend_from_slice(&[0u8; WORD - ADDRESS_SIZE]);
            out.extend_from_slice(address.as_bytes());
        }
        Token::Uint(value) => out.extend_from_slice(&uint_word(*value)),
        Token::Bool(b) => out.extend_from_slice(&uint_word(u128::from(*b))),
        Token::FixedBytes32(bytes) => out.extend_from_slice(bytes),
        Token::String(s) => {
            let bytes = s.as_bytes();
            out.extend_from_slice(&uint_word(bytes.len() as u128));
            out.extend_from_slice(bytes);
            let padding = (WORD - bytes.len() % WORD) % WORD;
            out.extend(std::iter::repeat(0u8).take(padding));
        }
        Token::Array(items) => {
            out.extend_from_slice(&uint_word(items.len() as u128));
            encode_sequence(items, out);
        }
        Token::Tuple(items) => encode_sequence(items, out),
    }
}

fn head_size(token: &Token) -> usize {
    match token {
        Token::Tuple(items) if !token.is_dynamic() => items.iter().map(head_size).sum(),
        _ => WORD,
    }
}

fn encode_sequence(tokens: &[Token], out: &mut Vec<u8>) {
    let head_len: usize = tokens.iter().map(head_size).sum();
    let mut tail = Vec::new();
    for token in tokens {
        if token.is_dynamic() {
            out.extend_from_slice(&uint_word((head_len + tail.len()) as u128));
            encode_body(token, &mut tail);
        } else {
            encode_body(token, out);
        }
    }
    out.extend_from_slice(&tail);
}

/// Encode a list of values as the ABI encodes function arguments
pub fn encode(tokens: &[Token]) -> Vec<u8> {
    let mut out = Vec::new();
    encode_sequence(tokens, &mut out);
    out
}

/// Encode a call payload: selector followed by the encoded arguments
pub fn encode_call(signature: &str, tokens: &[Token]) -> Vec<u8> {
    let mut out = selector(signature).to_vec();
    encode_sequence(tokens, &mut out);
    out
}

// ---------------------------------------------------------------------------
// decoding

fn word_at(data: &[u8], at: usize) -> Result<&[u8], AbiError> {
    let end = at.checked_add(WORD).ok_or(AbiError::LengthOverflow)?;
    data.get(at..end).ok_or(AbiError::OutOfBounds {
        at,
        needed: WORD,
        len: data.len(),
    })
}

fn usize_at(data: &[u8], at: usize) -> Result<usize, AbiError> {
    let word = word_at(data, at)?;
    if word[..WORD - 8].iter().any(|b| *b != 0) {
        return Err(AbiError::LengthOverflow);
    }
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&word[WORD - 8..]);
    usize::try_from(u64::from_be_bytes(raw)).map_err(|_| AbiError::LengthOverflow)
}

fn decode_static(ty: &ParamType, data: &[u8], at: usize) -> Result<Token, AbiError> {
    match ty {
        ParamType::Address => {
            let word = word_at(data, at)?;
            if word[..WORD - ADDRESS_SIZE].iter().any(|b| *b != 0) {
                return Err(AbiError::InvalidAddressPadding);
            }
            let mut raw = [0u8; ADDRESS_SIZE];
            raw.copy_from_slice(&word[WORD - ADDRESS_SIZE..]);
            Ok(Token::Address(Address::from_bytes(raw)))
        }
        ParamType::Uint => {
            let word = word_at(data, at)?;
            if word[..16].iter().any(|b| *b != 0) {
                return Err(AbiError::ValueOverflow);
            }
            let mut raw = [0u8; 16];
            raw.copy_from_slice(&word[16..]);
            Ok(Token::Uint(u128::from_be_bytes(raw)))
        }
        ParamType::Bool => {
            let word = word_at(data, at)?;
            if word[..WORD - 1].iter().any(|b| *b != 0) {
                return Err(AbiError::InvalidBool);
            }
            match word[WORD - 1] {
                0 => Ok(Token::Bool(false)),
                1 => Ok(Token::Bool(true)),
                _ => Err(AbiError::InvalidBool),
            }
        }
        ParamType::FixedBytes32 => {
            let mut raw = [0u8; WORD];
            raw.copy_from_slice(word_at(data, at)?);
            Ok(Token::FixedBytes32(raw))
        }
        ParamType::Tuple(components) => {
            let slice = data.get(at..).ok_or(AbiError::OutOfBounds {
                at,
                needed: ty.head_size(),
                len: data.len(),
            })?;
            decode_sequence(components, slice).map(Token::Tuple)
        }
        ParamType::String | ParamType::Array(_) => decode_dynamic(ty, data, at),
    }
}

fn decode_dynamic(ty: &ParamType, data: &[u8], at: usize) -> Result<Token, AbiError> {
    match ty {
        ParamType::String => {
            let len = usize_at(data, at)?;
            let start = at + WORD;
            let end = start.checked_add(len).ok_or(AbiError::LengthOverflow)?;
            let bytes = data.get(start..end).ok_or(AbiError::OutOfBounds {
                at: start,
                needed: len,
                len: data.len(),
            })?;
            String::from_utf8(bytes.to_vec())
                .map(Token::String)
                .map_err(|_| AbiError::InvalidUtf8)
        }
        ParamType::Array(inner) => {
            let count = usize_at(data, at)?;
            let body = data.get(at + WORD..).unwrap_or_default();
            // every element takes at least one word of head; refuse counts
            //  the buffer cannot possibly hold before allocating for them
            if count > body.len() / WORD {
                return Err(AbiError::OutOfBounds {
                    at: at + WORD,
                    needed: count.saturating_mul(WORD),
                    len: data.len(),
                });
            }
            let types = vec![(**inner).clone(); count];
            decode_sequence(&types, body).map(Token::Array)
        }
        ParamType::Tuple(components) => {
            let body = data.get(at..).ok_or(AbiError::OutOfBounds {
                at,
                needed: WORD,
                len: data.len(),
            })?;
            decode_sequence(components, body).map(Token::Tuple)
        }
        _ => decode_static(ty, data, at),
    }
}

/// Decode a head/tail sequence whose offsets are relative to `data[0]`
fn decode_sequence(types: &[ParamType], data: &[u8]) -> Result<Vec<Token>, AbiError> {
    let mut tokens = Vec::with_capacity(types.len());
    let mut cursor = 0usize;
    for ty in types {
        if ty.is_dynamic() {
            let offset = usize_at(data, cursor)?;
            tokens.push(decode_dynamic(ty, data, offset)?);
            cursor += WORD;
        } else {
            tokens.push(decode_static(ty, data, cursor)?);
            cursor += ty.head_size();
        }
    }
    Ok(tokens)
}

/// Decode ABI-encoded values (function arguments or return data)
pub fn decode(types: &[ParamType], data: &[u8]) -> Result<Vec<Token>, AbiError> {
    if data.len() > MAX_CALL_PAYLOAD {
        return Err(AbiError::PayloadTooLarge {
            len: data.len(),
            max: MAX_CALL_PAYLOAD,
        });
    }
    decode_sequence(types, data)
}

/// Check the selector of a call payload against `signature`, then decode
///  the arguments that follow it
pub fn decode_call(
    signature: &str,
    types: &[ParamType],
    input: &[u8],
) -> Result<Vec<Token>, AbiError> {
    if input.len() > MAX_CALL_PAYLOAD {
        return Err(AbiError::PayloadTooLarge {
            len: input.len(),
            max: MAX_CALL_PAYLOAD,
        });
    }
    if input.len() < SELECTOR_SIZE {
        return Err(AbiError::OutOfBounds {
            at: 0,
            needed: SELECTOR_SIZE,
            len: input.len(),
        });
    }
    let expected = selector(signature);
    let got = &input[..SELECTOR_SIZE];
    if got != expected {
        return Err(AbiError::SelectorMismatch {
            expected: hex::encode(expected),
            got: hex::encode(got),
        });
    }
    decode_sequence(types, &input[SELECTOR_SIZE..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn string_pair() -> Vec<ParamType> {
        vec![ParamType::String, ParamType::String]
    }

    #[test]
    fn test_well_known_selectors() {
        assert_eq!(hex::encode(selector("transfer(address,uint256)")), "a9059cbb");
        assert_eq!(hex::encode(selector("balanceOf(address)")), "70a08231");
    }

    #[test]
    fn test_string_pair_layout() {
        let encoded = encode(&[
            Token::String("a.txt".to_string()),
            Token::String("key".to_string()),
        ]);
        // two offset words, then (len, data) for each string
        assert_eq!(encoded.len(), WORD * 6);
        assert_eq!(usize_at(&encoded, 0).unwrap(), 0x40);
        assert_eq!(usize_at(&encoded, WORD).unwrap(), 0x80);
        assert_eq!(usize_at(&encoded, 0x40).unwrap(), 5);
        assert_eq!(&encoded[0x60..0x65], b"a.txt");
    }

    #[test]
    fn test_decode_multibyte_strings() {
        let name = "rapport-été-📄.pdf".to_string();
        let key = "🔑".repeat(40);
        let input = encode_call(
            "registerFile(string,string)",
            &[Token::String(name.clone()), Token::String(key.clone())],
        );

        let tokens = decode_call("registerFile(string,string)", &string_pair(), &input).unwrap();
        assert_eq!(
            tokens,
            vec![Token::String(name), Token::String(key)]
        );
    }

    #[test]
    fn test_decode_key_near_payload_limit() {
        // leave room for selector, two offsets, two lengths and a short name
        let key = "k".repeat(MAX_CALL_PAYLOAD - SELECTOR_SIZE - WORD * 6);
        let input = encode_call(
            "registerFile(string,string)",
            &[Token::String("n".to_string()), Token::String(key.clone())],
        );
        assert!(input.len() <= MAX_CALL_PAYLOAD);

        let tokens = decode_call("registerFile(string,string)", &string_pair(), &input).unwrap();
        assert_eq!(tokens[1], Token::String(key));
    }

    #[test]
    fn test_decode_rejects_oversized_payload() {
        let input = vec![0u8; MAX_CALL_PAYLOAD + 1];
        assert!(matches!(
            decode_call("registerFile(string,string)", &string_pair(), &input),
            Err(AbiError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_wrong_selector() {
        let input = encode_call("archiveFile(bytes32)", &[Token::FixedBytes32([1; WORD])]);
        assert!(matches!(
            decode_call("registerFile(string,string)", &string_pair(), &input),
            Err(AbiError::SelectorMismatch { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_truncated_and_hostile_offsets() {
        let mut input = encode(&[
            Token::String("name".to_string()),
            Token::String("key".to_string()),
        ]);

        // truncated tail
        assert!(decode(&string_pair(), &input[..input.len() - WORD]).is_err());

        // offset pointing far past the end
        input[WORD - 1] = 0xff;
        input[WORD - 2] = 0xff;
        assert!(matches!(
            decode(&string_pair(), &input),
            Err(AbiError::OutOfBounds { .. })
        ));

        // offset wider than 64 bits
        let mut wide = encode(&[Token::String("x".to_string())]);
        wide[0] = 1;
        assert_eq!(
            decode(&[ParamType::String], &wide),
            Err(AbiError::LengthOverflow)
        );
    }

    #[test]
    fn test_decode_rejects_invalid_utf8() {
        let mut input = encode(&[Token::String("ab".to_string())]);
        input[WORD * 2] = 0xff;
        assert_eq!(
            decode(&[ParamType::String], &input),
            Err(AbiError::InvalidUtf8)
        );
    }

    #[test]
    fn test_static_values_and_validation() {
        let address: Address = "0x00000000000000000000000000000000000000aa".parse().unwrap();
        let tokens = vec![
            Token::Address(address),
            Token::Uint(1_700_000_000),
            Token::Bool(true),
            Token::FixedBytes32([9; WORD]),
        ];
        let types = vec![
            ParamType::Address,
            ParamType::Uint,
            ParamType::Bool,
            ParamType::FixedBytes32,
        ];
        let encoded = encode(&tokens);
        assert_eq!(encoded.len(), WORD * 4);
        assert_eq!(decode(&types, &encoded).unwrap(), tokens);

        let mut bad_bool = encoded.clone();
        bad_bool[WORD * 3 - 1] = 2;
        assert_eq!(decode(&types, &bad_bool), Err(AbiError::InvalidBool));

        let mut bad_address = encoded.clone();
        bad_address[0] = 1;
        assert_eq!(
            decode(&types, &bad_address),
            Err(AbiError::InvalidAddressPadding)
        );

        let mut wide_uint = encoded;
        wide_uint[WORD] = 1;
        assert_eq!(decode(&types, &wide_uint), Err(AbiError::ValueOverflow));
    }

    #[test]
    fn test_dynamic_tuple_return_value() {
        // shape of getFileMetadata's return: a single dynamic struct
        let address: Address = "0x1111111111111111111111111111111111111111".parse().unwrap();
        let record = Token::Tuple(vec![
            Token::Address(address),
            Token::Uint(42),
            Token::String("report.pdf".to_string()),
            Token::String("a2V5".to_string()),
            Token::Bool(false),
        ]);
        let types = vec![ParamType::Tuple(vec![
            ParamType::Address,
            ParamType::Uint,
            ParamType::String,
            ParamType::String,
            ParamType::Bool,
        ])];

        let encoded = encode(std::slice::from_ref(&record));
        // dynamic tuple is referenced through an offset
        assert_eq!(usize_at(&encoded, 0).unwrap(), WORD);
        assert_eq!(decode(&types, &encoded).unwrap(), vec![record]);
    }

    #[test]
    fn test_array_of_bytes32() {
        let ids = Token::Array(vec![Token::FixedBytes32([1; WORD]), Token::FixedBytes32([2; WORD])]);
        let types = vec![ParamType::Array(Box::new(ParamType::FixedBytes32))];
        let encoded = encode(std::slice::from_ref(&ids));
        assert_eq!(encoded.len(), WORD * 4);
        assert_eq!(decode(&types, &encoded).unwrap(), vec![ids]);

        // a count the buffer cannot hold is rejected before allocation
        let mut lying = encoded;
        lying[WORD * 2 - 1] = 0xff;
        assert!(decode(&types, &lying).is_err());
    }

    proptest! {
        #[test]
        fn prop_register_payload_decodes_to_original(name in any::<String>(), key in any::<String>()) {
            let input = encode_call(
                "registerFile(string,string)",
                &[Token::String(name.clone()), Token::String(key.clone())],
            );
            let tokens = decode_call("registerFile(string,string)", &string_pair(), &input).unwrap();
            prop_assert_eq!(tokens, vec![Token::String(name), Token::String(key)]);
        }

        #[test]
        fn prop_arbitrary_bytes_never_panic(data in proptest::collection::vec(any::<u8>(), 0..512)) {
            let _ = decode_call("registerFile(string,string)", &string_pair(), &data);
            let _ = decode(&[ParamType::Array(Box::new(ParamType::String))], &data);
        }
    }
}
