//! Wire format of the `FileEncryptionRegistry` contract
//!
//! Function and event signatures, call payload encoding, return value
//!  decoding and event log (de)serialization. Everything that touches the
//!  contract's ABI goes through here so the memory ledger and the RPC client
//!  cannot drift apart.

use crate::abi::{self, AbiError, ParamType, Token, WORD};
use crate::types::{Address, ProvenanceId, ADDRESS_SIZE};

use super::{LedgerEvent, ProvenanceRecord, UploaderProfile};

pub const REGISTER_FILE: &str = "registerFile(string,string)";
pub const ARCHIVE_FILE: &str = "archiveFile(bytes32)";
pub const ADD_UPLOADER: &str = "addUploader(address)";
pub const REMOVE_UPLOADER: &str = "removeUploader(address)";
pub const TRANSFER_OWNERSHIP: &str = "transferOwnership(address)";

pub const OWNER: &str = "owner()";
pub const TOTAL_FILES: &str = "totalFiles()";
pub const USER_PROFILES: &str = "userProfiles(address)";
pub const IS_UPLOADER: &str = "isUploader(address)";
pub const GET_FILE_METADATA: &str = "getFileMetadata(bytes32)";
pub const GET_USER_FILES: &str = "getUserFiles()";
pub const GET_ENCRYPTION_KEY: &str = "getEncryptionKey(bytes32)";

pub const FILE_REGISTERED: &str = "FileRegistered(bytes32,address,string,string)";
pub const FILE_ARCHIVED: &str = "FileArchived(bytes32)";
pub const UPLOADER_ADDED: &str = "UploaderAdded(address)";
pub const UPLOADER_REMOVED: &str = "UploaderRemoved(address)";
pub const OWNERSHIP_TRANSFERRED: &str = "OwnershipTransferred(address,address)";

/// A state-changing call on the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    RegisterFile {
        file_name: String,
        encryption_key: String,
    },
    ArchiveFile(ProvenanceId),
    AddUploader(Address),
    RemoveUploader(Address),
    TransferOwnership(Address),
}

impl Call {
    pub fn signature(&self) -> &'static str {
        match self {
            Call::RegisterFile { .. } => REGISTER_FILE,
            Call::ArchiveFile(_) => ARCHIVE_FILE,
            Call::AddUploader(_) => ADD_UPLOADER,
            Call::RemoveUploader(_) => REMOVE_UPLOADER,
            Call::TransferOwnership(_) => TRANSFER_OWNERSHIP,
        }
    }

    /// The transaction input: selector followed by the encoded arguments
    pub fn encode(&self) -> Vec<u8> {
        let args = match self {
            Call::RegisterFile {
                file_name,
                encryption_key,
            } => vec![
                Token::String(file_name.clone()),
                Token::String(encryption_key.clone()),
            ],
            Call::ArchiveFile(id) => vec![Token::FixedBytes32(*id.as_bytes())],
            Call::AddUploader(address)
            | Call::RemoveUploader(address)
            | Call::TransferOwnership(address) => vec![Token::Address(*address)],
        };
        abi::encode_call(self.signature(), &args)
    }

    /// Parse a transaction input back into a call
    pub fn decode(input: &[u8]) -> Result<Self, AbiError> {
        let selector = input
            .get(..abi::SELECTOR_SIZE)
            .ok_or(AbiError::OutOfBounds {
                at: 0,
                needed: abi::SELECTOR_SIZE,
                len: input.len(),
            })?;

        let address_arg = |signature: &str| -> Result<Address, AbiError> {
            let mut tokens = abi::decode_call(signature, &[ParamType::Address], input)?;
            tokens.remove(0).into_address()
        };

        if selector == abi::selector(REGISTER_FILE) {
            let call = decode_register_file_call(input)?;
            Ok(Call::RegisterFile {
                file_name: call.file_name,
                encryption_key: call.encryption_key,
            })
        } else if selector == abi::selector(ARCHIVE_FILE) {
            let mut tokens = abi::decode_call(ARCHIVE_FILE, &[ParamType::FixedBytes32], input)?;
            Ok(Call::ArchiveFile(ProvenanceId::from_bytes(
                tokens.remove(0).into_fixed_bytes()?,
            )))
        } else if selector == abi::selector(ADD_UPLOADER) {
            address_arg(ADD_UPLOADER).map(Call::AddUploader)
        } else if selector == abi::selector(REMOVE_UPLOADER) {
            address_arg(REMOVE_UPLOADER).map(Call::RemoveUploader)
        } else if selector == abi::selector(TRANSFER_OWNERSHIP) {
            address_arg(TRANSFER_OWNERSHIP).map(Call::TransferOwnership)
        } else {
            Err(AbiError::SelectorMismatch {
                expected: "a registry function".to_string(),
                got: hex::encode(selector),
            })
        }
    }
}

/// The arguments of a `registerFile` call, as recovered from its payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterFileCall {
    pub file_name: String,
    pub encryption_key: String,
}

/// Strip and check the `registerFile(string,string)` selector, then decode
///  `(fileName, encryptionKey)` from the rest of the payload
pub fn decode_register_file_call(input: &[u8]) -> Result<RegisterFileCall, AbiError> {
    let mut tokens = abi::decode_call(
        REGISTER_FILE,
        &[ParamType::String, ParamType::String],
        input,
    )?
    .into_iter();

    match (tokens.next(), tokens.next()) {
        (Some(name), Some(key)) => Ok(RegisterFileCall {
            file_name: name.into_string()?,
            encryption_key: key.into_string()?,
        }),
        _ => Err(AbiError::UnexpectedToken("string")),
    }
}

fn single(types: &[ParamType], data: &[u8]) -> Result<Token, AbiError> {
    abi::decode(types, data)?
        .into_iter()
        .next()
        .ok_or(AbiError::UnexpectedToken("return value"))
}

fn to_u64(value: u128) -> Result<u64, AbiError> {
    u64::try_from(value).map_err(|_| AbiError::ValueOverflow)
}

pub fn decode_address_return(data: &[u8]) -> Result<Address, AbiError> {
    single(&[ParamType::Address], data)?.into_address()
}

pub fn decode_bool_return(data: &[u8]) -> Result<bool, AbiError> {
    single(&[ParamType::Bool], data)?.into_bool()
}

pub fn decode_uint_return(data: &[u8]) -> Result<u64, AbiError> {
    to_u64(single(&[ParamType::Uint], data)?.into_uint()?)
}

pub fn decode_string_return(data: &[u8]) -> Result<String, AbiError> {
    single(&[ParamType::String], data)?.into_string()
}

pub fn decode_ids_return(data: &[u8]) -> Result<Vec<ProvenanceId>, AbiError> {
    single(&[ParamType::Array(Box::new(ParamType::FixedBytes32))], data)?
        .into_array()?
        .into_iter()
        .map(|token| token.into_fixed_bytes().map(ProvenanceId::from_bytes))
        .collect()
}

pub fn decode_profile_return(data: &[u8]) -> Result<UploaderProfile, AbiError> {
    let mut tokens = abi::decode(&[ParamType::Bool, ParamType::Uint], data)?.into_iter();
    match (tokens.next(), tokens.next()) {
        (Some(is_uploader), Some(total)) => Ok(UploaderProfile {
            is_uploader: is_uploader.into_bool()?,
            total_files_uploaded: to_u64(total.into_uint()?)?,
        }),
        _ => Err(AbiError::UnexpectedToken("(bool,uint256)")),
    }
}

fn metadata_type() -> ParamType {
    ParamType::Tuple(vec![
        ParamType::Address,
        ParamType::Uint,
        ParamType::String,
        ParamType::String,
        ParamType::Bool,
    ])
}

/// Encode a record the way `getFileMetadata` returns it
pub fn encode_metadata_return(record: &ProvenanceRecord) -> Vec<u8> {
    abi::encode(&[Token::Tuple(vec![
        Token::Address(record.uploader),
        Token::Uint(u128::from(record.upload_timestamp)),
        Token::String(record.file_name.clone()),
        Token::String(record.encryption_key.clone()),
        Token::Bool(record.is_active),
    ])])
}

pub fn decode_metadata_return(
    id: ProvenanceId,
    data: &[u8],
) -> Result<ProvenanceRecord, AbiError> {
    let mut fields = single(&[metadata_type()], data)?.into_tuple()?.into_iter();
    let mut next = || fields.next().ok_or(AbiError::UnexpectedToken("metadata field"));

    Ok(ProvenanceRecord {
        id,
        uploader: next()?.into_address()?,
        upload_timestamp: to_u64(next()?.into_uint()?)?,
        file_name: next()?.into_string()?,
        encryption_key: next()?.into_string()?,
        is_active: next()?.into_bool()?,
    })
}

/// A raw event log: indexed arguments in `topics[1..]`, the rest
///  ABI-encoded in `data`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EventLog {
    pub topics: Vec<[u8; WORD]>,
    pub data: Vec<u8>,
}

fn address_topic(address: &Address) -> [u8; WORD] {
    let mut topic = [0u8; WORD];
    topic[WORD - ADDRESS_SIZE..].copy_from_slice(address.as_bytes());
    topic
}

fn topic_address(topic: &[u8; WORD]) -> Result<Address, AbiError> {
    if topic[..WORD - ADDRESS_SIZE].iter().any(|b| *b != 0) {
        return Err(AbiError::InvalidAddressPadding);
    }
    let mut raw = [0u8; ADDRESS_SIZE];
    raw.copy_from_slice(&topic[WORD - ADDRESS_SIZE..]);
    Ok(Address::from_bytes(raw))
}

impl LedgerEvent {
    pub fn to_log(&self) -> EventLog {
        match self {
            LedgerEvent::FileRegistered {
                id,
                uploader,
                file_name,
                encryption_key,
            } => EventLog {
                topics: vec![
                    abi::event_topic(FILE_REGISTERED),
                    *id.as_bytes(),
                    address_topic(uploader),
                ],
                data: abi::encode(&[
                    Token::String(file_name.clone()),
                    Token::String(encryption_key.clone()),
                ]),
            },
            LedgerEvent::FileArchived { id } => EventLog {
                topics: vec![abi::event_topic(FILE_ARCHIVED), *id.as_bytes()],
                data: Vec::new(),
            },
            LedgerEvent::UploaderAdded { uploader } => EventLog {
                topics: vec![abi::event_topic(UPLOADER_ADDED), address_topic(uploader)],
                data: Vec::new(),
            },
            LedgerEvent::UploaderRemoved { uploader } => EventLog {
                topics: vec![abi::event_topic(UPLOADER_REMOVED), address_topic(uploader)],
                data: Vec::new(),
            },
            LedgerEvent::OwnershipTransferred {
                previous_owner,
                new_owner,
            } => EventLog {
                topics: vec![
                    abi::event_topic(OWNERSHIP_TRANSFERRED),
                    address_topic(previous_owner),
                    address_topic(new_owner),
                ],
                data: Vec::new(),
            },
        }
    }

    /// Decode a log emitted by the registry
    ///
    /// Returns `Ok(None)` for logs whose topic 0 is not a registry event.
    pub fn from_log(log: &EventLog) -> Result<Option<Self>, AbiError> {
        let Some(topic0) = log.topics.first() else {
            return Ok(None);
        };
        let topic = |i: usize| {
            log.topics.get(i).ok_or(AbiError::OutOfBounds {
                at: i,
                needed: 1,
                len: log.topics.len(),
            })
        };

        let event = if *topic0 == abi::event_topic(FILE_REGISTERED) {
            let mut strings =
                abi::decode(&[ParamType::String, ParamType::String], &log.data)?.into_iter();
            let (Some(name), Some(key)) = (strings.next(), strings.next()) else {
                return Err(AbiError::UnexpectedToken("string"));
            };
            LedgerEvent::FileRegistered {
                id: ProvenanceId::from_bytes(*topic(1)?),
                uploader: topic_address(topic(2)?)?,
                file_name: name.into_string()?,
                encryption_key: key.into_string()?,
            }
        } else if *topic0 == abi::event_topic(FILE_ARCHIVED) {
            LedgerEvent::FileArchived {
                id: ProvenanceId::from_bytes(*topic(1)?),
            }
        } else if *topic0 == abi::event_topic(UPLOADER_ADDED) {
            LedgerEvent::UploaderAdded {
                uploader: topic_address(topic(1)?)?,
            }
        } else if *topic0 == abi::event_topic(UPLOADER_REMOVED) {
            LedgerEvent::UploaderRemoved {
                uploader: topic_address(topic(1)?)?,
            }
        } else if *topic0 == abi::event_topic(OWNERSHIP_TRANSFERRED) {
            LedgerEvent::OwnershipTransferred {
                previous_owner: topic_address(topic(1)?)?,
                new_owner: topic_address(topic(2)?)?,
            }
        } else {
            return Ok(None);
        };

        Ok(Some(event))
    }
}
