use std::collections::{HashMap, HashSet};

use crate::abi;
use crate::types::{Address, ProvenanceId};

use super::contract::Call;
use super::{LedgerError, LedgerEvent, ProvenanceRecord, UploaderProfile};

/// The registry contract's state machine
///
/// Records move `Unregistered -> Active -> Archived` and never back.
///  Record ids are derived from the uploader, the name, the block timestamp
///  and a running counter, so no two registrations ever share one.
#[derive(Debug, Clone)]
pub struct Registry {
    owner: Address,
    uploaders: HashSet<Address>,
    uploads: HashMap<Address, u64>,
    records: HashMap<ProvenanceId, ProvenanceRecord>,
    by_uploader: HashMap<Address, Vec<ProvenanceId>>,
    archived_names: HashSet<(Address, String)>,
    counter: u64,
}

impl Registry {
    /// Deploy a fresh registry. The deployer owns it and is whitelisted.
    pub fn new(owner: Address) -> Self {
        Self {
            owner,
            uploaders: HashSet::from([owner]),
            uploads: HashMap::new(),
            records: HashMap::new(),
            by_uploader: HashMap::new(),
            archived_names: HashSet::new(),
            counter: 0,
        }
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn total_files(&self) -> u64 {
        self.counter
    }

    pub fn is_uploader(&self, identity: &Address) -> bool {
        self.uploaders.contains(identity)
    }

    pub fn profile(&self, identity: &Address) -> UploaderProfile {
        UploaderProfile {
            is_uploader: self.is_uploader(identity),
            total_files_uploaded: self.uploads.get(identity).copied().unwrap_or(0),
        }
    }

    pub fn record(&self, id: &ProvenanceId) -> Result<&ProvenanceRecord, LedgerError> {
        self.records.get(id).ok_or(LedgerError::NotFound(*id))
    }

    pub fn user_files(&self, identity: &Address) -> Vec<ProvenanceId> {
        self.by_uploader.get(identity).cloned().unwrap_or_default()
    }

    pub fn encryption_key(
        &self,
        from: &Address,
        id: &ProvenanceId,
    ) -> Result<String, LedgerError> {
        let record = self.record(id)?;
        if *from != record.uploader && *from != self.owner {
            return Err(LedgerError::Unauthorized(*from));
        }
        Ok(record.encryption_key.clone())
    }

    /// Check a raw call payload against the current state without
    ///  applying it
    pub fn validate(&self, from: &Address, input: &[u8]) -> Result<Call, LedgerError> {
        let call = Call::decode(input)?;
        self.check(from, &call)?;
        Ok(call)
    }

    /// Execute a raw call payload on behalf of `from`
    ///
    /// Either the whole call applies and its events are returned, or
    ///  nothing changes.
    pub fn execute(
        &mut self,
        from: &Address,
        input: &[u8],
        timestamp: u64,
    ) -> Result<Vec<LedgerEvent>, LedgerError> {
        let call = self.validate(from, input)?;
        Ok(vec![self.apply(from, call, timestamp)])
    }

    fn check(&self, from: &Address, call: &Call) -> Result<(), LedgerError> {
        match call {
            Call::RegisterFile {
                file_name,
                encryption_key,
            } => {
                if !self.is_uploader(from) {
                    return Err(LedgerError::Unauthorized(*from));
                }
                if file_name.is_empty() {
                    return Err(LedgerError::Reverted("file name is empty".to_string()));
                }
                if encryption_key.is_empty() {
                    return Err(LedgerError::Reverted("encryption key is empty".to_string()));
                }
                if self.archived_names.contains(&(*from, file_name.clone())) {
                    return Err(LedgerError::NameArchived {
                        uploader: *from,
                        name: file_name.clone(),
                    });
                }
                Ok(())
            }
            Call::ArchiveFile(id) => {
                let record = self.record(id)?;
                if *from != record.uploader && *from != self.owner {
                    return Err(LedgerError::Unauthorized(*from));
                }
                if !record.is_active {
                    return Err(LedgerError::AlreadyArchived(*id));
                }
                Ok(())
            }
            Call::AddUploader(_) => self.only_owner(from),
            Call::RemoveUploader(uploader) => {
                self.only_owner(from)?;
                if !self.uploaders.contains(uploader) {
                    return Err(LedgerError::Reverted(format!(
                        "{} is not an uploader",
                        uploader
                    )));
                }
                Ok(())
            }
            Call::TransferOwnership(new_owner) => {
                self.only_owner(from)?;
                if *new_owner == Address::default() {
                    return Err(LedgerError::Reverted(
                        "new owner is the zero address".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }

    fn only_owner(&self, from: &Address) -> Result<(), LedgerError> {
        if *from != self.owner {
            return Err(LedgerError::Unauthorized(*from));
        }
        Ok(())
    }

    /// Apply a call that passed [`Registry::check`]
    fn apply(&mut self, from: &Address, call: Call, timestamp: u64) -> LedgerEvent {
        match call {
            Call::RegisterFile {
                file_name,
                encryption_key,
            } => {
                let id = self.next_id(from, &file_name, timestamp);
                self.records.insert(
                    id,
                    ProvenanceRecord {
                        id,
                        uploader: *from,
                        upload_timestamp: timestamp,
                        file_name: file_name.clone(),
                        encryption_key: encryption_key.clone(),
                        is_active: true,
                    },
                );
                self.by_uploader.entry(*from).or_default().push(id);
                *self.uploads.entry(*from).or_default() += 1;

                LedgerEvent::FileRegistered {
                    id,
                    uploader: *from,
                    file_name,
                    encryption_key,
                }
            }
            Call::ArchiveFile(id) => {
                if let Some(record) = self.records.get_mut(&id) {
                    record.is_active = false;
                    self.archived_names
                        .insert((record.uploader, record.file_name.clone()));
                }
                LedgerEvent::FileArchived { id }
            }
            Call::AddUploader(uploader) => {
                self.uploaders.insert(uploader);
                LedgerEvent::UploaderAdded { uploader }
            }
            Call::RemoveUploader(uploader) => {
                self.uploaders.remove(&uploader);
                LedgerEvent::UploaderRemoved { uploader }
            }
            Call::TransferOwnership(new_owner) => {
                let previous_owner = self.owner;
                self.owner = new_owner;
                LedgerEvent::OwnershipTransferred {
                    previous_owner,
                    new_owner,
                }
            }
        }
    }

    fn next_id(&mut self, from: &Address, file_name: &str, timestamp: u64) -> ProvenanceId {
        self.counter += 1;
        let mut preimage = Vec::with_capacity(20 + file_name.len() + 16);
        preimage.extend_from_slice(from.as_bytes());
        preimage.extend_from_slice(file_name.as_bytes());
        preimage.extend_from_slice(&timestamp.to_be_bytes());
        preimage.extend_from_slice(&self.counter.to_be_bytes());
        ProvenanceId::from_bytes(abi::keccak256(&preimage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(n: u8) -> Address {
        Address::from_bytes([n; 20])
    }

    fn register(name: &str) -> Vec<u8> {
        Call::RegisterFile {
            file_name: name.to_string(),
            encryption_key: "a2V5".to_string(),
        }
        .encode()
    }

    fn registered_id(events: &[LedgerEvent]) -> ProvenanceId {
        match &events[0] {
            LedgerEvent::FileRegistered { id, .. } => *id,
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_owner_is_whitelisted_at_deployment() {
        let registry = Registry::new(address(1));
        assert_eq!(registry.owner(), address(1));
        assert!(registry.is_uploader(&address(1)));
        assert!(!registry.is_uploader(&address(2)));
    }

    #[test]
    fn test_only_whitelisted_uploaders_register() {
        let mut registry = Registry::new(address(1));
        let result = registry.execute(&address(2), &register("a.txt"), 100);
        assert_eq!(result, Err(LedgerError::Unauthorized(address(2))));
        assert_eq!(registry.total_files(), 0);

        // only the owner manages the whitelist
        let add = Call::AddUploader(address(2)).encode();
        assert_eq!(
            registry.execute(&address(3), &add, 100),
            Err(LedgerError::Unauthorized(address(3)))
        );
        registry.execute(&address(1), &add, 100).unwrap();

        let events = registry
            .execute(&address(2), &register("a.txt"), 101)
            .unwrap();
        let id = registered_id(&events);
        let record = registry.record(&id).unwrap();
        assert_eq!(record.uploader, address(2));
        assert_eq!(record.upload_timestamp, 101);
        assert!(record.is_active);
        assert_eq!(registry.user_files(&address(2)), vec![id]);
        assert_eq!(registry.profile(&address(2)).total_files_uploaded, 1);
    }

    #[test]
    fn test_ids_are_never_reused() {
        let mut registry = Registry::new(address(1));
        let first = registered_id(&registry.execute(&address(1), &register("same"), 5).unwrap());
        let second = registered_id(&registry.execute(&address(1), &register("same"), 5).unwrap());
        assert_ne!(first, second);
        assert_eq!(registry.total_files(), 2);
    }

    #[test]
    fn test_archive_is_terminal() {
        let mut registry = Registry::new(address(1));
        registry
            .execute(&address(1), &Call::AddUploader(address(2)).encode(), 0)
            .unwrap();
        let id = registered_id(
            &registry
                .execute(&address(2), &register("report.pdf"), 1)
                .unwrap(),
        );
        let archive = Call::ArchiveFile(id).encode();

        // a stranger may not archive
        assert_eq!(
            registry.execute(&address(3), &archive, 2),
            Err(LedgerError::Unauthorized(address(3)))
        );

        registry.execute(&address(2), &archive, 2).unwrap();
        assert!(!registry.record(&id).unwrap().is_active);

        assert_eq!(
            registry.execute(&address(1), &archive, 3),
            Err(LedgerError::AlreadyArchived(id))
        );

        // archiving blocks re-registration under the same name
        assert!(matches!(
            registry.execute(&address(2), &register("report.pdf"), 4),
            Err(LedgerError::NameArchived { .. })
        ));
        // but the key stays readable
        assert_eq!(registry.encryption_key(&address(2), &id).unwrap(), "a2V5");
    }

    #[test]
    fn test_encryption_key_is_restricted() {
        let mut registry = Registry::new(address(1));
        let id = registered_id(&registry.execute(&address(1), &register("x"), 0).unwrap());
        assert!(registry.encryption_key(&address(1), &id).is_ok());
        assert_eq!(
            registry.encryption_key(&address(9), &id),
            Err(LedgerError::Unauthorized(address(9)))
        );
    }

    #[test]
    fn test_transfer_ownership() {
        let mut registry = Registry::new(address(1));
        let events = registry
            .execute(&address(1), &Call::TransferOwnership(address(2)).encode(), 0)
            .unwrap();
        assert_eq!(
            events,
            vec![LedgerEvent::OwnershipTransferred {
                previous_owner: address(1),
                new_owner: address(2)
            }]
        );
        assert_eq!(registry.owner(), address(2));
        assert!(registry
            .execute(&address(1), &Call::AddUploader(address(3)).encode(), 0)
            .is_err());
    }

    #[test]
    fn test_validate_leaves_state_untouched() {
        let mut registry = Registry::new(address(1));
        let call = registry.validate(&address(1), &register("draft")).unwrap();
        assert!(matches!(call, Call::RegisterFile { .. }));
        assert_eq!(registry.total_files(), 0);
        assert!(registry.user_files(&address(1)).is_empty());

        assert_eq!(
            registry
                .validate(&address(1), &Call::RemoveUploader(address(5)).encode())
                .unwrap_err(),
            LedgerError::Reverted(format!("{} is not an uploader", address(5)))
        );

        // a refused call changes nothing when executed either
        let id = registered_id(&registry.execute(&address(1), &register("x"), 0).unwrap());
        registry
            .execute(&address(1), &Call::ArchiveFile(id).encode(), 1)
            .unwrap();
        assert_eq!(
            registry.execute(&address(1), &Call::ArchiveFile(id).encode(), 2),
            Err(LedgerError::AlreadyArchived(id))
        );
        assert_eq!(registry.total_files(), 1);
    }

    #[test]
    fn test_garbage_input_is_rejected() {
        let mut registry = Registry::new(address(1));
        assert!(matches!(
            registry.execute(&address(1), &[1, 2, 3, 4, 5], 0),
            Err(LedgerError::Decode(_))
        ));
    }
}
