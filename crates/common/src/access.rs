//! Priority-tiered access control for recovery
//!
//! The gate holds no state of its own. Every decision is a function of the
//!  requester's membership, as reported by an external membership
//!  directory, and the priority of the file being recovered.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{Address, Priority, Role};

/// A requester's standing as reported by the membership service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub role: Role,
    pub priority_ceiling: Priority,
}

impl Membership {
    pub fn new(role: Role, priority_ceiling: Priority) -> Self {
        Self {
            role,
            priority_ceiling,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("membership directory unavailable: {0}")]
    Unavailable(String),
}

/// Lookup of a requester's role and priority ceiling
#[async_trait]
pub trait MembershipDirectory: Send + Sync + std::fmt::Debug + 'static {
    /// `Ok(None)` means the identity is not a member of anything
    async fn role_and_ceiling(&self, identity: &Address)
        -> Result<Option<Membership>, DirectoryError>;
}

/// A fixed identity -> membership table, loaded from configuration
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    members: HashMap<Address, Membership>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, identity: Address, membership: Membership) {
        self.members.insert(identity, membership);
    }

    pub fn with(mut self, identity: Address, role: Role, priority_ceiling: Priority) -> Self {
        self.insert(identity, Membership::new(role, priority_ceiling));
        self
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl FromIterator<(Address, Membership)> for StaticDirectory {
    fn from_iter<I: IntoIterator<Item = (Address, Membership)>>(iter: I) -> Self {
        Self {
            members: iter.into_iter().collect(),
        }
    }
}

#[async_trait]
impl MembershipDirectory for StaticDirectory {
    async fn role_and_ceiling(
        &self,
        identity: &Address,
    ) -> Result<Option<Membership>, DirectoryError> {
        Ok(self.members.get(identity).copied())
    }
}

/// Who is asking, resolved once at the edge of a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequesterContext {
    pub identity: Address,
    pub membership: Option<Membership>,
}

impl RequesterContext {
    pub fn new(identity: Address, membership: Option<Membership>) -> Self {
        Self {
            identity,
            membership,
        }
    }

    pub async fn resolve(
        identity: Address,
        directory: &dyn MembershipDirectory,
    ) -> Result<Self, DirectoryError> {
        let membership = directory.role_and_ceiling(&identity).await?;
        Ok(Self::new(identity, membership))
    }
}

/// Role -> priority ceiling mapping. SuperAdmin has no ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPolicy {
    pub user: Priority,
    pub admin: Priority,
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self {
            user: Priority::User,
            admin: Priority::Admin,
        }
    }
}

impl AccessPolicy {
    /// `None` means unrestricted
    pub fn ceiling(&self, role: Role) -> Option<Priority> {
        match role {
            Role::User => Some(self.user),
            Role::Admin => Some(self.admin),
            Role::SuperAdmin => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessDenied {
    #[error("{identity} has no membership")]
    NoMembership { identity: Address },
    #[error("{identity} ({role}, ceiling {ceiling}) may not access priority {priority} files")]
    AboveCeiling {
        identity: Address,
        role: Role,
        ceiling: Priority,
        priority: Priority,
    },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AccessGate {
    policy: AccessPolicy,
}

impl AccessGate {
    pub fn new(policy: AccessPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    /// Decide whether `requester` may recover a file of `file_priority`
    ///
    /// Fails closed: a requester without a membership is always denied.
    pub fn check(
        &self,
        requester: &RequesterContext,
        file_priority: Priority,
    ) -> Result<(), AccessDenied> {
        let membership = requester.membership.ok_or(AccessDenied::NoMembership {
            identity: requester.identity,
        })?;

        let Some(role_ceiling) = self.policy.ceiling(membership.role) else {
            return Ok(());
        };
        let ceiling = role_ceiling.min(membership.priority_ceiling);

        if file_priority <= ceiling {
            Ok(())
        } else {
            Err(AccessDenied::AboveCeiling {
                identity: requester.identity,
                role: membership.role,
                ceiling,
                priority: file_priority,
            })
        }
    }
}
