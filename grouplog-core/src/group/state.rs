//! Group state snapshots
//!
//! A [`GroupState`] is immutable once committed; `modify` works on a clone
//! and commits a new snapshot.

use super::errors::{GroupError, GroupResult};
use super::types::{AccessControl, Member, PendingMember, Presentation, Role, UserId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Material snapshot of a group at one version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupState {
    pub version: u32,
    pub title: Vec<u8>,
    pub description: Vec<u8>,
    pub avatar: String,
    /// Seconds, 0 disables
    pub disappearing_messages_timer: u32,
    pub public_key: Vec<u8>,
    pub access_control: AccessControl,
    pub members: Vec<Member>,
    pub pending_members: Vec<PendingMember>,
}

impl GroupState {
    pub fn get_member(&self, user_id: &UserId) -> Option<&Member> {
        self.members.iter().find(|m| &m.user_id == user_id)
    }

    pub fn get_pending_member(&self, user_id: &UserId) -> Option<&PendingMember> {
        self.pending_members.iter().find(|p| &p.user_id == user_id)
    }

    pub fn is_member(&self, user_id: &UserId) -> bool {
        self.get_member(user_id).is_some()
    }

    pub fn is_pending(&self, user_id: &UserId) -> bool {
        self.get_pending_member(user_id).is_some()
    }

    pub(crate) fn get_member_mut(&mut self, user_id: &UserId) -> Option<&mut Member> {
        self.members.iter_mut().find(|m| &m.user_id == user_id)
    }

    /// Remove an active member, returning it
    pub(crate) fn remove_member(&mut self, user_id: &UserId) -> Option<Member> {
        let idx = self.members.iter().position(|m| &m.user_id == user_id)?;
        Some(self.members.remove(idx))
    }

    /// Remove a pending member, returning it
    pub(crate) fn remove_pending_member(&mut self, user_id: &UserId) -> Option<PendingMember> {
        let idx = self.pending_members.iter().position(|p| &p.user_id == user_id)?;
        Some(self.pending_members.remove(idx))
    }

    /// Members plus pending members
    pub fn total_size(&self) -> usize {
        self.members.len() + self.pending_members.len()
    }

    /// Check identity uniqueness across members and pending members
    pub fn check_membership_invariants(&self) -> GroupResult<()> {
        let mut seen = HashSet::with_capacity(self.total_size());
        for member in &self.members {
            if !seen.insert(&member.user_id) {
                return Err(GroupError::Validation(format!(
                    "duplicate member {}",
                    member.user_id.short()
                )));
            }
        }
        for pending in &self.pending_members {
            if !seen.insert(&pending.user_id) {
                return Err(GroupError::Validation(format!(
                    "{} is both pending and active, or pending twice",
                    pending.user_id.short()
                )));
            }
        }
        Ok(())
    }
}

/// Initial member: a role and a presentation, never a raw identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialMember {
    pub role: Option<Role>,
    pub presentation: Presentation,
}

/// Caller-supplied state a group is constructed from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialGroupState {
    pub version: u32,
    pub title: Vec<u8>,
    pub description: Vec<u8>,
    pub avatar: String,
    pub disappearing_messages_timer: u32,
    pub public_key: Option<Vec<u8>>,
    pub access_control: Option<AccessControl>,
    pub members: Vec<InitialMember>,
}

impl InitialGroupState {
    pub fn new(public_key: Vec<u8>, access_control: AccessControl) -> Self {
        Self {
            public_key: Some(public_key),
            access_control: Some(access_control),
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<Vec<u8>>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_member(mut self, role: Role, presentation: Presentation) -> Self {
        self.members.push(InitialMember { role: Some(role), presentation });
        self
    }

    /// Structural checks that do not need the credential verifier
    pub fn validate(&self) -> GroupResult<()> {
        if self.version != 0 {
            return Err(GroupError::Validation(format!(
                "initial version must be 0, got {}",
                self.version
            )));
        }

        match &self.public_key {
            Some(key) if !key.is_empty() => {}
            _ => return Err(GroupError::Validation("missing public key".to_string())),
        }

        let access = self
            .access_control
            .as_ref()
            .ok_or_else(|| GroupError::Validation("missing access control".to_string()))?;
        if let Some(field) = access.first_unknown() {
            return Err(GroupError::Validation(format!(
                "access control {} is not specified",
                field
            )));
        }

        if self.members.is_empty() {
            return Err(GroupError::Validation("group needs at least one member".to_string()));
        }

        if let Some(idx) = self.members.iter().position(|m| m.role.is_none()) {
            return Err(GroupError::Validation(format!("member {} has no role", idx)));
        }

        Ok(())
    }
}
