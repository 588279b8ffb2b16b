//! Action bundles and the signed record of what a commit applied
//!
//! [`Actions`] is what a caller submits. [`AppliedActions`] is the normalized
//! record built while the bundle is applied; its canonical encoding is the
//! exact input to the [`Signer`](super::credentials::Signer).

use super::errors::{GroupError, GroupResult};
use super::types::{
    AccessRequired, Member, PendingMember, Presentation, ProfileKeyCiphertext, Role, UserId,
};
use serde::{Deserialize, Serialize};

/// Format byte prefixed to every encoded [`AppliedActions`]
///
/// Bump when the field layout changes; old signatures stay verifiable only
/// against the layout they were produced with.
pub const APPLIED_ACTIONS_FORMAT: u8 = 1;

/// Change epoch for ordinary commits
pub const CHANGE_EPOCH_DEFAULT: u32 = 1;

/// Change epoch for commits that promoted a pending member across identity spaces
pub const CHANGE_EPOCH_PNI_PROMOTION: u32 = 5;

/// Direct admission of a member with a credential presentation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddMemberAction {
    pub role: Option<Role>,
    pub presentation: Presentation,
}

/// Invitation of a not-yet-verified user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddPendingMemberAction {
    /// Raw encrypted identity; validated for length on apply
    pub user_id: Vec<u8>,
    pub role: Option<Role>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifyMemberRoleAction {
    pub user_id: UserId,
    pub role: Option<Role>,
}

/// Proposed mutations against a target version
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actions {
    /// Version the caller expects the commit to produce
    pub version: Option<u32>,
    pub modify_title: Option<Vec<u8>>,
    pub modify_description: Option<Vec<u8>>,
    pub modify_avatar: Option<String>,
    pub modify_disappearing_messages_timer: Option<u32>,
    pub add_members: Vec<AddMemberAction>,
    pub delete_members: Vec<UserId>,
    pub modify_member_roles: Vec<ModifyMemberRoleAction>,
    pub modify_member_profile_keys: Vec<Presentation>,
    pub add_pending_members: Vec<AddPendingMemberAction>,
    pub delete_pending_members: Vec<UserId>,
    pub promote_pending_members: Vec<Presentation>,
    pub promote_pending_pni_aci_members: Vec<Presentation>,
    pub modify_attributes_access: Option<AccessRequired>,
    pub modify_members_access: Option<AccessRequired>,
    pub modify_add_from_invite_link_access: Option<AccessRequired>,
}

impl Actions {
    /// Empty bundle targeting `version`
    pub fn at_version(version: u32) -> Self {
        Self { version: Some(version), ..Default::default() }
    }

    pub fn title(mut self, title: impl Into<Vec<u8>>) -> Self {
        self.modify_title = Some(title.into());
        self
    }

    pub fn description(mut self, description: impl Into<Vec<u8>>) -> Self {
        self.modify_description = Some(description.into());
        self
    }

    pub fn avatar(mut self, avatar: impl Into<String>) -> Self {
        self.modify_avatar = Some(avatar.into());
        self
    }

    pub fn disappearing_messages_timer(mut self, seconds: u32) -> Self {
        self.modify_disappearing_messages_timer = Some(seconds);
        self
    }

    pub fn add_member(mut self, role: Role, presentation: Presentation) -> Self {
        self.add_members.push(AddMemberAction { role: Some(role), presentation });
        self
    }

    pub fn delete_member(mut self, user_id: UserId) -> Self {
        self.delete_members.push(user_id);
        self
    }

    pub fn modify_member_role(mut self, user_id: UserId, role: Role) -> Self {
        self.modify_member_roles.push(ModifyMemberRoleAction { user_id, role: Some(role) });
        self
    }

    pub fn modify_profile_key(mut self, presentation: Presentation) -> Self {
        self.modify_member_profile_keys.push(presentation);
        self
    }

    pub fn add_pending_member(mut self, user_id: &UserId, role: Role) -> Self {
        self.add_pending_members.push(AddPendingMemberAction {
            user_id: user_id.as_bytes().to_vec(),
            role: Some(role),
        });
        self
    }

    pub fn delete_pending_member(mut self, user_id: UserId) -> Self {
        self.delete_pending_members.push(user_id);
        self
    }

    pub fn promote_pending(mut self, presentation: Presentation) -> Self {
        self.promote_pending_members.push(presentation);
        self
    }

    pub fn promote_pending_pni(mut self, presentation: Presentation) -> Self {
        self.promote_pending_pni_aci_members.push(presentation);
        self
    }

    pub fn attributes_access(mut self, access: AccessRequired) -> Self {
        self.modify_attributes_access = Some(access);
        self
    }

    pub fn members_access(mut self, access: AccessRequired) -> Self {
        self.modify_members_access = Some(access);
        self
    }

    pub fn add_from_invite_link_access(mut self, access: AccessRequired) -> Self {
        self.modify_add_from_invite_link_access = Some(access);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRoleChange {
    pub user_id: UserId,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileKeyChange {
    pub user_id: UserId,
    pub profile_key_ciphertext: ProfileKeyCiphertext,
}

/// Pending member promoted under the same identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotedMember {
    pub user_id: UserId,
    pub profile_key_ciphertext: ProfileKeyCiphertext,
}

/// Pending member invited under its secondary identity and promoted under its primary one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotedPniMember {
    pub aci: UserId,
    pub pni: UserId,
    pub profile_key_ciphertext: ProfileKeyCiphertext,
}

/// Normalized record of what one commit applied
///
/// Field order is part of the signed encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedActions {
    pub source_user_id: UserId,
    pub version: u32,
    pub modify_title: Option<Vec<u8>>,
    pub modify_description: Option<Vec<u8>>,
    pub modify_avatar: Option<String>,
    pub modify_disappearing_messages_timer: Option<u32>,
    pub add_members: Vec<Member>,
    pub delete_members: Vec<UserId>,
    pub modify_member_roles: Vec<MemberRoleChange>,
    pub modify_member_profile_keys: Vec<ProfileKeyChange>,
    pub add_pending_members: Vec<PendingMember>,
    pub delete_pending_members: Vec<UserId>,
    pub promote_pending_members: Vec<PromotedMember>,
    pub promote_pending_pni_aci_members: Vec<PromotedPniMember>,
    pub modify_attributes_access: Option<AccessRequired>,
    pub modify_members_access: Option<AccessRequired>,
    pub modify_add_from_invite_link_access: Option<AccessRequired>,
}

impl AppliedActions {
    pub fn new(source_user_id: UserId, version: u32) -> Self {
        Self {
            source_user_id,
            version,
            modify_title: None,
            modify_description: None,
            modify_avatar: None,
            modify_disappearing_messages_timer: None,
            add_members: Vec::new(),
            delete_members: Vec::new(),
            modify_member_roles: Vec::new(),
            modify_member_profile_keys: Vec::new(),
            add_pending_members: Vec::new(),
            delete_pending_members: Vec::new(),
            promote_pending_members: Vec::new(),
            promote_pending_pni_aci_members: Vec::new(),
            modify_attributes_access: None,
            modify_members_access: None,
            modify_add_from_invite_link_access: None,
        }
    }

    /// Canonical bytes: format byte followed by the bincode body
    pub fn encode(&self) -> GroupResult<Vec<u8>> {
        let body = bincode::serialize(self)?;
        let mut out = Vec::with_capacity(body.len() + 1);
        out.push(APPLIED_ACTIONS_FORMAT);
        out.extend_from_slice(&body);
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> GroupResult<Self> {
        match bytes.split_first() {
            Some((&APPLIED_ACTIONS_FORMAT, body)) => Ok(bincode::deserialize(body)?),
            Some((format, _)) => Err(GroupError::Serialization(format!(
                "unsupported applied actions format {}",
                format
            ))),
            None => Err(GroupError::Serialization("empty applied actions".to_string())),
        }
    }
}

/// Applied actions together with the server signature over their encoding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedChange {
    pub actions: AppliedActions,
    /// Exact bytes that were signed
    pub encoded_actions: Vec<u8>,
    pub signature: Vec<u8>,
    pub change_epoch: u32,
}
