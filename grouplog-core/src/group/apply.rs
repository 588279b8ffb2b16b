//! Sub-action application on a working copy
//!
//! Every function here mutates only the working [`GroupState`] and the
//! [`AppliedActions`] accumulator handed in by `ServerGroup::modify`. The
//! committed snapshot is never touched, so returning an error anywhere
//! discards the whole bundle.
//!
//! Fixed order:
//! title → description → avatar → disappearing timer → add members →
//! delete members → member roles → profile keys → add pending →
//! delete pending → promote pending → promote pending (PNI) → access control

use super::access::verify_access;
use super::actions::{
    Actions, AddMemberAction, AppliedActions, MemberRoleChange, ProfileKeyChange, PromotedMember,
    PromotedPniMember, CHANGE_EPOCH_DEFAULT, CHANGE_EPOCH_PNI_PROMOTION,
};
use super::credentials::{CredentialVerifier, GroupPublicParams, VerifiedCredential};
use super::errors::{GroupError, GroupResult};
use super::state::GroupState;
use super::types::{
    AccessControl, AccessRequired, Member, PendingMember, Presentation, Role, UserId,
};
use crate::config::GroupConfig;
use tracing::debug;

/// Everything a sub-action may read besides the working copy
pub(crate) struct ApplyContext<'a> {
    /// Acting member as resolved in the committed state
    pub acting: Option<&'a Member>,
    pub acting_aci: &'a UserId,
    pub acting_pni: &'a UserId,
    /// Committed access control; changes in the same bundle do not apply early
    pub access: AccessControl,
    pub params: &'a GroupPublicParams,
    pub verifier: &'a dyn CredentialVerifier,
    pub config: &'a GroupConfig,
    /// Version the commit would produce
    pub next_version: u32,
    /// Milliseconds since the unix epoch, stamped on new pending members
    pub now: u64,
}

impl ApplyContext<'_> {
    fn verify(&self, presentation: &Presentation) -> GroupResult<VerifiedCredential> {
        Ok(self.verifier.verify(self.params, presentation)?)
    }

    fn require_acting_identity(&self, verified: &VerifiedCredential) -> GroupResult<()> {
        if &verified.user_id != self.acting_aci {
            return Err(GroupError::CredentialVerification(format!(
                "presentation is for {}, not the acting identity {}",
                verified.user_id.short(),
                self.acting_aci.short()
            )));
        }
        Ok(())
    }
}

/// Apply all sub-actions in order, returning the change epoch
pub(crate) fn apply_actions(
    ctx: &ApplyContext<'_>,
    actions: &Actions,
    working: &mut GroupState,
    applied: &mut AppliedActions,
) -> GroupResult<u32> {
    apply_attributes(ctx, actions, working, applied)?;
    apply_add_members(ctx, &actions.add_members, working, applied)?;
    apply_delete_members(ctx, &actions.delete_members, working, applied)?;
    apply_member_roles(ctx, actions, working, applied)?;
    apply_profile_keys(ctx, &actions.modify_member_profile_keys, working, applied)?;
    apply_add_pending(ctx, actions, working, applied)?;
    apply_delete_pending(ctx, &actions.delete_pending_members, working, applied)?;
    apply_promote_pending(ctx, &actions.promote_pending_members, working, applied)?;
    let change_epoch =
        apply_promote_pending_pni(ctx, &actions.promote_pending_pni_aci_members, working, applied)?;
    apply_access_control(ctx, actions, working, applied)?;

    if working.total_size() > ctx.config.max_group_size {
        return Err(GroupError::Validation(format!(
            "group would have {} members and invitations, limit is {}",
            working.total_size(),
            ctx.config.max_group_size
        )));
    }
    working.check_membership_invariants()?;

    Ok(change_epoch)
}

fn apply_attributes(
    ctx: &ApplyContext<'_>,
    actions: &Actions,
    working: &mut GroupState,
    applied: &mut AppliedActions,
) -> GroupResult<()> {
    if let Some(title) = &actions.modify_title {
        verify_access("attributes", ctx.acting, ctx.access.attributes, None)?;
        if title.len() > ctx.config.max_title_bytes {
            return Err(GroupError::Validation(format!(
                "title is {} bytes, limit is {}",
                title.len(),
                ctx.config.max_title_bytes
            )));
        }
        working.title = title.clone();
        applied.modify_title = Some(title.clone());
        debug!(bytes = title.len(), "title changed");
    }

    if let Some(description) = &actions.modify_description {
        verify_access("attributes", ctx.acting, ctx.access.attributes, None)?;
        if description.len() > ctx.config.max_description_bytes {
            return Err(GroupError::Validation(format!(
                "description is {} bytes, limit is {}",
                description.len(),
                ctx.config.max_description_bytes
            )));
        }
        working.description = description.clone();
        applied.modify_description = Some(description.clone());
        debug!(bytes = description.len(), "description changed");
    }

    if let Some(avatar) = &actions.modify_avatar {
        verify_access("attributes", ctx.acting, ctx.access.attributes, None)?;
        working.avatar = avatar.clone();
        applied.modify_avatar = Some(avatar.clone());
        debug!("avatar changed");
    }

    if let Some(timer) = actions.modify_disappearing_messages_timer {
        verify_access("attributes", ctx.acting, ctx.access.attributes, None)?;
        working.disappearing_messages_timer = timer;
        applied.modify_disappearing_messages_timer = Some(timer);
        debug!(seconds = timer, "disappearing messages timer changed");
    }

    Ok(())
}

fn apply_add_members(
    ctx: &ApplyContext<'_>,
    adds: &[AddMemberAction],
    working: &mut GroupState,
    applied: &mut AppliedActions,
) -> GroupResult<()> {
    for add in adds {
        verify_access("members", ctx.acting, ctx.access.members, None)?;
        let role = add
            .role
            .ok_or_else(|| GroupError::Validation("added member has no role".to_string()))?;
        let verified = ctx.verify(&add.presentation)?;

        if working.is_member(&verified.user_id) {
            return Err(GroupError::Validation(format!(
                "{} is already a member",
                verified.user_id.short()
            )));
        }
        // Direct admission supersedes an outstanding invitation
        if working.remove_pending_member(&verified.user_id).is_some() {
            debug!(user = %verified.user_id.short(), "dropped invitation of admitted member");
        }

        let member = Member {
            user_id: verified.user_id,
            role,
            profile_key_ciphertext: verified.profile_key_ciphertext,
            joined_at_version: ctx.next_version,
        };
        debug!(user = %member.user_id.short(), ?role, "member added");
        working.members.push(member.clone());
        applied.add_members.push(member);
    }
    Ok(())
}

fn apply_delete_members(
    ctx: &ApplyContext<'_>,
    targets: &[UserId],
    working: &mut GroupState,
    applied: &mut AppliedActions,
) -> GroupResult<()> {
    for target in targets {
        verify_access("members", ctx.acting, ctx.access.members, Some(target))?;
        working.remove_member(target).ok_or_else(|| {
            GroupError::Validation(format!("{} is not an active member", target.short()))
        })?;
        applied.delete_members.push(target.clone());
        debug!(user = %target.short(), "member deleted");
    }
    Ok(())
}

fn apply_member_roles(
    ctx: &ApplyContext<'_>,
    actions: &Actions,
    working: &mut GroupState,
    applied: &mut AppliedActions,
) -> GroupResult<()> {
    for change in &actions.modify_member_roles {
        // No self bypass: members may not promote themselves
        verify_access("member_roles", ctx.acting, AccessRequired::Administrator, None)?;
        let role = change
            .role
            .ok_or_else(|| GroupError::Validation("role change has no role".to_string()))?;
        let member = working.get_member_mut(&change.user_id).ok_or_else(|| {
            GroupError::Validation(format!("{} is not an active member", change.user_id.short()))
        })?;
        member.role = role;
        applied
            .modify_member_roles
            .push(MemberRoleChange { user_id: change.user_id.clone(), role });
        debug!(user = %change.user_id.short(), ?role, "member role changed");
    }
    Ok(())
}

fn apply_profile_keys(
    ctx: &ApplyContext<'_>,
    presentations: &[Presentation],
    working: &mut GroupState,
    applied: &mut AppliedActions,
) -> GroupResult<()> {
    for presentation in presentations {
        let verified = ctx.verify(presentation)?;
        ctx.require_acting_identity(&verified)?;
        // Only the member itself may replace its profile key
        verify_access(
            "profile_key",
            ctx.acting,
            AccessRequired::Unsatisfiable,
            Some(&verified.user_id),
        )?;
        let member = working.get_member_mut(&verified.user_id).ok_or_else(|| {
            GroupError::Validation(format!("{} is not an active member", verified.user_id.short()))
        })?;
        member.profile_key_ciphertext = verified.profile_key_ciphertext.clone();
        applied.modify_member_profile_keys.push(ProfileKeyChange {
            user_id: verified.user_id,
            profile_key_ciphertext: verified.profile_key_ciphertext,
        });
        debug!("profile key changed");
    }
    Ok(())
}

fn apply_add_pending(
    ctx: &ApplyContext<'_>,
    actions: &Actions,
    working: &mut GroupState,
    applied: &mut AppliedActions,
) -> GroupResult<()> {
    for add in &actions.add_pending_members {
        verify_access("members", ctx.acting, ctx.access.members, None)?;
        let role: Role = add
            .role
            .ok_or_else(|| GroupError::Validation("pending member has no role".to_string()))?;
        let user_id = UserId::from_bytes(&add.user_id)?;

        if working.is_member(&user_id) {
            return Err(GroupError::Validation(format!(
                "{} is already an active member",
                user_id.short()
            )));
        }
        if working.is_pending(&user_id) {
            return Err(GroupError::Validation(format!("{} is already pending", user_id.short())));
        }

        let pending = PendingMember {
            user_id,
            role,
            added_by_user_id: ctx.acting_aci.clone(),
            timestamp: ctx.now,
        };
        debug!(user = %pending.user_id.short(), ?role, "pending member added");
        working.pending_members.push(pending.clone());
        applied.add_pending_members.push(pending);
    }
    Ok(())
}

fn apply_delete_pending(
    ctx: &ApplyContext<'_>,
    targets: &[UserId],
    working: &mut GroupState,
    applied: &mut AppliedActions,
) -> GroupResult<()> {
    for target in targets {
        if target != ctx.acting_aci && target != ctx.acting_pni {
            return Err(GroupError::access_denied(
                "pending_members",
                "pending members may only remove themselves",
            ));
        }
        working.remove_pending_member(target).ok_or_else(|| {
            GroupError::Validation(format!("{} is not a pending member", target.short()))
        })?;
        applied.delete_pending_members.push(target.clone());
        debug!(user = %target.short(), "pending member deleted");
    }
    Ok(())
}

fn apply_promote_pending(
    ctx: &ApplyContext<'_>,
    presentations: &[Presentation],
    working: &mut GroupState,
    applied: &mut AppliedActions,
) -> GroupResult<()> {
    for presentation in presentations {
        let verified = ctx.verify(presentation)?;
        ctx.require_acting_identity(&verified)?;

        if working.is_member(&verified.user_id) {
            return Err(GroupError::CredentialVerification(format!(
                "{} is already an active member",
                verified.user_id.short()
            )));
        }
        working.remove_pending_member(&verified.user_id).ok_or_else(|| {
            GroupError::CredentialVerification(format!(
                "{} is not a pending member",
                verified.user_id.short()
            ))
        })?;

        working.members.push(Member {
            user_id: verified.user_id.clone(),
            role: Role::Default,
            profile_key_ciphertext: verified.profile_key_ciphertext.clone(),
            joined_at_version: ctx.next_version,
        });
        debug!(user = %verified.user_id.short(), "pending member promoted");
        applied.promote_pending_members.push(PromotedMember {
            user_id: verified.user_id,
            profile_key_ciphertext: verified.profile_key_ciphertext,
        });
    }
    Ok(())
}

fn apply_promote_pending_pni(
    ctx: &ApplyContext<'_>,
    presentations: &[Presentation],
    working: &mut GroupState,
    applied: &mut AppliedActions,
) -> GroupResult<u32> {
    let mut change_epoch = CHANGE_EPOCH_DEFAULT;

    for presentation in presentations {
        let verified = ctx.verify(presentation)?;
        ctx.require_acting_identity(&verified)?;

        if working.is_member(&verified.user_id) {
            return Err(GroupError::CredentialVerification(format!(
                "{} is already an active member",
                verified.user_id.short()
            )));
        }
        if working.is_pending(&verified.user_id) {
            return Err(GroupError::CredentialVerification(format!(
                "{} is also pending under its primary identity",
                verified.user_id.short()
            )));
        }
        working.remove_pending_member(ctx.acting_pni).ok_or_else(|| {
            GroupError::CredentialVerification(format!(
                "{} is not a pending member",
                ctx.acting_pni.short()
            ))
        })?;

        working.members.push(Member {
            user_id: verified.user_id.clone(),
            role: Role::Default,
            profile_key_ciphertext: verified.profile_key_ciphertext.clone(),
            joined_at_version: ctx.next_version,
        });
        debug!(
            aci = %verified.user_id.short(),
            pni = %ctx.acting_pni.short(),
            "pending member promoted across identities"
        );
        applied.promote_pending_pni_aci_members.push(PromotedPniMember {
            aci: verified.user_id,
            pni: ctx.acting_pni.clone(),
            profile_key_ciphertext: verified.profile_key_ciphertext,
        });
        applied.source_user_id = ctx.acting_pni.clone();
        change_epoch = CHANGE_EPOCH_PNI_PROMOTION;
    }

    Ok(change_epoch)
}

fn check_access_change(
    ctx: &ApplyContext<'_>,
    field: &str,
    level: AccessRequired,
) -> GroupResult<()> {
    verify_access("access_control", ctx.acting, AccessRequired::Administrator, None)?;
    if !level.is_known() {
        return Err(GroupError::Validation(format!("access control {} cannot be unknown", field)));
    }
    debug!(field, %level, "access control changed");
    Ok(())
}

fn apply_access_control(
    ctx: &ApplyContext<'_>,
    actions: &Actions,
    working: &mut GroupState,
    applied: &mut AppliedActions,
) -> GroupResult<()> {
    if let Some(level) = actions.modify_attributes_access {
        check_access_change(ctx, "attributes", level)?;
        working.access_control.attributes = level;
        applied.modify_attributes_access = Some(level);
    }
    if let Some(level) = actions.modify_members_access {
        check_access_change(ctx, "members", level)?;
        working.access_control.members = level;
        applied.modify_members_access = Some(level);
    }
    if let Some(level) = actions.modify_add_from_invite_link_access {
        check_access_change(ctx, "add_from_invite_link", level)?;
        working.access_control.add_from_invite_link = level;
        applied.modify_add_from_invite_link_access = Some(level);
    }
    Ok(())
}
