/*
    modify_scenarios.rs - Access-gated transitions through ServerGroup::modify

    Covers version preconditions, self-modification, administrator-only
    actions and the multi-step batches where later sub-actions observe
    earlier ones.
*/

use grouplog_core::group::{
    verify_change_signature, AccessControl, AccessRequired, Actions, AddPendingMemberAction,
    AppliedActions, Ed25519Signer, Group, GroupError, Role, ServerGroup,
};
use grouplog_core::test_utils::{
    assert_access_denied, assert_applied, assert_conflict, assert_disjoint, assert_err,
    GroupFixture, TestUser,
};
use grouplog_core::{GroupConfig, GroupResult, ModifyOutcome};

struct Scenario {
    fx: GroupFixture,
    admin: TestUser,
    bob: TestUser,
    carol: TestUser,
    dave: TestUser,
    group: ServerGroup,
}

/// Admin plus two regular members under the given access levels
fn scenario(attributes: AccessRequired, members: AccessRequired) -> Scenario {
    let fx = GroupFixture::new();
    let (admin, bob, carol, dave) = (fx.user(1), fx.user(2), fx.user(3), fx.user(4));
    let access = AccessControl::new(attributes, members, AccessRequired::Unsatisfiable);
    let group = fx
        .build(fx.initial_state(
            access,
            &[(&admin, Role::Administrator), (&bob, Role::Default), (&carol, Role::Default)],
        ))
        .unwrap();
    Scenario { fx, admin, bob, carol, dave, group }
}

impl Scenario {
    fn modify(&mut self, actor: &TestUser, actions: Actions) -> GroupResult<ModifyOutcome> {
        self.group.modify(&actor.aci, &actor.pni, actions)
    }
}

#[test]
fn test_each_commit_appends_one_entry() {
    let mut s = scenario(AccessRequired::Member, AccessRequired::Member);
    let admin = s.admin.clone();

    for v in 1..=3u32 {
        let actions = Actions::at_version(v).title(format!("t{}", v));
        let change = assert_applied(s.modify(&admin, actions));
        assert_eq!(change.actions.version, v);
        assert_eq!(s.group.version(), v);
    }

    let len = s.group.change_log().len();
    assert_eq!(len, 4);
    for n in 0..=len {
        assert_eq!(s.group.changes_since(n).len(), len - n);
    }
    assert!(s.group.changes_since(len).is_empty());
    assert!(s.group.changes_since(len + 10).is_empty());

    for (i, entry) in s.group.changes_since(0).iter().enumerate() {
        assert_eq!(entry.version() as usize, i);
        assert_eq!(entry.change.is_some(), i > 0);
    }
}

#[test]
fn test_stale_and_future_versions_conflict_without_effects() {
    let mut s = scenario(AccessRequired::Member, AccessRequired::Member);
    let admin = s.admin.clone();
    assert_applied(s.modify(&admin, Actions::at_version(1).title("first")));
    let before = s.group.current_state().clone();

    assert_conflict(s.modify(&admin, Actions::at_version(1).title("stale")), 2, 1);
    assert_conflict(s.modify(&admin, Actions::at_version(7).title("future")), 2, 7);

    assert_eq!(s.group.current_state(), &before);
    assert_eq!(s.group.change_log().len(), 2);
}

#[test]
fn test_rejection_beats_conflict() {
    // Sub-actions run before the version check
    let mut s = scenario(AccessRequired::Administrator, AccessRequired::Member);
    let bob = s.bob.clone();
    assert_access_denied(s.modify(&bob, Actions::at_version(9).title("nope")), "attributes");
}

#[test]
fn test_empty_bundle_bumps_version() {
    let mut s = scenario(AccessRequired::Member, AccessRequired::Member);
    let admin = s.admin.clone();
    let change = assert_applied(s.modify(&admin, Actions::at_version(1)));
    assert_eq!(change.actions, AppliedActions::new(admin.aci.clone(), 1));
    assert_eq!(s.group.version(), 1);
}

#[test]
fn test_signature_covers_encoded_actions() {
    let mut s = scenario(AccessRequired::Member, AccessRequired::Member);
    let admin = s.admin.clone();
    let dave = s.dave.clone();
    let change = assert_applied(s.modify(
        &admin,
        Actions::at_version(1).title("signed").add_pending_member(&dave.aci, Role::Default),
    ));

    let public = Ed25519Signer::public_key(&s.fx.secret_params);
    assert!(verify_change_signature(&public, &change.encoded_actions, &change.signature).unwrap());
    assert_eq!(AppliedActions::decode(&change.encoded_actions).unwrap(), change.actions);

    let mut tampered = change.encoded_actions.clone();
    let last = tampered.len() - 1;
    tampered[last] ^= 1;
    assert!(!verify_change_signature(&public, &tampered, &change.signature).unwrap());
}

#[test]
fn test_self_removal_always_permitted() {
    let mut s = scenario(AccessRequired::Member, AccessRequired::Administrator);
    let (bob, carol) = (s.bob.clone(), s.carol.clone());

    assert_access_denied(
        s.modify(&bob, Actions::at_version(1).delete_member(carol.aci.clone())),
        "members",
    );
    assert_applied(s.modify(&bob, Actions::at_version(1).delete_member(bob.aci.clone())));
    assert!(s.group.get_member(&bob.aci).is_none());
    assert!(s.group.get_member(&carol.aci).is_some());
}

#[test]
fn test_self_profile_key_update() {
    let mut s = scenario(AccessRequired::Administrator, AccessRequired::Administrator);
    let (bob, carol) = (s.bob.clone(), s.carol.clone());
    let new_key = s.fx.user(77).profile_key;

    let presentation = s.fx.presentation_with_key(&bob, &new_key);
    assert_applied(s.modify(&bob, Actions::at_version(1).modify_profile_key(presentation)));
    assert_eq!(s.group.get_member(&bob.aci).unwrap().profile_key_ciphertext, new_key);

    // Carol cannot swap Bob's key, even with a valid presentation for Bob
    let foreign = s.fx.presentation_with_key(&bob, &s.fx.user(78).profile_key);
    let err = assert_err(s.modify(&carol, Actions::at_version(2).modify_profile_key(foreign)));
    assert!(matches!(err, GroupError::CredentialVerification(_)));
}

#[test]
fn test_scenario_sole_admin_deletes_self() {
    let fx = GroupFixture::new();
    let admin = fx.user(1);
    let access = AccessControl::new(
        AccessRequired::Administrator,
        AccessRequired::Administrator,
        AccessRequired::Any,
    );
    let mut group = fx.build(fx.initial_state(access, &[(&admin, Role::Administrator)])).unwrap();

    let leave = Actions::at_version(1).delete_member(admin.aci.clone());
    assert_applied(group.modify(&admin.aci, &admin.pni, leave));
    assert!(group.current_state().members.is_empty());
    assert_eq!(group.version(), 1);
}

#[test]
fn test_scenario_two_callers_same_version() {
    let mut s = scenario(AccessRequired::Member, AccessRequired::Member);
    let (admin, bob) = (s.admin.clone(), s.bob.clone());
    for v in 1..=3 {
        assert_applied(s.modify(&admin, Actions::at_version(v).disappearing_messages_timer(v)));
    }

    let first = s.modify(&admin, Actions::at_version(4).title("admin wins"));
    let second = s.modify(&bob, Actions::at_version(4).title("bob loses"));

    assert_applied(first);
    assert_conflict(second, 5, 4);
    assert_eq!(s.group.current_state().title, b"admin wins");
    assert_eq!(s.group.version(), 4);
}

#[test]
fn test_scenario_unsatisfiable_members_locks_everyone() {
    let mut s = scenario(AccessRequired::Member, AccessRequired::Unsatisfiable);
    let (admin, bob, dave) = (s.admin.clone(), s.bob.clone(), s.dave.clone());

    let add = s.fx.presentation(&dave);
    assert_access_denied(
        s.modify(&admin, Actions::at_version(1).add_member(Role::Default, add)),
        "members",
    );
    assert_access_denied(
        s.modify(&admin, Actions::at_version(1).add_pending_member(&dave.aci, Role::Default)),
        "members",
    );
    assert_access_denied(
        s.modify(&admin, Actions::at_version(1).delete_member(bob.aci.clone())),
        "members",
    );
    assert_eq!(s.group.version(), 0);
}

#[test]
fn test_non_member_denied_member_gated_actions() {
    let mut s = scenario(AccessRequired::Member, AccessRequired::Member);
    let dave = s.dave.clone();
    let carol = s.carol.clone();
    assert_access_denied(s.modify(&dave, Actions::at_version(1).title("outsider")), "attributes");
    assert_access_denied(
        s.modify(&dave, Actions::at_version(1).add_pending_member(&carol.pni, Role::Default)),
        "members",
    );
}

#[test]
fn test_any_access_admits_non_members() {
    let mut s = scenario(AccessRequired::Any, AccessRequired::Member);
    let dave = s.dave.clone();
    assert_applied(s.modify(&dave, Actions::at_version(1).avatar("cdn/avatars/abc")));
    assert_eq!(s.group.current_state().avatar, "cdn/avatars/abc");
}

#[test]
fn test_add_member_records_join_version() {
    let mut s = scenario(AccessRequired::Member, AccessRequired::Member);
    let (bob, dave) = (s.bob.clone(), s.dave.clone());
    assert_applied(s.modify(&bob, Actions::at_version(1).title("x")));

    let change = assert_applied(s.modify(
        &bob,
        Actions::at_version(2).add_member(Role::Default, s.fx.presentation(&dave)),
    ));
    let member = s.group.get_member(&dave.aci).unwrap();
    assert_eq!(member.joined_at_version, 2);
    assert_eq!(member.profile_key_ciphertext, dave.profile_key);
    assert_eq!(change.actions.add_members, vec![member.clone()]);
}

#[test]
fn test_add_existing_member_rejected() {
    let mut s = scenario(AccessRequired::Member, AccessRequired::Member);
    let (admin, bob) = (s.admin.clone(), s.bob.clone());
    let err = assert_err(s.modify(
        &admin,
        Actions::at_version(1).add_member(Role::Default, s.fx.presentation(&bob)),
    ));
    assert!(matches!(err, GroupError::Validation(_)));
}

#[test]
fn test_delete_absent_member_rejected() {
    let mut s = scenario(AccessRequired::Member, AccessRequired::Member);
    let (admin, dave) = (s.admin.clone(), s.dave.clone());
    let err = assert_err(s.modify(&admin, Actions::at_version(1).delete_member(dave.aci.clone())));
    assert!(matches!(err, GroupError::Validation(_)));
}

#[test]
fn test_add_pending_records_inviter() {
    let mut s = scenario(AccessRequired::Member, AccessRequired::Member);
    let (bob, dave) = (s.bob.clone(), s.dave.clone());
    let invite = Actions::at_version(1).add_pending_member(&dave.pni, Role::Administrator);
    assert_applied(s.modify(&bob, invite));

    let pending = s.group.get_pending_member(&dave.pni).unwrap();
    assert_eq!(pending.added_by_user_id, bob.aci);
    assert_eq!(pending.role, Role::Administrator);
    assert!(pending.timestamp > 0);
    assert!(s.group.get_member(&dave.pni).is_none());
}

#[test]
fn test_add_pending_rejects_bad_input() {
    let mut s = scenario(AccessRequired::Member, AccessRequired::Member);
    let (admin, bob, dave) = (s.admin.clone(), s.bob.clone(), s.dave.clone());

    let mut no_role = Actions::at_version(1);
    no_role
        .add_pending_members
        .push(AddPendingMemberAction { user_id: dave.aci.as_bytes().to_vec(), role: None });
    assert!(matches!(s.modify(&admin, no_role), Err(GroupError::Validation(_))));

    let mut short_id = Actions::at_version(1);
    short_id
        .add_pending_members
        .push(AddPendingMemberAction { user_id: vec![1; 12], role: Some(Role::Default) });
    assert!(matches!(s.modify(&admin, short_id), Err(GroupError::Validation(_))));

    assert!(matches!(
        s.modify(&admin, Actions::at_version(1).add_pending_member(&bob.aci, Role::Default)),
        Err(GroupError::Validation(_))
    ));
    assert_eq!(s.group.version(), 0);
}

#[test]
fn test_delete_pending_only_by_invitee() {
    let mut s = scenario(AccessRequired::Member, AccessRequired::Member);
    let (admin, dave) = (s.admin.clone(), s.dave.clone());
    let invite = Actions::at_version(1).add_pending_member(&dave.pni, Role::Default);
    assert_applied(s.modify(&admin, invite));

    assert_access_denied(
        s.modify(&admin, Actions::at_version(2).delete_pending_member(dave.pni.clone())),
        "pending_members",
    );

    // Declining by the secondary identity, acting as a non-member
    assert_applied(s.modify(&dave, Actions::at_version(2).delete_pending_member(dave.pni.clone())));
    assert!(s.group.get_pending_member(&dave.pni).is_none());

    let decline_again = Actions::at_version(3).delete_pending_member(dave.aci.clone());
    let err = assert_err(s.modify(&dave, decline_again));
    assert!(matches!(err, GroupError::Validation(_)));
}

#[test]
fn test_promote_pending_member() {
    let mut s = scenario(AccessRequired::Member, AccessRequired::Member);
    let (admin, dave) = (s.admin.clone(), s.dave.clone());
    let invite = Actions::at_version(1).add_pending_member(&dave.aci, Role::Administrator);
    assert_applied(s.modify(&admin, invite));

    let accept = Actions::at_version(2).promote_pending(s.fx.presentation(&dave));
    let change = assert_applied(s.modify(&dave, accept));

    let member = s.group.get_member(&dave.aci).unwrap();
    assert_eq!(member.role, Role::Default);
    assert_eq!(member.profile_key_ciphertext, dave.profile_key);
    assert!(s.group.get_pending_member(&dave.aci).is_none());
    assert_eq!(change.actions.promote_pending_members.len(), 1);
    assert_eq!(change.change_epoch, grouplog_core::group::CHANGE_EPOCH_DEFAULT);
}

#[test]
fn test_promotion_failures() {
    let mut s = scenario(AccessRequired::Member, AccessRequired::Member);
    let (admin, bob, dave) = (s.admin.clone(), s.bob.clone(), s.dave.clone());

    // Already active
    let accept = Actions::at_version(1).promote_pending(s.fx.presentation(&bob));
    let err = assert_err(s.modify(&bob, accept));
    assert!(matches!(err, GroupError::CredentialVerification(_)));

    // Never pending
    let accept = Actions::at_version(1).promote_pending(s.fx.presentation(&dave));
    let err = assert_err(s.modify(&dave, accept));
    assert!(matches!(err, GroupError::CredentialVerification(_)));

    // Presentation for someone other than the caller
    let invite = Actions::at_version(1).add_pending_member(&dave.aci, Role::Default);
    assert_applied(s.modify(&admin, invite));
    let accept = Actions::at_version(2).promote_pending(s.fx.presentation(&dave));
    let err = assert_err(s.modify(&bob, accept));
    assert!(matches!(err, GroupError::CredentialVerification(_)));

    // Forged
    let forged = GroupFixture::forge(&s.fx.presentation(&dave));
    let err = assert_err(s.modify(&dave, Actions::at_version(2).promote_pending(forged)));
    assert!(matches!(err, GroupError::CredentialVerification(_)));

    assert!(s.group.get_pending_member(&dave.aci).is_some());
    assert_eq!(s.group.version(), 1);
}

#[test]
fn test_pni_promotion() {
    let mut s = scenario(AccessRequired::Member, AccessRequired::Member);
    let (admin, dave) = (s.admin.clone(), s.dave.clone());
    let invite = Actions::at_version(1).add_pending_member(&dave.pni, Role::Default);
    assert_applied(s.modify(&admin, invite));

    let accept = Actions::at_version(2).promote_pending_pni(s.fx.presentation(&dave));
    let change = assert_applied(s.modify(&dave, accept));

    assert_eq!(change.change_epoch, grouplog_core::group::CHANGE_EPOCH_PNI_PROMOTION);
    assert_eq!(change.actions.source_user_id, dave.pni);
    let promoted = &change.actions.promote_pending_pni_aci_members[0];
    assert_eq!((&promoted.aci, &promoted.pni), (&dave.aci, &dave.pni));
    assert!(s.group.get_member(&dave.aci).is_some());
    assert!(s.group.get_pending_member(&dave.pni).is_none());
    assert_disjoint(s.group.current_state());
}

#[test]
fn test_pni_promotion_rejects_double_invitation() {
    let mut s = scenario(AccessRequired::Member, AccessRequired::Member);
    let (admin, dave) = (s.admin.clone(), s.dave.clone());
    assert_applied(s.modify(
        &admin,
        Actions::at_version(1)
            .add_pending_member(&dave.pni, Role::Default)
            .add_pending_member(&dave.aci, Role::Default),
    ));

    let accept = Actions::at_version(2).promote_pending_pni(s.fx.presentation(&dave));
    let err = assert_err(s.modify(&dave, accept));
    assert!(matches!(err, GroupError::CredentialVerification(_)));
    assert_eq!(s.group.current_state().pending_members.len(), 2);
}

#[test]
fn test_pni_promotion_rejects_active_member() {
    let mut s = scenario(AccessRequired::Member, AccessRequired::Member);
    let (admin, bob) = (s.admin.clone(), s.bob.clone());

    // Bob is already active under his ACI
    let invite = Actions::at_version(1).add_pending_member(&bob.pni, Role::Default);
    assert_applied(s.modify(&admin, invite));
    let before = s.group.current_state().clone();

    let accept = Actions::at_version(2).promote_pending_pni(s.fx.presentation(&bob));
    let err = assert_err(s.modify(&bob, accept));

    assert!(matches!(err, GroupError::CredentialVerification(_)));
    assert_eq!(s.group.version(), 1);
    assert_eq!(s.group.current_state(), &before);
    assert!(s.group.get_pending_member(&bob.pni).is_some());
}

#[test]
fn test_member_roles_are_admin_only() {
    let mut s = scenario(AccessRequired::Member, AccessRequired::Member);
    let (admin, bob) = (s.admin.clone(), s.bob.clone());

    let promote = Actions::at_version(1).modify_member_role(bob.aci.clone(), Role::Administrator);
    assert_access_denied(s.modify(&bob, promote.clone()), "member_roles");
    assert_applied(s.modify(&admin, promote));
    assert_eq!(s.group.get_member(&bob.aci).unwrap().role, Role::Administrator);
}

#[test]
fn test_access_control_changes() {
    let mut s = scenario(AccessRequired::Member, AccessRequired::Member);
    let (admin, bob, dave) = (s.admin.clone(), s.bob.clone(), s.dave.clone());

    assert_access_denied(
        s.modify(&bob, Actions::at_version(1).members_access(AccessRequired::Any)),
        "access_control",
    );
    assert!(matches!(
        s.modify(&admin, Actions::at_version(1).attributes_access(AccessRequired::Unknown)),
        Err(GroupError::Validation(_))
    ));

    // The lock takes effect from the next version, not within this bundle
    assert_applied(s.modify(
        &admin,
        Actions::at_version(1)
            .members_access(AccessRequired::Unsatisfiable)
            .add_pending_member(&dave.aci, Role::Default),
    ));
    assert_eq!(s.group.current_state().access_control.members, AccessRequired::Unsatisfiable);
    assert!(s.group.get_pending_member(&dave.aci).is_some());

    assert_access_denied(
        s.modify(&admin, Actions::at_version(2).add_pending_member(&bob.pni, Role::Default)),
        "members",
    );
}

#[test]
fn test_group_size_limit() {
    let fx = GroupFixture::new();
    let (admin, bob, carol) = (fx.user(1), fx.user(2), fx.user(3));
    let access =
        AccessControl::new(AccessRequired::Member, AccessRequired::Member, AccessRequired::Any);
    let config = GroupConfig { max_group_size: 2, ..GroupConfig::default() };
    let initial = fx.initial_state(access, &[(&admin, Role::Administrator)]);
    let mut group = fx.build_with_config(initial, config).unwrap();

    let invite = Actions::at_version(1).add_pending_member(&bob.aci, Role::Default);
    assert_applied(group.modify(&admin.aci, &admin.pni, invite));
    let err = assert_err(group.modify(
        &admin.aci,
        &admin.pni,
        Actions::at_version(2).add_pending_member(&carol.aci, Role::Default),
    ));
    assert!(matches!(err, GroupError::Validation(_)));
}

#[test]
fn test_description_limit() {
    let fx = GroupFixture::new();
    let admin = fx.user(1);
    let access =
        AccessControl::new(AccessRequired::Member, AccessRequired::Member, AccessRequired::Any);
    let config = GroupConfig { max_description_bytes: 8, ..GroupConfig::default() };
    let initial = fx.initial_state(access, &[(&admin, Role::Administrator)]);
    let mut group = fx.build_with_config(initial, config).unwrap();

    let short = Actions::at_version(1).description("short");
    assert_applied(group.modify(&admin.aci, &admin.pni, short));
    let long = Actions::at_version(2).description("far too long");
    let err = assert_err(group.modify(&admin.aci, &admin.pni, long));
    assert!(matches!(err, GroupError::Validation(_)));
    assert_eq!(group.current_state().description, b"short");
}

// Batches that touch the same identity more than once

#[test]
fn test_batch_add_then_delete_same_member() {
    let mut s = scenario(AccessRequired::Member, AccessRequired::Member);
    let (admin, dave) = (s.admin.clone(), s.dave.clone());
    let change = assert_applied(s.modify(
        &admin,
        Actions::at_version(1)
            .add_member(Role::Default, s.fx.presentation(&dave))
            .delete_member(dave.aci.clone()),
    ));
    assert!(s.group.get_member(&dave.aci).is_none());
    assert_eq!(change.actions.add_members.len(), 1);
    assert_eq!(change.actions.delete_members, vec![dave.aci.clone()]);
}

#[test]
fn test_batch_delete_then_reinvite_same_member() {
    let mut s = scenario(AccessRequired::Member, AccessRequired::Member);
    let (admin, carol) = (s.admin.clone(), s.carol.clone());
    assert_applied(s.modify(
        &admin,
        Actions::at_version(1)
            .delete_member(carol.aci.clone())
            .add_pending_member(&carol.aci, Role::Default),
    ));
    assert!(s.group.get_member(&carol.aci).is_none());
    assert!(s.group.get_pending_member(&carol.aci).is_some());
    assert_disjoint(s.group.current_state());
}

#[test]
fn test_batch_duplicate_invitation_rejected_whole() {
    let mut s = scenario(AccessRequired::Member, AccessRequired::Member);
    let (admin, dave) = (s.admin.clone(), s.dave.clone());
    let err = assert_err(s.modify(
        &admin,
        Actions::at_version(1)
            .title("never applied")
            .add_pending_member(&dave.aci, Role::Default)
            .add_pending_member(&dave.aci, Role::Administrator),
    ));
    assert!(matches!(err, GroupError::Validation(_)));
    assert!(s.group.current_state().title.is_empty());
    assert!(s.group.current_state().pending_members.is_empty());
}

#[test]
fn test_batch_decline_then_promote_fails() {
    let mut s = scenario(AccessRequired::Member, AccessRequired::Member);
    let (admin, dave) = (s.admin.clone(), s.dave.clone());
    let invite = Actions::at_version(1).add_pending_member(&dave.aci, Role::Default);
    assert_applied(s.modify(&admin, invite));

    // Delete-pending runs before promote, so the invitation is already gone
    let err = assert_err(s.modify(
        &dave,
        Actions::at_version(2)
            .promote_pending(s.fx.presentation(&dave))
            .delete_pending_member(dave.aci.clone()),
    ));
    assert!(matches!(err, GroupError::CredentialVerification(_)));
    assert!(s.group.get_pending_member(&dave.aci).is_some());
}

#[test]
fn test_direct_add_supersedes_invitation() {
    let mut s = scenario(AccessRequired::Member, AccessRequired::Member);
    let (admin, dave) = (s.admin.clone(), s.dave.clone());
    let invite = Actions::at_version(1).add_pending_member(&dave.aci, Role::Default);
    assert_applied(s.modify(&admin, invite));
    let admit = Actions::at_version(2).add_member(Role::Administrator, s.fx.presentation(&dave));
    assert_applied(s.modify(&admin, admit));

    assert!(s.group.get_pending_member(&dave.aci).is_none());
    assert_eq!(s.group.get_member(&dave.aci).unwrap().role, Role::Administrator);
    assert_disjoint(s.group.current_state());
}

#[test]
fn test_missing_version() {
    let mut s = scenario(AccessRequired::Member, AccessRequired::Member);
    let admin = s.admin.clone();
    let err = assert_err(s.modify(&admin, Actions::default().title("no version")));
    assert!(matches!(err, GroupError::Validation(_)));
}
