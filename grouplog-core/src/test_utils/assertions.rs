//! Assertion helpers for group tests
//!
//! Each helper panics with the full outcome on mismatch, so a failing
//! scenario shows what actually happened.

use crate::group::{GroupError, GroupResult, GroupState, ModifyOutcome, SignedChange};
use std::collections::HashSet;
use std::fmt::Debug;

/// Assert that a Result is Ok and return the value
pub fn assert_ok<T, E: Debug>(result: Result<T, E>) -> T {
    match result {
        Ok(value) => value,
        Err(e) => panic!("Expected Ok, got Err: {:?}", e),
    }
}

/// Assert that a Result is Err and return the error
pub fn assert_err<T: Debug, E>(result: Result<T, E>) -> E {
    match result {
        Ok(value) => panic!("Expected Err, got Ok: {:?}", value),
        Err(e) => e,
    }
}

/// Assert a committed change and return it
pub fn assert_applied(result: GroupResult<ModifyOutcome>) -> SignedChange {
    match result {
        Ok(ModifyOutcome::Applied(change)) => change,
        other => panic!("Expected Applied, got {:?}", other),
    }
}

/// Assert a version conflict with the given versions
pub fn assert_conflict(result: GroupResult<ModifyOutcome>, expected: u32, requested: u32) {
    match result {
        Ok(ModifyOutcome::Conflict { expected_version, requested_version }) => {
            assert_eq!(
                (expected_version, requested_version),
                (expected, requested),
                "conflict carried the wrong versions"
            );
        }
        other => panic!("Expected Conflict {{ {}, {} }}, got {:?}", expected, requested, other),
    }
}

/// Assert an access denial on `attribute`
pub fn assert_access_denied(result: GroupResult<ModifyOutcome>, attribute: &str) {
    match result {
        Err(GroupError::AccessDenied { attribute: denied, .. }) if denied == attribute => {}
        other => panic!("Expected AccessDenied on {}, got {:?}", attribute, other),
    }
}

/// Assert that no identity is both active and pending, and none repeats
pub fn assert_disjoint(state: &GroupState) {
    let mut seen = HashSet::new();
    for id in state
        .members
        .iter()
        .map(|m| &m.user_id)
        .chain(state.pending_members.iter().map(|p| &p.user_id))
    {
        if !seen.insert(id) {
            panic!("{:?} appears more than once at version {}", id, state.version);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assert_ok_and_err() {
        let ok: Result<u8, &str> = Ok(3);
        assert_eq!(assert_ok(ok), 3);
        let err: Result<u8, &str> = Err("nope");
        assert_eq!(assert_err(err), "nope");
    }

    #[test]
    fn test_assert_conflict_accepts_matching_versions() {
        let outcome = ModifyOutcome::Conflict { expected_version: 4, requested_version: 2 };
        assert_conflict(Ok(outcome), 4, 2);
    }

    #[test]
    #[should_panic(expected = "Expected AccessDenied")]
    fn test_assert_access_denied_checks_attribute() {
        let denied = GroupError::access_denied("members", "not a member");
        assert_access_denied(Err(denied), "attributes");
    }
}
