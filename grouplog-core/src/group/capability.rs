//! Read-side capability shared by every group variant

use super::change_log::ChangeLogEntry;
use super::credentials::GroupPublicParams;
use super::state::GroupState;
use super::types::{Member, PendingMember, UserId};

/// What observers of a group may ask of it
///
/// `ServerGroup` is the authoritative implementation. A client-side mirror
/// would implement this trait separately rather than share state with it.
pub trait Group {
    fn current_state(&self) -> &GroupState;

    fn public_params(&self) -> &GroupPublicParams;

    /// Change log suffix starting at `index`; empty past the end
    fn changes_since(&self, index: usize) -> &[ChangeLogEntry];

    fn version(&self) -> u32 {
        self.current_state().version
    }

    fn get_member(&self, user_id: &UserId) -> Option<&Member> {
        self.current_state().get_member(user_id)
    }

    fn get_pending_member(&self, user_id: &UserId) -> Option<&PendingMember> {
        self.current_state().get_pending_member(user_id)
    }
}
