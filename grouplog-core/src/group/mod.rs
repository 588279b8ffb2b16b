//! Authoritative group membership
//!
//! A group is a versioned snapshot of metadata, access control, active
//! members and pending (invited) members. [`ServerGroup`] owns the append-only
//! [`ChangeLog`] of those snapshots and is the only place new versions are
//! produced. Each accepted [`Actions`] bundle becomes one signed log entry.

pub mod access;
pub mod actions;
pub(crate) mod apply;
pub mod capability;
pub mod change_log;
pub mod credentials;
pub mod errors;
pub mod handle;
pub mod server_group;
pub mod state;
pub mod types;

pub use access::verify_access;
pub use actions::{
    Actions, AddMemberAction, AddPendingMemberAction, AppliedActions, MemberRoleChange,
    ModifyMemberRoleAction, ProfileKeyChange, PromotedMember, PromotedPniMember, SignedChange,
    APPLIED_ACTIONS_FORMAT, CHANGE_EPOCH_DEFAULT, CHANGE_EPOCH_PNI_PROMOTION,
};
pub use capability::Group;
pub use change_log::{ChangeLog, ChangeLogEntry};
pub use credentials::{
    verify_change_signature, CredentialError, CredentialVerifier, Ed25519Signer, GroupPublicParams,
    GroupSecretParams, Signer, VerifiedCredential,
};
pub use errors::{GroupError, GroupErrorKind, GroupResult};
pub use handle::{GroupCommand, GroupHandle};
pub use server_group::{ModifyOutcome, ServerGroup};
pub use state::{GroupState, InitialGroupState, InitialMember};
pub use types::{
    AccessControl, AccessRequired, Member, PendingMember, Presentation, ProfileKeyCiphertext, Role,
    UserId, USER_ID_LEN,
};
