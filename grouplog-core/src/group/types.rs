//! Type definitions for group membership

use super::errors::{GroupError, GroupResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of an encrypted user identity
pub const USER_ID_LEN: usize = 65;

/// Encrypted account identity (fixed-length ciphertext)
///
/// Active members only ever carry ids extracted by a
/// [`CredentialVerifier`](super::credentials::CredentialVerifier).
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(Vec<u8>);

impl UserId {
    /// Wrap raw ciphertext bytes, rejecting the wrong length
    pub fn from_bytes(bytes: &[u8]) -> GroupResult<Self> {
        if bytes.len() != USER_ID_LEN {
            return Err(GroupError::Validation(format!(
                "user id must be {} bytes, got {}",
                USER_ID_LEN,
                bytes.len()
            )));
        }
        Ok(Self(bytes.to_vec()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// First bytes as hex, for log fields
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8.min(self.0.len())])
    }
}

impl fmt::Debug for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserId({}..)", self.short())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl AsRef<[u8]> for UserId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Encrypted profile key of a member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileKeyCiphertext(pub Vec<u8>);

impl ProfileKeyCiphertext {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Zero-knowledge credential presentation, opaque to this crate
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Presentation(pub Vec<u8>);

impl Presentation {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Presentation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Presentation({} bytes)", self.0.len())
    }
}

/// Role of a member in a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Regular member
    Default,
    /// Can satisfy ADMINISTRATOR access requirements
    Administrator,
}

impl Role {
    pub fn is_administrator(&self) -> bool {
        matches!(self, Role::Administrator)
    }
}

/// Required access level for a group attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AccessRequired {
    /// Missing or unrecognized configuration
    #[default]
    Unknown,
    /// Anyone, member or not
    Any,
    /// Any current member
    Member,
    /// Administrators only
    Administrator,
    /// Permanently locked
    Unsatisfiable,
}

impl AccessRequired {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessRequired::Unknown => "unknown",
            AccessRequired::Any => "any",
            AccessRequired::Member => "member",
            AccessRequired::Administrator => "administrator",
            AccessRequired::Unsatisfiable => "unsatisfiable",
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, AccessRequired::Unknown)
    }
}

impl fmt::Display for AccessRequired {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-attribute access configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AccessControl {
    /// Title and other metadata edits
    #[serde(default)]
    pub attributes: AccessRequired,
    /// Adding and removing active members
    #[serde(default)]
    pub members: AccessRequired,
    /// Joining through an invite link
    #[serde(default)]
    pub add_from_invite_link: AccessRequired,
}

impl AccessControl {
    pub fn new(
        attributes: AccessRequired,
        members: AccessRequired,
        add_from_invite_link: AccessRequired,
    ) -> Self {
        Self { attributes, members, add_from_invite_link }
    }

    /// Name of the first level still set to `Unknown`
    pub fn first_unknown(&self) -> Option<&'static str> {
        if !self.attributes.is_known() {
            Some("attributes")
        } else if !self.members.is_known() {
            Some("members")
        } else if !self.add_from_invite_link.is_known() {
            Some("add_from_invite_link")
        } else {
            None
        }
    }
}

/// Active, credential-verified member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub user_id: UserId,
    pub role: Role,
    pub profile_key_ciphertext: ProfileKeyCiphertext,
    /// Version at which the member became active
    pub joined_at_version: u32,
}

/// Invited member that has not yet proven its identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingMember {
    pub user_id: UserId,
    pub role: Role,
    pub added_by_user_id: UserId,
    /// Milliseconds since the unix epoch
    pub timestamp: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_length_is_enforced() {
        assert!(UserId::from_bytes(&[7u8; USER_ID_LEN]).is_ok());
        assert!(matches!(UserId::from_bytes(&[7u8; 16]), Err(GroupError::Validation(_))));
        assert!(UserId::from_bytes(&[]).is_err());
    }

    #[test]
    fn test_user_id_display() {
        let id = UserId::from_bytes(&[0xAB; USER_ID_LEN]).unwrap();
        assert_eq!(id.to_string().len(), USER_ID_LEN * 2);
        assert_eq!(id.short(), "abababababababab");
        assert_eq!(format!("{:?}", id), "UserId(abababababababab..)");
    }

    #[test]
    fn test_access_control_first_unknown() {
        let complete = AccessControl::new(
            AccessRequired::Member,
            AccessRequired::Administrator,
            AccessRequired::Unsatisfiable,
        );
        assert_eq!(complete.first_unknown(), None);

        let mut partial = complete;
        partial.members = AccessRequired::Unknown;
        assert_eq!(partial.first_unknown(), Some("members"));

        assert_eq!(AccessControl::default().first_unknown(), Some("attributes"));
    }

    #[test]
    fn test_access_control_missing_fields_deserialize_as_unknown() {
        let parsed: AccessControl = serde_json::from_str(r#"{"attributes":"Any"}"#).unwrap();
        assert_eq!(parsed.attributes, AccessRequired::Any);
        assert_eq!(parsed.members, AccessRequired::Unknown);
        assert_eq!(parsed.add_from_invite_link, AccessRequired::Unknown);
    }

    #[test]
    fn test_role_is_administrator() {
        assert!(Role::Administrator.is_administrator());
        assert!(!Role::Default.is_administrator());
    }
}
