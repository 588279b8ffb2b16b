//! Error types for group state operations

use thiserror::Error;

/// Result type for group operations
pub type GroupResult<T> = Result<T, GroupError>;

/// Errors that abort a `construct` or `modify` call
///
/// A version conflict is not an error; see
/// [`ModifyOutcome::Conflict`](super::server_group::ModifyOutcome::Conflict).
#[derive(Debug, Error)]
pub enum GroupError {
    /// Malformed initial state or action bundle
    #[error("Validation failed: {0}")]
    Validation(String),

    /// An attribute-level access check failed
    #[error("Access denied for {attribute}: {reason}")]
    AccessDenied { attribute: String, reason: String },

    /// A presentation failed verification or verified to the wrong identity
    #[error("Credential verification failed: {0}")]
    CredentialVerification(String),

    /// Canonical encoding of the applied actions failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The signer could not produce a signature
    #[error("Signing failed: {0}")]
    Signing(String),

    /// The owning actor task is gone
    #[error("Group handle closed: {0}")]
    HandleClosed(String),
}

/// Coarse classification used for log fields and metric labels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupErrorKind {
    Validation,
    AccessDenied,
    CredentialVerification,
    Serialization,
    Signing,
    HandleClosed,
}

impl GroupErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupErrorKind::Validation => "validation",
            GroupErrorKind::AccessDenied => "access_denied",
            GroupErrorKind::CredentialVerification => "credential_verification",
            GroupErrorKind::Serialization => "serialization",
            GroupErrorKind::Signing => "signing",
            GroupErrorKind::HandleClosed => "handle_closed",
        }
    }
}

impl GroupError {
    /// Shorthand for an access denial on `attribute`
    pub fn access_denied(attribute: impl Into<String>, reason: impl Into<String>) -> Self {
        GroupError::AccessDenied { attribute: attribute.into(), reason: reason.into() }
    }

    pub fn kind(&self) -> GroupErrorKind {
        match self {
            GroupError::Validation(_) => GroupErrorKind::Validation,
            GroupError::AccessDenied { .. } => GroupErrorKind::AccessDenied,
            GroupError::CredentialVerification(_) => GroupErrorKind::CredentialVerification,
            GroupError::Serialization(_) => GroupErrorKind::Serialization,
            GroupError::Signing(_) => GroupErrorKind::Signing,
            GroupError::HandleClosed(_) => GroupErrorKind::HandleClosed,
        }
    }
}

impl From<bincode::Error> for GroupError {
    fn from(e: bincode::Error) -> Self {
        GroupError::Serialization(e.to_string())
    }
}
