//! Credential verification and change signing boundaries
//!
//! The zero-knowledge proof system is not implemented here. Groups talk to it
//! through [`CredentialVerifier`], and sign committed changes through
//! [`Signer`]. Both are synchronous, local computations.

use super::errors::{GroupError, GroupResult};
use super::types::{ProfileKeyCiphertext, Presentation, UserId};
use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Serialized group public parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupPublicParams(pub Vec<u8>);

impl GroupPublicParams {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Serialized group secret parameters
///
/// Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct GroupSecretParams(Vec<u8>);

impl GroupSecretParams {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for GroupSecretParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "GroupSecretParams(<redacted>)")
    }
}

/// Identity material extracted from a verified presentation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedCredential {
    pub user_id: UserId,
    pub profile_key_ciphertext: ProfileKeyCiphertext,
}

/// Presentation rejected by the proof system
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct CredentialError(pub String);

impl From<CredentialError> for GroupError {
    fn from(e: CredentialError) -> Self {
        GroupError::CredentialVerification(e.0)
    }
}

/// Verifies membership / profile-key presentations
///
/// Implementations must be deterministic and side-effect free.
pub trait CredentialVerifier: Send + Sync {
    fn verify(
        &self,
        params: &GroupPublicParams,
        presentation: &Presentation,
    ) -> Result<VerifiedCredential, CredentialError>;
}

/// Signs the canonical encoding of applied actions
///
/// Must return the same signature for the same key and message.
pub trait Signer: Send + Sync {
    fn sign(&self, secret: &GroupSecretParams, message: &[u8]) -> GroupResult<Vec<u8>>;
}

const SIGNING_KEY_LABEL: &[u8] = b"grouplog.change-signing.v1";

/// Ed25519 signer keyed from the group secret parameters
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519Signer;

impl Ed25519Signer {
    fn signing_key(secret: &GroupSecretParams) -> SigningKey {
        let mut hasher = Sha256::new();
        hasher.update(SIGNING_KEY_LABEL);
        hasher.update(secret.as_bytes());
        let mut seed = [0u8; 32];
        seed.copy_from_slice(&hasher.finalize());
        let key = SigningKey::from_bytes(&seed);
        seed.zeroize();
        key
    }

    /// Public half of the change-signing key
    pub fn public_key(secret: &GroupSecretParams) -> [u8; 32] {
        Self::signing_key(secret).verifying_key().to_bytes()
    }
}

impl Signer for Ed25519Signer {
    fn sign(&self, secret: &GroupSecretParams, message: &[u8]) -> GroupResult<Vec<u8>> {
        Ok(Self::signing_key(secret).sign(message).to_bytes().to_vec())
    }
}

/// Check a change signature produced by [`Ed25519Signer`]
pub fn verify_change_signature(
    public_key: &[u8; 32],
    message: &[u8],
    signature: &[u8],
) -> GroupResult<bool> {
    let key = VerifyingKey::from_bytes(public_key)
        .map_err(|e| GroupError::Signing(format!("Invalid Ed25519 public key: {}", e)))?;

    let sig_array: [u8; 64] = match signature.try_into() {
        Ok(bytes) => bytes,
        Err(_) => return Ok(false),
    };

    Ok(key.verify(message, &Signature::from_bytes(&sig_array)).is_ok())
}
