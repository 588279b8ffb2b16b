//! Fixtures for building groups in tests
//!
//! Presentations produced here are `identity ‖ profile key ‖ tag`, where the
//! tag is SHA-256 over the group public params, identity and profile key.
//! [`MockCredentialVerifier`] accepts exactly those, so a presentation made
//! for one group does not verify against another.

use crate::config::GroupConfig;
use crate::group::{
    AccessControl, CredentialError, CredentialVerifier, Ed25519Signer, GroupPublicParams,
    GroupResult, GroupSecretParams, InitialGroupState, InitialMember, Presentation,
    ProfileKeyCiphertext, Role, ServerGroup, UserId, VerifiedCredential, USER_ID_LEN,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Seed used by [`GroupFixture::new`]
pub const DEFAULT_TEST_SEED: u64 = 42;

const TAG_LEN: usize = 32;
const PROFILE_KEY_LEN: usize = 32;

/// Leading byte of generated primary identities
pub const ACI_MARKER: u8 = 0x01;
/// Leading byte of generated phone-number identities
pub const PNI_MARKER: u8 = 0x02;

/// Deterministic bytes for `seed`
pub fn seeded_bytes(seed: u64, len: usize) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| rng.random()).collect()
}

fn presentation_tag(
    params: &GroupPublicParams,
    identity: &[u8],
    profile_key: &[u8],
) -> [u8; TAG_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(params.as_bytes());
    hasher.update(identity);
    hasher.update(profile_key);
    let mut tag = [0u8; TAG_LEN];
    tag.copy_from_slice(&hasher.finalize());
    tag
}

/// Credential verifier that checks the fixture's tagged presentations
#[derive(Debug, Clone, Copy, Default)]
pub struct MockCredentialVerifier;

impl MockCredentialVerifier {
    /// Build a presentation that verifies to `user_id` and `profile_key` under `params`
    pub fn present(
        params: &GroupPublicParams,
        user_id: &UserId,
        profile_key: &ProfileKeyCiphertext,
    ) -> Presentation {
        let mut bytes = Vec::with_capacity(USER_ID_LEN + profile_key.0.len() + TAG_LEN);
        bytes.extend_from_slice(user_id.as_bytes());
        bytes.extend_from_slice(profile_key.as_bytes());
        let tag = presentation_tag(params, user_id.as_bytes(), profile_key.as_bytes());
        bytes.extend_from_slice(&tag);
        Presentation(bytes)
    }
}

impl CredentialVerifier for MockCredentialVerifier {
    fn verify(
        &self,
        params: &GroupPublicParams,
        presentation: &Presentation,
    ) -> Result<VerifiedCredential, CredentialError> {
        let bytes = presentation.as_bytes();
        if bytes.len() < USER_ID_LEN + TAG_LEN {
            return Err(CredentialError(format!("presentation too short: {} bytes", bytes.len())));
        }

        let (body, tag) = bytes.split_at(bytes.len() - TAG_LEN);
        let (identity, profile_key) = body.split_at(USER_ID_LEN);
        if presentation_tag(params, identity, profile_key).as_slice() != tag {
            return Err(CredentialError("presentation tag mismatch".to_string()));
        }

        let user_id = UserId::from_bytes(identity).map_err(|e| CredentialError(e.to_string()))?;
        Ok(VerifiedCredential {
            user_id,
            profile_key_ciphertext: ProfileKeyCiphertext(profile_key.to_vec()),
        })
    }
}

/// A user with both identities and a profile key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestUser {
    pub aci: UserId,
    pub pni: UserId,
    pub profile_key: ProfileKeyCiphertext,
}

fn seeded_user_id(marker: u8, seed: u64) -> UserId {
    let mut bytes = seeded_bytes(seed, USER_ID_LEN);
    bytes[0] = marker;
    UserId::from_bytes(&bytes).expect("seeded id has USER_ID_LEN bytes")
}

/// Builds users, presentations and groups that share one set of params
pub struct GroupFixture {
    pub public_params: GroupPublicParams,
    pub secret_params: GroupSecretParams,
    pub verifier: Arc<MockCredentialVerifier>,
}

impl Default for GroupFixture {
    fn default() -> Self {
        Self::new()
    }
}

impl GroupFixture {
    pub fn new() -> Self {
        Self::with_seed(DEFAULT_TEST_SEED)
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            public_params: GroupPublicParams(seeded_bytes(seed, 32)),
            secret_params: GroupSecretParams::new(seeded_bytes(seed.wrapping_add(1), 32)),
            verifier: Arc::new(MockCredentialVerifier),
        }
    }

    /// Same `seed` gives the same user
    pub fn user(&self, seed: u64) -> TestUser {
        TestUser {
            aci: seeded_user_id(ACI_MARKER, seed),
            pni: seeded_user_id(PNI_MARKER, seed),
            profile_key: ProfileKeyCiphertext(seeded_bytes(seed ^ 0xA5A5, PROFILE_KEY_LEN)),
        }
    }

    /// Presentation proving `user`'s primary identity and profile key
    pub fn presentation(&self, user: &TestUser) -> Presentation {
        MockCredentialVerifier::present(&self.public_params, &user.aci, &user.profile_key)
    }

    /// Presentation carrying a different profile key
    pub fn presentation_with_key(
        &self,
        user: &TestUser,
        profile_key: &ProfileKeyCiphertext,
    ) -> Presentation {
        MockCredentialVerifier::present(&self.public_params, &user.aci, profile_key)
    }

    /// Copy of `presentation` with a corrupted tag
    pub fn forge(presentation: &Presentation) -> Presentation {
        let mut bytes = presentation.0.clone();
        if let Some(last) = bytes.last_mut() {
            *last ^= 0xFF;
        }
        Presentation(bytes)
    }

    pub fn initial_state(
        &self,
        access: AccessControl,
        members: &[(&TestUser, Role)],
    ) -> InitialGroupState {
        let mut initial = InitialGroupState::new(self.public_params.0.clone(), access);
        initial.members = members
            .iter()
            .map(|(user, role)| InitialMember {
                role: Some(*role),
                presentation: self.presentation(user),
            })
            .collect();
        initial
    }

    pub fn build(&self, initial: InitialGroupState) -> GroupResult<ServerGroup> {
        self.build_with_config(initial, GroupConfig::default())
    }

    pub fn build_with_config(
        &self,
        initial: InitialGroupState,
        config: GroupConfig,
    ) -> GroupResult<ServerGroup> {
        ServerGroup::construct(
            initial,
            self.secret_params.clone(),
            self.verifier.clone(),
            Arc::new(Ed25519Signer),
            config,
        )
    }
}
