//! Server-authoritative group
//!
//! `ServerGroup` owns the change log of one group and is the only place a
//! new version can be committed. `modify` computes the next state on a
//! working copy, checks the version precondition, signs the applied actions
//! and appends one log entry. Nothing is written before that append, so a
//! failed or conflicting call leaves the group exactly as it was.
//!
//! Callers on several threads must serialize access, for example through
//! [`GroupHandle`](super::handle::GroupHandle).

use super::actions::{Actions, AppliedActions, SignedChange};
use super::apply::{apply_actions, ApplyContext};
use super::capability::Group;
use super::change_log::{ChangeLog, ChangeLogEntry};
use super::credentials::{CredentialVerifier, GroupPublicParams, GroupSecretParams, Signer};
use super::errors::{GroupError, GroupResult};
use super::state::{GroupState, InitialGroupState};
use super::types::{Member, UserId};
use crate::config::GroupConfig;
use crate::metrics::{self, Timer};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Result of a well-formed modify call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModifyOutcome {
    /// The change was committed
    Applied(SignedChange),
    /// The declared version was stale or ahead; nothing changed
    Conflict { expected_version: u32, requested_version: u32 },
}

impl ModifyOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ModifyOutcome::Applied(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ModifyOutcome::Conflict { .. })
    }
}

/// Authoritative group state machine
pub struct ServerGroup {
    public_params: GroupPublicParams,
    secret_params: GroupSecretParams,
    verifier: Arc<dyn CredentialVerifier>,
    signer: Arc<dyn Signer>,
    config: GroupConfig,
    log: ChangeLog,
}

impl std::fmt::Debug for ServerGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerGroup")
            .field("version", &self.log.current_version())
            .field("members", &self.log.current_state().members.len())
            .field("pending_members", &self.log.current_state().pending_members.len())
            .finish()
    }
}

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl ServerGroup {
    /// Validate and verify an initial state, then seed the change log at version 0
    ///
    /// Every initial member is admitted under the identity its presentation
    /// verifies to. Any failure aborts construction.
    #[instrument(skip_all, fields(members = initial.members.len()))]
    pub fn construct(
        initial: InitialGroupState,
        secret_params: GroupSecretParams,
        verifier: Arc<dyn CredentialVerifier>,
        signer: Arc<dyn Signer>,
        config: GroupConfig,
    ) -> GroupResult<Self> {
        initial.validate()?;

        let InitialGroupState {
            version,
            title,
            description,
            avatar,
            disappearing_messages_timer,
            public_key,
            access_control,
            members: initial_members,
        } = initial;

        let public_key =
            public_key.ok_or_else(|| GroupError::Validation("missing public key".to_string()))?;
        let access_control = access_control
            .ok_or_else(|| GroupError::Validation("missing access control".to_string()))?;
        let public_params = GroupPublicParams(public_key.clone());

        if initial_members.len() > config.max_group_size {
            return Err(GroupError::Validation(format!(
                "{} initial members exceed the limit of {}",
                initial_members.len(),
                config.max_group_size
            )));
        }
        if title.len() > config.max_title_bytes {
            return Err(GroupError::Validation(format!(
                "title is {} bytes, limit is {}",
                title.len(),
                config.max_title_bytes
            )));
        }
        if description.len() > config.max_description_bytes {
            return Err(GroupError::Validation(format!(
                "description is {} bytes, limit is {}",
                description.len(),
                config.max_description_bytes
            )));
        }

        let mut members: Vec<Member> = Vec::with_capacity(initial_members.len());
        for (idx, initial_member) in initial_members.into_iter().enumerate() {
            let role = initial_member
                .role
                .ok_or_else(|| GroupError::Validation(format!("member {} has no role", idx)))?;
            let verified = verifier.verify(&public_params, &initial_member.presentation)?;

            if members.iter().any(|m| m.user_id == verified.user_id) {
                return Err(GroupError::Validation(format!(
                    "member {} duplicates {}",
                    idx,
                    verified.user_id.short()
                )));
            }

            members.push(Member {
                user_id: verified.user_id,
                role,
                profile_key_ciphertext: verified.profile_key_ciphertext,
                joined_at_version: version,
            });
        }

        let state = GroupState {
            version,
            title,
            description,
            avatar,
            disappearing_messages_timer,
            public_key,
            access_control,
            members,
            pending_members: Vec::new(),
        };
        state.check_membership_invariants()?;
        let log = ChangeLog::seed(state)?;

        info!(members = log.current_state().members.len(), "group constructed");
        metrics::record_counter(metrics::GROUPS_CONSTRUCTED, 1);

        Ok(Self { public_params, secret_params, verifier, signer, config, log })
    }

    /// Apply an action bundle on behalf of the acting identities
    ///
    /// Returns `Ok(ModifyOutcome::Conflict)` when `actions.version` is not the
    /// next version; every other failure is an error. In both cases the
    /// group is left unchanged.
    #[instrument(
        skip(self, actions),
        fields(aci = %acting_aci.short(), pni = %acting_pni.short(), target = ?actions.version)
    )]
    pub fn modify(
        &mut self,
        acting_aci: &UserId,
        acting_pni: &UserId,
        actions: Actions,
    ) -> GroupResult<ModifyOutcome> {
        let timer = Timer::new(metrics::MODIFY_DURATION_MS);
        let result = self.try_modify(acting_aci, acting_pni, &actions);
        timer.stop();

        match &result {
            Ok(ModifyOutcome::Applied(change)) => {
                metrics::record_counter(metrics::MODIFY_APPLIED, 1);
                info!(
                    version = change.actions.version,
                    change_epoch = change.change_epoch,
                    "change committed"
                );
            }
            Ok(ModifyOutcome::Conflict { expected_version, requested_version }) => {
                metrics::record_counter(metrics::MODIFY_CONFLICT, 1);
                warn!(expected_version, requested_version, "version conflict");
            }
            Err(e) => {
                metrics::record_rejection(e.kind().as_str());
                warn!(kind = e.kind().as_str(), error = %e, "modify rejected");
            }
        }

        result
    }

    fn try_modify(
        &mut self,
        acting_aci: &UserId,
        acting_pni: &UserId,
        actions: &Actions,
    ) -> GroupResult<ModifyOutcome> {
        let target_version = actions
            .version
            .ok_or_else(|| GroupError::Validation("action bundle has no version".to_string()))?;

        let committed = self.log.current_state();
        let next_version = committed.version + 1;

        let ctx = ApplyContext {
            acting: committed.get_member(acting_aci),
            acting_aci,
            acting_pni,
            access: committed.access_control,
            params: &self.public_params,
            verifier: self.verifier.as_ref(),
            config: &self.config,
            next_version,
            now: now_millis(),
        };

        let mut working = committed.clone();
        let mut applied = AppliedActions::new(acting_aci.clone(), target_version);
        let change_epoch = apply_actions(&ctx, actions, &mut working, &mut applied)?;

        // Checked after the sub-actions, before anything is committed
        if target_version != next_version {
            return Ok(ModifyOutcome::Conflict {
                expected_version: next_version,
                requested_version: target_version,
            });
        }

        working.version = next_version;
        let encoded_actions = applied.encode()?;
        let signature = self.signer.sign(&self.secret_params, &encoded_actions)?;
        let change = SignedChange { actions: applied, encoded_actions, signature, change_epoch };

        self.log.append(change.clone(), working)?;
        Ok(ModifyOutcome::Applied(change))
    }

    /// Like [`Group::changes_since`], capped by `max_changes_per_fetch`
    pub fn changes_since_bounded(&self, index: usize) -> &[ChangeLogEntry] {
        let changes = self.log.since(index);
        match self.config.max_changes_per_fetch {
            0 => changes,
            limit => &changes[..limit.min(changes.len())],
        }
    }

    pub fn change_log(&self) -> &ChangeLog {
        &self.log
    }

    pub fn config(&self) -> &GroupConfig {
        &self.config
    }
}

impl Group for ServerGroup {
    fn current_state(&self) -> &GroupState {
        self.log.current_state()
    }

    fn public_params(&self) -> &GroupPublicParams {
        &self.public_params
    }

    fn changes_since(&self, index: usize) -> &[ChangeLogEntry] {
        self.log.since(index)
    }
}
