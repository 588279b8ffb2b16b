/*
   GroupHandle

   Async front door for a ServerGroup shared by many callers.

   The group itself is plain synchronous state. GroupHandle moves it into a
   dedicated task and feeds it commands over an mpsc channel, one at a time,
   so concurrent modify calls are linearized without a lock. Replies travel
   back on a oneshot per request.

   E.G: modify(aci, pni, actions) -> ModifyOutcome
        changes_since(index)      -> Vec<ChangeLogEntry>
        current_state()           -> GroupState

   Two callers racing at the same version both reach the actor; the first
   one processed commits, the second gets ModifyOutcome::Conflict.
*/

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::actions::Actions;
use super::capability::Group;
use super::change_log::ChangeLogEntry;
use super::errors::{GroupError, GroupResult};
use super::server_group::{ModifyOutcome, ServerGroup};
use super::state::GroupState;
use super::types::{Member, PendingMember, UserId};

/// Commands processed by the group actor
#[derive(Debug)]
pub enum GroupCommand {
    Modify {
        acting_aci: UserId,
        acting_pni: UserId,
        actions: Actions,
        response_tx: oneshot::Sender<GroupResult<ModifyOutcome>>,
    },
    ChangesSince {
        index: usize,
        response_tx: oneshot::Sender<Vec<ChangeLogEntry>>,
    },
    CurrentState {
        response_tx: oneshot::Sender<GroupState>,
    },
    GetMember {
        user_id: UserId,
        response_tx: oneshot::Sender<Option<Member>>,
    },
    GetPendingMember {
        user_id: UserId,
        response_tx: oneshot::Sender<Option<PendingMember>>,
    },
    /// Stop the actor after the commands already queued
    Shutdown,
}

/// Cloneable handle to a group running in its own task
#[derive(Clone)]
pub struct GroupHandle {
    command_tx: mpsc::Sender<GroupCommand>,
}

impl GroupHandle {
    /// Move `group` into a new task and return a handle to it
    pub fn spawn(group: ServerGroup) -> (Self, JoinHandle<ServerGroup>) {
        let (command_tx, command_rx) = mpsc::channel(100);
        let actor = GroupActor { group, command_rx };
        let handle = tokio::spawn(actor.run());
        (GroupHandle { command_tx }, handle)
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> GroupCommand,
    ) -> GroupResult<T> {
        let (response_tx, response_rx) = oneshot::channel();

        self.command_tx
            .send(build(response_tx))
            .await
            .map_err(|e| GroupError::HandleClosed(format!("Failed to send command: {}", e)))?;

        response_rx
            .await
            .map_err(|e| GroupError::HandleClosed(format!("Response channel closed: {}", e)))
    }

    /// Apply an action bundle; see [`ServerGroup::modify`]
    pub async fn modify(
        &self,
        acting_aci: UserId,
        acting_pni: UserId,
        actions: Actions,
    ) -> GroupResult<ModifyOutcome> {
        self.request(|response_tx| GroupCommand::Modify {
            acting_aci,
            acting_pni,
            actions,
            response_tx,
        })
        .await?
    }

    /// Log entries from `index`, capped by `max_changes_per_fetch`
    pub async fn changes_since(&self, index: usize) -> GroupResult<Vec<ChangeLogEntry>> {
        self.request(|response_tx| GroupCommand::ChangesSince { index, response_tx })
            .await
    }

    pub async fn current_state(&self) -> GroupResult<GroupState> {
        self.request(|response_tx| GroupCommand::CurrentState { response_tx })
            .await
    }

    pub async fn get_member(&self, user_id: UserId) -> GroupResult<Option<Member>> {
        self.request(|response_tx| GroupCommand::GetMember { user_id, response_tx })
            .await
    }

    pub async fn get_pending_member(&self, user_id: UserId) -> GroupResult<Option<PendingMember>> {
        self.request(|response_tx| GroupCommand::GetPendingMember { user_id, response_tx })
            .await
    }

    /// Ask the actor to stop
    pub async fn shutdown(&self) -> GroupResult<()> {
        self.command_tx
            .send(GroupCommand::Shutdown)
            .await
            .map_err(|e| {
                GroupError::HandleClosed(format!("Failed to send shutdown command: {}", e))
            })
    }
}

struct GroupActor {
    group: ServerGroup,
    command_rx: mpsc::Receiver<GroupCommand>,
}

impl GroupActor {
    async fn run(mut self) -> ServerGroup {
        while let Some(command) = self.command_rx.recv().await {
            if !self.handle_command(command) {
                break;
            }
        }
        info!(version = self.group.version(), "group actor stopped");
        self.group
    }

    /// Returns false once the actor should stop
    fn handle_command(&mut self, command: GroupCommand) -> bool {
        match command {
            GroupCommand::Modify { acting_aci, acting_pni, actions, response_tx } => {
                let result = self.group.modify(&acting_aci, &acting_pni, actions);
                if response_tx.send(result).is_err() {
                    debug!("modify caller went away before the reply");
                }
            }
            GroupCommand::ChangesSince { index, response_tx } => {
                let _ = response_tx.send(self.group.changes_since_bounded(index).to_vec());
            }
            GroupCommand::CurrentState { response_tx } => {
                let _ = response_tx.send(self.group.current_state().clone());
            }
            GroupCommand::GetMember { user_id, response_tx } => {
                let _ = response_tx.send(self.group.get_member(&user_id).cloned());
            }
            GroupCommand::GetPendingMember { user_id, response_tx } => {
                let _ = response_tx.send(self.group.get_pending_member(&user_id).cloned());
            }
            GroupCommand::Shutdown => return false,
        }
        true
    }
}
