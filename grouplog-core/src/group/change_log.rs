/*
    change_log.rs - Append-only group change history

    Entry `i` always holds the state at version `i`. Entries are never
    rewritten once appended, so observers that lag behind can replay
    everything after the last version they saw.

    The log is seeded with the version 0 state at construction and is
    therefore never empty.
*/

use super::actions::SignedChange;
use super::errors::{GroupError, GroupResult};
use super::state::GroupState;
use serde::{Deserialize, Serialize};

/// One committed transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    /// `None` only for the version 0 entry
    pub change: Option<SignedChange>,
    pub state: GroupState,
}

impl ChangeLogEntry {
    pub fn version(&self) -> u32 {
        self.state.version
    }
}

/// In-memory append-only log
#[derive(Debug, Clone)]
pub struct ChangeLog {
    entries: Vec<ChangeLogEntry>,
}

impl ChangeLog {
    /// Start a log at the version 0 state
    pub(crate) fn seed(initial: GroupState) -> GroupResult<Self> {
        if initial.version != 0 {
            return Err(GroupError::Validation(format!(
                "change log must start at version 0, got {}",
                initial.version
            )));
        }
        Ok(Self { entries: vec![ChangeLogEntry { change: None, state: initial }] })
    }

    /// Append the next entry; its version must equal the current length
    pub(crate) fn append(&mut self, change: SignedChange, state: GroupState) -> GroupResult<u32> {
        let expected = self.entries.len() as u32;
        if state.version != expected {
            return Err(GroupError::Validation(format!(
                "out of order append: expected version {}, got {}",
                expected, state.version
            )));
        }
        self.entries.push(ChangeLogEntry { change: Some(change), state });
        Ok(expected)
    }

    pub fn latest(&self) -> &ChangeLogEntry {
        &self.entries[self.entries.len() - 1]
    }

    pub fn current_state(&self) -> &GroupState {
        &self.latest().state
    }

    pub fn current_version(&self) -> u32 {
        self.latest().version()
    }

    /// Entry for `version`, if committed
    pub fn get(&self, version: u32) -> Option<&ChangeLogEntry> {
        self.entries.get(version as usize)
    }

    /// Suffix starting at `index`; empty past the end
    pub fn since(&self, index: usize) -> &[ChangeLogEntry] {
        self.entries.get(index..).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false: a seeded log holds the version 0 entry
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
