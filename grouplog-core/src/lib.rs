//! Authoritative, versioned group membership
//!
//! [`group::ServerGroup`] is the state machine; [`group::GroupHandle`] runs
//! one in its own task for concurrent callers.

pub mod config;
pub mod group;
pub mod logging;
pub mod metrics;
pub mod test_utils;

pub use config::{Config, ConfigError, GroupConfig};
pub use group::{
    Actions, GroupError, GroupHandle, GroupResult, GroupState, ModifyOutcome, ServerGroup,
    SignedChange,
};
pub use logging::{init_logging, LogLevel};
