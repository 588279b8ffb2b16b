//! Group log harness
//!
//! Builds a throwaway group with mock credentials and drives it through
//! `GroupHandle`, printing the resulting change log as JSON.
//!
//!   grouplog-harness race --callers 8
//!   grouplog-harness walk --config grouplog.toml

use anyhow::{bail, Context, Result};
use clap::Parser;
use grouplog_core::group::{
    AccessControl, AccessRequired, Actions, GroupHandle, ModifyOutcome, Role,
};
use grouplog_core::logging::{init_logging_with_config, LogConfig, LogLevel};
use grouplog_core::metrics::init_metrics;
use grouplog_core::test_utils::{GroupFixture, TestUser};
use grouplog_core::Config;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "grouplog-harness")]
#[command(author, version, about = "Exercise a ServerGroup end to end", long_about = None)]
struct Args {
    /// TOML configuration file; GROUPLOG_* environment variables otherwise
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured log level
    #[arg(short, long)]
    log_level: Option<LogLevel>,

    /// Enable JSON formatted logging
    #[arg(long)]
    json_logs: bool,

    /// Print the change log as JSON when done
    #[arg(long)]
    dump: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Parser, Debug)]
enum Command {
    /// Race several callers at the same version
    Race {
        #[arg(short = 'n', long, default_value = "4")]
        callers: usize,
    },
    /// Invite, promote and remove a member step by step
    Walk,
}

fn open_access() -> AccessControl {
    AccessControl::new(
        AccessRequired::Member,
        AccessRequired::Member,
        AccessRequired::Administrator,
    )
}

async fn race(handle: &GroupHandle, users: &[TestUser]) -> Result<()> {
    let next = handle.current_state().await?.version + 1;

    let tasks: Vec<_> = users
        .iter()
        .enumerate()
        .map(|(i, user)| {
            let handle = handle.clone();
            let user = user.clone();
            tokio::spawn(async move {
                let actions = Actions::at_version(next).title(format!("caller {}", i));
                (i, handle.modify(user.aci, user.pni, actions).await)
            })
        })
        .collect();

    let mut winners = 0;
    for task in tasks {
        let (caller, result) = task.await?;
        match result? {
            ModifyOutcome::Applied(change) => {
                winners += 1;
                info!(caller, version = change.actions.version, "committed");
            }
            ModifyOutcome::Conflict { expected_version, requested_version } => {
                info!(caller, expected_version, requested_version, "conflict");
            }
        }
    }

    if winners != 1 {
        bail!("expected exactly one winner at version {}, got {}", next, winners);
    }
    Ok(())
}

async fn walk(fx: &GroupFixture, handle: &GroupHandle, admin: &TestUser) -> Result<()> {
    let guest = fx.user(1000);

    let invite = Actions::at_version(1)
        .title("harness")
        .add_pending_member(&guest.aci, Role::Default);
    let steps = [
        (admin, invite),
        (&guest, Actions::at_version(2).promote_pending(fx.presentation(&guest))),
        (admin, Actions::at_version(3).modify_member_role(guest.aci.clone(), Role::Administrator)),
        (&guest, Actions::at_version(4).delete_member(guest.aci.clone())),
    ];

    for (actor, actions) in steps {
        match handle.modify(actor.aci.clone(), actor.pni.clone(), actions).await? {
            ModifyOutcome::Applied(change) => {
                info!(version = change.actions.version, "step applied")
            }
            ModifyOutcome::Conflict { expected_version, .. } => {
                bail!("unexpected conflict, group expected version {}", expected_version)
            }
        }
    }

    if handle.get_member(guest.aci.clone()).await?.is_some() {
        warn!("guest still present after leaving");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => Config::from_env()?,
    };

    let mut log_config = LogConfig::try_from(&config.logging)?;
    if let Some(level) = args.log_level {
        log_config.level = level;
    }
    if args.json_logs {
        log_config = log_config.json_format(true);
    }
    init_logging_with_config(log_config)?;
    init_metrics();

    let fx = GroupFixture::new();
    let users: Vec<TestUser> = match &args.command {
        Command::Race { callers } => (1..=*callers as u64).map(|seed| fx.user(seed)).collect(),
        Command::Walk => vec![fx.user(1)],
    };
    if users.is_empty() {
        bail!("need at least one caller");
    }

    let mut members: Vec<(&TestUser, Role)> = users.iter().map(|u| (u, Role::Default)).collect();
    members[0].1 = Role::Administrator;
    let initial = fx.initial_state(open_access(), &members);
    let group = fx.build_with_config(initial, config.group.clone())?;
    let (handle, join) = GroupHandle::spawn(group);
    info!(members = users.len(), "group started");

    match args.command {
        Command::Race { .. } => race(&handle, &users).await?,
        Command::Walk => walk(&fx, &handle, &users[0]).await?,
    }

    if args.dump {
        let history = handle.changes_since(0).await?;
        println!("{}", serde_json::to_string_pretty(&history)?);
    }

    handle.shutdown().await?;
    let group = join.await?;
    info!(version = group.change_log().current_version(), "harness finished");

    Ok(())
}
