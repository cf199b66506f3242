use std::sync::Arc;

use boardroom_membership::{EngineConfig, MembershipEngine};
use boardroom_store_sqlite::SqliteStore;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Command, MemberCommand, OwnerCommand, ScopeCommand, WorkspaceCommand};
use commands::*;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = EngineConfig::from_env()?;

    let store = Arc::new(SqliteStore::open(&cli.database_url).await?);
    info!(
        database_url = %cli.database_url,
        transfer_mode = config.transfer_mode.as_str(),
        "store opened"
    );
    // audit events land in the same database as the memberships
    let engine = MembershipEngine::with_config(store.clone(), store, config);

    match cli.command {
        Command::Workspace { workspace_cmd } => match workspace_cmd {
            WorkspaceCommand::Create { name, actor } => {
                cmd_workspace_create(&engine, actor, &name).await?;
            }
        },
        Command::Scope { scope_cmd } => match scope_cmd {
            ScopeCommand::Create {
                requester,
                kind,
                name,
            } => {
                cmd_scope_create(&engine, requester, kind, &name).await?;
            }
        },
        Command::Member { member_cmd } => match member_cmd {
            MemberCommand::List { requester } => {
                cmd_member_list(&engine, requester).await?;
            }
            MemberCommand::Add {
                requester,
                actor_id,
                role,
            } => {
                cmd_member_add(&engine, requester, actor_id, &role).await?;
            }
            MemberCommand::Role {
                requester,
                membership_id,
                role,
            } => {
                cmd_member_role(&engine, requester, membership_id, &role).await?;
            }
            MemberCommand::Remove {
                requester,
                membership_id,
            } => {
                cmd_member_remove(&engine, requester, membership_id).await?;
            }
            MemberCommand::Leave { requester } => {
                cmd_member_leave(&engine, requester).await?;
            }
        },
        Command::Owner { owner_cmd } => match owner_cmd {
            OwnerCommand::Transfer {
                requester,
                membership_id,
            } => {
                cmd_owner_transfer(&engine, requester, membership_id).await?;
            }
        },
    }

    Ok(())
}
