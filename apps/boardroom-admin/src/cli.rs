use boardroom_storage::{ActorId, MembershipId, ScopeId};
use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "boardroom")]
#[command(about = "Administer workspace, project and team memberships")]
pub struct Cli {
    /// SQLite database URL
    #[arg(
        long,
        env = "BOARDROOM_DATABASE_URL",
        default_value = "sqlite://boardroom.db"
    )]
    pub database_url: String,

    #[command(subcommand)]
    pub command: Command,
}

/// Who is asking, and in which scope.
#[derive(Args, Clone, Copy)]
pub struct Requester {
    /// Scope the request is made in
    #[arg(long)]
    pub scope: ScopeId,

    /// Actor making the request
    #[arg(long, env = "BOARDROOM_ACTOR")]
    pub actor: ActorId,
}

#[derive(Subcommand)]
pub enum Command {
    /// Workspace commands
    Workspace {
        #[command(subcommand)]
        workspace_cmd: WorkspaceCommand,
    },
    /// Project and team commands
    Scope {
        #[command(subcommand)]
        scope_cmd: ScopeCommand,
    },
    /// Membership commands
    Member {
        #[command(subcommand)]
        member_cmd: MemberCommand,
    },
    /// Ownership commands
    Owner {
        #[command(subcommand)]
        owner_cmd: OwnerCommand,
    },
}

#[derive(Subcommand)]
pub enum WorkspaceCommand {
    /// Create a workspace owned by an actor
    Create {
        /// Workspace name
        name: String,
        /// Owner of the new workspace
        #[arg(long, env = "BOARDROOM_ACTOR")]
        actor: ActorId,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ChildKind {
    Project,
    Team,
}

#[derive(Subcommand)]
pub enum ScopeCommand {
    /// Create a project or team under the requester's scope
    Create {
        #[command(flatten)]
        requester: Requester,
        /// Kind of scope to create
        #[arg(value_enum)]
        kind: ChildKind,
        /// Scope name
        name: String,
    },
}

#[derive(Subcommand)]
pub enum MemberCommand {
    /// List active members
    List {
        #[command(flatten)]
        requester: Requester,
    },
    /// Add an actor to the scope
    Add {
        #[command(flatten)]
        requester: Requester,
        /// Actor to add
        actor_id: ActorId,
        /// Role to grant (admin or member)
        #[arg(long, default_value = "member")]
        role: String,
    },
    /// Change a member's role
    Role {
        #[command(flatten)]
        requester: Requester,
        /// Membership to change
        membership_id: MembershipId,
        /// New role
        role: String,
    },
    /// Remove a membership and everything derived from it
    Remove {
        #[command(flatten)]
        requester: Requester,
        /// Membership to remove
        membership_id: MembershipId,
    },
    /// Leave the scope
    Leave {
        #[command(flatten)]
        requester: Requester,
    },
}

#[derive(Subcommand)]
pub enum OwnerCommand {
    /// Hand ownership to another member; the current owner becomes admin
    Transfer {
        #[command(flatten)]
        requester: Requester,
        /// Membership that becomes the owner
        membership_id: MembershipId,
    },
}
