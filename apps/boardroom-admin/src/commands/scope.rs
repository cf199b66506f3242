use boardroom_storage::{ActorId, ScopeKind};

use super::{context, Engine};
use crate::cli::{ChildKind, Requester};

pub async fn cmd_workspace_create(
    engine: &Engine,
    actor: ActorId,
    name: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let (workspace, owner) = engine.create_workspace(actor, name).await?;

    println!("✓ Workspace created");
    println!("  ID:         {}", workspace.id);
    println!("  Name:       {}", workspace.name);
    println!("  Membership: {} (owner)", owner.id);
    Ok(())
}

pub async fn cmd_scope_create(
    engine: &Engine,
    requester: Requester,
    kind: ChildKind,
    name: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = context(engine, requester).await?;
    let kind = match kind {
        ChildKind::Project => ScopeKind::Project,
        ChildKind::Team => ScopeKind::Team,
    };
    let (scope, owner) = engine.create_scope(&ctx, kind, name).await?;

    println!("✓ {} created", scope.kind);
    println!("  ID:         {}", scope.id);
    println!("  Name:       {}", scope.name);
    println!("  Parent:     {}", ctx.scope_ref());
    println!("  Membership: {} (owner)", owner.id);
    Ok(())
}
