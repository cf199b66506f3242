use boardroom_membership::RemovalReport;
use boardroom_storage::{ActorId, MembershipId};

use super::{context, Engine};
use crate::cli::Requester;

pub async fn cmd_member_list(
    engine: &Engine,
    requester: Requester,
) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = context(engine, requester).await?;
    let members = engine.list_members(&ctx).await?;

    println!("Members of {}:", ctx.scope_ref());
    for m in members {
        println!("  {}  {:<6}  actor {}", m.id, m.role.as_str(), m.actor_id);
    }
    Ok(())
}

pub async fn cmd_member_add(
    engine: &Engine,
    requester: Requester,
    actor_id: ActorId,
    role: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = context(engine, requester).await?;
    let m = engine.add_member_with_role(&ctx, actor_id, role).await?;

    println!("✓ Added actor {} as {}", m.actor_id, m.role);
    println!("  Membership: {}", m.id);
    if let Some(enclosing) = m.enclosing_membership_id {
        println!("  Enclosing:  {}", enclosing);
    }
    Ok(())
}

pub async fn cmd_member_role(
    engine: &Engine,
    requester: Requester,
    membership_id: MembershipId,
    role: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = context(engine, requester).await?;
    let m = engine.change_role(&ctx, membership_id, role).await?;

    println!("✓ Membership {} is now {}", m.id, m.role);
    Ok(())
}

pub async fn cmd_member_remove(
    engine: &Engine,
    requester: Requester,
    membership_id: MembershipId,
) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = context(engine, requester).await?;
    let report = engine.remove_member(&ctx, membership_id).await?;
    print_report(&report);
    Ok(())
}

pub async fn cmd_member_leave(
    engine: &Engine,
    requester: Requester,
) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = context(engine, requester).await?;
    let report = engine.leave(&ctx).await?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &RemovalReport) {
    println!("✓ Removed membership {} from {}", report.target, report.scope);
    if report.derived_count() > 0 {
        println!("  Also removed (most nested first):");
        for id in &report.removal_order()[..report.derived_count()] {
            println!("    {}", id);
        }
    }
}
