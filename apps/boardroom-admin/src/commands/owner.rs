use boardroom_storage::MembershipId;

use super::{context, Engine};
use crate::cli::Requester;

pub async fn cmd_owner_transfer(
    engine: &Engine,
    requester: Requester,
    membership_id: MembershipId,
) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = context(engine, requester).await?;
    let transfer = engine.transfer_ownership(&ctx, membership_id).await?;

    if transfer.is_noop() {
        println!("Membership {} already owns {}", transfer.new_owner.id, ctx.scope_ref());
    } else {
        println!("✓ Ownership of {} transferred", ctx.scope_ref());
        println!("  New owner:      {}", transfer.new_owner.id);
        println!("  Previous owner: {} (now admin)", transfer.previous_owner.id);
    }
    Ok(())
}
