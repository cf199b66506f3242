pub mod member;
pub mod owner;
pub mod scope;

pub use member::{
    cmd_member_add, cmd_member_leave, cmd_member_list, cmd_member_remove, cmd_member_role,
};
pub use owner::cmd_owner_transfer;
pub use scope::{cmd_scope_create, cmd_workspace_create};

use boardroom_membership::{ActorContext, MembershipEngine};
use boardroom_store_sqlite::SqliteStore;

use crate::cli::Requester;

pub type Engine = MembershipEngine<SqliteStore>;

pub(crate) async fn context(
    engine: &Engine,
    requester: Requester,
) -> Result<ActorContext, Box<dyn std::error::Error>> {
    Ok(engine
        .resolve_actor(requester.scope, requester.actor)
        .await?)
}
