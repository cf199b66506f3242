//! Role policy: who may do what to whom.
//!
//! Pure functions, identical for workspaces, projects and teams.

use boardroom_storage::Role;

use crate::EngineError;

pub const SOLE_OWNER_REMOVAL: &str = "cannot remove sole owner; transfer ownership first";

/// Management actions subject to role checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    /// Grant a membership with the target role.
    AddMember,
    ChangeRole,
    RemoveMember,
    /// Removal where requester and target are the same membership.
    Leave,
    TransferOwnership,
    /// Create a project or team under the requester's scope.
    CreateScope,
    ListMembers,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::AddMember => "add_member",
            Action::ChangeRole => "change_role",
            Action::RemoveMember => "remove_member",
            Action::Leave => "leave",
            Action::TransferOwnership => "transfer_ownership",
            Action::CreateScope => "create_scope",
            Action::ListMembers => "list_members",
        }
    }
}

/// Whether an actor holding `actor_role` may perform `action` against a target holding
/// (or, for `AddMember`, being granted) `target_role`.
pub fn can_perform(actor_role: Role, target_role: Role, action: Action) -> bool {
    match action {
        Action::CreateScope | Action::ListMembers => true,
        Action::TransferOwnership => actor_role == Role::Owner,
        Action::Leave => target_role != Role::Owner,
        Action::AddMember | Action::ChangeRole | Action::RemoveMember => {
            // the owner role moves only through transfer
            target_role != Role::Owner && actor_role.outranks(&target_role)
        }
    }
}

/// [`can_perform`] with a reason attached to every denial.
pub fn authorize(actor_role: Role, target_role: Role, action: Action) -> Result<(), EngineError> {
    if can_perform(actor_role, target_role, action) {
        return Ok(());
    }

    let reason = match (action, target_role) {
        (Action::RemoveMember | Action::Leave, Role::Owner) => SOLE_OWNER_REMOVAL.to_string(),
        (Action::ChangeRole, Role::Owner) => {
            "the owner role changes only through ownership transfer".to_string()
        }
        (Action::AddMember, Role::Owner) => {
            "the owner role is assigned only through ownership transfer".to_string()
        }
        (Action::TransferOwnership, _) => "only the owner can transfer ownership".to_string(),
        (_, target) => format!("{}s cannot {} {}s", actor_role, verb(action), target),
    };
    Err(EngineError::forbidden(reason))
}

/// Change-role is checked against both the role the target holds now and the role it
/// would hold afterwards.
pub fn authorize_role_change(
    actor_role: Role,
    current_role: Role,
    new_role: Role,
) -> Result<(), EngineError> {
    authorize(actor_role, current_role, Action::ChangeRole)?;
    authorize(actor_role, new_role, Action::ChangeRole)
}

fn verb(action: Action) -> &'static str {
    match action {
        Action::AddMember => "grant membership as",
        Action::ChangeRole => "change the role of",
        Action::RemoveMember => "remove",
        _ => action.as_str(),
    }
}
