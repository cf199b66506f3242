//! Invariant checks run before any write.
//!
//! Every function reads through the repository it is given, which inside a mutating
//! operation is the operation's own transaction.

use boardroom_storage::{
    ActorId, Membership, MembershipId, MembershipRepository, Role, Scope, ScopeKind, ScopeRef,
    StoreError,
};

use crate::{ActorContext, EngineError};

/// Parse a caller-supplied role name.
pub fn parse_role(role: &str) -> Result<Role, EngineError> {
    role.parse::<Role>()
        .map_err(|e| EngineError::bad_request(e.to_string()))
}

pub fn validate_scope_name(name: &str) -> Result<(), EngineError> {
    if name.trim().is_empty() {
        return Err(EngineError::bad_request("scope name must not be empty"));
    }
    Ok(())
}

/// Re-read the requester's membership; a context whose membership is no longer Active in
/// its scope grants nothing.
pub async fn refresh_requester<R>(repo: &R, ctx: &ActorContext) -> Result<Membership, EngineError>
where
    R: MembershipRepository + ?Sized,
{
    if ctx.membership.scope != ctx.scope_ref() {
        return Err(EngineError::bad_request(format!(
            "membership {} does not belong to {}",
            ctx.membership.id,
            ctx.scope_ref()
        )));
    }

    match repo
        .find_active_membership(&ctx.scope_ref(), &ctx.membership.id)
        .await
    {
        Ok(m) if m.actor_id == ctx.membership.actor_id => Ok(m),
        Ok(_) | Err(StoreError::NotFound) => Err(EngineError::forbidden(format!(
            "requester is no longer an active member of {}",
            ctx.scope_ref()
        ))),
        Err(e) => Err(e.into()),
    }
}

/// Look up the Active membership an operation targets.
pub async fn find_target<R>(
    repo: &R,
    scope: &ScopeRef,
    membership_id: &MembershipId,
) -> Result<Membership, EngineError>
where
    R: MembershipRepository + ?Sized,
{
    match repo.find_active_membership(scope, membership_id).await {
        Ok(m) => Ok(m),
        Err(StoreError::NotFound) => Err(EngineError::not_found(format!(
            "membership {} is not active in {}",
            membership_id, scope
        ))),
        Err(e) => Err(e.into()),
    }
}

/// At most one Active membership per actor per scope.
pub async fn ensure_not_member<R>(
    repo: &R,
    scope: &ScopeRef,
    actor_id: &ActorId,
) -> Result<(), EngineError>
where
    R: MembershipRepository + ?Sized,
{
    match repo.find_active_membership_by_actor(scope, actor_id).await {
        Ok(existing) => Err(EngineError::conflict(format!(
            "actor {} is already a member of {} (membership {})",
            actor_id, scope, existing.id
        ))),
        Err(StoreError::NotFound) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Containment: find the membership a new membership in `scope` derives from.
///
/// Returns `None` for a workspace. For a project or team the actor must be an Active
/// member of the parent scope, and (for a team under a project) of the workspace too.
pub async fn resolve_enclosing<R>(
    repo: &R,
    scope: &Scope,
    actor_id: &ActorId,
) -> Result<Option<Membership>, EngineError>
where
    R: MembershipRepository + ?Sized,
{
    let Some(parent_id) = scope.parent_id else {
        return Ok(None);
    };

    let parent = repo.get_scope(&parent_id).await?;
    if parent.kind != ScopeKind::Workspace {
        require_member(repo, &ScopeRef::workspace(scope.workspace_id), actor_id).await?;
    }
    require_member(repo, &parent.scope_ref(), actor_id)
        .await
        .map(Some)
}

async fn require_member<R>(
    repo: &R,
    scope: &ScopeRef,
    actor_id: &ActorId,
) -> Result<Membership, EngineError>
where
    R: MembershipRepository + ?Sized,
{
    match repo.find_active_membership_by_actor(scope, actor_id).await {
        Ok(m) => Ok(m),
        Err(StoreError::NotFound) => Err(EngineError::conflict(format!(
            "actor {} does not belong to the {}",
            actor_id, scope.kind
        ))),
        Err(e) => Err(e.into()),
    }
}
