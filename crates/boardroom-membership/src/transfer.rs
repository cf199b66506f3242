//! Ownership transfer.
//!
//! The candidate becomes `owner` and the previous owner becomes `admin`. With native
//! transactions both writes commit together. Without them the candidate is promoted
//! first, the promotion is verified, and the previous owner is demoted; a failed
//! demotion restores the candidate's old role.

use boardroom_storage::{Membership, MembershipId, MembershipRepository, Role};

use crate::policy::{self, Action};
use crate::validator;
use crate::{ActorContext, EngineError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OwnershipTransfer {
    pub previous_owner: Membership,
    pub new_owner: Membership,
}

impl OwnershipTransfer {
    /// True for a transfer to oneself, which changes nothing.
    pub fn is_noop(&self) -> bool {
        self.previous_owner.id == self.new_owner.id
    }
}

/// A validated transfer, ready to apply.
#[derive(Clone, Debug)]
pub enum TransferStep {
    /// Current owner and candidate are the same membership.
    Unchanged(Membership),
    Apply { owner: Membership, candidate: Membership },
}

/// Check every precondition of a transfer. Performs no writes.
pub async fn prepare<R>(
    repo: &R,
    ctx: &ActorContext,
    candidate_id: MembershipId,
) -> Result<TransferStep, EngineError>
where
    R: MembershipRepository + ?Sized,
{
    let owner = validator::refresh_requester(repo, ctx).await?;
    policy::authorize(owner.role, Role::Owner, Action::TransferOwnership)?;

    if owner.id == candidate_id {
        return Ok(TransferStep::Unchanged(owner));
    }

    let candidate = validator::find_target(repo, &ctx.scope_ref(), &candidate_id).await?;
    if candidate.role == Role::Owner {
        return Err(EngineError::conflict(format!(
            "membership {} is already the owner",
            candidate.id
        )));
    }

    Ok(TransferStep::Apply { owner, candidate })
}

/// Apply a transfer through a repository whose writes commit together.
pub async fn apply_transactional<R>(
    txn: &R,
    owner: Membership,
    candidate: Membership,
) -> Result<OwnershipTransfer, EngineError>
where
    R: MembershipRepository + ?Sized,
{
    let previous_owner = txn
        .update_role(&owner.id, Role::Admin)
        .await
        .map_err(|e| EngineError::from(e).into_write_failure("demoting previous owner"))?;
    let new_owner = txn
        .update_role(&candidate.id, Role::Owner)
        .await
        .map_err(|e| EngineError::from(e).into_write_failure("promoting transfer candidate"))?;

    Ok(OwnershipTransfer {
        previous_owner,
        new_owner,
    })
}

/// Apply a transfer as promote, verify, demote, undoing the promotion if a later
/// step fails.
pub async fn apply_compensating<R>(
    repo: &R,
    owner: Membership,
    candidate: Membership,
) -> Result<OwnershipTransfer, EngineError>
where
    R: MembershipRepository + ?Sized,
{
    repo.update_role(&candidate.id, Role::Owner)
        .await
        .map_err(|e| EngineError::from(e).into_write_failure("promoting transfer candidate"))?;
    tracing::debug!(membership_id = %candidate.id, "transfer candidate promoted");

    let new_owner = match repo
        .find_active_membership(&candidate.scope, &candidate.id)
        .await
    {
        Ok(m) if m.role == Role::Owner => m,
        Ok(m) => {
            restore_candidate(repo, &candidate).await;
            return Err(EngineError::internal(format!(
                "promotion of membership {} did not persist (role is {})",
                m.id, m.role
            )));
        }
        Err(e) => {
            restore_candidate(repo, &candidate).await;
            return Err(EngineError::internal(format!(
                "could not verify promotion of membership {}: {}",
                candidate.id, e
            )));
        }
    };

    match repo.update_role(&owner.id, Role::Admin).await {
        Ok(previous_owner) => Ok(OwnershipTransfer {
            previous_owner,
            new_owner,
        }),
        Err(e) => {
            tracing::warn!(
                membership_id = %owner.id,
                error = %e,
                "demotion of previous owner failed; restoring candidate"
            );
            restore_candidate(repo, &candidate).await;
            Err(EngineError::internal(format!(
                "ownership transfer failed while demoting membership {}: {}",
                owner.id, e
            )))
        }
    }
}

async fn restore_candidate<R>(repo: &R, candidate: &Membership)
where
    R: MembershipRepository + ?Sized,
{
    match repo.update_role(&candidate.id, candidate.role).await {
        Ok(_) => tracing::info!(
            membership_id = %candidate.id,
            role = %candidate.role,
            "transfer candidate role restored"
        ),
        Err(e) => tracing::error!(
            membership_id = %candidate.id,
            role = %candidate.role,
            error = %e,
            "failed to restore transfer candidate role"
        ),
    }
}
