//! Cascading removal.
//!
//! Removing a membership also removes every Active membership derived from it through
//! `enclosing_membership_id`: team memberships first, then project memberships, then the
//! target itself. The caller runs both phases inside one transaction.

use std::collections::HashSet;

use boardroom_storage::{Membership, MembershipId, MembershipRepository, ScopeKind, ScopeRef};
use serde::Serialize;

use crate::EngineError;

/// What a removal took away, in removal order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RemovalReport {
    pub scope: ScopeRef,
    pub target: MembershipId,
    pub removed_teams: Vec<MembershipId>,
    pub removed_projects: Vec<MembershipId>,
}

impl RemovalReport {
    /// Every removed membership id, most derived first, ending with the target.
    pub fn removal_order(&self) -> Vec<MembershipId> {
        self.removed_teams
            .iter()
            .chain(&self.removed_projects)
            .copied()
            .chain(std::iter::once(self.target))
            .collect()
    }

    pub fn derived_count(&self) -> usize {
        self.removed_teams.len() + self.removed_projects.len()
    }
}

/// Memberships to remove, grouped by depth.
#[derive(Clone, Debug)]
pub struct CascadePlan {
    pub target: Membership,
    pub teams: Vec<Membership>,
    pub projects: Vec<Membership>,
}

impl CascadePlan {
    /// True when only the target itself is affected.
    pub fn is_single(&self) -> bool {
        self.teams.is_empty() && self.projects.is_empty()
    }

    /// First derived membership that owns its scope, if any.
    pub fn derived_owner(&self) -> Option<&Membership> {
        self.teams
            .iter()
            .chain(&self.projects)
            .find(|m| m.is_owner())
    }
}

/// Collect every Active membership that transitively derives from `target`.
pub async fn resolve_derived<R>(repo: &R, target: Membership) -> Result<CascadePlan, EngineError>
where
    R: MembershipRepository + ?Sized,
{
    let mut teams = Vec::new();
    let mut projects = Vec::new();
    let mut seen = HashSet::from([target.id]);
    let mut frontier = vec![target.id];

    while let Some(enclosing) = frontier.pop() {
        for derived in repo.find_active_memberships_by_enclosing(&enclosing).await? {
            if !seen.insert(derived.id) {
                continue;
            }
            frontier.push(derived.id);
            match derived.scope.kind {
                ScopeKind::Team => teams.push(derived),
                ScopeKind::Project => projects.push(derived),
                ScopeKind::Workspace => {
                    return Err(EngineError::internal(format!(
                        "workspace membership {} derives from membership {}",
                        derived.id, enclosing
                    )))
                }
            }
        }
    }

    Ok(CascadePlan {
        target,
        teams,
        projects,
    })
}

/// Remove everything in `plan`, most derived first.
///
/// A removal that touches no row means the store changed under us; the whole
/// operation fails and the caller's transaction rolls back.
pub async fn execute<R>(repo: &R, plan: CascadePlan) -> Result<RemovalReport, EngineError>
where
    R: MembershipRepository + ?Sized,
{
    let ordered = plan
        .teams
        .iter()
        .chain(&plan.projects)
        .chain(std::iter::once(&plan.target));

    for membership in ordered {
        let removed = repo
            .remove_membership(&membership.id)
            .await
            .map_err(|e| EngineError::from(e).into_write_failure("cascade removal"))?;
        if removed != 1 {
            return Err(EngineError::internal(format!(
                "membership {} was not active when removed",
                membership.id
            )));
        }
        tracing::debug!(
            membership_id = %membership.id,
            scope = %membership.scope,
            actor_id = %membership.actor_id,
            "membership removed"
        );
    }

    Ok(RemovalReport {
        scope: plan.target.scope,
        target: plan.target.id,
        removed_teams: plan.teams.iter().map(|m| m.id).collect(),
        removed_projects: plan.projects.iter().map(|m| m.id).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use boardroom_storage::{
        ActorId, MembershipState, MockMembershipRepository, Role, ScopeId, StoreError,
    };
    use chrono::Utc;
    use mockall::predicate::eq;
    use mockall::Sequence;

    fn membership(kind: ScopeKind, enclosing: Option<MembershipId>) -> Membership {
        let now = Utc::now();
        Membership {
            id: MembershipId::new(),
            scope: ScopeRef::new(kind, ScopeId::new()),
            actor_id: ActorId::new(),
            role: Role::Member,
            enclosing_membership_id: enclosing,
            state: MembershipState::Active,
            created_at: now,
            updated_at: now,
            removed_at: None,
        }
    }

    #[test]
    fn report_lists_teams_then_projects_then_target() {
        let report = RemovalReport {
            scope: ScopeRef::workspace(ScopeId::new()),
            target: MembershipId::new(),
            removed_teams: vec![MembershipId::new()],
            removed_projects: vec![MembershipId::new(), MembershipId::new()],
        };
        let order = report.removal_order();
        assert_eq!(order.len(), 4);
        assert_eq!(order[0], report.removed_teams[0]);
        assert_eq!(&order[1..3], report.removed_projects.as_slice());
        assert_eq!(order[3], report.target);
        assert_eq!(report.derived_count(), 3);
    }

    #[tokio::test]
    async fn resolves_transitively_derived_memberships() {
        let ws = membership(ScopeKind::Workspace, None);
        let project = membership(ScopeKind::Project, Some(ws.id));
        let ws_team = membership(ScopeKind::Team, Some(ws.id));
        let project_team = membership(ScopeKind::Team, Some(project.id));

        let all = vec![project.clone(), ws_team.clone(), project_team.clone()];

        let mut repo = MockMembershipRepository::new();
        repo.expect_find_active_memberships_by_enclosing()
            .returning(move |enclosing| {
                Ok(all
                    .iter()
                    .filter(|m| m.enclosing_membership_id == Some(*enclosing))
                    .cloned()
                    .collect())
            });

        let plan = resolve_derived(&repo, ws.clone()).await.unwrap();
        assert_eq!(plan.projects.len(), 1);
        let mut team_ids: Vec<_> = plan.teams.iter().map(|m| m.id).collect();
        team_ids.sort();
        let mut expected = vec![ws_team.id, project_team.id];
        expected.sort();
        assert_eq!(team_ids, expected);
        assert!(!plan.is_single());
        assert!(plan.derived_owner().is_none());
    }

    #[test]
    fn derived_owner_is_reported() {
        let ws = membership(ScopeKind::Workspace, None);
        let mut project = membership(ScopeKind::Project, Some(ws.id));
        project.role = Role::Owner;

        let plan = CascadePlan {
            target: ws,
            teams: vec![],
            projects: vec![project.clone()],
        };
        assert_eq!(plan.derived_owner().map(|m| m.id), Some(project.id));
    }

    #[tokio::test]
    async fn execute_removes_most_derived_first() {
        let ws = membership(ScopeKind::Workspace, None);
        let project = membership(ScopeKind::Project, Some(ws.id));
        let team = membership(ScopeKind::Team, Some(project.id));

        let mut seq = Sequence::new();
        let mut repo = MockMembershipRepository::new();
        for id in [team.id, project.id, ws.id] {
            repo.expect_remove_membership()
                .with(eq(id))
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_| Ok(1));
        }

        let plan = CascadePlan {
            target: ws.clone(),
            teams: vec![team.clone()],
            projects: vec![project.clone()],
        };
        let report = execute(&repo, plan).await.unwrap();
        assert_eq!(report.removal_order(), vec![team.id, project.id, ws.id]);
        assert_eq!(report.scope, ws.scope);
    }

    #[tokio::test]
    async fn zero_affected_rows_is_internal() {
        let target = membership(ScopeKind::Project, None);
        let mut repo = MockMembershipRepository::new();
        repo.expect_remove_membership().returning(|_| Ok(0));

        let plan = CascadePlan {
            target,
            teams: vec![],
            projects: vec![],
        };
        let err = execute(&repo, plan).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[tokio::test]
    async fn store_failure_mid_cascade_is_internal_but_contention_stays_retryable() {
        let target = membership(ScopeKind::Workspace, None);
        let team = membership(ScopeKind::Team, Some(target.id));

        let mut repo = MockMembershipRepository::new();
        repo.expect_remove_membership()
            .returning(|_| Err(StoreError::Backend("io".into())));
        let plan = CascadePlan {
            target: target.clone(),
            teams: vec![team.clone()],
            projects: vec![],
        };
        let err = execute(&repo, plan.clone()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);

        let mut repo = MockMembershipRepository::new();
        repo.expect_remove_membership()
            .returning(|_| Err(StoreError::Conflict("locked".into())));
        let err = execute(&repo, plan).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
