use std::sync::Arc;

use boardroom_audit::{AuditAction, AuditLog, AuditLogFilter, AuditResult, MemoryAuditLog};
use boardroom_membership::{
    policy, ActorContext, EngineConfig, ErrorKind, MembershipEngine, TransferMode,
};
use boardroom_storage::{
    ActorId, Membership, MembershipRepository, MembershipState, Role, Scope, ScopeKind,
    StoreError,
};
use boardroom_store_memory::{FailPoint, MemoryStore};

struct Harness {
    engine: MembershipEngine<MemoryStore>,
    store: Arc<MemoryStore>,
    audit: Arc<MemoryAuditLog>,
    workspace: Scope,
    owner: ActorContext,
}

impl Harness {
    async fn new() -> Self {
        Self::with(MemoryStore::new(), EngineConfig::default()).await
    }

    async fn with(store: MemoryStore, config: EngineConfig) -> Self {
        let store = Arc::new(store);
        let audit = Arc::new(MemoryAuditLog::new());
        let engine = MembershipEngine::with_config(store.clone(), audit.clone(), config);

        let (workspace, owner) = engine
            .create_workspace(ActorId::new(), "acme")
            .await
            .unwrap();
        let owner = ActorContext::new(owner, workspace.clone());
        Self {
            engine,
            store,
            audit,
            workspace,
            owner,
        }
    }

    /// Add a fresh actor to the workspace and return their context.
    async fn join(&self, role: &str) -> ActorContext {
        let m = self
            .engine
            .add_member_with_role(&self.owner, ActorId::new(), role)
            .await
            .unwrap();
        ActorContext::new(m, self.workspace.clone())
    }

    async fn is_active(&self, m: &Membership) -> bool {
        self.store
            .membership(&m.id)
            .await
            .map(|m| m.is_active())
            .unwrap_or(false)
    }
}

/// Workspace admin who is also a member of a project and of a team under it.
struct Nested {
    admin: ActorContext,
    project: ActorContext,
    team: ActorContext,
    admin_project: Membership,
    admin_team: Membership,
}

async fn nested(h: &Harness) -> Nested {
    let admin = h.join("member").await;
    let promoted = h
        .engine
        .change_role(&h.owner, admin.membership.id, "admin")
        .await
        .unwrap();
    assert_eq!(promoted.role, Role::Admin);

    let (project, project_owner) = h
        .engine
        .create_scope(&h.owner, ScopeKind::Project, "roadmap")
        .await
        .unwrap();
    let project = ActorContext::new(project_owner, project);
    let admin_project = h
        .engine
        .add_member(&project, admin.actor_id())
        .await
        .unwrap();

    let (team, team_owner) = h
        .engine
        .create_scope(&project, ScopeKind::Team, "core")
        .await
        .unwrap();
    let team = ActorContext::new(team_owner, team);
    let admin_team = h.engine.add_member(&team, admin.actor_id()).await.unwrap();

    Nested {
        admin,
        project,
        team,
        admin_project,
        admin_team,
    }
}

#[tokio::test]
async fn create_workspace_makes_single_owner() {
    let h = Harness::new().await;

    assert_eq!(h.owner.role(), Role::Owner);
    assert_eq!(h.workspace.kind, ScopeKind::Workspace);
    assert_eq!(h.store.owner_count(&h.workspace.id).await, 1);

    let events = h.audit.events().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].action, AuditAction::ScopeCreate);
    assert_eq!(events[0].result, AuditResult::Success);
}

#[tokio::test]
async fn add_then_promote_then_remove_with_cascade() {
    let h = Harness::new().await;
    let outsider = ActorId::new();
    let added = h.engine.add_member(&h.owner, outsider).await.unwrap();
    assert_eq!(added.role, Role::Member);
    assert_eq!(added.scope, h.workspace.scope_ref());

    let n = nested(&h).await;
    assert_eq!(n.admin_project.enclosing_membership_id, Some(n.admin.membership.id));
    assert_eq!(n.admin_team.enclosing_membership_id, Some(n.admin_project.id));

    let report = h
        .engine
        .remove_member(&h.owner, n.admin.membership.id)
        .await
        .unwrap();
    assert_eq!(
        report.removal_order(),
        vec![n.admin_team.id, n.admin_project.id, n.admin.membership.id]
    );
    assert_eq!(report.derived_count(), 2);

    let lookup = h
        .store
        .find_active_membership(&n.project.scope_ref(), &n.admin_project.id)
        .await;
    assert_eq!(lookup.unwrap_err(), StoreError::NotFound);

    let removed = h.store.membership(&n.admin_team.id).await.unwrap();
    assert_eq!(removed.state, MembershipState::Removed);
    assert!(removed.removed_at.is_some());

    // The outsider and every scope owner are untouched.
    assert!(h.is_active(&added).await);
    assert!(h.is_active(&n.project.membership).await);
    assert!(h.is_active(&n.team.membership).await);
}

#[tokio::test]
async fn removing_project_member_cascades_to_its_teams_only() {
    let h = Harness::new().await;
    let n = nested(&h).await;

    let report = h
        .engine
        .remove_member(&n.project, n.admin_project.id)
        .await
        .unwrap();
    assert_eq!(report.removal_order(), vec![n.admin_team.id, n.admin_project.id]);
    assert_eq!(report.derived_count(), 1);

    let team = h.store.membership(&n.admin_team.id).await.unwrap();
    assert_eq!(team.state, MembershipState::Removed);
    assert!(!h.is_active(&n.admin_project).await);

    // The workspace membership the project one was derived from stays.
    let workspace = h.store.membership(&n.admin.membership.id).await.unwrap();
    assert_eq!(workspace.state, MembershipState::Active);
    assert_eq!(workspace.role, Role::Admin);
    assert!(h.is_active(&n.team.membership).await);

    let cascades = h
        .audit
        .query(AuditLogFilter::new().action(AuditAction::MemberCascadeRemove))
        .await
        .unwrap();
    assert_eq!(cascades.len(), 1);
    assert_eq!(cascades[0].scope(), n.project.scope_ref());
}

#[tokio::test]
async fn sole_owner_cannot_be_removed() {
    let h = Harness::new().await;

    let err = h
        .engine
        .remove_member(&h.owner, h.owner.membership.id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
    assert!(err.reason().contains("cannot remove sole owner"));

    let err = h.engine.leave(&h.owner).await.unwrap_err();
    assert_eq!(err.reason(), policy::SOLE_OWNER_REMOVAL);

    let admin = h.join("admin").await;
    let err = h
        .engine
        .remove_member(&admin, h.owner.membership.id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    assert!(h.is_active(&h.owner.membership).await);
    assert_eq!(h.store.owner_count(&h.workspace.id).await, 1);
}

#[tokio::test]
async fn member_can_leave() {
    let h = Harness::new().await;
    let member = h.join("member").await;

    let report = h.engine.leave(&member).await.unwrap();
    assert_eq!(report.target, member.membership.id);
    assert!(!h.is_active(&member.membership).await);

    let events = h
        .audit
        .query(AuditLogFilter::new().action(AuditAction::MemberLeave))
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].target_membership_id, Some(member.membership.id));
}

#[tokio::test]
async fn role_hierarchy_is_enforced_for_every_requester() {
    let h = Harness::new().await;
    let admin = h.join("admin").await;
    let other_admin = h.join("admin").await;
    let member = h.join("member").await;
    let other_member = h.join("member").await;

    // Members manage nobody.
    for target in [&other_member, &other_admin] {
        let err = h
            .engine
            .remove_member(&member, target.membership.id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }
    let err = h.engine.add_member(&member, ActorId::new()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    // Admins manage members only.
    let err = h
        .engine
        .change_role(&admin, other_admin.membership.id, "member")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
    assert_eq!(err.reason(), "admins cannot change the role of admins");

    let err = h
        .engine
        .change_role(&admin, other_member.membership.id, "admin")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let err = h
        .engine
        .add_member_with_role(&admin, ActorId::new(), "admin")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    h.engine.add_member(&admin, ActorId::new()).await.unwrap();
    h.engine
        .remove_member(&admin, other_member.membership.id)
        .await
        .unwrap();

    // Nobody reaches the owner role except through transfer.
    for requester in [&h.owner, &admin] {
        let err = h
            .engine
            .change_role(requester, member.membership.id, "owner")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }
    let err = h
        .engine
        .add_member_with_role(&h.owner, ActorId::new(), "owner")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let err = h
        .engine
        .change_role(&h.owner, h.owner.membership.id, "admin")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    assert_eq!(h.store.owner_count(&h.workspace.id).await, 1);
}

#[tokio::test]
async fn unknown_role_is_bad_request() {
    let h = Harness::new().await;
    let member = h.join("member").await;

    let err = h
        .engine
        .add_member_with_role(&h.owner, ActorId::new(), "superuser")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);

    let err = h
        .engine
        .change_role(&h.owner, member.membership.id, "root")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);
}

#[tokio::test]
async fn change_role_to_same_role_is_noop() {
    let h = Harness::new().await;
    let member = h.join("member").await;

    let unchanged = h
        .engine
        .change_role(&h.owner, member.membership.id, "member")
        .await
        .unwrap();
    assert_eq!(unchanged.role, Role::Member);
    assert_eq!(unchanged.updated_at, member.membership.updated_at);
}

#[tokio::test]
async fn duplicate_add_is_conflict() {
    let h = Harness::new().await;
    let actor = ActorId::new();
    h.engine.add_member(&h.owner, actor).await.unwrap();

    let err = h.engine.add_member(&h.owner, actor).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn removed_actor_can_be_added_again() {
    let h = Harness::new().await;
    let member = h.join("member").await;
    h.engine
        .remove_member(&h.owner, member.membership.id)
        .await
        .unwrap();

    let again = h
        .engine
        .add_member(&h.owner, member.actor_id())
        .await
        .unwrap();
    assert_ne!(again.id, member.membership.id);
    assert!(!h.is_active(&member.membership).await);
}

#[tokio::test]
async fn stale_context_is_refused_after_removal() {
    let h = Harness::new().await;
    let admin = h.join("admin").await;
    h.engine
        .remove_member(&h.owner, admin.membership.id)
        .await
        .unwrap();

    let err = h.engine.add_member(&admin, ActorId::new()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
    assert!(err.reason().contains("no longer an active member"));

    let err = h.engine.list_members(&admin).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
}

#[tokio::test]
async fn stale_role_in_context_is_not_trusted() {
    let h = Harness::new().await;
    let admin = h.join("admin").await;
    h.engine
        .change_role(&h.owner, admin.membership.id, "member")
        .await
        .unwrap();

    // The context still says admin; the store says member.
    assert_eq!(admin.role(), Role::Admin);
    let err = h.engine.add_member(&admin, ActorId::new()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
}

#[tokio::test]
async fn containment_requires_enclosing_membership() {
    let h = Harness::new().await;
    let (project, project_owner) = h
        .engine
        .create_scope(&h.owner, ScopeKind::Project, "roadmap")
        .await
        .unwrap();
    let project = ActorContext::new(project_owner, project);

    let stranger = ActorId::new();
    let err = h.engine.add_member(&project, stranger).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(err.reason().contains("does not belong to the workspace"));

    // A team under the project needs both the project and the workspace.
    let (team, team_owner) = h
        .engine
        .create_scope(&project, ScopeKind::Team, "core")
        .await
        .unwrap();
    assert_eq!(team.parent_id, Some(project.scope.id));
    assert_eq!(team.workspace_id, h.workspace.id);
    let team = ActorContext::new(team_owner, team);

    let ws_only = h.join("member").await;
    let err = h
        .engine
        .add_member(&team, ws_only.actor_id())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(err.reason().contains("does not belong to the project"));

    let in_project = h
        .engine
        .add_member(&project, ws_only.actor_id())
        .await
        .unwrap();
    let in_team = h
        .engine
        .add_member(&team, ws_only.actor_id())
        .await
        .unwrap();
    assert_eq!(in_team.enclosing_membership_id, Some(in_project.id));
}

#[tokio::test]
async fn team_directly_under_workspace() {
    let h = Harness::new().await;
    let member = h.join("member").await;

    let (team, team_owner) = h
        .engine
        .create_scope(&member, ScopeKind::Team, "ops")
        .await
        .unwrap();
    assert_eq!(team.parent_id, Some(h.workspace.id));
    assert_eq!(team_owner.actor_id, member.actor_id());
    assert_eq!(team_owner.enclosing_membership_id, Some(member.membership.id));
}

#[tokio::test]
async fn invalid_scope_requests_are_bad_requests() {
    let h = Harness::new().await;

    let err = h
        .engine
        .create_scope(&h.owner, ScopeKind::Workspace, "nested")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);

    let err = h
        .engine
        .create_scope(&h.owner, ScopeKind::Project, "   ")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);

    let (project, owner) = h
        .engine
        .create_scope(&h.owner, ScopeKind::Project, "roadmap")
        .await
        .unwrap();
    let project = ActorContext::new(owner, project);
    let err = h
        .engine
        .create_scope(&project, ScopeKind::Project, "inner")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);

    let err = h.engine.create_workspace(ActorId::new(), "").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);
}

#[tokio::test]
async fn cascade_refuses_to_orphan_a_nested_scope() {
    let h = Harness::new().await;
    let admin = h.join("admin").await;
    let (project, project_owner) = h
        .engine
        .create_scope(&admin, ScopeKind::Project, "roadmap")
        .await
        .unwrap();

    let err = h
        .engine
        .remove_member(&h.owner, admin.membership.id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(err.reason().contains("transfer that ownership first"));
    assert!(h.is_active(&admin.membership).await);
    assert_eq!(h.store.owner_count(&project.id).await, 1);
    assert!(h.is_active(&project_owner).await);
}

#[tokio::test]
async fn failed_cascade_step_rolls_back_everything() {
    let h = Harness::new().await;
    let n = nested(&h).await;

    // Teams and projects go first; the target itself fails last.
    h.store
        .fail_on(
            FailPoint::RemoveMembership(n.admin.membership.id),
            StoreError::Backend("disk full".into()),
        )
        .await;

    let err = h
        .engine
        .remove_member(&h.owner, n.admin.membership.id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);

    assert!(h.is_active(&n.admin.membership).await);
    assert!(h.is_active(&n.admin_project).await);
    assert!(h.is_active(&n.admin_team).await);
}

#[tokio::test]
async fn cascade_needs_native_transactions() {
    let h = Harness::with(
        MemoryStore::without_native_transactions(),
        EngineConfig::default(),
    )
    .await;
    let n = nested(&h).await;

    let err = h
        .engine
        .remove_member(&h.owner, n.admin.membership.id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
    assert!(h.is_active(&n.admin.membership).await);
    assert!(h.is_active(&n.admin_team).await);

    // Nothing derived, nothing to keep consistent.
    let member = h.join("member").await;
    h.engine
        .remove_member(&h.owner, member.membership.id)
        .await
        .unwrap();
    assert!(!h.is_active(&member.membership).await);
}

#[tokio::test]
async fn commit_conflict_is_retried() {
    let h = Harness::new().await;
    h.store
        .fail_on(FailPoint::Commit, StoreError::Conflict("database is locked".into()))
        .await;

    let added = h.engine.add_member(&h.owner, ActorId::new()).await.unwrap();
    assert!(h.is_active(&added).await);
}

#[tokio::test]
async fn commit_conflict_surfaces_when_retries_are_exhausted() {
    let h = Harness::with(
        MemoryStore::new(),
        EngineConfig::default().with_conflict_retries(0),
    )
    .await;
    h.store
        .fail_on(FailPoint::Commit, StoreError::Conflict("database is locked".into()))
        .await;

    let actor = ActorId::new();
    let err = h.engine.add_member(&h.owner, actor).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(err.is_retryable());

    let lookup = h
        .store
        .find_active_membership_by_actor(&h.workspace.scope_ref(), &actor)
        .await;
    assert_eq!(lookup.unwrap_err(), StoreError::NotFound);
}

#[tokio::test]
async fn transfer_swaps_owner_and_admin() {
    let h = Harness::new().await;
    let member = h.join("member").await;

    let transfer = h
        .engine
        .transfer_ownership(&h.owner, member.membership.id)
        .await
        .unwrap();
    assert!(!transfer.is_noop());
    assert_eq!(transfer.new_owner.id, member.membership.id);
    assert_eq!(transfer.new_owner.role, Role::Owner);
    assert_eq!(transfer.previous_owner.role, Role::Admin);
    assert_eq!(h.store.owner_count(&h.workspace.id).await, 1);

    // The old owner is an admin now and cannot transfer again.
    let err = h
        .engine
        .transfer_ownership(&h.owner, h.owner.membership.id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    // The new owner can hand it back.
    h.engine
        .transfer_ownership(&member, h.owner.membership.id)
        .await
        .unwrap();
    assert_eq!(h.store.owner_count(&h.workspace.id).await, 1);
}

#[tokio::test]
async fn self_transfer_changes_nothing() {
    let h = Harness::new().await;

    let transfer = h
        .engine
        .transfer_ownership(&h.owner, h.owner.membership.id)
        .await
        .unwrap();
    assert!(transfer.is_noop());
    assert_eq!(transfer.new_owner.role, Role::Owner);

    let current = h.store.membership(&h.owner.membership.id).await.unwrap();
    assert_eq!(current.updated_at, h.owner.membership.updated_at);
}

#[tokio::test]
async fn transfer_rejects_missing_candidate_and_non_owner() {
    let h = Harness::new().await;
    let admin = h.join("admin").await;
    let member = h.join("member").await;

    let err = h
        .engine
        .transfer_ownership(&admin, member.membership.id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    h.engine
        .remove_member(&h.owner, member.membership.id)
        .await
        .unwrap();
    let err = h
        .engine
        .transfer_ownership(&h.owner, member.membership.id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn failed_transactional_transfer_changes_nothing() {
    let h = Harness::new().await;
    let member = h.join("member").await;
    h.store
        .fail_on(
            FailPoint::UpdateRole(member.membership.id),
            StoreError::Backend("io error".into()),
        )
        .await;

    let err = h
        .engine
        .transfer_ownership(&h.owner, member.membership.id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);

    let owner = h.store.membership(&h.owner.membership.id).await.unwrap();
    assert_eq!(owner.role, Role::Owner);
    let candidate = h.store.membership(&member.membership.id).await.unwrap();
    assert_eq!(candidate.role, Role::Member);
}

#[tokio::test]
async fn compensating_transfer_without_native_transactions() {
    let h = Harness::with(
        MemoryStore::without_native_transactions(),
        EngineConfig::default(),
    )
    .await;
    let admin = h.join("admin").await;

    let transfer = h
        .engine
        .transfer_ownership(&h.owner, admin.membership.id)
        .await
        .unwrap();
    assert_eq!(transfer.new_owner.role, Role::Owner);
    assert_eq!(transfer.previous_owner.role, Role::Admin);
    assert_eq!(h.store.owner_count(&h.workspace.id).await, 1);

    let events = h
        .audit
        .query(AuditLogFilter::new().action(AuditAction::OwnershipTransfer))
        .await
        .unwrap();
    let details = events[0].details.as_ref().unwrap();
    assert_eq!(details["mode"], "compensating");
}

#[tokio::test]
async fn compensating_transfer_restores_candidate_when_demotion_fails() {
    let h = Harness::with(
        MemoryStore::new(),
        EngineConfig::default().with_transfer_mode(TransferMode::Compensating),
    )
    .await;
    let admin = h.join("admin").await;
    h.store
        .fail_on(
            FailPoint::UpdateRole(h.owner.membership.id),
            StoreError::Backend("connection reset".into()),
        )
        .await;

    let err = h
        .engine
        .transfer_ownership(&h.owner, admin.membership.id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);

    let candidate = h.store.membership(&admin.membership.id).await.unwrap();
    assert_eq!(candidate.role, Role::Admin);
    let owner = h.store.membership(&h.owner.membership.id).await.unwrap();
    assert_eq!(owner.role, Role::Owner);
    assert_eq!(h.store.owner_count(&h.workspace.id).await, 1);
}

#[tokio::test]
async fn audit_records_denials_and_failures() {
    let h = Harness::new().await;
    let member = h.join("member").await;

    h.engine
        .remove_member(&member, h.owner.membership.id)
        .await
        .unwrap_err();
    h.engine
        .add_member_with_role(&h.owner, ActorId::new(), "superuser")
        .await
        .unwrap_err();

    let denied = h
        .audit
        .query(AuditLogFilter::new().result(AuditResult::Denied))
        .await
        .unwrap();
    assert_eq!(denied.len(), 1);
    assert_eq!(denied[0].action, AuditAction::MemberRemove);
    assert_eq!(denied[0].actor_id, member.actor_id());
    assert!(denied[0].reason.is_some());

    let failed = h
        .audit
        .query(AuditLogFilter::new().result(AuditResult::Failed))
        .await
        .unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].action, AuditAction::MemberAdd);
}

#[tokio::test]
async fn audit_records_cascade() {
    let h = Harness::new().await;
    let n = nested(&h).await;
    h.engine
        .remove_member(&h.owner, n.admin.membership.id)
        .await
        .unwrap();

    let cascades = h
        .audit
        .query(AuditLogFilter::new().action(AuditAction::MemberCascadeRemove))
        .await
        .unwrap();
    assert_eq!(cascades.len(), 1);
    assert_eq!(cascades[0].target_membership_id, Some(n.admin.membership.id));
    assert_eq!(cascades[0].workspace_id, Some(h.workspace.id));

    let count = h
        .audit
        .count(AuditLogFilter::new().workspace_id(h.workspace.id))
        .await
        .unwrap();
    assert!(count >= 8);
}

#[tokio::test]
async fn list_members_returns_active_only() {
    let h = Harness::new().await;
    let a = h.join("member").await;
    let b = h.join("admin").await;
    h.engine.remove_member(&h.owner, a.membership.id).await.unwrap();

    let members = h.engine.list_members(&b).await.unwrap();
    let ids: Vec<_> = members.iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![h.owner.membership.id, b.membership.id]);
}

#[tokio::test]
async fn resolve_actor_builds_context() {
    let h = Harness::new().await;
    let member = h.join("member").await;

    let ctx = h
        .engine
        .resolve_actor(h.workspace.id, member.actor_id())
        .await
        .unwrap();
    assert_eq!(ctx.membership.id, member.membership.id);
    assert_eq!(ctx.scope.id, h.workspace.id);

    let err = h
        .engine
        .resolve_actor(h.workspace.id, ActorId::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}
