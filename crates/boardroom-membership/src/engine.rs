use std::future::Future;
use std::sync::Arc;

use boardroom_audit::{AuditAction, AuditEvent, AuditLog, AuditResult};
use boardroom_storage::{
    run_in_transaction, ActorId, AddMembershipParams, CreateScopeParams, Membership,
    MembershipId, MembershipRepository, MembershipStore, Role, Scope, ScopeId, ScopeKind,
    StoreError,
};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::cascade::{self, RemovalReport};
use crate::policy::{self, Action};
use crate::transfer::{self, OwnershipTransfer, TransferStep};
use crate::validator;
use crate::{ActorContext, EngineConfig, EngineError, ErrorKind, TransferMode};

/// The membership engine.
///
/// Holds no membership state of its own: every call re-reads what it needs from the
/// store, validates, then writes inside a store transaction (or, for transfers on stores
/// without transactions, through the compensating protocol). A retryable store conflict
/// re-runs the whole operation from validation onwards.
pub struct MembershipEngine<S> {
    store: Arc<S>,
    audit: Arc<dyn AuditLog>,
    config: EngineConfig,
}

impl<S> Clone for MembershipEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            audit: self.audit.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S> MembershipEngine<S>
where
    S: MembershipStore + 'static,
{
    pub fn new(store: Arc<S>, audit: Arc<dyn AuditLog>) -> Self {
        Self::with_config(store, audit, EngineConfig::default())
    }

    pub fn with_config(store: Arc<S>, audit: Arc<dyn AuditLog>, config: EngineConfig) -> Self {
        Self {
            store,
            audit,
            config,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ───────────────────────────── Scopes ─────────────────────────────

    /// Create a workspace owned by `actor_id`.
    pub async fn create_workspace(
        &self,
        actor_id: ActorId,
        name: &str,
    ) -> Result<(Scope, Membership), EngineError> {
        validator::validate_scope_name(name)?;
        let params = CreateScopeParams {
            kind: ScopeKind::Workspace,
            name: name.to_string(),
            parent_id: None,
            owner_actor_id: actor_id,
            owner_enclosing_membership_id: None,
        };

        let store = self.store.as_ref();
        let params = &params;
        let (scope, owner) = self
            .retrying("create_workspace", move || async move {
                store.create_scope(params).await.map_err(EngineError::from)
            })
            .await?;

        info!(scope = %scope.scope_ref(), actor_id = %actor_id, "workspace created");
        self.record(
            AuditEvent::builder(actor_id, AuditAction::ScopeCreate, scope.scope_ref())
                .workspace_id(scope.workspace_id)
                .target(owner.id)
                .details(json!({ "kind": scope.kind, "name": scope.name }))
                .build(),
        )
        .await;
        Ok((scope, owner))
    }

    /// Create a project or team under the context scope. The creator becomes its owner.
    pub async fn create_scope(
        &self,
        ctx: &ActorContext,
        kind: ScopeKind,
        name: &str,
    ) -> Result<(Scope, Membership), EngineError> {
        let outcome = self.create_child_scope(ctx, kind, name).await;
        let details = match &outcome {
            Ok((scope, _)) => json!({ "kind": kind, "name": name, "scope_id": scope.id }),
            Err(_) => json!({ "kind": kind, "name": name }),
        };
        self.audit_outcome(
            ctx,
            AuditAction::ScopeCreate,
            outcome.as_ref().ok().map(|(_, owner)| owner.id),
            &outcome,
            details,
        )
        .await;

        if let Ok((scope, _)) = &outcome {
            info!(
                scope = %scope.scope_ref(),
                parent = %ctx.scope_ref(),
                actor_id = %ctx.actor_id(),
                "scope created"
            );
        }
        outcome
    }

    async fn create_child_scope(
        &self,
        ctx: &ActorContext,
        kind: ScopeKind,
        name: &str,
    ) -> Result<(Scope, Membership), EngineError> {
        if kind == ScopeKind::Workspace {
            return Err(EngineError::bad_request(
                "workspaces are created with create_workspace",
            ));
        }
        if !kind.can_nest_under(ctx.scope.kind) {
            return Err(EngineError::bad_request(format!(
                "a {} cannot be nested under a {}",
                kind, ctx.scope.kind
            )));
        }
        validator::validate_scope_name(name)?;

        let store = self.store.as_ref();
        self.retrying("create_scope", move || async move {
            let requester = validator::refresh_requester(store, ctx).await?;
            policy::authorize(requester.role, requester.role, Action::CreateScope)?;
            let params = CreateScopeParams {
                kind,
                name: name.to_string(),
                parent_id: Some(ctx.scope.id),
                owner_actor_id: requester.actor_id,
                owner_enclosing_membership_id: Some(requester.id),
            };
            store.create_scope(&params).await.map_err(EngineError::from)
        })
        .await
    }

    /// Build the context for `actor_id` acting in `scope_id`.
    pub async fn resolve_actor(
        &self,
        scope_id: ScopeId,
        actor_id: ActorId,
    ) -> Result<ActorContext, EngineError> {
        let scope = match self.store.get_scope(&scope_id).await {
            Ok(scope) => scope,
            Err(StoreError::NotFound) => {
                return Err(EngineError::not_found(format!("scope {} not found", scope_id)))
            }
            Err(e) => return Err(e.into()),
        };

        match self
            .store
            .find_active_membership_by_actor(&scope.scope_ref(), &actor_id)
            .await
        {
            Ok(membership) => Ok(ActorContext::new(membership, scope)),
            Err(StoreError::NotFound) => Err(EngineError::not_found(format!(
                "actor {} is not an active member of {}",
                actor_id,
                scope.scope_ref()
            ))),
            Err(e) => Err(e.into()),
        }
    }

    // ───────────────────────────── Memberships ─────────────────────────────

    /// Add `target` to the context scope with role `member`.
    pub async fn add_member(
        &self,
        ctx: &ActorContext,
        target: ActorId,
    ) -> Result<Membership, EngineError> {
        self.add_member_with_role(ctx, target, Role::Member.as_str())
            .await
    }

    /// Add `target` to the context scope with an explicit role.
    pub async fn add_member_with_role(
        &self,
        ctx: &ActorContext,
        target: ActorId,
        role: &str,
    ) -> Result<Membership, EngineError> {
        let outcome = match validator::parse_role(role) {
            Ok(role) => self.insert_member(ctx, target, role).await,
            Err(e) => Err(e),
        };

        let target_id = outcome.as_ref().ok().map(|m| m.id);
        self.audit_outcome(
            ctx,
            AuditAction::MemberAdd,
            target_id,
            &outcome,
            json!({ "actor_id": target, "role": role }),
        )
        .await;

        if let Ok(m) = &outcome {
            info!(
                scope = %m.scope,
                membership_id = %m.id,
                actor_id = %m.actor_id,
                role = %m.role,
                "member added"
            );
        }
        outcome
    }

    async fn insert_member(
        &self,
        ctx: &ActorContext,
        target: ActorId,
        role: Role,
    ) -> Result<Membership, EngineError> {
        let store = self.store.as_ref();
        self.retrying("add_member", move || {
            let ctx = ctx.clone();
            run_in_transaction(store, move |txn| {
                Box::pin(async move {
                    let requester = validator::refresh_requester(txn, &ctx).await?;
                    policy::authorize(requester.role, role, Action::AddMember)?;
                    validator::ensure_not_member(txn, &ctx.scope_ref(), &target).await?;
                    let enclosing = validator::resolve_enclosing(txn, &ctx.scope, &target).await?;

                    let params = AddMembershipParams {
                        scope: ctx.scope_ref(),
                        actor_id: target,
                        role,
                        enclosing_membership_id: enclosing.map(|m| m.id),
                    };
                    match txn.add_membership(&params).await {
                        Ok(m) => Ok(m),
                        Err(StoreError::AlreadyExists) => Err(EngineError::conflict(format!(
                            "actor {} is already a member of {}",
                            target, params.scope
                        ))),
                        Err(e) => Err(e.into()),
                    }
                })
            })
        })
        .await
    }

    /// Change the role of an Active membership in the context scope.
    pub async fn change_role(
        &self,
        ctx: &ActorContext,
        target: MembershipId,
        new_role: &str,
    ) -> Result<Membership, EngineError> {
        let outcome = match validator::parse_role(new_role) {
            Ok(role) => self.update_member_role(ctx, target, role).await,
            Err(e) => Err(e),
        };

        let details = match &outcome {
            Ok((_, previous)) => json!({ "from": previous, "to": new_role }),
            Err(_) => json!({ "to": new_role }),
        };
        self.audit_outcome(ctx, AuditAction::MemberChangeRole, Some(target), &outcome, details)
            .await;

        outcome.map(|(m, previous)| {
            info!(
                scope = %m.scope,
                membership_id = %m.id,
                from = %previous,
                role = %m.role,
                "member role changed"
            );
            m
        })
    }

    async fn update_member_role(
        &self,
        ctx: &ActorContext,
        target: MembershipId,
        new_role: Role,
    ) -> Result<(Membership, Role), EngineError> {
        let store = self.store.as_ref();
        self.retrying("change_role", move || {
            let ctx = ctx.clone();
            run_in_transaction(store, move |txn| {
                Box::pin(async move {
                    let requester = validator::refresh_requester(txn, &ctx).await?;
                    let current = validator::find_target(txn, &ctx.scope_ref(), &target).await?;
                    policy::authorize_role_change(requester.role, current.role, new_role)?;

                    if current.role == new_role {
                        let previous = current.role;
                        return Ok((current, previous));
                    }
                    let updated = txn
                        .update_role(&current.id, new_role)
                        .await
                        .map_err(|e| EngineError::from(e).into_write_failure("updating role"))?;
                    Ok((updated, current.role))
                })
            })
        })
        .await
    }

    /// Remove a membership and everything derived from it.
    ///
    /// Targeting the requester's own membership is a self-leave.
    pub async fn remove_member(
        &self,
        ctx: &ActorContext,
        target: MembershipId,
    ) -> Result<RemovalReport, EngineError> {
        let leaving = target == ctx.membership.id;
        let action = if leaving {
            AuditAction::MemberLeave
        } else {
            AuditAction::MemberRemove
        };

        let outcome = self.remove_with_cascade(ctx, target, leaving).await;

        let details = match &outcome {
            Ok(report) => serde_json::to_value(report).unwrap_or_default(),
            Err(_) => json!({}),
        };
        self.audit_outcome(ctx, action, Some(target), &outcome, details)
            .await;

        if let Ok(report) = &outcome {
            info!(
                scope = %report.scope,
                membership_id = %report.target,
                derived = report.derived_count(),
                leaving,
                "membership removed"
            );
            if report.derived_count() > 0 {
                self.record(
                    AuditEvent::builder(
                        ctx.actor_id(),
                        AuditAction::MemberCascadeRemove,
                        ctx.scope_ref(),
                    )
                    .workspace_id(ctx.scope.workspace_id)
                    .target(report.target)
                    .details(json!({
                        "teams": report.removed_teams,
                        "projects": report.removed_projects,
                    }))
                    .build(),
                )
                .await;
            }
        }
        outcome
    }

    /// Remove the requester's own membership.
    pub async fn leave(&self, ctx: &ActorContext) -> Result<RemovalReport, EngineError> {
        self.remove_member(ctx, ctx.membership.id).await
    }

    async fn remove_with_cascade(
        &self,
        ctx: &ActorContext,
        target: MembershipId,
        leaving: bool,
    ) -> Result<RemovalReport, EngineError> {
        let store = self.store.as_ref();
        let native = store.native_transactions();

        self.retrying("remove_member", move || {
            let ctx = ctx.clone();
            run_in_transaction(store, move |txn| {
                Box::pin(async move {
                    let requester = validator::refresh_requester(txn, &ctx).await?;
                    let (target, action) = if leaving {
                        (requester.clone(), Action::Leave)
                    } else {
                        let t = validator::find_target(txn, &ctx.scope_ref(), &target).await?;
                        (t, Action::RemoveMember)
                    };
                    policy::authorize(requester.role, target.role, action)?;

                    let plan = cascade::resolve_derived(txn, target).await?;
                    if let Some(owner) = plan.derived_owner() {
                        return Err(EngineError::conflict(format!(
                            "membership {} owns {}; transfer that ownership first",
                            owner.id, owner.scope
                        )));
                    }
                    if !native && !plan.is_single() {
                        return Err(EngineError::internal(
                            "cascading removal requires a store with native transactions",
                        ));
                    }
                    cascade::execute(txn, plan).await
                })
            })
        })
        .await
    }

    // ───────────────────────────── Ownership ─────────────────────────────

    /// Make `candidate` the owner of the context scope; the current owner becomes admin.
    pub async fn transfer_ownership(
        &self,
        ctx: &ActorContext,
        candidate: MembershipId,
    ) -> Result<OwnershipTransfer, EngineError> {
        let mode = self
            .config
            .transfer_mode
            .resolve(self.store.native_transactions());

        let outcome = match mode {
            TransferMode::Compensating => self.transfer_compensating(ctx, candidate).await,
            _ => self.transfer_transactional(ctx, candidate).await,
        };

        let details = match &outcome {
            Ok(t) => json!({
                "previous_owner": t.previous_owner.id,
                "new_owner": t.new_owner.id,
                "mode": mode.as_str(),
                "noop": t.is_noop(),
            }),
            Err(_) => json!({ "mode": mode.as_str() }),
        };
        self.audit_outcome(ctx, AuditAction::OwnershipTransfer, Some(candidate), &outcome, details)
            .await;

        if let Ok(t) = &outcome {
            if t.is_noop() {
                debug!(membership_id = %t.new_owner.id, "self-transfer of ownership is a no-op");
            } else {
                info!(
                    scope = %ctx.scope_ref(),
                    previous_owner = %t.previous_owner.id,
                    new_owner = %t.new_owner.id,
                    "ownership transferred"
                );
            }
        }
        outcome
    }

    async fn transfer_transactional(
        &self,
        ctx: &ActorContext,
        candidate: MembershipId,
    ) -> Result<OwnershipTransfer, EngineError> {
        let store = self.store.as_ref();
        self.retrying("transfer_ownership", move || {
            let ctx = ctx.clone();
            run_in_transaction(store, move |txn| {
                Box::pin(async move {
                    match transfer::prepare(txn, &ctx, candidate).await? {
                        TransferStep::Unchanged(owner) => Ok(OwnershipTransfer {
                            previous_owner: owner.clone(),
                            new_owner: owner,
                        }),
                        TransferStep::Apply { owner, candidate } => {
                            transfer::apply_transactional(txn, owner, candidate).await
                        }
                    }
                })
            })
        })
        .await
    }

    async fn transfer_compensating(
        &self,
        ctx: &ActorContext,
        candidate: MembershipId,
    ) -> Result<OwnershipTransfer, EngineError> {
        let store = self.store.as_ref();
        self.retrying("transfer_ownership", move || async move {
            match transfer::prepare(store, ctx, candidate).await? {
                TransferStep::Unchanged(owner) => Ok(OwnershipTransfer {
                    previous_owner: owner.clone(),
                    new_owner: owner,
                }),
                TransferStep::Apply { owner, candidate } => {
                    transfer::apply_compensating(store, owner, candidate).await
                }
            }
        })
        .await
    }

    // ───────────────────────────── Queries ─────────────────────────────

    /// Active memberships of the context scope, oldest first.
    pub async fn list_members(&self, ctx: &ActorContext) -> Result<Vec<Membership>, EngineError> {
        let requester = validator::refresh_requester(self.store.as_ref(), ctx).await?;
        policy::authorize(requester.role, requester.role, Action::ListMembers)?;
        Ok(self.store.list_active_memberships(&ctx.scope_ref()).await?)
    }

    // ───────────────────────────── Helpers ─────────────────────────────

    /// Run `attempt`, re-running it after retryable store conflicts.
    async fn retrying<T, F, Fut>(
        &self,
        operation: &'static str,
        mut attempt: F,
    ) -> Result<T, EngineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, EngineError>>,
    {
        let mut retries = 0;
        loop {
            match attempt().await {
                Err(e) if e.is_retryable() && retries < self.config.conflict_retries => {
                    retries += 1;
                    debug!(operation, retries, error = %e, "store conflict; retrying");
                }
                Err(e) if e.is_retryable() => {
                    warn!(operation, retries, error = %e, "store conflict; giving up");
                    return Err(e);
                }
                outcome => return outcome,
            }
        }
    }

    async fn audit_outcome<T>(
        &self,
        ctx: &ActorContext,
        action: AuditAction,
        target: Option<MembershipId>,
        outcome: &Result<T, EngineError>,
        details: serde_json::Value,
    ) {
        let mut builder = AuditEvent::builder(ctx.actor_id(), action, ctx.scope_ref())
            .workspace_id(ctx.scope.workspace_id)
            .details(details);
        if let Some(target) = target {
            builder = builder.target(target);
        }
        if let Err(e) = outcome {
            let result = if e.kind() == ErrorKind::Forbidden {
                info!(
                    action = %action,
                    scope = %ctx.scope_ref(),
                    actor_id = %ctx.actor_id(),
                    reason = e.reason(),
                    "request denied"
                );
                AuditResult::Denied
            } else {
                AuditResult::Failed
            };
            builder = builder.result(result).reason(e.to_string());
        }
        self.record(builder.build()).await;
    }

    async fn record(&self, event: AuditEvent) {
        if let Err(e) = self.audit.record(event).await {
            warn!(error = %e, "failed to record audit event");
        }
    }
}
