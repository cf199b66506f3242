//! In-memory membership store.
//!
//! This implementation is suitable for:
//! - Development and testing
//! - Single process deployments that don't need durability
//!
//! Transactions stage their writes privately and validate them at commit time
//! (optimistic concurrency): a commit fails with `StoreError::Conflict` if any
//! membership it wrote was changed by another commit in the meantime, or if applying
//! it would break uniqueness, containment or the single-owner rule. A whole commit is
//! applied under one write lock, so readers never see part of a transaction.
//!
//! Reads inside a transaction look up its staged writes first and fall back to the
//! committed map; neither they nor commit copy the committed state. Scans (by actor,
//! by scope, by enclosing membership) are linear in the number of memberships.

use async_trait::async_trait;
use boardroom_storage::{
    ActorId, AddMembershipParams, CreateScopeParams, Membership, MembershipId,
    MembershipRepository, MembershipState, MembershipStore, Role, Scope, ScopeId, ScopeKind,
    ScopeRef, StoreError, Transaction,
};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// A write the store can be told to fail, for exercising rollback paths.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FailPoint {
    AddMembership(ActorId),
    UpdateRole(MembershipId),
    RemoveMembership(MembershipId),
    BeginTxn,
    Commit,
}

fn sorted(mut memberships: Vec<Membership>) -> Vec<Membership> {
    memberships.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    memberships
}

fn mark_removed(membership: &mut Membership) {
    let now = Utc::now();
    membership.state = MembershipState::Removed;
    membership.removed_at = Some(now);
    membership.updated_at = now;
}

/// Read access to memberships, either committed or as a transaction sees them.
trait MembershipView {
    fn get(&self, membership_id: &MembershipId) -> Option<&Membership>;

    fn all(&self) -> Box<dyn Iterator<Item = &Membership> + '_>;

    fn active(&self, membership_id: &MembershipId) -> Result<Membership, StoreError> {
        self.get(membership_id)
            .filter(|m| m.is_active())
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn is_active(&self, membership_id: &MembershipId) -> bool {
        self.get(membership_id).is_some_and(|m| m.is_active())
    }

    fn find_active(
        &self,
        scope: &ScopeRef,
        membership_id: &MembershipId,
    ) -> Result<Membership, StoreError> {
        self.get(membership_id)
            .filter(|m| m.is_active() && m.scope == *scope)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn find_active_by_actor(
        &self,
        scope: &ScopeRef,
        actor_id: &ActorId,
    ) -> Result<Membership, StoreError> {
        self.all()
            .find(|m| m.is_active() && m.scope == *scope && m.actor_id == *actor_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn active_by_enclosing(&self, enclosing_membership_id: &MembershipId) -> Vec<Membership> {
        let enclosing = Some(*enclosing_membership_id);
        sorted(
            self.all()
                .filter(|m| m.is_active() && m.enclosing_membership_id == enclosing)
                .cloned()
                .collect(),
        )
    }

    fn list_active(&self, scope: &ScopeRef) -> Vec<Membership> {
        sorted(
            self.all()
                .filter(|m| m.is_active() && m.scope == *scope)
                .cloned()
                .collect(),
        )
    }

    fn check_unique_active(&self) -> Result<(), StoreError> {
        let mut seen = HashSet::new();
        for m in self.all().filter(|m| m.is_active()) {
            if !seen.insert((m.scope.id, m.actor_id)) {
                return Err(StoreError::AlreadyExists);
            }
        }
        Ok(())
    }

    fn check_containment(&self) -> Result<(), StoreError> {
        for m in self.all().filter(|m| m.is_active()) {
            if let Some(enclosing) = &m.enclosing_membership_id {
                if !self.is_active(enclosing) {
                    return Err(StoreError::Conflict(format!(
                        "membership {} would outlive enclosing membership {}",
                        m.id, enclosing
                    )));
                }
            }
        }
        Ok(())
    }

    fn check_single_owner(&self, scope_id: &ScopeId) -> Result<(), StoreError> {
        let owners = self
            .all()
            .filter(|m| m.is_active() && m.scope.id == *scope_id && m.is_owner())
            .count();
        if owners != 1 {
            return Err(StoreError::Conflict(format!(
                "scope {} would have {} owners",
                scope_id, owners
            )));
        }
        Ok(())
    }
}

/// Checks a new membership against `view` and builds it without storing it.
fn new_membership(
    view: &impl MembershipView,
    scope: &Scope,
    params: &AddMembershipParams,
) -> Result<Membership, StoreError> {
    if scope.kind != params.scope.kind {
        return Err(StoreError::NotFound);
    }
    if view
        .find_active_by_actor(&params.scope, &params.actor_id)
        .is_ok()
    {
        return Err(StoreError::AlreadyExists);
    }
    if let Some(enclosing) = &params.enclosing_membership_id {
        if !view.is_active(enclosing) {
            return Err(StoreError::Conflict(format!(
                "enclosing membership {} is not active",
                enclosing
            )));
        }
    }

    let now = Utc::now();
    Ok(Membership {
        id: MembershipId::new(),
        scope: params.scope,
        actor_id: params.actor_id,
        role: params.role,
        enclosing_membership_id: params.enclosing_membership_id,
        state: MembershipState::Active,
        created_at: now,
        updated_at: now,
        removed_at: None,
    })
}

#[derive(Debug, Default)]
struct MemoryState {
    scopes: HashMap<ScopeId, Scope>,
    memberships: HashMap<MembershipId, Membership>,
}

impl MembershipView for MemoryState {
    fn get(&self, membership_id: &MembershipId) -> Option<&Membership> {
        self.memberships.get(membership_id)
    }

    fn all(&self) -> Box<dyn Iterator<Item = &Membership> + '_> {
        Box::new(self.memberships.values())
    }
}

impl MemoryState {
    fn get_scope(&self, scope_id: &ScopeId) -> Result<Scope, StoreError> {
        self.scopes.get(scope_id).cloned().ok_or(StoreError::NotFound)
    }

    fn insert_membership(
        &mut self,
        params: &AddMembershipParams,
    ) -> Result<Membership, StoreError> {
        let scope = self.get_scope(&params.scope.id)?;
        let membership = new_membership(&*self, &scope, params)?;
        self.memberships.insert(membership.id, membership.clone());
        Ok(membership)
    }

    fn update_role(
        &mut self,
        membership_id: &MembershipId,
        role: Role,
    ) -> Result<Membership, StoreError> {
        let membership = self
            .memberships
            .get_mut(membership_id)
            .filter(|m| m.is_active())
            .ok_or(StoreError::NotFound)?;
        membership.role = role;
        membership.updated_at = Utc::now();
        Ok(membership.clone())
    }

    fn remove(&mut self, membership_id: &MembershipId) -> u64 {
        match self
            .memberships
            .get_mut(membership_id)
            .filter(|m| m.is_active())
        {
            Some(membership) => {
                mark_removed(membership);
                1
            }
            None => 0,
        }
    }

    fn insert_scope(
        &mut self,
        params: &CreateScopeParams,
    ) -> Result<(Scope, Membership), StoreError> {
        let workspace_id = match (&params.kind, &params.parent_id) {
            (ScopeKind::Workspace, None) => None,
            (ScopeKind::Workspace, Some(_)) => {
                return Err(StoreError::Backend("a workspace has no parent scope".into()))
            }
            (_, Some(parent_id)) => {
                let parent = self.get_scope(parent_id)?;
                if !params.kind.can_nest_under(parent.kind) {
                    return Err(StoreError::Backend(format!(
                        "a {} cannot be nested under a {}",
                        params.kind, parent.kind
                    )));
                }
                Some(parent.workspace_id)
            }
            (_, None) => {
                return Err(StoreError::Backend(format!(
                    "a {} requires a parent scope",
                    params.kind
                )))
            }
        };

        let id = ScopeId::new();
        let scope = Scope {
            id,
            kind: params.kind,
            parent_id: params.parent_id,
            workspace_id: workspace_id.unwrap_or(id),
            name: params.name.clone(),
            created_at: Utc::now(),
        };
        self.scopes.insert(id, scope.clone());

        let owner = self.insert_membership(&AddMembershipParams {
            scope: scope.scope_ref(),
            actor_id: params.owner_actor_id,
            role: Role::Owner,
            enclosing_membership_id: params.owner_enclosing_membership_id,
        });
        match owner {
            Ok(owner) => Ok((scope, owner)),
            Err(e) => {
                self.scopes.remove(&id);
                Err(e)
            }
        }
    }
}

/// In-memory membership store.
///
/// Cloning is cheap and every clone shares the same state.
#[derive(Clone)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
    faults: Arc<Mutex<Vec<(FailPoint, StoreError)>>>,
    native: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(MemoryState::default())),
            faults: Arc::new(Mutex::new(Vec::new())),
            native: true,
        }
    }

    /// A store whose transactions write through immediately and cannot roll back.
    pub fn without_native_transactions() -> Self {
        Self {
            native: false,
            ..Self::new()
        }
    }

    /// Make the next matching write fail once with `error`.
    pub async fn fail_on(&self, point: FailPoint, error: StoreError) {
        self.faults.lock().await.push((point, error));
    }

    /// Look up a membership in any lifecycle state.
    pub async fn membership(&self, membership_id: &MembershipId) -> Option<Membership> {
        self.state.read().await.memberships.get(membership_id).cloned()
    }

    /// Number of Active owner memberships in a scope.
    pub async fn owner_count(&self, scope_id: &ScopeId) -> usize {
        self.state
            .read()
            .await
            .memberships
            .values()
            .filter(|m| m.is_active() && m.scope.id == *scope_id && m.is_owner())
            .count()
    }

    async fn trip(&self, point: FailPoint) -> Result<(), StoreError> {
        let mut faults = self.faults.lock().await;
        if let Some(pos) = faults.iter().position(|(p, _)| *p == point) {
            let (_, error) = faults.remove(pos);
            tracing::debug!(?point, %error, "injected store failure");
            return Err(error);
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MembershipRepository for MemoryStore {
    async fn get_scope(&self, scope_id: &ScopeId) -> Result<Scope, StoreError> {
        self.state.read().await.get_scope(scope_id)
    }

    async fn add_membership(&self, params: &AddMembershipParams) -> Result<Membership, StoreError> {
        self.trip(FailPoint::AddMembership(params.actor_id)).await?;
        self.state.write().await.insert_membership(params)
    }

    async fn find_active_membership(
        &self,
        scope: &ScopeRef,
        membership_id: &MembershipId,
    ) -> Result<Membership, StoreError> {
        self.state.read().await.find_active(scope, membership_id)
    }

    async fn find_active_membership_by_actor(
        &self,
        scope: &ScopeRef,
        actor_id: &ActorId,
    ) -> Result<Membership, StoreError> {
        self.state.read().await.find_active_by_actor(scope, actor_id)
    }

    async fn find_active_memberships_by_enclosing(
        &self,
        enclosing_membership_id: &MembershipId,
    ) -> Result<Vec<Membership>, StoreError> {
        Ok(self.state.read().await.active_by_enclosing(enclosing_membership_id))
    }

    async fn list_active_memberships(
        &self,
        scope: &ScopeRef,
    ) -> Result<Vec<Membership>, StoreError> {
        Ok(self.state.read().await.list_active(scope))
    }

    async fn update_role(
        &self,
        membership_id: &MembershipId,
        role: Role,
    ) -> Result<Membership, StoreError> {
        self.trip(FailPoint::UpdateRole(*membership_id)).await?;
        self.state.write().await.update_role(membership_id, role)
    }

    async fn remove_membership(&self, membership_id: &MembershipId) -> Result<u64, StoreError> {
        self.trip(FailPoint::RemoveMembership(*membership_id)).await?;
        Ok(self.state.write().await.remove(membership_id))
    }
}

#[async_trait]
impl MembershipStore for MemoryStore {
    type Txn = MemoryTxn;

    async fn create_scope(
        &self,
        params: &CreateScopeParams,
    ) -> Result<(Scope, Membership), StoreError> {
        self.trip(FailPoint::AddMembership(params.owner_actor_id)).await?;
        self.state.write().await.insert_scope(params)
    }

    async fn begin_txn(&self) -> Result<Self::Txn, StoreError> {
        self.trip(FailPoint::BeginTxn).await?;
        Ok(MemoryTxn {
            store: self.clone(),
            staged: Mutex::new(Staged::default()),
        })
    }

    fn native_transactions(&self) -> bool {
        self.native
    }
}

#[derive(Default)]
struct Staged {
    /// Latest version of every membership written by this transaction.
    writes: HashMap<MembershipId, Membership>,
    /// Committed version each written membership had when first touched.
    seen: HashMap<MembershipId, Membership>,
}

/// Transaction over a [`MemoryStore`].
///
/// With native transactions, writes stay private until commit. Otherwise every write is
/// applied to the store immediately and rollback is a no-op.
pub struct MemoryTxn {
    store: MemoryStore,
    staged: Mutex<Staged>,
}

/// Committed memberships with a transaction's staged writes laid on top.
struct Overlay<'a> {
    base: &'a MemoryState,
    writes: &'a HashMap<MembershipId, Membership>,
}

impl MembershipView for Overlay<'_> {
    fn get(&self, membership_id: &MembershipId) -> Option<&Membership> {
        self.writes
            .get(membership_id)
            .or_else(|| self.base.memberships.get(membership_id))
    }

    fn all(&self) -> Box<dyn Iterator<Item = &Membership> + '_> {
        let writes = self.writes;
        let committed = self
            .base
            .memberships
            .values()
            .filter(move |m| !writes.contains_key(&m.id));
        Box::new(writes.values().chain(committed))
    }
}

impl MemoryTxn {
    async fn read<T>(&self, f: impl FnOnce(&Overlay<'_>) -> T) -> T {
        let staged = self.staged.lock().await;
        let base = self.store.state.read().await;
        f(&Overlay {
            base: &base,
            writes: &staged.writes,
        })
    }

    /// Stages the membership `f` produces, remembering the committed version it replaces.
    async fn stage_with<F>(&self, f: F) -> Result<Membership, StoreError>
    where
        F: FnOnce(&Overlay<'_>) -> Result<Membership, StoreError>,
    {
        let mut staged = self.staged.lock().await;
        let base = self.store.state.read().await;
        let membership = f(&Overlay {
            base: &base,
            writes: &staged.writes,
        })?;
        if let Some(committed) = base.memberships.get(&membership.id) {
            staged
                .seen
                .entry(membership.id)
                .or_insert_with(|| committed.clone());
        }
        staged.writes.insert(membership.id, membership.clone());
        Ok(membership)
    }
}

#[async_trait]
impl MembershipRepository for MemoryTxn {
    async fn get_scope(&self, scope_id: &ScopeId) -> Result<Scope, StoreError> {
        self.store.get_scope(scope_id).await
    }

    async fn add_membership(&self, params: &AddMembershipParams) -> Result<Membership, StoreError> {
        if !self.store.native {
            return self.store.add_membership(params).await;
        }
        self.store.trip(FailPoint::AddMembership(params.actor_id)).await?;
        self.stage_with(|view| {
            let scope = view.base.get_scope(&params.scope.id)?;
            new_membership(view, &scope, params)
        })
        .await
    }

    async fn find_active_membership(
        &self,
        scope: &ScopeRef,
        membership_id: &MembershipId,
    ) -> Result<Membership, StoreError> {
        self.read(|view| view.find_active(scope, membership_id)).await
    }

    async fn find_active_membership_by_actor(
        &self,
        scope: &ScopeRef,
        actor_id: &ActorId,
    ) -> Result<Membership, StoreError> {
        self.read(|view| view.find_active_by_actor(scope, actor_id))
            .await
    }

    async fn find_active_memberships_by_enclosing(
        &self,
        enclosing_membership_id: &MembershipId,
    ) -> Result<Vec<Membership>, StoreError> {
        Ok(self
            .read(|view| view.active_by_enclosing(enclosing_membership_id))
            .await)
    }

    async fn list_active_memberships(
        &self,
        scope: &ScopeRef,
    ) -> Result<Vec<Membership>, StoreError> {
        Ok(self.read(|view| view.list_active(scope)).await)
    }

    async fn update_role(
        &self,
        membership_id: &MembershipId,
        role: Role,
    ) -> Result<Membership, StoreError> {
        if !self.store.native {
            return self.store.update_role(membership_id, role).await;
        }
        self.store.trip(FailPoint::UpdateRole(*membership_id)).await?;
        self.stage_with(|view| {
            let mut membership = view.active(membership_id)?;
            membership.role = role;
            membership.updated_at = Utc::now();
            Ok(membership)
        })
        .await
    }

    async fn remove_membership(&self, membership_id: &MembershipId) -> Result<u64, StoreError> {
        if !self.store.native {
            return self.store.remove_membership(membership_id).await;
        }
        self.store
            .trip(FailPoint::RemoveMembership(*membership_id))
            .await?;
        let removed = self
            .stage_with(|view| {
                let mut membership = view.active(membership_id)?;
                mark_removed(&mut membership);
                Ok(membership)
            })
            .await;
        match removed {
            Ok(_) => Ok(1),
            Err(StoreError::NotFound) => Ok(0),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl Transaction for MemoryTxn {
    async fn commit(self) -> Result<(), StoreError> {
        self.store.trip(FailPoint::Commit).await?;
        if !self.store.native {
            return Ok(());
        }

        let staged = self.staged.into_inner();
        if staged.writes.is_empty() {
            return Ok(());
        }

        let mut state = self.store.state.write().await;
        for (id, seen) in &staged.seen {
            if state.memberships.get(id) != Some(seen) {
                return Err(StoreError::Conflict(format!(
                    "membership {} was changed by a concurrent transaction",
                    id
                )));
            }
        }

        let next = Overlay {
            base: &state,
            writes: &staged.writes,
        };
        next.check_unique_active()?;
        next.check_containment()?;
        let touched: HashSet<ScopeId> = staged.writes.values().map(|m| m.scope.id).collect();
        for scope_id in &touched {
            next.check_single_owner(scope_id)?;
        }

        state.memberships.extend(staged.writes);
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        if !self.store.native {
            tracing::warn!("rollback requested on a store without native transactions");
        }
        Ok(())
    }
}
