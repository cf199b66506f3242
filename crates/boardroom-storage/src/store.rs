//! The repository traits that backends implement.

use futures::future::BoxFuture;

use crate::types::*;
use crate::StoreError;

/// Membership reads and writes, independent of storage technology.
///
/// Implemented both by stores (each call is its own unit of work) and by their
/// transactions (calls are staged until [`Transaction::commit`]).
#[cfg_attr(feature = "test-support", mockall::automock)]
#[async_trait::async_trait]
pub trait MembershipRepository: Send + Sync {
    // ───────────────────────────────────── Scopes ─────────────────────────────────────────

    /// Get a scope by ID.
    async fn get_scope(&self, scope_id: &ScopeId) -> Result<Scope, StoreError>;

    // ───────────────────────────────────── Memberships ────────────────────────────────────

    /// Persist a new Active membership.
    /// Fails with `AlreadyExists` if the actor already holds an Active membership in the scope.
    async fn add_membership(&self, params: &AddMembershipParams)
        -> Result<Membership, StoreError>;

    /// Get an Active membership of the given scope by ID.
    async fn find_active_membership(
        &self,
        scope: &ScopeRef,
        membership_id: &MembershipId,
    ) -> Result<Membership, StoreError>;

    /// Get an actor's Active membership in a scope.
    async fn find_active_membership_by_actor(
        &self,
        scope: &ScopeRef,
        actor_id: &ActorId,
    ) -> Result<Membership, StoreError>;

    /// List Active memberships directly derived from the given membership.
    async fn find_active_memberships_by_enclosing(
        &self,
        enclosing_membership_id: &MembershipId,
    ) -> Result<Vec<Membership>, StoreError>;

    /// List all Active memberships of a scope, oldest first.
    async fn list_active_memberships(&self, scope: &ScopeRef)
        -> Result<Vec<Membership>, StoreError>;

    /// Change the role of an Active membership.
    async fn update_role(
        &self,
        membership_id: &MembershipId,
        role: Role,
    ) -> Result<Membership, StoreError>;

    /// Move an Active membership to Removed. Returns the number of affected rows (0 or 1).
    async fn remove_membership(&self, membership_id: &MembershipId) -> Result<u64, StoreError>;
}

/// Explicit transaction over a [`MembershipRepository`].
///
/// Dropping a transaction without committing discards its writes.
#[async_trait::async_trait]
pub trait Transaction: MembershipRepository {
    async fn commit(self) -> Result<(), StoreError>;
    async fn rollback(self) -> Result<(), StoreError>;
}

/// The storage trait the membership engine depends on.
#[async_trait::async_trait]
pub trait MembershipStore: MembershipRepository {
    type Txn: Transaction + 'static;

    /// Create a scope and its initial owner membership atomically.
    async fn create_scope(
        &self,
        params: &CreateScopeParams,
    ) -> Result<(Scope, Membership), StoreError>;

    /// Begin an explicit transaction.
    async fn begin_txn(&self) -> Result<Self::Txn, StoreError>;

    /// Whether writes inside a transaction become visible atomically at commit.
    /// Stores that return false apply each write immediately and cannot roll back.
    fn native_transactions(&self) -> bool {
        true
    }
}

/// Run `f` inside a transaction: commit on `Ok`, roll back on `Err`.
///
/// The closure receives the transaction by reference and must move owned data into
/// the returned future.
pub async fn run_in_transaction<S, T, E, F>(store: &S, f: F) -> Result<T, E>
where
    S: MembershipStore + ?Sized,
    T: Send,
    E: From<StoreError> + Send,
    F: for<'t> FnOnce(&'t S::Txn) -> BoxFuture<'t, Result<T, E>> + Send,
{
    let txn = store.begin_txn().await?;
    let outcome = f(&txn).await;
    match outcome {
        Ok(value) => {
            txn.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = txn.rollback().await {
                tracing::warn!(error = %rollback_err, "transaction rollback failed");
            }
            Err(err)
        }
    }
}
