use boardroom_storage::{ActorId, Membership, Role, Scope, ScopeRef};

/// Who is asking, and in which scope.
///
/// Resolved once per request (see `MembershipEngine::resolve_actor`) and passed
/// explicitly into every engine call. The engine re-reads the membership before acting,
/// so a stale context can never grant more than the store currently allows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActorContext {
    pub membership: Membership,
    pub scope: Scope,
}

impl ActorContext {
    pub fn new(membership: Membership, scope: Scope) -> Self {
        Self { membership, scope }
    }

    pub fn actor_id(&self) -> ActorId {
        self.membership.actor_id
    }

    pub fn role(&self) -> Role {
        self.membership.role
    }

    pub fn scope_ref(&self) -> ScopeRef {
        self.scope.scope_ref()
    }
}
