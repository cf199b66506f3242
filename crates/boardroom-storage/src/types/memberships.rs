//! Membership types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::{ActorId, MembershipId, Role, ScopeRef};

/// Lifecycle state of a persisted membership. `Removed` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipState {
    Active,
    Removed,
}

impl MembershipState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipState::Active => "active",
            MembershipState::Removed => "removed",
        }
    }
}

impl FromStr for MembershipState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(MembershipState::Active),
            "removed" => Ok(MembershipState::Removed),
            _ => Err(format!("invalid membership state: {}", s)),
        }
    }
}

/// Membership record
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Membership {
    pub id: MembershipId,
    pub scope: ScopeRef,
    pub actor_id: ActorId,
    pub role: Role,
    /// Same actor's membership in the parent scope (None for workspace memberships).
    pub enclosing_membership_id: Option<MembershipId>,
    pub state: MembershipState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub removed_at: Option<DateTime<Utc>>,
}

impl Membership {
    pub fn is_active(&self) -> bool {
        self.state == MembershipState::Active
    }

    pub fn is_owner(&self) -> bool {
        self.role == Role::Owner
    }
}

/// Parameters for adding a membership
#[derive(Clone, Debug)]
pub struct AddMembershipParams {
    pub scope: ScopeRef,
    pub actor_id: ActorId,
    pub role: Role,
    pub enclosing_membership_id: Option<MembershipId>,
}
