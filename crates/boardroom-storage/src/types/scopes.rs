//! Scope types (workspace, project, team).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::{ActorId, ScopeId};

/// Kind of container a membership belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeKind {
    Workspace,
    Project,
    Team,
}

impl ScopeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeKind::Workspace => "workspace",
            ScopeKind::Project => "project",
            ScopeKind::Team => "team",
        }
    }

    /// Whether a scope of this kind may be nested directly under `parent`.
    pub fn can_nest_under(&self, parent: ScopeKind) -> bool {
        match self {
            ScopeKind::Workspace => false,
            ScopeKind::Project => parent == ScopeKind::Workspace,
            ScopeKind::Team => matches!(parent, ScopeKind::Workspace | ScopeKind::Project),
        }
    }
}

impl std::fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScopeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "workspace" => Ok(ScopeKind::Workspace),
            "project" => Ok(ScopeKind::Project),
            "team" => Ok(ScopeKind::Team),
            _ => Err(format!("invalid scope kind: {}", s)),
        }
    }
}

/// Scope-qualified identifier used to address membership lists.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeRef {
    pub kind: ScopeKind,
    pub id: ScopeId,
}

impl ScopeRef {
    pub fn new(kind: ScopeKind, id: ScopeId) -> Self {
        Self { kind, id }
    }

    pub fn workspace(id: ScopeId) -> Self {
        Self::new(ScopeKind::Workspace, id)
    }

    pub fn project(id: ScopeId) -> Self {
        Self::new(ScopeKind::Project, id)
    }

    pub fn team(id: ScopeId) -> Self {
        Self::new(ScopeKind::Team, id)
    }
}

impl std::fmt::Display for ScopeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Scope record
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Scope {
    pub id: ScopeId,
    pub kind: ScopeKind,
    /// None only for workspaces.
    pub parent_id: Option<ScopeId>,
    /// Top-level workspace (the scope itself for a workspace).
    pub workspace_id: ScopeId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Scope {
    pub fn scope_ref(&self) -> ScopeRef {
        ScopeRef::new(self.kind, self.id)
    }
}

/// Parameters for creating a scope together with its initial owner membership
#[derive(Clone, Debug)]
pub struct CreateScopeParams {
    pub kind: ScopeKind,
    pub name: String,
    pub parent_id: Option<ScopeId>,
    pub owner_actor_id: ActorId,
    /// Owner's membership in the parent scope (None for workspaces).
    pub owner_enclosing_membership_id: Option<super::MembershipId>,
}
