//! Audit trail for membership changes.
//!
//! This crate defines the `AuditLog` trait for persisting audit events
//! and the types describing what the membership engine did, to whom, and
//! whether it succeeded.

mod memory;

pub use memory::MemoryAuditLog;

use async_trait::async_trait;
use boardroom_storage::{ActorId, MembershipId, ScopeId, ScopeKind, ScopeRef};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for an audit log entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuditLogId(pub Uuid);

impl AuditLogId {
    /// Generate a new audit log ID using UUID v7 (time-ordered)
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for AuditLogId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AuditLogId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Categories of auditable membership actions
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    ScopeCreate,
    MemberAdd,
    MemberChangeRole,
    MemberRemove,
    MemberLeave,
    MemberCascadeRemove,
    OwnershipTransfer,
}

impl AuditAction {
    pub const ALL: [AuditAction; 7] = [
        AuditAction::ScopeCreate,
        AuditAction::MemberAdd,
        AuditAction::MemberChangeRole,
        AuditAction::MemberRemove,
        AuditAction::MemberLeave,
        AuditAction::MemberCascadeRemove,
        AuditAction::OwnershipTransfer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::ScopeCreate => "scope.create",
            AuditAction::MemberAdd => "member.add",
            AuditAction::MemberChangeRole => "member.change_role",
            AuditAction::MemberRemove => "member.remove",
            AuditAction::MemberLeave => "member.leave",
            AuditAction::MemberCascadeRemove => "member.cascade_remove",
            AuditAction::OwnershipTransfer => "ownership.transfer",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AuditAction::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| format!("Unknown audit action: {}", s))
    }
}

/// Outcome of an audited operation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditResult {
    Success,
    /// Rejected by authorization before any write.
    Denied,
    /// The store transaction failed or was rolled back.
    Failed,
}

impl std::fmt::Display for AuditResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AuditResult::Success => "success",
            AuditResult::Denied => "denied",
            AuditResult::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for AuditResult {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(AuditResult::Success),
            "denied" => Ok(AuditResult::Denied),
            "failed" => Ok(AuditResult::Failed),
            _ => Err(format!("Unknown audit result: {}", s)),
        }
    }
}

/// A single audit log entry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: AuditLogId,
    pub timestamp: DateTime<Utc>,
    /// Actor that requested the operation
    pub actor_id: ActorId,
    pub action: AuditAction,
    pub scope_kind: ScopeKind,
    pub scope_id: ScopeId,
    /// Top-level workspace of the scope, when known
    pub workspace_id: Option<ScopeId>,
    /// Membership the operation was aimed at (if any)
    pub target_membership_id: Option<MembershipId>,
    pub result: AuditResult,
    /// Denial or failure reason
    pub reason: Option<String>,
    /// Additional details as JSON (e.g., old/new roles, cascaded ids)
    pub details: Option<serde_json::Value>,
}

impl AuditEvent {
    pub fn builder(actor_id: ActorId, action: AuditAction, scope: ScopeRef) -> AuditEventBuilder {
        AuditEventBuilder::new(actor_id, action, scope)
    }

    pub fn scope(&self) -> ScopeRef {
        ScopeRef::new(self.scope_kind, self.scope_id)
    }
}

/// Builder for constructing audit events
pub struct AuditEventBuilder {
    actor_id: ActorId,
    action: AuditAction,
    scope: ScopeRef,
    workspace_id: Option<ScopeId>,
    target_membership_id: Option<MembershipId>,
    result: AuditResult,
    reason: Option<String>,
    details: Option<serde_json::Value>,
}

impl AuditEventBuilder {
    pub fn new(actor_id: ActorId, action: AuditAction, scope: ScopeRef) -> Self {
        Self {
            actor_id,
            action,
            scope,
            workspace_id: None,
            target_membership_id: None,
            result: AuditResult::Success,
            reason: None,
            details: None,
        }
    }

    pub fn workspace_id(mut self, workspace_id: ScopeId) -> Self {
        self.workspace_id = Some(workspace_id);
        self
    }

    pub fn target(mut self, membership_id: MembershipId) -> Self {
        self.target_membership_id = Some(membership_id);
        self
    }

    pub fn result(mut self, result: AuditResult) -> Self {
        self.result = result;
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn build(self) -> AuditEvent {
        AuditEvent {
            id: AuditLogId::new(),
            timestamp: Utc::now(),
            actor_id: self.actor_id,
            action: self.action,
            scope_kind: self.scope.kind,
            scope_id: self.scope.id,
            workspace_id: self.workspace_id,
            target_membership_id: self.target_membership_id,
            result: self.result,
            reason: self.reason,
            details: self.details,
        }
    }
}

/// Filter for querying audit logs
#[derive(Clone, Debug, Default)]
pub struct AuditLogFilter {
    pub actor_id: Option<ActorId>,
    pub scope_id: Option<ScopeId>,
    pub workspace_id: Option<ScopeId>,
    pub target_membership_id: Option<MembershipId>,
    pub action: Option<AuditAction>,
    pub result: Option<AuditResult>,
    /// Start timestamp (inclusive)
    pub from: Option<DateTime<Utc>>,
    /// End timestamp (exclusive)
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl AuditLogFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn actor_id(mut self, actor_id: ActorId) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    pub fn scope_id(mut self, scope_id: ScopeId) -> Self {
        self.scope_id = Some(scope_id);
        self
    }

    pub fn workspace_id(mut self, workspace_id: ScopeId) -> Self {
        self.workspace_id = Some(workspace_id);
        self
    }

    pub fn target(mut self, membership_id: MembershipId) -> Self {
        self.target_membership_id = Some(membership_id);
        self
    }

    pub fn action(mut self, action: AuditAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn result(mut self, result: AuditResult) -> Self {
        self.result = Some(result);
        self
    }

    pub fn from(mut self, from: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self
    }

    pub fn to(mut self, to: DateTime<Utc>) -> Self {
        self.to = Some(to);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Whether an event satisfies every set criterion (ignores paging).
    pub fn matches(&self, event: &AuditEvent) -> bool {
        self.actor_id.map_or(true, |a| event.actor_id == a)
            && self.scope_id.map_or(true, |s| event.scope_id == s)
            && self
                .workspace_id
                .map_or(true, |w| event.workspace_id == Some(w))
            && self
                .target_membership_id
                .map_or(true, |m| event.target_membership_id == Some(m))
            && self.action.map_or(true, |a| event.action == a)
            && self.result.map_or(true, |r| event.result == r)
            && self.from.map_or(true, |from| event.timestamp >= from)
            && self.to.map_or(true, |to| event.timestamp < to)
    }
}

/// Error type for audit log operations
#[derive(Debug, Error)]
pub enum AuditLogError {
    #[error("backend error: {0}")]
    Backend(String),

    #[error("audit log not found: {0}")]
    NotFound(AuditLogId),

    #[error("invalid filter: {0}")]
    InvalidFilter(String),
}

/// Audit log persistence.
#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Record an audit event.
    ///
    /// Called after the audited operation completes. Failures are logged by the
    /// caller and never undo a committed mutation.
    async fn record(&self, event: AuditEvent) -> Result<(), AuditLogError>;

    /// Query audit logs, newest first.
    async fn query(&self, filter: AuditLogFilter) -> Result<Vec<AuditEvent>, AuditLogError>;

    /// Get a specific audit log entry by ID.
    async fn get(&self, id: AuditLogId) -> Result<AuditEvent, AuditLogError>;

    /// Count audit logs matching the filter (paging ignored).
    async fn count(&self, filter: AuditLogFilter) -> Result<u64, AuditLogError>;
}
