//! Durable audit trail stored next to the memberships it describes.

use async_trait::async_trait;
use boardroom_audit::{AuditEvent, AuditLog, AuditLogError, AuditLogFilter, AuditLogId};
use boardroom_storage::{ActorId, MembershipId, ScopeId};
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite};
use uuid::Uuid;

use crate::SqliteStore;

const AUDIT_COLUMNS: &str = "id, timestamp, actor_id, action, scope_kind, scope_id, workspace_id, \
     target_membership_id, result, reason, details";

#[derive(sqlx::FromRow)]
struct AuditRow {
    id: String,
    timestamp: DateTime<Utc>,
    actor_id: String,
    action: String,
    scope_kind: String,
    scope_id: String,
    workspace_id: Option<String>,
    target_membership_id: Option<String>,
    result: String,
    reason: Option<String>,
    details: Option<String>,
}

fn backend(e: impl std::fmt::Display) -> AuditLogError {
    AuditLogError::Backend(e.to_string())
}

fn uuid(s: &str) -> Result<Uuid, AuditLogError> {
    Uuid::try_parse(s).map_err(backend)
}

impl TryFrom<AuditRow> for AuditEvent {
    type Error = AuditLogError;

    fn try_from(row: AuditRow) -> Result<Self, Self::Error> {
        Ok(AuditEvent {
            id: AuditLogId(uuid(&row.id)?),
            timestamp: row.timestamp,
            actor_id: ActorId(uuid(&row.actor_id)?),
            action: row.action.parse().map_err(backend)?,
            scope_kind: row.scope_kind.parse().map_err(backend)?,
            scope_id: ScopeId(uuid(&row.scope_id)?),
            workspace_id: row.workspace_id.as_deref().map(uuid).transpose()?.map(ScopeId),
            target_membership_id: row
                .target_membership_id
                .as_deref()
                .map(uuid)
                .transpose()?
                .map(MembershipId),
            result: row.result.parse().map_err(backend)?,
            reason: row.reason,
            details: row
                .details
                .as_deref()
                .map(serde_json::from_str::<serde_json::Value>)
                .transpose()
                .map_err(backend)?,
        })
    }
}

/// Appends `WHERE ...` for every criterion the filter sets. Paging is left to the caller.
fn push_filter(query: &mut QueryBuilder<'_, Sqlite>, filter: &AuditLogFilter) {
    query.push(" WHERE 1 = 1");
    if let Some(actor_id) = filter.actor_id {
        query.push(" AND actor_id = ").push_bind(actor_id.0.to_string());
    }
    if let Some(scope_id) = filter.scope_id {
        query.push(" AND scope_id = ").push_bind(scope_id.0.to_string());
    }
    if let Some(workspace_id) = filter.workspace_id {
        query
            .push(" AND workspace_id = ")
            .push_bind(workspace_id.0.to_string());
    }
    if let Some(target) = filter.target_membership_id {
        query
            .push(" AND target_membership_id = ")
            .push_bind(target.0.to_string());
    }
    if let Some(action) = filter.action {
        query.push(" AND action = ").push_bind(action.as_str());
    }
    if let Some(result) = filter.result {
        query.push(" AND result = ").push_bind(result.to_string());
    }
    if let Some(from) = filter.from {
        query.push(" AND timestamp >= ").push_bind(from);
    }
    if let Some(to) = filter.to {
        query.push(" AND timestamp < ").push_bind(to);
    }
}

#[async_trait]
impl AuditLog for SqliteStore {
    async fn record(&self, event: AuditEvent) -> Result<(), AuditLogError> {
        let details = event
            .details
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(backend)?;

        sqlx::query(
            "INSERT INTO audit_events(id, timestamp, actor_id, action, scope_kind, scope_id, \
             workspace_id, target_membership_id, result, reason, details)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(event.id.0.to_string())
        .bind(event.timestamp)
        .bind(event.actor_id.0.to_string())
        .bind(event.action.as_str())
        .bind(event.scope_kind.as_str())
        .bind(event.scope_id.0.to_string())
        .bind(event.workspace_id.map(|w| w.0.to_string()))
        .bind(event.target_membership_id.map(|m| m.0.to_string()))
        .bind(event.result.to_string())
        .bind(event.reason.as_deref())
        .bind(details)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn query(&self, filter: AuditLogFilter) -> Result<Vec<AuditEvent>, AuditLogError> {
        if filter.limit == Some(0) {
            return Err(AuditLogError::InvalidFilter("limit must be positive".into()));
        }

        let mut query =
            QueryBuilder::<Sqlite>::new(format!("SELECT {AUDIT_COLUMNS} FROM audit_events"));
        push_filter(&mut query, &filter);
        query.push(" ORDER BY timestamp DESC, id DESC");
        // SQLite only accepts OFFSET after a LIMIT; -1 means unbounded
        query
            .push(" LIMIT ")
            .push_bind(filter.limit.map_or(-1, i64::from))
            .push(" OFFSET ")
            .push_bind(i64::from(filter.offset.unwrap_or(0)));

        let rows: Vec<AuditRow> = query
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        rows.into_iter().map(AuditEvent::try_from).collect()
    }

    async fn get(&self, id: AuditLogId) -> Result<AuditEvent, AuditLogError> {
        let sql = format!("SELECT {AUDIT_COLUMNS} FROM audit_events WHERE id = ?");
        sqlx::query_as::<_, AuditRow>(&sql)
            .bind(id.0.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .ok_or(AuditLogError::NotFound(id))?
            .try_into()
    }

    async fn count(&self, filter: AuditLogFilter) -> Result<u64, AuditLogError> {
        let mut query = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM audit_events");
        push_filter(&mut query, &filter);
        let count: i64 = query
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(backend)?;
        Ok(count as u64)
    }
}
