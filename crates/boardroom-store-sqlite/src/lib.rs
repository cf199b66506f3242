//! SQLite membership store.
//!
//! The pool holds a single connection, so every transaction runs alone: writers to the
//! same scope are serialized by the database rather than by the engine. Busy/locked
//! errors from other processes sharing the file surface as `StoreError::Conflict`.
//!
//! The same database also carries the audit trail (see `AuditLog for SqliteStore`).

mod audit;

use async_trait::async_trait;
use boardroom_storage::{
    ActorId, AddMembershipParams, CreateScopeParams, Membership, MembershipId,
    MembershipRepository, MembershipState, MembershipStore, Role, Scope, ScopeId, ScopeKind,
    ScopeRef, StoreError, Transaction,
};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool};
use std::str::FromStr;
use tokio::sync::Mutex;
use uuid::Uuid;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

const MEMBERSHIP_COLUMNS: &str = "m.id, s.kind AS scope_kind, m.scope_id, m.actor_id, m.role, \
     m.enclosing_membership_id, m.state, m.created_at, m.updated_at, m.removed_at";

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        Self::open("sqlite::memory:").await
    }

    pub async fn open(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StoreError::Backend(e.to_string()))?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            // an in-memory database lives only as long as its connection
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(map_err)?;

        MIGRATOR
            .run(&pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        tracing::debug!(url, "opened sqlite membership store");
        Ok(Self { pool })
    }
}

fn map_err(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::RowNotFound => StoreError::NotFound,
        sqlx::Error::PoolTimedOut => StoreError::Conflict(e.to_string()),
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::AlreadyExists,
        // SQLITE_BUSY, SQLITE_LOCKED and their extended codes
        sqlx::Error::Database(db)
            if matches!(
                db.code().as_deref(),
                Some("5") | Some("6") | Some("261") | Some("262") | Some("517")
            ) =>
        {
            StoreError::Conflict(db.message().to_string())
        }
        _ => StoreError::Backend(e.to_string()),
    }
}

fn parse_uuid(s: &str) -> Result<Uuid, StoreError> {
    Uuid::try_parse(s).map_err(|e| StoreError::Backend(e.to_string()))
}

#[derive(sqlx::FromRow)]
struct ScopeRow {
    id: String,
    kind: String,
    parent_id: Option<String>,
    workspace_id: String,
    name: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<ScopeRow> for Scope {
    type Error = StoreError;

    fn try_from(row: ScopeRow) -> Result<Self, Self::Error> {
        Ok(Scope {
            id: ScopeId(parse_uuid(&row.id)?),
            kind: row.kind.parse().map_err(StoreError::Backend)?,
            parent_id: row
                .parent_id
                .as_deref()
                .map(parse_uuid)
                .transpose()?
                .map(ScopeId),
            workspace_id: ScopeId(parse_uuid(&row.workspace_id)?),
            name: row.name,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct MembershipRow {
    id: String,
    scope_kind: String,
    scope_id: String,
    actor_id: String,
    role: String,
    enclosing_membership_id: Option<String>,
    state: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    removed_at: Option<DateTime<Utc>>,
}

impl TryFrom<MembershipRow> for Membership {
    type Error = StoreError;

    fn try_from(row: MembershipRow) -> Result<Self, Self::Error> {
        let kind: ScopeKind = row.scope_kind.parse().map_err(StoreError::Backend)?;
        Ok(Membership {
            id: MembershipId(parse_uuid(&row.id)?),
            scope: ScopeRef::new(kind, ScopeId(parse_uuid(&row.scope_id)?)),
            actor_id: ActorId(parse_uuid(&row.actor_id)?),
            role: Role::from_str(&row.role).map_err(|e| StoreError::Backend(e.to_string()))?,
            enclosing_membership_id: row
                .enclosing_membership_id
                .as_deref()
                .map(parse_uuid)
                .transpose()?
                .map(MembershipId),
            state: row.state.parse().map_err(StoreError::Backend)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
            removed_at: row.removed_at,
        })
    }
}

fn collect(rows: Vec<MembershipRow>) -> Result<Vec<Membership>, StoreError> {
    rows.into_iter().map(Membership::try_from).collect()
}

// ───────────────────────────── Queries (shared by store and transaction) ─────────────────────────────

async fn get_scope(conn: &mut SqliteConnection, scope_id: &ScopeId) -> Result<Scope, StoreError> {
    let row = sqlx::query_as::<_, ScopeRow>(
        "SELECT id, kind, parent_id, workspace_id, name, created_at FROM scopes WHERE id = ?",
    )
    .bind(scope_id.0.to_string())
    .fetch_optional(&mut *conn)
    .await
    .map_err(map_err)?
    .ok_or(StoreError::NotFound)?;
    row.try_into()
}

async fn get_membership(
    conn: &mut SqliteConnection,
    membership_id: &MembershipId,
) -> Result<Membership, StoreError> {
    let sql = format!(
        "SELECT {MEMBERSHIP_COLUMNS} FROM memberships m JOIN scopes s ON s.id = m.scope_id \
         WHERE m.id = ?"
    );
    let row = sqlx::query_as::<_, MembershipRow>(&sql)
        .bind(membership_id.0.to_string())
        .fetch_optional(&mut *conn)
        .await
        .map_err(map_err)?
        .ok_or(StoreError::NotFound)?;
    row.try_into()
}

async fn is_active(
    conn: &mut SqliteConnection,
    membership_id: &MembershipId,
) -> Result<bool, StoreError> {
    let row: Option<(i64,)> =
        sqlx::query_as("SELECT 1 FROM memberships WHERE id = ? AND state = 'active'")
            .bind(membership_id.0.to_string())
            .fetch_optional(&mut *conn)
            .await
            .map_err(map_err)?;
    Ok(row.is_some())
}

async fn add_membership(
    conn: &mut SqliteConnection,
    params: &AddMembershipParams,
) -> Result<Membership, StoreError> {
    let scope = get_scope(conn, &params.scope.id).await?;
    if scope.kind != params.scope.kind {
        return Err(StoreError::NotFound);
    }
    if let Some(enclosing) = &params.enclosing_membership_id {
        if !is_active(conn, enclosing).await? {
            return Err(StoreError::Conflict(format!(
                "enclosing membership {} is not active",
                enclosing
            )));
        }
    }

    let id = MembershipId::new();
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO memberships(id, scope_id, actor_id, role, enclosing_membership_id, state, \
         created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, 'active', ?, ?)",
    )
    .bind(id.0.to_string())
    .bind(params.scope.id.0.to_string())
    .bind(params.actor_id.0.to_string())
    .bind(params.role.as_str())
    .bind(params.enclosing_membership_id.map(|m| m.0.to_string()))
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await
    .map_err(map_err)?;

    Ok(Membership {
        id,
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

async fn find_active_membership(
    conn: &mut SqliteConnection,
    scope: &ScopeRef,
    membership_id: &MembershipId,
) -> Result<Membership, StoreError> {
    let sql = format!(
        "SELECT {MEMBERSHIP_COLUMNS} FROM memberships m JOIN scopes s ON s.id = m.scope_id \
         WHERE m.id = ? AND m.scope_id = ? AND s.kind = ? AND m.state = 'active'"
    );
    let row = sqlx::query_as::<_, MembershipRow>(&sql)
        .bind(membership_id.0.to_string())
        .bind(scope.id.0.to_string())
        .bind(scope.kind.as_str())
        .fetch_optional(&mut *conn)
        .await
        .map_err(map_err)?
        .ok_or(StoreError::NotFound)?;
    row.try_into()
}

async fn find_active_membership_by_actor(
    conn: &mut SqliteConnection,
    scope: &ScopeRef,
    actor_id: &ActorId,
) -> Result<Membership, StoreError> {
    let sql = format!(
        "SELECT {MEMBERSHIP_COLUMNS} FROM memberships m JOIN scopes s ON s.id = m.scope_id \
         WHERE m.actor_id = ? AND m.scope_id = ? AND s.kind = ? AND m.state = 'active'"
    );
    let row = sqlx::query_as::<_, MembershipRow>(&sql)
        .bind(actor_id.0.to_string())
        .bind(scope.id.0.to_string())
        .bind(scope.kind.as_str())
        .fetch_optional(&mut *conn)
        .await
        .map_err(map_err)?
        .ok_or(StoreError::NotFound)?;
    row.try_into()
}

async fn find_active_memberships_by_enclosing(
    conn: &mut SqliteConnection,
    enclosing_membership_id: &MembershipId,
) -> Result<Vec<Membership>, StoreError> {
    let sql = format!(
        "SELECT {MEMBERSHIP_COLUMNS} FROM memberships m JOIN scopes s ON s.id = m.scope_id \
         WHERE m.enclosing_membership_id = ? AND m.state = 'active' \
         ORDER BY m.created_at, m.id"
    );
    let rows = sqlx::query_as::<_, MembershipRow>(&sql)
        .bind(enclosing_membership_id.0.to_string())
        .fetch_all(&mut *conn)
        .await
        .map_err(map_err)?;
    collect(rows)
}

async fn list_active_memberships(
    conn: &mut SqliteConnection,
    scope: &ScopeRef,
) -> Result<Vec<Membership>, StoreError> {
    let sql = format!(
        "SELECT {MEMBERSHIP_COLUMNS} FROM memberships m JOIN scopes s ON s.id = m.scope_id \
         WHERE m.scope_id = ? AND s.kind = ? AND m.state = 'active' \
         ORDER BY m.created_at, m.id"
    );
    let rows = sqlx::query_as::<_, MembershipRow>(&sql)
        .bind(scope.id.0.to_string())
        .bind(scope.kind.as_str())
        .fetch_all(&mut *conn)
        .await
        .map_err(map_err)?;
    collect(rows)
}

async fn update_role(
    conn: &mut SqliteConnection,
    membership_id: &MembershipId,
    role: Role,
) -> Result<Membership, StoreError> {
    let result = sqlx::query(
        "UPDATE memberships SET role = ?, updated_at = ? WHERE id = ? AND state = 'active'",
    )
    .bind(role.as_str())
    .bind(Utc::now())
    .bind(membership_id.0.to_string())
    .execute(&mut *conn)
    .await
    .map_err(map_err)?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound);
    }
    get_membership(conn, membership_id).await
}

async fn remove_membership(
    conn: &mut SqliteConnection,
    membership_id: &MembershipId,
) -> Result<u64, StoreError> {
    let now = Utc::now();
    let result = sqlx::query(
        "UPDATE memberships SET state = 'removed', removed_at = ?, updated_at = ?
         WHERE id = ? AND state = 'active'",
    )
    .bind(now)
    .bind(now)
    .bind(membership_id.0.to_string())
    .execute(&mut *conn)
    .await
    .map_err(map_err)?;
    Ok(result.rows_affected())
}

async fn create_scope(
    conn: &mut SqliteConnection,
    params: &CreateScopeParams,
) -> Result<(Scope, Membership), StoreError> {
    let id = ScopeId::new();
    let workspace_id = match (params.kind, params.parent_id) {
        (ScopeKind::Workspace, None) => id,
        (ScopeKind::Workspace, Some(_)) => {
            return Err(StoreError::Backend("a workspace has no parent scope".into()))
        }
        (kind, Some(parent_id)) => {
            let parent = get_scope(conn, &parent_id).await?;
            if !kind.can_nest_under(parent.kind) {
                return Err(StoreError::Backend(format!(
                    "a {} cannot be nested under a {}",
                    kind, parent.kind
                )));
            }
            parent.workspace_id
        }
        (kind, None) => {
            return Err(StoreError::Backend(format!(
                "a {} requires a parent scope",
                kind
            )))
        }
    };

    let scope = Scope {
        id,
        kind: params.kind,
        parent_id: params.parent_id,
        workspace_id,
        name: params.name.clone(),
        created_at: Utc::now(),
    };
    sqlx::query(
        "INSERT INTO scopes(id, kind, parent_id, workspace_id, name, created_at) \
         VALUES(?, ?, ?, ?, ?, ?)",
    )
    .bind(scope.id.0.to_string())
    .bind(scope.kind.as_str())
    .bind(scope.parent_id.map(|p| p.0.to_string()))
    .bind(scope.workspace_id.0.to_string())
    .bind(&scope.name)
    .bind(scope.created_at)
    .execute(&mut *conn)
    .await
    .map_err(map_err)?;

    let owner = add_membership(
        conn,
        &AddMembershipParams {
            scope: scope.scope_ref(),
            actor_id: params.owner_actor_id,
            role: Role::Owner,
            enclosing_membership_id: params.owner_enclosing_membership_id,
        },
    )
    .await?;

    Ok((scope, owner))
}

// ───────────────────────────── Store ─────────────────────────────

impl SqliteStore {
    async fn conn(&self) -> Result<sqlx::pool::PoolConnection<Sqlite>, StoreError> {
        self.pool.acquire().await.map_err(map_err)
    }

    async fn begin(&self) -> Result<sqlx::Transaction<'static, Sqlite>, StoreError> {
        self.pool.begin().await.map_err(map_err)
    }
}

#[async_trait]
impl MembershipRepository for SqliteStore {
    async fn get_scope(&self, scope_id: &ScopeId) -> Result<Scope, StoreError> {
        get_scope(&mut *self.conn().await?, scope_id).await
    }

    async fn add_membership(&self, params: &AddMembershipParams) -> Result<Membership, StoreError> {
        let mut tx = self.begin().await?;
        let membership = add_membership(&mut tx, params).await?;
        tx.commit().await.map_err(map_err)?;
        Ok(membership)
    }

    async fn find_active_membership(
        &self,
        scope: &ScopeRef,
        membership_id: &MembershipId,
    ) -> Result<Membership, StoreError> {
        find_active_membership(&mut *self.conn().await?, scope, membership_id).await
    }

    async fn find_active_membership_by_actor(
        &self,
        scope: &ScopeRef,
        actor_id: &ActorId,
    ) -> Result<Membership, StoreError> {
        find_active_membership_by_actor(&mut *self.conn().await?, scope, actor_id).await
    }

    async fn find_active_memberships_by_enclosing(
        &self,
        enclosing_membership_id: &MembershipId,
    ) -> Result<Vec<Membership>, StoreError> {
        find_active_memberships_by_enclosing(&mut *self.conn().await?, enclosing_membership_id)
            .await
    }

    async fn list_active_memberships(
        &self,
        scope: &ScopeRef,
    ) -> Result<Vec<Membership>, StoreError> {
        list_active_memberships(&mut *self.conn().await?, scope).await
    }

    async fn update_role(
        &self,
        membership_id: &MembershipId,
        role: Role,
    ) -> Result<Membership, StoreError> {
        let mut tx = self.begin().await?;
        let membership = update_role(&mut tx, membership_id, role).await?;
        tx.commit().await.map_err(map_err)?;
        Ok(membership)
    }

    async fn remove_membership(&self, membership_id: &MembershipId) -> Result<u64, StoreError> {
        remove_membership(&mut *self.conn().await?, membership_id).await
    }
}

#[async_trait]
impl MembershipStore for SqliteStore {
    type Txn = SqliteTxn;

    async fn create_scope(
        &self,
        params: &CreateScopeParams,
    ) -> Result<(Scope, Membership), StoreError> {
        let mut tx = self.begin().await?;
        let created = create_scope(&mut tx, params).await?;
        tx.commit().await.map_err(map_err)?;
        Ok(created)
    }

    async fn begin_txn(&self) -> Result<Self::Txn, StoreError> {
        Ok(SqliteTxn {
            tx: Mutex::new(self.begin().await?),
        })
    }
}

// ───────────────────────────── Transaction ─────────────────────────────

/// A sqlx transaction. Dropping it without commit rolls back.
pub struct SqliteTxn {
    tx: Mutex<sqlx::Transaction<'static, Sqlite>>,
}

#[async_trait]
impl MembershipRepository for SqliteTxn {
    async fn get_scope(&self, scope_id: &ScopeId) -> Result<Scope, StoreError> {
        let mut tx = self.tx.lock().await;
        get_scope(&mut tx, scope_id).await
    }

    async fn add_membership(&self, params: &AddMembershipParams) -> Result<Membership, StoreError> {
        let mut tx = self.tx.lock().await;
        add_membership(&mut tx, params).await
    }

    async fn find_active_membership(
        &self,
        scope: &ScopeRef,
        membership_id: &MembershipId,
    ) -> Result<Membership, StoreError> {
        let mut tx = self.tx.lock().await;
        find_active_membership(&mut tx, scope, membership_id).await
    }

    async fn find_active_membership_by_actor(
        &self,
        scope: &ScopeRef,
        actor_id: &ActorId,
    ) -> Result<Membership, StoreError> {
        let mut tx = self.tx.lock().await;
        find_active_membership_by_actor(&mut tx, scope, actor_id).await
    }

    async fn find_active_memberships_by_enclosing(
        &self,
        enclosing_membership_id: &MembershipId,
    ) -> Result<Vec<Membership>, StoreError> {
        let mut tx = self.tx.lock().await;
        find_active_memberships_by_enclosing(&mut tx, enclosing_membership_id).await
    }

    async fn list_active_memberships(
        &self,
        scope: &ScopeRef,
    ) -> Result<Vec<Membership>, StoreError> {
        let mut tx = self.tx.lock().await;
        list_active_memberships(&mut tx, scope).await
    }

    async fn update_role(
        &self,
        membership_id: &MembershipId,
        role: Role,
    ) -> Result<Membership, StoreError> {
        let mut tx = self.tx.lock().await;
        update_role(&mut tx, membership_id, role).await
    }

    async fn remove_membership(&self, membership_id: &MembershipId) -> Result<u64, StoreError> {
        let mut tx = self.tx.lock().await;
        remove_membership(&mut tx, membership_id).await
    }
}

#[async_trait]
impl Transaction for SqliteTxn {
    async fn commit(self) -> Result<(), StoreError> {
        self.tx.into_inner().commit().await.map_err(map_err)
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.tx.into_inner().rollback().await.map_err(map_err)
    }
}
