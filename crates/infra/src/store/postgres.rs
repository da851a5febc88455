//! Postgres-backed stores.
//!
//! Read-modify-write operations run inside a transaction that locks the row
//! (`SELECT ... FOR UPDATE`), apply the same domain transition the in-memory
//! stores use, then write the row back. Reset-token consumption is a single
//! conditional `UPDATE`.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (other) | Any other | `Backend` |
//! | PoolClosed / other | N/A | `Backend` |

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use terra_auth::{
    AdminUpdate, DecisionClaim, PermissionMatrix, PermissionPatch, PermissionRequest, Principal, ProfileUpdate,
    RequestDecision, RequestStatus, ResetState, Role,
};
use terra_core::{PermissionRequestId, PrincipalId};

use super::{CredentialStore, PermissionRequestStore, StoreError};

const SCHEMA: &str = include_str!("../../migrations/0001_identity.sql");

/// Create tables and indexes if they do not exist yet.
#[instrument(skip(pool), err)]
pub async fn apply_schema(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::raw_sql(SCHEMA)
        .execute(pool)
        .await
        .map_err(|e| map_sqlx_error("apply_schema", e))?;
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Principals
// ─────────────────────────────────────────────────────────────────────────────

const PRINCIPAL_COLUMNS: &str = r#"
    id, username, email, first_name, last_name, phone, profile_image_path,
    role, permissions, password_hash, reset_token_hash, reset_expires_at,
    created_at, updated_at
"#;

#[derive(Debug, Clone)]
pub struct PostgresCredentialStore {
    pool: Arc<PgPool>,
}

impl PostgresCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    async fn fetch_one_where(&self, operation: &str, clause: &str, value: &str) -> Result<Option<Principal>, StoreError> {
        let sql = format!("SELECT {PRINCIPAL_COLUMNS} FROM principals WHERE {clause}");
        let row = sqlx::query(&sql)
            .bind(value)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        row.as_ref().map(principal_from_row).transpose()
    }

    /// Lock the row, apply `f`, write the row back. A failing `f` rolls back.
    async fn modify<F>(&self, operation: &str, id: PrincipalId, f: F) -> Result<Principal, StoreError>
    where
        F: FnOnce(&mut Principal) -> Result<(), StoreError> + Send,
    {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let sql = format!("SELECT {PRINCIPAL_COLUMNS} FROM principals WHERE id = $1 FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?
            .ok_or(StoreError::NotFound("principal"))?;

        let mut principal = principal_from_row(&row)?;
        f(&mut principal)?;
        write_principal(&mut tx, operation, &principal).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(principal)
    }
}

#[async_trait]
impl CredentialStore for PostgresCredentialStore {
    #[instrument(skip(self, principal), fields(principal_id = %principal.id), err)]
    async fn insert(&self, principal: Principal) -> Result<(), StoreError> {
        let (reset_hash, reset_expires) = reset_columns(&principal.reset);

        sqlx::query(
            r#"
            INSERT INTO principals (
                id, username, email, first_name, last_name, phone, profile_image_path,
                role, permissions, password_hash, reset_token_hash, reset_expires_at,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(principal.id.as_uuid())
        .bind(&principal.username)
        .bind(&principal.email)
        .bind(&principal.first_name)
        .bind(&principal.last_name)
        .bind(&principal.phone)
        .bind(&principal.profile_image_path)
        .bind(principal.role.as_str())
        .bind(Json(principal.permissions))
        .bind(&principal.password_hash)
        .bind(reset_hash)
        .bind(reset_expires)
        .bind(principal.created_at)
        .bind(principal.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_principal", e))?;

        Ok(())
    }

    async fn get(&self, id: PrincipalId) -> Result<Option<Principal>, StoreError> {
        let sql = format!("SELECT {PRINCIPAL_COLUMNS} FROM principals WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_principal", e))?;
        row.as_ref().map(principal_from_row).transpose()
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Principal>, StoreError> {
        self.fetch_one_where("find_by_username", "username = $1", username).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Principal>, StoreError> {
        self.fetch_one_where("find_by_email", "email = $1", email).await
    }

    async fn list(&self) -> Result<Vec<Principal>, StoreError> {
        let sql = format!("SELECT {PRINCIPAL_COLUMNS} FROM principals ORDER BY created_at DESC, id DESC");
        let rows = sqlx::query(&sql)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_principals", e))?;
        rows.iter().map(principal_from_row).collect()
    }

    #[instrument(skip(self, update), fields(principal_id = %id), err)]
    async fn update_profile(
        &self,
        id: PrincipalId,
        update: ProfileUpdate,
        now: DateTime<Utc>,
    ) -> Result<Principal, StoreError> {
        self.modify("update_profile", id, move |p| Ok(p.apply_profile_update(update, now)?))
            .await
    }

    #[instrument(skip(self, update), fields(principal_id = %id), err)]
    async fn admin_update(
        &self,
        id: PrincipalId,
        update: AdminUpdate,
        now: DateTime<Utc>,
    ) -> Result<Principal, StoreError> {
        self.modify("admin_update", id, move |p| Ok(p.apply_admin_update(update, now)?))
            .await
    }

    #[instrument(skip(self, patch), fields(principal_id = %id), err)]
    async fn merge_permissions(
        &self,
        id: PrincipalId,
        patch: &PermissionPatch,
        now: DateTime<Utc>,
    ) -> Result<Principal, StoreError> {
        let patch = *patch;
        self.modify("merge_permissions", id, move |p| {
            if !p.permissions.merge_grants(&patch).is_empty() {
                p.updated_at = now;
            }
            Ok(())
        })
        .await
    }

    #[instrument(skip(self, reset), fields(principal_id = %id), err)]
    async fn set_reset_token(&self, id: PrincipalId, reset: ResetState) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE principals
            SET reset_token_hash = $2, reset_expires_at = $3
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(&reset.token_hash)
        .bind(reset.expires_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("set_reset_token", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("principal"));
        }
        Ok(())
    }

    async fn find_by_reset_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Principal>, StoreError> {
        let sql = format!(
            "SELECT {PRINCIPAL_COLUMNS} FROM principals WHERE reset_token_hash = $1 AND reset_expires_at > $2"
        );
        let row = sqlx::query(&sql)
            .bind(token_hash)
            .bind(now)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_by_reset_token", e))?;
        row.as_ref().map(principal_from_row).transpose()
    }

    #[instrument(skip_all, err)]
    async fn consume_reset_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
        new_password_hash: String,
    ) -> Result<Option<PrincipalId>, StoreError> {
        let row = sqlx::query(
            r#"
            UPDATE principals
            SET password_hash = $3,
                reset_token_hash = NULL,
                reset_expires_at = NULL,
                updated_at = $2
            WHERE reset_token_hash = $1 AND reset_expires_at > $2
            RETURNING id
            "#,
        )
        .bind(token_hash)
        .bind(now)
        .bind(new_password_hash)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("consume_reset_token", e))?;

        row.map(|r| r.try_get::<Uuid, _>("id").map(PrincipalId::from_uuid))
            .transpose()
            .map_err(|e| decode_error("id", e))
    }
}

async fn write_principal(
    tx: &mut Transaction<'_, Postgres>,
    operation: &str,
    principal: &Principal,
) -> Result<(), StoreError> {
    let (reset_hash, reset_expires) = reset_columns(&principal.reset);

    sqlx::query(
        r#"
        UPDATE principals
        SET first_name = $2,
            last_name = $3,
            phone = $4,
            profile_image_path = $5,
            role = $6,
            permissions = $7,
            password_hash = $8,
            reset_token_hash = $9,
            reset_expires_at = $10,
            updated_at = $11
        WHERE id = $1
        "#,
    )
    .bind(principal.id.as_uuid())
    .bind(&principal.first_name)
    .bind(&principal.last_name)
    .bind(&principal.phone)
    .bind(&principal.profile_image_path)
    .bind(principal.role.as_str())
    .bind(Json(principal.permissions))
    .bind(&principal.password_hash)
    .bind(reset_hash)
    .bind(reset_expires)
    .bind(principal.updated_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error(operation, e))?;

    Ok(())
}

fn reset_columns(reset: &Option<ResetState>) -> (Option<&str>, Option<DateTime<Utc>>) {
    match reset {
        Some(r) => (Some(r.token_hash.as_str()), Some(r.expires_at)),
        None => (None, None),
    }
}

fn principal_from_row(row: &PgRow) -> Result<Principal, StoreError> {
    let role: String = row.try_get("role").map_err(|e| decode_error("role", e))?;
    let role = Role::from_str(&role).map_err(|e| StoreError::Backend(format!("bad role column: {e}")))?;
    let Json(permissions): Json<PermissionMatrix> =
        row.try_get("permissions").map_err(|e| decode_error("permissions", e))?;

    let reset_hash: Option<String> = row.try_get("reset_token_hash").map_err(|e| decode_error("reset_token_hash", e))?;
    let reset_expires: Option<DateTime<Utc>> =
        row.try_get("reset_expires_at").map_err(|e| decode_error("reset_expires_at", e))?;
    let reset = match (reset_hash, reset_expires) {
        (Some(token_hash), Some(expires_at)) => Some(ResetState { token_hash, expires_at }),
        _ => None,
    };

    Ok(Principal {
        id: PrincipalId::from_uuid(row.try_get("id").map_err(|e| decode_error("id", e))?),
        username: row.try_get("username").map_err(|e| decode_error("username", e))?,
        email: row.try_get("email").map_err(|e| decode_error("email", e))?,
        first_name: row.try_get("first_name").map_err(|e| decode_error("first_name", e))?,
        last_name: row.try_get("last_name").map_err(|e| decode_error("last_name", e))?,
        phone: row.try_get("phone").map_err(|e| decode_error("phone", e))?,
        profile_image_path: row
            .try_get("profile_image_path")
            .map_err(|e| decode_error("profile_image_path", e))?,
        role,
        permissions,
        password_hash: row.try_get("password_hash").map_err(|e| decode_error("password_hash", e))?,
        reset,
        created_at: row.try_get("created_at").map_err(|e| decode_error("created_at", e))?,
        updated_at: row.try_get("updated_at").map_err(|e| decode_error("updated_at", e))?,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Permission requests
// ─────────────────────────────────────────────────────────────────────────────

const REQUEST_COLUMNS: &str = r#"
    id, principal_id, requested, message, status, decided_by, decided_at,
    is_read_by_admin, claim_token, claimed_at, claim_decision, created_at, updated_at
"#;

#[derive(Debug, Clone)]
pub struct PostgresPermissionRequestStore {
    pool: Arc<PgPool>,
}

impl PostgresPermissionRequestStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    /// Lock the row, run the state transition, write the row back.
    async fn transition<T, F>(&self, operation: &str, id: PermissionRequestId, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut PermissionRequest) -> Result<T, StoreError> + Send,
        T: Send,
    {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let sql = format!("SELECT {REQUEST_COLUMNS} FROM permission_requests WHERE id = $1 FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?
            .ok_or(StoreError::NotFound("permission request"))?;

        let mut request = request_from_row(&row)?;
        let out = f(&mut request)?;

        sqlx::query(
            r#"
            UPDATE permission_requests
            SET status = $2,
                decided_by = $3,
                decided_at = $4,
                is_read_by_admin = $5,
                claim_token = $6,
                claimed_at = $7,
                claim_decision = $8,
                updated_at = $9
            WHERE id = $1
            "#,
        )
        .bind(request.id.as_uuid())
        .bind(request.status.as_str())
        .bind(request.decided_by.map(Uuid::from))
        .bind(request.decided_at)
        .bind(request.is_read_by_admin)
        .bind(request.claim.map(|c| c.token))
        .bind(request.claim.map(|c| c.claimed_at))
        .bind(request.claim.map(|c| c.decision.as_str()))
        .bind(request.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error(operation, e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(out)
    }

    async fn fetch_list(&self, operation: &str, clause: &str, principal_id: Option<Uuid>) -> Result<Vec<PermissionRequest>, StoreError> {
        let sql = format!(
            "SELECT {REQUEST_COLUMNS} FROM permission_requests WHERE {clause} ORDER BY created_at DESC, id DESC"
        );
        let mut query = sqlx::query(&sql);
        if let Some(principal_id) = principal_id {
            query = query.bind(principal_id);
        }
        let rows = query
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        rows.iter().map(request_from_row).collect()
    }
}

#[async_trait]
impl PermissionRequestStore for PostgresPermissionRequestStore {
    #[instrument(skip(self, request), fields(request_id = %request.id, principal_id = %request.principal_id), err)]
    async fn insert(&self, request: PermissionRequest) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO permission_requests (
                id, principal_id, requested, message, status, decided_by, decided_at,
                is_read_by_admin, claim_token, claimed_at, claim_decision, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NULL, NULL, NULL, $9, $10)
            "#,
        )
        .bind(request.id.as_uuid())
        .bind(request.principal_id.as_uuid())
        .bind(Json(request.requested))
        .bind(&request.message)
        .bind(request.status.as_str())
        .bind(request.decided_by.map(Uuid::from))
        .bind(request.decided_at)
        .bind(request.is_read_by_admin)
        .bind(request.created_at)
        .bind(request.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_permission_request", e))?;

        Ok(())
    }

    async fn get(&self, id: PermissionRequestId) -> Result<Option<PermissionRequest>, StoreError> {
        let sql = format!("SELECT {REQUEST_COLUMNS} FROM permission_requests WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_permission_request", e))?;
        row.as_ref().map(request_from_row).transpose()
    }

    async fn list_for_principal(&self, principal_id: PrincipalId) -> Result<Vec<PermissionRequest>, StoreError> {
        self.fetch_list("list_for_principal", "principal_id = $1", Some(*principal_id.as_uuid()))
            .await
    }

    async fn list_pending(&self) -> Result<Vec<PermissionRequest>, StoreError> {
        self.fetch_list("list_pending", "status = 'PENDING'", None).await
    }

    #[instrument(skip(self), fields(request_id = %id), err)]
    async fn mark_read(&self, id: PermissionRequestId, now: DateTime<Utc>) -> Result<PermissionRequest, StoreError> {
        self.transition("mark_read", id, move |r| {
            r.mark_read(now);
            Ok(r.clone())
        })
        .await
    }

    #[instrument(skip(self), fields(request_id = %id, decision = ?decision), err)]
    async fn claim(
        &self,
        id: PermissionRequestId,
        now: DateTime<Utc>,
        lease: Duration,
        decision: RequestDecision,
    ) -> Result<(PermissionRequest, DecisionClaim), StoreError> {
        self.transition("claim_request", id, move |r| {
            let claim = r.claim(now, lease, decision)?;
            Ok((r.clone(), claim))
        })
        .await
    }

    #[instrument(skip(self, token), fields(request_id = %id, decision = ?decision), err)]
    async fn complete(
        &self,
        id: PermissionRequestId,
        token: Uuid,
        decision: RequestDecision,
        decided_by: PrincipalId,
        now: DateTime<Utc>,
    ) -> Result<PermissionRequest, StoreError> {
        self.transition("complete_request", id, move |r| {
            r.complete(token, decision, decided_by, now)?;
            Ok(r.clone())
        })
        .await
    }

    #[instrument(skip(self, token), fields(request_id = %id), err)]
    async fn release(&self, id: PermissionRequestId, token: Uuid) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE permission_requests
            SET claim_token = NULL, claimed_at = NULL, claim_decision = NULL
            WHERE id = $1 AND claim_token = $2
            "#,
        )
        .bind(id.as_uuid())
        .bind(token)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("release_request", e))?;
        Ok(())
    }
}

fn request_from_row(row: &PgRow) -> Result<PermissionRequest, StoreError> {
    let status: String = row.try_get("status").map_err(|e| decode_error("status", e))?;
    let status =
        RequestStatus::parse(&status).ok_or_else(|| StoreError::Backend(format!("bad status column: {status}")))?;
    let Json(requested): Json<PermissionPatch> =
        row.try_get("requested").map_err(|e| decode_error("requested", e))?;

    let claim_token: Option<Uuid> = row.try_get("claim_token").map_err(|e| decode_error("claim_token", e))?;
    let claimed_at: Option<DateTime<Utc>> = row.try_get("claimed_at").map_err(|e| decode_error("claimed_at", e))?;
    let claim_decision: Option<String> =
        row.try_get("claim_decision").map_err(|e| decode_error("claim_decision", e))?;
    let claim = match (claim_token, claimed_at, claim_decision) {
        (Some(token), Some(claimed_at), Some(decision)) => {
            let decision = RequestDecision::parse(&decision)
                .ok_or_else(|| StoreError::Backend(format!("bad claim_decision column: {decision}")))?;
            Some(DecisionClaim {
                token,
                claimed_at,
                decision,
            })
        }
        _ => None,
    };

    let decided_by: Option<Uuid> = row.try_get("decided_by").map_err(|e| decode_error("decided_by", e))?;

    Ok(PermissionRequest {
        id: PermissionRequestId::from_uuid(row.try_get("id").map_err(|e| decode_error("id", e))?),
        principal_id: PrincipalId::from_uuid(row.try_get("principal_id").map_err(|e| decode_error("principal_id", e))?),
        requested,
        message: row.try_get("message").map_err(|e| decode_error("message", e))?,
        status,
        decided_by: decided_by.map(PrincipalId::from_uuid),
        decided_at: row.try_get("decided_at").map_err(|e| decode_error("decided_at", e))?,
        is_read_by_admin: row.try_get("is_read_by_admin").map_err(|e| decode_error("is_read_by_admin", e))?,
        claim,
        created_at: row.try_get("created_at").map_err(|e| decode_error("created_at", e))?,
        updated_at: row.try_get("updated_at").map_err(|e| decode_error("updated_at", e))?,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Error mapping
// ─────────────────────────────────────────────────────────────────────────────

fn decode_error(column: &str, err: sqlx::Error) -> StoreError {
    StoreError::Backend(format!("failed to decode column {column}: {err}"))
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            if db_err.code().as_deref() == Some("23505") {
                let what = match db_err.constraint() {
                    Some("principals_username_key") => "username already in use".to_string(),
                    Some("principals_email_key") => "email already in use".to_string(),
                    _ => format!("duplicate key in {operation}"),
                };
                StoreError::Conflict(what)
            } else {
                StoreError::Backend(format!("database error in {operation}: {}", db_err.message()))
            }
        }
        sqlx::Error::PoolClosed => StoreError::Backend(format!("connection pool closed in {operation}")),
        _ => StoreError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}
