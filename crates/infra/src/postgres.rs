//! Postgres-backed token repository.
//!
//! The rotation race is decided here, not in process memory: `revoke_if_active`
//! is a single `UPDATE … WHERE NOT is_revoked`, so of two concurrent writers
//! exactly one observes `rows_affected = 1`. This holds across multiple
//! service instances sharing the database.
//!
//! ## Expected schema
//!
//! ```sql
//! CREATE TABLE refresh_tokens (
//!     token_value              TEXT PRIMARY KEY,
//!     access_token_id          UUID        NOT NULL,
//!     user_id                  UUID        NOT NULL,
//!     issued_at                TIMESTAMPTZ NOT NULL,
//!     expires_at               TIMESTAMPTZ NOT NULL,
//!     is_revoked               BOOLEAN     NOT NULL DEFAULT FALSE,
//!     revoked_at               TIMESTAMPTZ,
//!     revoked_by_ip            TEXT,
//!     replaced_by_token_value  TEXT,
//!     created_by_ip            TEXT,
//!     last_validated_at        TIMESTAMPTZ
//! );
//! CREATE INDEX refresh_tokens_user_idx ON refresh_tokens (user_id) WHERE NOT is_revoked;
//! ```
//!
//! ## Error Mapping
//!
//! All SQLx errors surface as `RepositoryError::Unavailable` with the failing
//! operation named; the ledger has no sensible recovery beyond propagating,
//! and the evaluator above it fails closed.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tracing::instrument;
use uuid::Uuid;

use sentra_core::UserId;
use sentra_tokens::{RefreshToken, RepositoryError, TokenRepository};

/// Postgres-backed refresh-token store.
#[derive(Debug, Clone)]
pub struct PgTokenRepository {
    pool: Arc<PgPool>,
}

impl PgTokenRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[derive(Debug, FromRow)]
struct TokenRow {
    token_value: String,
    access_token_id: Uuid,
    user_id: Uuid,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    is_revoked: bool,
    revoked_at: Option<DateTime<Utc>>,
    revoked_by_ip: Option<String>,
    replaced_by_token_value: Option<String>,
    created_by_ip: Option<String>,
    last_validated_at: Option<DateTime<Utc>>,
}

impl From<TokenRow> for RefreshToken {
    fn from(row: TokenRow) -> Self {
        RefreshToken {
            token_value: row.token_value,
            access_token_id: row.access_token_id.into(),
            user_id: row.user_id.into(),
            issued_at: row.issued_at,
            expires_at: row.expires_at,
            is_revoked: row.is_revoked,
            revoked_at: row.revoked_at,
            revoked_by_ip: row.revoked_by_ip,
            replaced_by_token_value: row.replaced_by_token_value,
            created_by_ip: row.created_by_ip,
            last_validated_at: row.last_validated_at,
        }
    }
}

const COLUMNS: &str = "token_value, access_token_id, user_id, issued_at, expires_at, \
     is_revoked, revoked_at, revoked_by_ip, replaced_by_token_value, created_by_ip, \
     last_validated_at";

fn map_sqlx_error(operation: &str, e: sqlx::Error) -> RepositoryError {
    RepositoryError::Unavailable(format!("{operation}: {e}"))
}

#[async_trait]
impl TokenRepository for PgTokenRepository {
    #[instrument(skip(self))]
    async fn get(&self, token_value: &str) -> Result<Option<RefreshToken>, RepositoryError> {
        let row: Option<TokenRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM refresh_tokens WHERE token_value = $1"
        ))
        .bind(token_value)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get", e))?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self, token), fields(user_id = %token.user_id))]
    async fn save(&self, token: &RefreshToken) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (
                token_value, access_token_id, user_id, issued_at, expires_at,
                is_revoked, revoked_at, revoked_by_ip, replaced_by_token_value,
                created_by_ip, last_validated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(&token.token_value)
        .bind(token.access_token_id.as_uuid())
        .bind(token.user_id.as_uuid())
        .bind(token.issued_at)
        .bind(token.expires_at)
        .bind(token.is_revoked)
        .bind(token.revoked_at)
        .bind(&token.revoked_by_ip)
        .bind(&token.replaced_by_token_value)
        .bind(&token.created_by_ip)
        .bind(token.last_validated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("save", e))?;

        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn active_for_user(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<RefreshToken>, RepositoryError> {
        let rows: Vec<TokenRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM refresh_tokens \
             WHERE user_id = $1 AND NOT is_revoked AND expires_at >= $2 \
             ORDER BY issued_at ASC"
        ))
        .bind(user_id.as_uuid())
        .bind(now)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("active_for_user", e))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn revoke_if_active(
        &self,
        token_value: &str,
        revoked_at: DateTime<Utc>,
        revoked_by_ip: Option<&str>,
        replaced_by: Option<&str>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET is_revoked = TRUE,
                revoked_at = $2,
                revoked_by_ip = $3,
                replaced_by_token_value = $4
            WHERE token_value = $1 AND NOT is_revoked
            "#,
        )
        .bind(token_value)
        .bind(revoked_at)
        .bind(revoked_by_ip)
        .bind(replaced_by)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("revoke_if_active", e))?;

        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self))]
    async fn record_validation(
        &self,
        token_value: &str,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE refresh_tokens SET last_validated_at = $2 WHERE token_value = $1")
            .bind(token_value)
            .bind(at)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("record_validation", e))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn inactive_tokens(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<RefreshToken>, RepositoryError> {
        let rows: Vec<TokenRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM refresh_tokens \
             WHERE NOT is_revoked \
             AND GREATEST(issued_at, COALESCE(last_validated_at, issued_at)) < $1"
        ))
        .bind(cutoff)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("inactive_tokens", e))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}
