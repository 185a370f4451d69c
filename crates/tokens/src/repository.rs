//! Persistence contract for the token ledger.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use sentra_core::UserId;

use crate::token::RefreshToken;

/// Token store access error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("token store unavailable: {0}")]
    Unavailable(String),
}

/// Durable storage for refresh tokens.
///
/// Implementations must provide a **conditional write** on the revoked flag
/// ([`TokenRepository::revoke_if_active`]): rotation correctness depends on
/// the store deciding races, not in-process locking, because the ledger may
/// run behind multiple service instances.
#[async_trait]
pub trait TokenRepository: Send + Sync {
    async fn get(&self, token_value: &str) -> Result<Option<RefreshToken>, RepositoryError>;

    /// Insert a freshly issued token.
    async fn save(&self, token: &RefreshToken) -> Result<(), RepositoryError>;

    /// All active (not revoked, not expired at `now`) tokens for a user,
    /// ordered by `issued_at` ascending.
    async fn active_for_user(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<RefreshToken>, RepositoryError>;

    /// Atomically mark a token revoked **iff it is not already revoked**.
    ///
    /// Returns `true` when this call performed the revocation and `false`
    /// when the token was missing or already revoked (i.e. a concurrent
    /// writer won). `replaced_by` links the successor when the revocation is
    /// a rotation.
    async fn revoke_if_active(
        &self,
        token_value: &str,
        revoked_at: DateTime<Utc>,
        revoked_by_ip: Option<&str>,
        replaced_by: Option<&str>,
    ) -> Result<bool, RepositoryError>;

    /// Record a successful validation (activity signal for the sweep).
    async fn record_validation(
        &self,
        token_value: &str,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    /// Non-revoked tokens whose last rotation or validation activity is
    /// before `cutoff`.
    async fn inactive_tokens(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<RefreshToken>, RepositoryError>;
}

#[async_trait]
impl<R> TokenRepository for Arc<R>
where
    R: TokenRepository + ?Sized,
{
    async fn get(&self, token_value: &str) -> Result<Option<RefreshToken>, RepositoryError> {
        (**self).get(token_value).await
    }

    async fn save(&self, token: &RefreshToken) -> Result<(), RepositoryError> {
        (**self).save(token).await
    }

    async fn active_for_user(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<RefreshToken>, RepositoryError> {
        (**self).active_for_user(user_id, now).await
    }

    async fn revoke_if_active(
        &self,
        token_value: &str,
        revoked_at: DateTime<Utc>,
        revoked_by_ip: Option<&str>,
        replaced_by: Option<&str>,
    ) -> Result<bool, RepositoryError> {
        (**self)
            .revoke_if_active(token_value, revoked_at, revoked_by_ip, replaced_by)
            .await
    }

    async fn record_validation(
        &self,
        token_value: &str,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        (**self).record_validation(token_value, at).await
    }

    async fn inactive_tokens(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<RefreshToken>, RepositoryError> {
        (**self).inactive_tokens(cutoff).await
    }
}
