//! In-memory adapters.
//!
//! Intended for tests/dev. Not optimized for performance, but the token
//! repository keeps the same conditional-write semantics as the Postgres
//! implementation: the check-and-set happens under one write lock.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use sentra_auth::{PermissionName, PermissionStore, PrincipalStore, StoreError};
use sentra_core::{RoleId, UserId};
use sentra_tokens::{RefreshToken, RepositoryError, TokenRepository};

/// Map-backed role membership store.
#[derive(Debug, Default)]
pub struct InMemoryPrincipalStore {
    memberships: RwLock<HashMap<UserId, HashSet<RoleId>>>,
}

impl InMemoryPrincipalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Note: changing membership does not touch the resolver cache — the
    /// caller is responsible for invalidating the affected user.
    pub fn assign_role(&self, user_id: UserId, role_id: RoleId) {
        self.memberships
            .write()
            .expect("membership lock poisoned")
            .entry(user_id)
            .or_default()
            .insert(role_id);
    }

    pub fn remove_role(&self, user_id: UserId, role_id: RoleId) {
        if let Some(roles) = self
            .memberships
            .write()
            .expect("membership lock poisoned")
            .get_mut(&user_id)
        {
            roles.remove(&role_id);
        }
    }
}

#[async_trait]
impl PrincipalStore for InMemoryPrincipalStore {
    async fn roles_for_user(&self, user_id: UserId) -> Result<HashSet<RoleId>, StoreError> {
        let memberships = self
            .memberships
            .read()
            .map_err(|_| StoreError::Unavailable("membership lock poisoned".to_string()))?;
        Ok(memberships.get(&user_id).cloned().unwrap_or_default())
    }
}

/// Map-backed role-permission assignment store.
#[derive(Debug, Default)]
pub struct InMemoryPermissionStore {
    grants: RwLock<HashMap<RoleId, HashSet<PermissionName>>>,
}

impl InMemoryPermissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&self, role_id: RoleId, permission: impl Into<PermissionName>) {
        self.grants
            .write()
            .expect("grant lock poisoned")
            .entry(role_id)
            .or_default()
            .insert(permission.into());
    }

    pub fn revoke(&self, role_id: RoleId, permission: &PermissionName) {
        if let Some(granted) = self
            .grants
            .write()
            .expect("grant lock poisoned")
            .get_mut(&role_id)
        {
            granted.remove(permission);
        }
    }
}

#[async_trait]
impl PermissionStore for InMemoryPermissionStore {
    async fn permissions_for_role(
        &self,
        role_id: RoleId,
    ) -> Result<HashSet<PermissionName>, StoreError> {
        let grants = self
            .grants
            .read()
            .map_err(|_| StoreError::Unavailable("grant lock poisoned".to_string()))?;
        Ok(grants.get(&role_id).cloned().unwrap_or_default())
    }
}

/// Map-backed token repository.
#[derive(Debug, Default)]
pub struct InMemoryTokenRepository {
    tokens: RwLock<HashMap<String, RefreshToken>>,
}

impl InMemoryTokenRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_err() -> RepositoryError {
        RepositoryError::Unavailable("token lock poisoned".to_string())
    }
}

#[async_trait]
impl TokenRepository for InMemoryTokenRepository {
    async fn get(&self, token_value: &str) -> Result<Option<RefreshToken>, RepositoryError> {
        let tokens = self.tokens.read().map_err(|_| Self::lock_err())?;
        Ok(tokens.get(token_value).cloned())
    }

    async fn save(&self, token: &RefreshToken) -> Result<(), RepositoryError> {
        let mut tokens = self.tokens.write().map_err(|_| Self::lock_err())?;
        tokens.insert(token.token_value.clone(), token.clone());
        Ok(())
    }

    async fn active_for_user(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<RefreshToken>, RepositoryError> {
        let tokens = self.tokens.read().map_err(|_| Self::lock_err())?;
        let mut active: Vec<RefreshToken> = tokens
            .values()
            .filter(|t| t.user_id == user_id && t.is_active(now))
            .cloned()
            .collect();
        active.sort_by_key(|t| t.issued_at);
        Ok(active)
    }

    async fn revoke_if_active(
        &self,
        token_value: &str,
        revoked_at: DateTime<Utc>,
        revoked_by_ip: Option<&str>,
        replaced_by: Option<&str>,
    ) -> Result<bool, RepositoryError> {
        let mut tokens = self.tokens.write().map_err(|_| Self::lock_err())?;
        match tokens.get_mut(token_value) {
            Some(token) if !token.is_revoked => {
                token.is_revoked = true;
                token.revoked_at = Some(revoked_at);
                token.revoked_by_ip = revoked_by_ip.map(str::to_string);
                token.replaced_by_token_value = replaced_by.map(str::to_string);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn record_validation(
        &self,
        token_value: &str,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut tokens = self.tokens.write().map_err(|_| Self::lock_err())?;
        if let Some(token) = tokens.get_mut(token_value) {
            token.last_validated_at = Some(at);
        }
        Ok(())
    }

    async fn inactive_tokens(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<RefreshToken>, RepositoryError> {
        let tokens = self.tokens.read().map_err(|_| Self::lock_err())?;
        Ok(tokens
            .values()
            .filter(|t| !t.is_revoked && t.last_activity_at() < cutoff)
            .cloned()
            .collect())
    }
}
