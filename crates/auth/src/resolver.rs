//! Effective-permission resolution with a TTL-bounded cache.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use sentra_core::{Clock, UserId};

use crate::permission::PermissionName;
use crate::stores::{PermissionStore, PrincipalStore, StoreError};

/// Resolver tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// How long a resolved permission set stays served from cache.
    pub cache_ttl_minutes: i64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            cache_ttl_minutes: 15,
        }
    }
}

impl ResolverConfig {
    pub fn with_cache_ttl_minutes(mut self, minutes: i64) -> Self {
        self.cache_ttl_minutes = minutes;
        self
    }

    fn ttl(&self) -> Duration {
        Duration::minutes(self.cache_ttl_minutes)
    }
}

#[derive(Debug, Clone)]
struct CachedSet {
    permissions: Arc<HashSet<PermissionName>>,
    expires_at: DateTime<Utc>,
}

/// Computes a user's effective permission set from the principal and
/// permission stores.
///
/// The effective set is the de-duplicated union of the permissions of every
/// role the user holds, keyed by permission name. Resolution is idempotent,
/// so concurrent cache misses for the same user may each resolve
/// independently; there is deliberately no single-flight, at the cost of
/// redundant store reads under a miss storm.
///
/// Staleness: after a role-membership or role-permission change, decisions
/// can be stale for up to the TTL unless [`PermissionResolver::invalidate_user_cache`]
/// is called. Mutating callers must invalidate; the TTL bounds the exposure
/// when one forgets.
pub struct PermissionResolver {
    principals: Arc<dyn PrincipalStore>,
    permissions: Arc<dyn PermissionStore>,
    clock: Arc<dyn Clock>,
    config: ResolverConfig,
    cache: RwLock<HashMap<UserId, CachedSet>>,
}

impl PermissionResolver {
    pub fn new(
        principals: Arc<dyn PrincipalStore>,
        permissions: Arc<dyn PermissionStore>,
        clock: Arc<dyn Clock>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            principals,
            permissions,
            clock,
            config,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// The user's effective permission set (cached if unexpired).
    ///
    /// An unknown user resolves to the empty set, not an error.
    pub async fn user_permissions(
        &self,
        user_id: UserId,
    ) -> Result<Arc<HashSet<PermissionName>>, StoreError> {
        let now = self.clock.now();

        if let Some(cached) = self.cached(user_id, now) {
            debug!(user_id = %user_id, "permission cache hit");
            return Ok(cached);
        }

        let resolved = Arc::new(self.resolve(user_id).await?);

        // Inserted only after a fully successful resolution: a cancelled or
        // failed resolution never leaves a partial entry behind.
        let entry = CachedSet {
            permissions: Arc::clone(&resolved),
            expires_at: now + self.config.ttl(),
        };
        self.cache
            .write()
            .map_err(|_| StoreError::Unavailable("cache lock poisoned".to_string()))?
            .insert(user_id, entry);

        debug!(user_id = %user_id, count = resolved.len(), "resolved permission set");
        Ok(resolved)
    }

    pub async fn has_permission(
        &self,
        user_id: UserId,
        name: &PermissionName,
    ) -> Result<bool, StoreError> {
        Ok(self.user_permissions(user_id).await?.contains(name))
    }

    /// True iff the user holds at least one of the requested permissions.
    pub async fn has_any<'a, I>(&self, user_id: UserId, names: I) -> Result<bool, StoreError>
    where
        I: IntoIterator<Item = &'a PermissionName>,
    {
        let held = self.user_permissions(user_id).await?;
        Ok(names.into_iter().any(|n| held.contains(n)))
    }

    /// True iff the user holds every requested permission.
    pub async fn has_all<'a, I>(&self, user_id: UserId, names: I) -> Result<bool, StoreError>
    where
        I: IntoIterator<Item = &'a PermissionName>,
    {
        let held = self.user_permissions(user_id).await?;
        Ok(names.into_iter().all(|n| held.contains(n)))
    }

    /// Drop any cached entry for the user.
    ///
    /// Callers that change role membership or role-permission assignments
    /// must invalidate every affected user, or decisions stay stale for up
    /// to the TTL.
    pub fn invalidate_user_cache(&self, user_id: UserId) {
        if let Ok(mut cache) = self.cache.write() {
            if cache.remove(&user_id).is_some() {
                debug!(user_id = %user_id, "permission cache invalidated");
            }
        }
    }

    fn cached(&self, user_id: UserId, now: DateTime<Utc>) -> Option<Arc<HashSet<PermissionName>>> {
        let cache = self.cache.read().ok()?;
        let entry = cache.get(&user_id)?;
        if entry.expires_at <= now {
            return None;
        }
        Some(Arc::clone(&entry.permissions))
    }

    async fn resolve(&self, user_id: UserId) -> Result<HashSet<PermissionName>, StoreError> {
        let roles = self.principals.roles_for_user(user_id).await?;

        let mut effective = HashSet::new();
        for role_id in roles {
            let granted = self.permissions.permissions_for_role(role_id).await?;
            effective.extend(granted);
        }
        Ok(effective)
    }
}
