//! Store contracts the resolver reads through.
//!
//! Which roles a user holds and which permissions a role grants live in
//! whatever storage the deployment uses; the engine only sees these two
//! contracts. Implementations must enforce their own isolation — the
//! resolver treats results as authoritative.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use sentra_core::{RoleId, UserId};

use crate::permission::PermissionName;

/// Store access error.
///
/// An unreachable store is a distinct condition from "no permissions": the
/// resolver propagates it and the evaluator fails closed, rather than
/// silently resolving to the empty set.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Supplies which roles a user holds.
///
/// An unknown user yields the empty set, not an error — absence of a user is
/// not conflated with absence of permission.
#[async_trait]
pub trait PrincipalStore: Send + Sync {
    async fn roles_for_user(&self, user_id: UserId) -> Result<HashSet<RoleId>, StoreError>;
}

/// Supplies which permissions are attached to a role.
#[async_trait]
pub trait PermissionStore: Send + Sync {
    async fn permissions_for_role(
        &self,
        role_id: RoleId,
    ) -> Result<HashSet<PermissionName>, StoreError>;
}

#[async_trait]
impl<S> PrincipalStore for Arc<S>
where
    S: PrincipalStore + ?Sized,
{
    async fn roles_for_user(&self, user_id: UserId) -> Result<HashSet<RoleId>, StoreError> {
        (**self).roles_for_user(user_id).await
    }
}

#[async_trait]
impl<S> PermissionStore for Arc<S>
where
    S: PermissionStore + ?Sized,
{
    async fn permissions_for_role(
        &self,
        role_id: RoleId,
    ) -> Result<HashSet<PermissionName>, StoreError> {
        (**self).permissions_for_role(role_id).await
    }
}
