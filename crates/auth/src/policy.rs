//! Startup policy compilation.
//!
//! Expands the permission catalog into named, reusable policies: one policy
//! per permission (named identically) plus a fixed set of module composites.
//! This is an explicit build step over a pre-validated catalog — it runs once,
//! after registration and before the gate serves its first request.

use std::collections::HashMap;

use thiserror::Error;
use tracing::info;

use crate::permission::{ModuleName, PermissionName};
use crate::registry::{PermissionRegistry, builtin};
use crate::requirement::Requirement;

/// Composite policy names registered alongside the per-permission policies.
pub mod composite {
    pub const ADMIN_ONLY: &str = "AdminOnly";
    pub const USER_MANAGEMENT: &str = "UserManagement";
    pub const ROLE_MANAGEMENT: &str = "RoleManagement";
    pub const SYSTEM_ADMINISTRATION: &str = "SystemAdministration";
    pub const AUTHENTICATION_MANAGEMENT: &str = "AuthenticationManagement";
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyError {
    /// Compiling against an empty catalog would register a gate that can
    /// never allow anything; treat it as a deployment mistake and refuse to
    /// start.
    #[error("permission registry is empty; refusing to compile policies")]
    EmptyCatalog,
}

/// Immutable mapping from policy name to compiled requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicySet {
    policies: HashMap<String, Requirement>,
}

impl PolicySet {
    pub fn get(&self, name: &str) -> Option<&Requirement> {
        self.policies.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.policies.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

/// Compile the policy set from a fully populated registry.
pub fn compile_policies(registry: &PermissionRegistry) -> Result<PolicySet, PolicyError> {
    if registry.is_empty() {
        return Err(PolicyError::EmptyCatalog);
    }

    let mut policies = HashMap::new();

    // One policy per permission, named identically to the permission.
    for permission in registry.all_permissions() {
        policies.insert(
            permission.name.as_str().to_string(),
            Requirement::Single(permission.name.clone()),
        );
    }

    // Fixed module composites. A composite over a module with zero
    // registered permissions compiles to `Never` (permanent deny) rather
    // than an invalid empty `Any`.
    let composites: [(&str, &[&str]); 5] = [
        (
            composite::ADMIN_ONLY,
            &[builtin::USERS, builtin::ROLES, builtin::SYSTEM_ADMINISTRATION],
        ),
        (composite::USER_MANAGEMENT, &[builtin::USERS]),
        (composite::ROLE_MANAGEMENT, &[builtin::ROLES]),
        (composite::SYSTEM_ADMINISTRATION, &[builtin::SYSTEM_ADMINISTRATION]),
        (composite::AUTHENTICATION_MANAGEMENT, &[builtin::AUTHENTICATION]),
    ];

    for (name, modules) in composites {
        let members: Vec<PermissionName> = modules
            .iter()
            .flat_map(|m| registry.module_permissions(&ModuleName::new(*m)))
            .map(|p| p.name.clone())
            .collect();
        policies.insert(name.to_string(), Requirement::any_or_never(members));
    }

    info!(policies = policies.len(), "compiled authorization policies");
    Ok(PolicySet { policies })
}
