//! Static permission catalog.
//!
//! The registry is populated once during process initialization and read-only
//! afterwards; consumers hold it behind an `Arc` and never see a partially
//! registered catalog.

use std::collections::HashMap;

use thiserror::Error;

use crate::permission::{ModuleName, Permission, PermissionName};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("duplicate module name: {0}")]
    DuplicateModule(String),

    #[error("duplicate permission name: {0}")]
    DuplicatePermission(String),

    #[error("unknown module: {0}")]
    UnknownModule(String),

    #[error("malformed permission name: {0}")]
    MalformedName(String),
}

/// In-memory catalog of known permissions grouped into modules.
///
/// No I/O; lookups after registration are pure map reads.
#[derive(Debug, Default)]
pub struct PermissionRegistry {
    modules: HashMap<ModuleName, Vec<PermissionName>>,
    permissions: HashMap<PermissionName, Permission>,
}

impl PermissionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module. Fails if the module name is already taken.
    pub fn register_module(&mut self, module: impl Into<ModuleName>) -> Result<(), RegistryError> {
        let module = module.into();
        if self.modules.contains_key(&module) {
            return Err(RegistryError::DuplicateModule(module.as_str().to_string()));
        }
        self.modules.insert(module, Vec::new());
        Ok(())
    }

    /// Register a permission under its module.
    ///
    /// Fails if the permission name is already taken, the module was not
    /// registered first, or the name is not of the dotted `Module.…` form.
    pub fn register_permission(&mut self, permission: Permission) -> Result<(), RegistryError> {
        if permission.name.module() != Some(permission.module.as_str()) {
            return Err(RegistryError::MalformedName(
                permission.name.as_str().to_string(),
            ));
        }
        if self.permissions.contains_key(&permission.name) {
            return Err(RegistryError::DuplicatePermission(
                permission.name.as_str().to_string(),
            ));
        }

        let members = self
            .modules
            .get_mut(&permission.module)
            .ok_or_else(|| RegistryError::UnknownModule(permission.module.as_str().to_string()))?;

        members.push(permission.name.clone());
        self.permissions.insert(permission.name.clone(), permission);
        Ok(())
    }

    /// All registered permissions, in no particular order.
    pub fn all_permissions(&self) -> impl Iterator<Item = &Permission> {
        self.permissions.values()
    }

    /// Permissions belonging to one module (empty if the module is unknown
    /// or has no permissions).
    pub fn module_permissions(&self, module: &ModuleName) -> Vec<&Permission> {
        self.modules
            .get(module)
            .map(|names| {
                names
                    .iter()
                    .filter_map(|n| self.permissions.get(n))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn modules(&self) -> impl Iterator<Item = &ModuleName> {
        self.modules.keys()
    }

    pub fn get(&self, name: &PermissionName) -> Option<&Permission> {
        self.permissions.get(name)
    }

    pub fn is_valid(&self, name: &PermissionName) -> bool {
        self.permissions.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.permissions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.permissions.is_empty()
    }
}

/// Built-in catalog definitions.
///
/// Covers the standard identity modules; deployments can register additional
/// modules before handing the registry to the policy compiler.
pub mod builtin {
    use super::*;

    pub const USERS: &str = "Users";
    pub const ROLES: &str = "Roles";
    pub const AUTHENTICATION: &str = "Authentication";
    pub const SYSTEM_ADMINISTRATION: &str = "SystemAdministration";

    /// Build the standard registry.
    pub fn catalog() -> Result<PermissionRegistry, RegistryError> {
        let mut registry = PermissionRegistry::new();

        for module in [USERS, ROLES, AUTHENTICATION, SYSTEM_ADMINISTRATION] {
            registry.register_module(module)?;
        }

        for (module, name, display, description) in definitions() {
            registry.register_permission(Permission::new(module, name, display, description))?;
        }

        Ok(registry)
    }

    fn definitions() -> Vec<(&'static str, &'static str, &'static str, &'static str)> {
        vec![
            (USERS, "Users.View", "View users", "List users and view user details"),
            (USERS, "Users.Create", "Create users", "Create new user accounts"),
            (USERS, "Users.Edit", "Edit users", "Update user profiles and role assignments"),
            (USERS, "Users.Delete", "Delete users", "Deactivate or remove user accounts"),
            (ROLES, "Roles.View", "View roles", "List roles and view role details"),
            (ROLES, "Roles.Create", "Create roles", "Create new roles"),
            (ROLES, "Roles.Edit", "Edit roles", "Update roles and their permission grants"),
            (ROLES, "Roles.Delete", "Delete roles", "Remove roles"),
            (
                AUTHENTICATION,
                "Authentication.ViewSessions",
                "View sessions",
                "Inspect active refresh-token sessions",
            ),
            (
                AUTHENTICATION,
                "Authentication.RevokeSessions",
                "Revoke sessions",
                "Force-revoke a user's refresh tokens",
            ),
            (
                SYSTEM_ADMINISTRATION,
                "SystemAdministration.ViewAuditLog",
                "View audit log",
                "Read the security audit trail",
            ),
            (
                SYSTEM_ADMINISTRATION,
                "SystemAdministration.ManageSettings",
                "Manage settings",
                "Change system-wide configuration",
            ),
        ]
    }
}
