use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier.
///
/// Permissions are modeled as dotted strings (e.g. "Users.Edit"). The first
/// segment is the owning module; the rest name the resource and action. The
/// name is the permission's identity: resolution and evaluation compare by
/// name, never by reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionName(Cow<'static, str>);

impl PermissionName {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The module segment (text before the first dot), if well-formed.
    pub fn module(&self) -> Option<&str> {
        let (module, rest) = self.0.split_once('.')?;
        if module.is_empty() || rest.is_empty() {
            return None;
        }
        Some(module)
    }
}

impl core::fmt::Display for PermissionName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for PermissionName {
    fn from(value: &'static str) -> Self {
        Self::new(value)
    }
}

impl From<String> for PermissionName {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Name of a permission module (a named group of permissions).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleName(Cow<'static, str>);

impl ModuleName {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for ModuleName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for ModuleName {
    fn from(value: &'static str) -> Self {
        Self::new(value)
    }
}

/// A registered permission.
///
/// Immutable once registered: the catalog is populated from static
/// definitions at process start and never mutated at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub name: PermissionName,
    pub module: ModuleName,
    pub display_name: String,
    pub description: String,
}

impl Permission {
    pub fn new(
        module: impl Into<ModuleName>,
        name: impl Into<PermissionName>,
        display_name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            module: module.into(),
            display_name: display_name.into(),
            description: description.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_segment_is_text_before_first_dot() {
        let name = PermissionName::new("Users.Sessions.Revoke");
        assert_eq!(name.module(), Some("Users"));
    }

    #[test]
    fn malformed_names_have_no_module() {
        assert_eq!(PermissionName::new("Users").module(), None);
        assert_eq!(PermissionName::new(".Edit").module(), None);
        assert_eq!(PermissionName::new("Users.").module(), None);
    }
}
