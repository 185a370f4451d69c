//! Authorization requirement combinators.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::permission::PermissionName;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RequirementError {
    /// `Any`/`All` over zero permissions would be vacuously wrong either way,
    /// so construction is rejected eagerly and the case never reaches
    /// evaluation.
    #[error("requirement must name at least one permission")]
    Empty,
}

/// A boolean combinator over permission names used to gate an action.
///
/// Constructed once when a policy is compiled and immutable afterwards.
/// `Never` exists so the policy compiler can express "permanently deny"
/// (e.g. a composite policy over a module with no registered permissions)
/// without constructing an invalid empty `Any`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Requirement {
    /// The principal must hold exactly this permission.
    Single(PermissionName),
    /// The principal must hold at least one of these permissions.
    Any(BTreeSet<PermissionName>),
    /// The principal must hold every one of these permissions.
    All(BTreeSet<PermissionName>),
    /// Always denies.
    Never,
}

impl Requirement {
    pub fn single(name: impl Into<PermissionName>) -> Self {
        Self::Single(name.into())
    }

    pub fn any<I, P>(names: I) -> Result<Self, RequirementError>
    where
        I: IntoIterator<Item = P>,
        P: Into<PermissionName>,
    {
        let set: BTreeSet<_> = names.into_iter().map(Into::into).collect();
        if set.is_empty() {
            return Err(RequirementError::Empty);
        }
        Ok(Self::Any(set))
    }

    pub fn all<I, P>(names: I) -> Result<Self, RequirementError>
    where
        I: IntoIterator<Item = P>,
        P: Into<PermissionName>,
    {
        let set: BTreeSet<_> = names.into_iter().map(Into::into).collect();
        if set.is_empty() {
            return Err(RequirementError::Empty);
        }
        Ok(Self::All(set))
    }

    /// `Any` over the given names, or `Never` when the set is empty.
    pub fn any_or_never<I, P>(names: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PermissionName>,
    {
        Self::any(names).unwrap_or(Self::Never)
    }
}
