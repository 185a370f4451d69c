//! Allow/deny decisions for `(principal, requirement)` pairs.

use core::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use sentra_core::UserId;

use crate::requirement::Requirement;
use crate::resolver::PermissionResolver;
use crate::stores::StoreError;

/// The principal attached to an inbound request, as seen by the gate.
///
/// The subject is kept as the raw token subject string; parsing it into a
/// [`UserId`] is part of the evaluation itself (an unparseable subject is a
/// deny, not an error).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Subject {
    Anonymous,
    Authenticated { subject: String },
}

impl Subject {
    pub fn authenticated(subject: impl Into<String>) -> Self {
        Self::Authenticated {
            subject: subject.into(),
        }
    }

    pub fn user(user_id: UserId) -> Self {
        Self::Authenticated {
            subject: user_id.to_string(),
        }
    }
}

/// Outcome of an authorization evaluation.
///
/// Deny is a normal, expected result surfaced to callers as "forbidden". It
/// deliberately carries no detail about which permission was missing, so a
/// caller probing the gate cannot enumerate the catalog.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Stateless decision gate over the resolver.
///
/// Evaluation walks: authenticated? → subject parses to a user id? → does the
/// resolved permission set satisfy the requirement? Any failure along the way
/// is a deny. If the stores are unreachable the gate fails **closed**.
pub struct AuthorizationEvaluator {
    resolver: Arc<PermissionResolver>,
}

impl AuthorizationEvaluator {
    pub fn new(resolver: Arc<PermissionResolver>) -> Self {
        Self { resolver }
    }

    pub async fn evaluate(&self, principal: &Subject, requirement: &Requirement) -> Decision {
        let subject = match principal {
            Subject::Anonymous => {
                debug!("deny: unauthenticated principal");
                return Decision::Deny;
            }
            Subject::Authenticated { subject } => subject,
        };

        let user_id = match UserId::from_str(subject) {
            Ok(id) => id,
            Err(_) => {
                debug!("deny: subject is not a valid user id");
                return Decision::Deny;
            }
        };

        let satisfied = match requirement {
            Requirement::Single(name) => self.resolver.has_permission(user_id, name).await,
            Requirement::Any(names) => self.resolver.has_any(user_id, names).await,
            Requirement::All(names) => self.resolver.has_all(user_id, names).await,
            Requirement::Never => Ok(false),
        };

        match satisfied {
            Ok(true) => Decision::Allow,
            Ok(false) => Decision::Deny,
            Err(StoreError::Unavailable(reason)) => {
                // Fail closed: an undeterminable permission set never allows.
                warn!(user_id = %user_id, %reason, "deny: permission store unavailable");
                Decision::Deny
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};
    use std::sync::RwLock;

    use async_trait::async_trait;
    use chrono::Utc;

    use sentra_core::{Clock, ManualClock, RoleId};

    use crate::permission::PermissionName;
    use crate::resolver::ResolverConfig;
    use crate::stores::{PermissionStore, PrincipalStore};

    use super::*;

    struct StaticStores {
        roles: HashMap<UserId, HashSet<RoleId>>,
        grants: HashMap<RoleId, HashSet<PermissionName>>,
        unavailable: RwLock<bool>,
    }

    #[async_trait]
    impl PrincipalStore for StaticStores {
        async fn roles_for_user(&self, user_id: UserId) -> Result<HashSet<RoleId>, StoreError> {
            if *self.unavailable.read().unwrap() {
                return Err(StoreError::Unavailable("down".to_string()));
            }
            Ok(self.roles.get(&user_id).cloned().unwrap_or_default())
        }
    }

    #[async_trait]
    impl PermissionStore for StaticStores {
        async fn permissions_for_role(
            &self,
            role_id: RoleId,
        ) -> Result<HashSet<PermissionName>, StoreError> {
            if *self.unavailable.read().unwrap() {
                return Err(StoreError::Unavailable("down".to_string()));
            }
            Ok(self.grants.get(&role_id).cloned().unwrap_or_default())
        }
    }

    fn gate_for(user: UserId, perms: &[&'static str]) -> (AuthorizationEvaluator, Arc<StaticStores>) {
        let role = RoleId::new();
        let stores = Arc::new(StaticStores {
            roles: HashMap::from([(user, HashSet::from([role]))]),
            grants: HashMap::from([(
                role,
                perms.iter().map(|p| PermissionName::new(*p)).collect(),
            )]),
            unavailable: RwLock::new(false),
        });
        let resolver = PermissionResolver::new(
            Arc::clone(&stores) as Arc<dyn PrincipalStore>,
            Arc::clone(&stores) as Arc<dyn PermissionStore>,
            Arc::new(ManualClock::new(Utc::now())) as Arc<dyn Clock>,
            ResolverConfig::default(),
        );
        (AuthorizationEvaluator::new(Arc::new(resolver)), stores)
    }

    #[tokio::test]
    async fn anonymous_principal_denied() {
        let (gate, _) = gate_for(UserId::new(), &["Users.View"]);
        let decision = gate
            .evaluate(&Subject::Anonymous, &Requirement::single("Users.View"))
            .await;
        assert_eq!(decision, Decision::Deny);
    }

    #[tokio::test]
    async fn unparseable_subject_denied() {
        let (gate, _) = gate_for(UserId::new(), &["Users.View"]);
        let decision = gate
            .evaluate(
                &Subject::authenticated("not-a-uuid"),
                &Requirement::single("Users.View"),
            )
            .await;
        assert_eq!(decision, Decision::Deny);
    }

    #[tokio::test]
    async fn single_requirement() {
        let user = UserId::new();
        let (gate, _) = gate_for(user, &["Users.View"]);

        let allow = gate
            .evaluate(&Subject::user(user), &Requirement::single("Users.View"))
            .await;
        assert_eq!(allow, Decision::Allow);

        let deny = gate
            .evaluate(&Subject::user(user), &Requirement::single("Users.Delete"))
            .await;
        assert_eq!(deny, Decision::Deny);
    }

    #[tokio::test]
    async fn any_and_all_requirements() {
        let user = UserId::new();
        let (gate, _) = gate_for(user, &["Users.View", "Users.Edit"]);

        let any = Requirement::any(["Users.Delete", "Users.View"]).unwrap();
        assert_eq!(gate.evaluate(&Subject::user(user), &any).await, Decision::Allow);

        let all = Requirement::all(["Users.View", "Users.Edit"]).unwrap();
        assert_eq!(gate.evaluate(&Subject::user(user), &all).await, Decision::Allow);

        let all_missing = Requirement::all(["Users.View", "Users.Delete"]).unwrap();
        assert_eq!(
            gate.evaluate(&Subject::user(user), &all_missing).await,
            Decision::Deny
        );
    }

    #[tokio::test]
    async fn never_requirement_always_denies() {
        let user = UserId::new();
        let (gate, _) = gate_for(user, &["Users.View"]);
        assert_eq!(
            gate.evaluate(&Subject::user(user), &Requirement::Never).await,
            Decision::Deny
        );
    }

    #[tokio::test]
    async fn store_outage_fails_closed() {
        let user = UserId::new();
        let (gate, stores) = gate_for(user, &["Users.View"]);
        *stores.unavailable.write().unwrap() = true;

        let decision = gate
            .evaluate(&Subject::user(user), &Requirement::single("Users.View"))
            .await;
        assert_eq!(decision, Decision::Deny);
    }
}
