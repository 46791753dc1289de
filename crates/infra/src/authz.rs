//! Authorization hook for lot operations.
//!
//! Actors are opaque user ids; the service asks a [`LotAuthorizer`] before any
//! read of the store or decision. Policies are plain permission strings
//! (`lots.split`, `lots.read`, ...) with `*` granting everything.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use lotkeeper_core::UserId;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LotAction {
    Receive,
    Split,
    Merge,
    Reserve,
    Release,
    Read,
}

impl LotAction {
    /// Permission string required for this action.
    pub fn permission(&self) -> &'static str {
        match self {
            LotAction::Receive => "lots.receive",
            LotAction::Split => "lots.split",
            LotAction::Merge => "lots.merge",
            LotAction::Reserve => "lots.reserve",
            LotAction::Release => "lots.release",
            LotAction::Read => "lots.read",
        }
    }
}

impl core::fmt::Display for LotAction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.permission())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Policy check. No IO, no panics.
pub trait LotAuthorizer: Send + Sync {
    fn authorize(&self, actor: UserId, action: LotAction) -> Result<(), AuthzError>;
}

/// Permits everything. Default for embedded and test use.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl LotAuthorizer for AllowAll {
    fn authorize(&self, _actor: UserId, _action: LotAction) -> Result<(), AuthzError> {
        Ok(())
    }
}

/// In-process grant table.
#[derive(Debug, Default)]
pub struct PermissionTable {
    grants: RwLock<HashMap<UserId, HashSet<String>>>,
}

impl PermissionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant a permission string (`"lots.split"`, `"*"`, ...).
    pub fn grant(&self, actor: UserId, permission: impl Into<String>) {
        // A poisoned lock only means another writer panicked mid-insert; the
        // set itself is still a valid HashSet.
        let mut grants = match self.grants.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        grants.entry(actor).or_default().insert(permission.into());
    }

    pub fn grant_action(&self, actor: UserId, action: LotAction) {
        self.grant(actor, action.permission());
    }

    pub fn revoke_all(&self, actor: UserId) {
        let mut grants = match self.grants.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        grants.remove(&actor);
    }
}

impl LotAuthorizer for PermissionTable {
    fn authorize(&self, actor: UserId, action: LotAction) -> Result<(), AuthzError> {
        let grants = match self.grants.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let required = action.permission();
        let allowed = grants
            .get(&actor)
            .is_some_and(|perms| perms.contains("*") || perms.contains(required));

        if allowed {
            Ok(())
        } else {
            Err(AuthzError::Forbidden(required.to_string()))
        }
    }
}

impl<A> LotAuthorizer for std::sync::Arc<A>
where
    A: LotAuthorizer + ?Sized,
{
    fn authorize(&self, actor: UserId, action: LotAction) -> Result<(), AuthzError> {
        (**self).authorize(actor, action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_all_permits_everything() {
        assert!(AllowAll.authorize(UserId::new(), LotAction::Merge).is_ok());
    }

    #[test]
    fn exact_permission_is_required() {
        let table = PermissionTable::new();
        let clerk = UserId::new();
        table.grant_action(clerk, LotAction::Read);

        assert!(table.authorize(clerk, LotAction::Read).is_ok());
        assert_eq!(
            table.authorize(clerk, LotAction::Split),
            Err(AuthzError::Forbidden("lots.split".to_string()))
        );
    }

    #[test]
    fn wildcard_grants_all_actions() {
        let table = PermissionTable::new();
        let admin = UserId::new();
        table.grant(admin, "*");

        for action in [
            LotAction::Receive,
            LotAction::Split,
            LotAction::Merge,
            LotAction::Reserve,
            LotAction::Release,
            LotAction::Read,
        ] {
            assert!(table.authorize(admin, action).is_ok(), "{action}");
        }
    }

    #[test]
    fn unknown_and_revoked_actors_are_forbidden() {
        let table = PermissionTable::new();
        let actor = UserId::new();
        assert!(table.authorize(actor, LotAction::Read).is_err());

        table.grant(actor, "*");
        table.revoke_all(actor);
        assert!(table.authorize(actor, LotAction::Read).is_err());
    }
}
