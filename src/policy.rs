//! Access policy
//!
//! The gateway in front of the ledger authenticates callers and hands over an
//! [`Actor`]. What an actor may do is decided here, not in the handlers.

use serde::{Deserialize, Serialize};

use crate::claim::Claim;
use crate::contributor::Role;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }
}

pub trait AccessPolicy: Send + Sync {
    fn can_request_claim(&self, actor: &Actor) -> bool;

    fn can_resolve_claims(&self, actor: &Actor) -> bool;

    /// Claim owners and processors may read a claim
    fn can_read_claim(&self, actor: &Actor, claim: &Claim) -> bool {
        claim.contributor_id == actor.id || self.can_resolve_claims(actor)
    }
}

/// Role-based policy driven by `[ledger] processor_roles`
#[derive(Debug, Clone)]
pub struct RolePolicy {
    processor_roles: Vec<Role>,
}

impl RolePolicy {
    pub fn new(processor_roles: Vec<Role>) -> Self {
        Self { processor_roles }
    }
}

impl Default for RolePolicy {
    fn default() -> Self {
        Self::new(vec![Role::Admin, Role::SuperAdmin])
    }
}

impl AccessPolicy for RolePolicy {
    fn can_request_claim(&self, actor: &Actor) -> bool {
        !actor.role.is_exempt_from_points()
    }

    fn can_resolve_claims(&self, actor: &Actor) -> bool {
        self.processor_roles.contains(&actor.role)
    }
}
