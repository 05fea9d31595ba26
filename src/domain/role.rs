//! Role definitions.
//!
//! A role is the template an agent is spawned from: a system prompt, the LLM
//! service it talks to, and the tool groups it may call. Roles form a tree
//! via `created_by`, mirroring the agent parentage tree, and are soft-deleted
//! rather than removed so history stays intact — grounded in the
//! `AgentMetadata` pattern of mutating a status field instead of dropping the
//! record.

use crate::domain_types::{LlmServiceId, RoleId, RoleName, ToolGroup};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Lifecycle status of a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleStatus {
    /// The role may still be used to spawn agents.
    Active,
    /// The role has been soft-deleted; existing agents are unaffected but no
    /// new agents may be spawned from it.
    Deleted,
}

/// A role record in the Organization Registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    /// Unique identifier.
    pub role_id: RoleId,
    /// Human-readable name.
    pub name: RoleName,
    /// Current lifecycle status.
    pub status: RoleStatus,
    /// System prompt text injected for agents of this role.
    pub role_prompt: String,
    /// The LLM service agents of this role are dispatched through.
    pub llm_service_id: LlmServiceId,
    /// Tool groups agents of this role may invoke. `None` means every tool
    /// group is allowed, used for the two system roles so bootstrapping
    /// agents are never locked out of tool access before any role has been
    /// explicitly configured.
    pub tool_groups: Option<BTreeSet<ToolGroup>>,
    /// The role whose `spawn_agent` call created this role, if any. `None`
    /// for the two system roles.
    pub created_by: Option<RoleId>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Role {
    /// Builds the well-known `root` system role.
    #[must_use]
    pub fn root(now: DateTime<Utc>) -> Self {
        Self {
            role_id: RoleId::root(),
            name: RoleName::try_new("root").expect("literal is valid"),
            status: RoleStatus::Active,
            role_prompt: String::new(),
            llm_service_id: LlmServiceId::try_new("none").expect("literal is valid"),
            tool_groups: None,
            created_by: None,
            created_at: now,
        }
    }

    /// Builds the well-known `user` system role.
    #[must_use]
    pub fn user(now: DateTime<Utc>) -> Self {
        Self {
            role_id: RoleId::user(),
            name: RoleName::try_new("user").expect("literal is valid"),
            status: RoleStatus::Active,
            role_prompt: String::new(),
            llm_service_id: LlmServiceId::try_new("none").expect("literal is valid"),
            tool_groups: None,
            created_by: None,
            created_at: now,
        }
    }

    /// True for the two non-deletable system roles.
    #[must_use]
    pub fn is_system(&self) -> bool {
        self.role_id.is_system()
    }

    /// True if this role may still be used to spawn agents.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == RoleStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_roles_are_active_and_parentless() {
        let now = Utc::now();
        let root = Role::root(now);
        let user = Role::user(now);
        assert!(root.is_system());
        assert!(user.is_system());
        assert!(root.created_by.is_none());
        assert!(user.is_active());
    }
}
