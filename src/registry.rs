//! Organization Registry: tracks every role and agent across every task this
//! process is running.
//!
//! Holds every role and agent ever created, keyed by ID behind
//! `dashmap::DashMap` for lock-free concurrent reads — the same structure
//! `AgentRegistry` (`src/agent.rs`) uses for its agent map, extended
//! here with a role table and parentage bookkeeping. Deletes are soft:
//! records are never removed, only flipped to a terminal status, so agent
//! parentage and role lineage stay walkable for as long as the process runs.
//!
//! One registry is shared by every task a process hosts (see
//! `Runtime::submit_task`): agents are keyed by `(TaskId, AgentId)` rather
//! than bare `AgentId` because the two system agents reuse the same fixed
//! `AgentId` value (`AgentId::root()`/`AgentId::user()`) in every task, so a
//! bare-`AgentId` table would collide different tasks' system agents into
//! the same slot. `entry_agents` records, per task, the agent a cross-task
//! send is checked against via `is_authorized_for_task`.

use crate::domain::{Agent, AgentStatus, ComputeStatus, Role, RoleStatus};
use crate::domain_types::{AgentId, LlmServiceId, RoleId, RoleName, TaskId, ToolGroup};
use crate::error::RegistryError;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::instrument;

/// Thread-safe handle to the registry, cheap to clone.
#[derive(Clone)]
pub struct OrganizationRegistry {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    roles: DashMap<RoleId, Role>,
    agents: DashMap<(TaskId, AgentId), Agent>,
    /// The agent each task's cross-task authorization is checked against:
    /// always that task's `root` system agent, seeded in `seed_task`.
    entry_agents: DashMap<TaskId, AgentId>,
    /// Dedup keys already used to spawn a child agent, keyed by
    /// `(caller, task_id, role_id)`, so a caller retrying the same
    /// `spawn_agent` call (e.g. after an LLM retry re-emits an identical
    /// tool call) does not fan out duplicate children for the same task and
    /// role.
    spawn_dedup: DashMap<(AgentId, TaskId, RoleId), AgentId>,
}

impl Default for OrganizationRegistry {
    fn default() -> Self {
        Self {
            inner: Arc::new(Inner::default()),
        }
    }
}

impl OrganizationRegistry {
    /// Builds an empty, process-wide registry. Call [`Self::seed_task`] once
    /// per task before dispatching against it.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the two system roles (idempotently — role content is the same
    /// for every task) and this task's own `root`/`user` agent instances,
    /// and records `root` as the task's entry agent.
    pub fn seed_task(&self, task_id: TaskId, now: DateTime<Utc>) {
        self.inner
            .roles
            .entry(RoleId::root())
            .or_insert_with(|| Role::root(now));
        self.inner
            .roles
            .entry(RoleId::user())
            .or_insert_with(|| Role::user(now));

        self.inner.agents.insert(
            (task_id.clone(), AgentId::root()),
            Agent::root(task_id.clone(), now),
        );
        self.inner.agents.insert(
            (task_id.clone(), AgentId::user()),
            Agent::user(task_id.clone(), now),
        );
        self.inner.entry_agents.insert(task_id, AgentId::root());
    }

    /// Returns the previously-spawned agent for `(caller, task_id, role_id)`
    /// if this exact combination has already produced a child, otherwise
    /// records `agent_id` against the key and returns `None`.
    pub fn dedup_spawn(
        &self,
        caller: AgentId,
        task_id: TaskId,
        role_id: RoleId,
        agent_id: AgentId,
    ) -> Option<AgentId> {
        let key = (caller, task_id, role_id);
        let mut inserted = false;
        let existing = *self.inner.spawn_dedup.entry(key).or_insert_with(|| {
            inserted = true;
            agent_id
        });
        if inserted {
            None
        } else {
            Some(existing)
        }
    }

    /// Registers a new role, created by `created_by`.
    #[instrument(skip(self, role_prompt))]
    #[allow(clippy::too_many_arguments)]
    pub fn create_role(
        &self,
        name: RoleName,
        role_prompt: String,
        llm_service_id: LlmServiceId,
        tool_groups: BTreeSet<ToolGroup>,
        created_by: RoleId,
        now: DateTime<Utc>,
    ) -> Result<Role, RegistryError> {
        if !self
            .inner
            .roles
            .get(&created_by)
            .is_some_and(|r| r.is_active())
        {
            return Err(RegistryError::RoleNotFound(created_by));
        }

        let role = Role {
            role_id: RoleId::generate(),
            name,
            status: RoleStatus::Active,
            role_prompt,
            llm_service_id,
            tool_groups: Some(tool_groups),
            created_by: Some(created_by),
            created_at: now,
        };
        self.inner.roles.insert(role.role_id, role.clone());
        Ok(role)
    }

    /// Updates a role's mutable fields in place. `tool_groups: Some(_)`
    /// replaces the role's tool groups; `None` leaves them untouched.
    pub fn update_role(
        &self,
        role_id: RoleId,
        role_prompt: Option<String>,
        tool_groups: Option<BTreeSet<ToolGroup>>,
    ) -> Result<Role, RegistryError> {
        let mut entry = self
            .inner
            .roles
            .get_mut(&role_id)
            .ok_or(RegistryError::RoleNotFound(role_id))?;
        if entry.status == RoleStatus::Deleted {
            return Err(RegistryError::RoleAlreadyDeleted(role_id));
        }
        if let Some(prompt) = role_prompt {
            entry.role_prompt = prompt;
        }
        if let Some(groups) = tool_groups {
            entry.tool_groups = Some(groups);
        }
        Ok(entry.clone())
    }

    /// Soft-deletes a role and every role transitively created by it.
    /// System roles may never be deleted.
    #[instrument(skip(self))]
    pub fn delete_role(&self, role_id: RoleId) -> Result<Vec<RoleId>, RegistryError> {
        if role_id.is_system() {
            return Err(RegistryError::CannotDeleteSystemRole);
        }
        let exists = self.inner.roles.contains_key(&role_id);
        if !exists {
            return Err(RegistryError::RoleNotFound(role_id));
        }

        let mut deleted = Vec::new();
        let mut frontier = vec![role_id];
        while let Some(id) = frontier.pop() {
            if let Some(mut entry) = self.inner.roles.get_mut(&id) {
                if entry.status == RoleStatus::Active {
                    entry.status = RoleStatus::Deleted;
                    deleted.push(id);
                }
            }
            for child in self.inner.roles.iter() {
                if child.created_by == Some(id) && child.status == RoleStatus::Active {
                    frontier.push(child.role_id);
                }
            }
        }
        Ok(deleted)
    }

    /// Looks up a role by ID.
    #[must_use]
    pub fn get_role(&self, role_id: RoleId) -> Option<Role> {
        self.inner.roles.get(&role_id).map(|r| r.clone())
    }

    /// True if `descendant` is `ancestor` itself or reachable from it via the
    /// `created_by` chain — used to enforce `not_child_role` on spawn.
    #[must_use]
    pub fn role_is_descendant(&self, ancestor: RoleId, descendant: RoleId) -> bool {
        let mut current = descendant;
        loop {
            if current == ancestor {
                return true;
            }
            match self.inner.roles.get(&current).and_then(|r| r.created_by) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    /// Lists every role (active and deleted).
    #[must_use]
    pub fn list_roles(&self) -> Vec<Role> {
        self.inner.roles.iter().map(|r| r.clone()).collect()
    }

    /// Registers a newly spawned agent within `task_id`.
    #[instrument(skip(self))]
    pub fn create_agent(
        &self,
        role_id: RoleId,
        parent_agent_id: AgentId,
        task_id: TaskId,
        now: DateTime<Utc>,
    ) -> Result<Agent, RegistryError> {
        let role = self
            .inner
            .roles
            .get(&role_id)
            .ok_or(RegistryError::RoleNotFound(role_id))?;
        if role.status != RoleStatus::Active {
            return Err(RegistryError::RoleNotFound(role_id));
        }
        drop(role);

        let agent = Agent {
            agent_id: AgentId::generate(),
            role_id,
            parent_agent_id: Some(parent_agent_id),
            task_id: task_id.clone(),
            status: AgentStatus::Active,
            compute_status: ComputeStatus::Idle,
            created_at: now,
            terminated_at: None,
        };
        self.inner
            .agents
            .insert((task_id, agent.agent_id), agent.clone());
        Ok(agent)
    }

    /// Looks up an agent by ID within `task_id`.
    #[must_use]
    pub fn get_agent(&self, task_id: &TaskId, agent_id: AgentId) -> Option<Agent> {
        self.inner
            .agents
            .get(&(task_id.clone(), agent_id))
            .map(|a| a.clone())
    }

    /// Lists every agent (active and terminated) in `task_id`.
    #[must_use]
    pub fn list_agents(&self, task_id: &TaskId) -> Vec<Agent> {
        self.inner
            .agents
            .iter()
            .filter(|e| &e.key().0 == task_id)
            .map(|e| e.value().clone())
            .collect()
    }

    /// Records a terminated agent, rejecting a repeat termination and
    /// system-agent targets. `caller` must be the target's direct parent.
    #[instrument(skip(self))]
    pub fn record_termination(
        &self,
        task_id: &TaskId,
        caller: AgentId,
        target: AgentId,
        now: DateTime<Utc>,
    ) -> Result<(), RegistryError> {
        if target.is_system() {
            return Err(RegistryError::CannotDeleteSystemAgent);
        }
        let mut entry = self
            .inner
            .agents
            .get_mut(&(task_id.clone(), target))
            .ok_or(RegistryError::AgentNotFound(target))?;
        if entry.status == AgentStatus::Terminated {
            return Err(RegistryError::AgentAlreadyTerminated(target));
        }
        if entry.parent_agent_id != Some(caller) {
            return Err(RegistryError::NotChildAgent);
        }
        entry.terminate(now);
        Ok(())
    }

    /// Updates an agent's compute status in place. The per-agent mutex
    /// guarding concurrent dispatch lives on the dispatcher; this just
    /// performs the write.
    pub fn set_compute_status(&self, task_id: &TaskId, agent_id: AgentId, status: ComputeStatus) {
        if let Some(mut entry) = self.inner.agents.get_mut(&(task_id.clone(), agent_id)) {
            entry.compute_status = status;
        }
    }

    /// The agent a cross-task send targeting/originating in `task_id` is
    /// authorized against, if the task has been seeded.
    #[must_use]
    pub fn entry_agent(&self, task_id: &TaskId) -> Option<AgentId> {
        self.inner.entry_agents.get(task_id).map(|e| *e)
    }

    /// True if `descendant` is `ancestor` itself or reachable from it via the
    /// `parent_agent_id` chain within `task_id`.
    #[must_use]
    pub fn agent_is_descendant(&self, task_id: &TaskId, ancestor: AgentId, descendant: AgentId) -> bool {
        let mut current = descendant;
        loop {
            if current == ancestor {
                return true;
            }
            match self
                .inner
                .agents
                .get(&(task_id.clone(), current))
                .and_then(|a| a.parent_agent_id)
            {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    /// True if `agent_id` may legitimately participate in `task_id`'s
    /// message traffic: either the task's entry agent (`root`), the `user`
    /// system agent (the task's external interface), or a descendant of the
    /// entry agent reached via `spawn_agent`. Used to compute `from_allowed`
    /// and `to_allowed` for `MessageBus::send` — replaces the old
    /// `get_agent(..).is_some()` existence check, which could never detect
    /// an actual cross-task violation since every task's registry used to
    /// be its own, disconnected instance.
    #[must_use]
    pub fn is_authorized_for_task(&self, task_id: &TaskId, agent_id: AgentId) -> bool {
        if agent_id == AgentId::user() {
            return self.get_agent(task_id, agent_id).is_some();
        }
        match self.entry_agent(task_id) {
            Some(entry) => self.agent_is_descendant(task_id, entry, agent_id),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> (OrganizationRegistry, TaskId) {
        let reg = OrganizationRegistry::new();
        let task_id = TaskId::generate();
        reg.seed_task(task_id.clone(), Utc::now());
        (reg, task_id)
    }

    #[test]
    fn system_roles_and_agents_are_seeded() {
        let (reg, task_id) = registry();
        assert!(reg.get_role(RoleId::root()).is_some());
        assert!(reg.get_role(RoleId::user()).is_some());
        assert!(reg.get_agent(&task_id, AgentId::root()).is_some());
        assert!(reg.get_agent(&task_id, AgentId::user()).is_some());
    }

    #[test]
    fn system_agents_do_not_leak_across_tasks() {
        let reg = OrganizationRegistry::new();
        let now = Utc::now();
        let task_a = TaskId::generate();
        let task_b = TaskId::generate();
        reg.seed_task(task_a.clone(), now);
        reg.seed_task(task_b.clone(), now);

        let role = reg
            .create_role(
                RoleName::try_new("worker").unwrap(),
                String::new(),
                LlmServiceId::try_new("svc").unwrap(),
                BTreeSet::new(),
                RoleId::root(),
                now,
            )
            .unwrap();
        let agent_a = reg
            .create_agent(role.role_id, AgentId::root(), task_a.clone(), now)
            .unwrap();

        assert!(reg.get_agent(&task_a, agent_a.agent_id).is_some());
        assert!(reg.get_agent(&task_b, agent_a.agent_id).is_none());
        assert!(reg.is_authorized_for_task(&task_a, agent_a.agent_id));
        assert!(!reg.is_authorized_for_task(&task_b, agent_a.agent_id));
    }

    #[test]
    fn entry_agent_and_its_descendants_are_authorized() {
        let (reg, task_id) = registry();
        let now = Utc::now();
        let role = reg
            .create_role(
                RoleName::try_new("worker").unwrap(),
                String::new(),
                LlmServiceId::try_new("svc").unwrap(),
                BTreeSet::new(),
                RoleId::root(),
                now,
            )
            .unwrap();
        let child = reg
            .create_agent(role.role_id, AgentId::root(), task_id.clone(), now)
            .unwrap();
        let grandchild = reg
            .create_agent(role.role_id, child.agent_id, task_id.clone(), now)
            .unwrap();

        assert!(reg.is_authorized_for_task(&task_id, AgentId::root()));
        assert!(reg.is_authorized_for_task(&task_id, AgentId::user()));
        assert!(reg.is_authorized_for_task(&task_id, child.agent_id));
        assert!(reg.is_authorized_for_task(&task_id, grandchild.agent_id));
        assert!(!reg.is_authorized_for_task(&task_id, AgentId::generate()));
    }

    #[test]
    fn delete_role_cascades_to_descendants() {
        let (reg, _task_id) = registry();
        let now = Utc::now();
        let parent = reg
            .create_role(
                RoleName::try_new("parent").unwrap(),
                String::new(),
                LlmServiceId::try_new("svc").unwrap(),
                BTreeSet::new(),
                RoleId::root(),
                now,
            )
            .unwrap();
        let child = reg
            .create_role(
                RoleName::try_new("child").unwrap(),
                String::new(),
                LlmServiceId::try_new("svc").unwrap(),
                BTreeSet::new(),
                parent.role_id,
                now,
            )
            .unwrap();

        let deleted = reg.delete_role(parent.role_id).unwrap();
        assert!(deleted.contains(&parent.role_id));
        assert!(deleted.contains(&child.role_id));
        assert_eq!(
            reg.get_role(child.role_id).unwrap().status,
            RoleStatus::Deleted
        );
    }

    #[test]
    fn system_role_cannot_be_deleted() {
        let (reg, _task_id) = registry();
        assert_eq!(
            reg.delete_role(RoleId::root()),
            Err(RegistryError::CannotDeleteSystemRole)
        );
    }

    #[test]
    fn termination_requires_direct_parent() {
        let (reg, task_id) = registry();
        let now = Utc::now();
        let role = reg
            .create_role(
                RoleName::try_new("worker").unwrap(),
                String::new(),
                LlmServiceId::try_new("svc").unwrap(),
                BTreeSet::new(),
                RoleId::root(),
                now,
            )
            .unwrap();
        let agent = reg
            .create_agent(role.role_id, AgentId::root(), task_id.clone(), now)
            .unwrap();

        assert_eq!(
            reg.record_termination(&task_id, AgentId::user(), agent.agent_id, now),
            Err(RegistryError::NotChildAgent)
        );
        assert!(reg
            .record_termination(&task_id, AgentId::root(), agent.agent_id, now)
            .is_ok());
        assert_eq!(
            reg.record_termination(&task_id, AgentId::root(), agent.agent_id, now),
            Err(RegistryError::AgentAlreadyTerminated(agent.agent_id))
        );
    }
}
