//! Agent records and the compute-status state machine.
//!
//! `ComputeStatus` is the three-state machine, guarded
//! by a per-agent mutex: an agent is `Idle` between inbound messages,
//! `Processing` while running tool calls synchronously, or `WaitingLlm` while
//! its one in-flight LLM request is outstanding. The dispatcher (see
//! `crate::dispatcher`) holds the mutex only across reads/writes of this
//! field, not across the whole behavior invocation, the same granularity
//! `AgentMetadata::set_state` uses for its `AgentState` field.

use crate::domain_types::{AgentId, RoleId, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What an agent is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputeStatus {
    /// No message is being processed.
    Idle,
    /// Running tool calls or composing the next LLM request.
    Processing,
    /// An LLM request is in flight via the Concurrency Controller.
    WaitingLlm,
}

/// Lifecycle status of an agent record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// The agent exists and may receive messages.
    Active,
    /// The agent has been terminated; its record is retained for history.
    Terminated,
}

/// An agent record in the Organization Registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    /// Unique identifier.
    pub agent_id: AgentId,
    /// The role this agent was spawned from.
    pub role_id: RoleId,
    /// The agent that spawned this one. `None` only for the two system agents.
    pub parent_agent_id: Option<AgentId>,
    /// The task/conversation thread this agent belongs to.
    pub task_id: TaskId,
    /// Active vs. terminated.
    pub status: AgentStatus,
    /// Idle / processing / waiting on an LLM call.
    pub compute_status: ComputeStatus,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Termination timestamp, set once on `terminate_agent`.
    pub terminated_at: Option<DateTime<Utc>>,
}

impl Agent {
    /// Builds the well-known `root` system agent for a fresh task.
    #[must_use]
    pub fn root(task_id: TaskId, now: DateTime<Utc>) -> Self {
        Self {
            agent_id: AgentId::root(),
            role_id: RoleId::root(),
            parent_agent_id: None,
            task_id,
            status: AgentStatus::Active,
            compute_status: ComputeStatus::Idle,
            created_at: now,
            terminated_at: None,
        }
    }

    /// Builds the well-known `user` system agent for a fresh task.
    #[must_use]
    pub fn user(task_id: TaskId, now: DateTime<Utc>) -> Self {
        Self {
            agent_id: AgentId::user(),
            role_id: RoleId::user(),
            parent_agent_id: None,
            task_id,
            status: AgentStatus::Active,
            compute_status: ComputeStatus::Idle,
            created_at: now,
            terminated_at: None,
        }
    }

    /// True for the two non-terminable system agents.
    #[must_use]
    pub fn is_system(&self) -> bool {
        self.agent_id.is_system()
    }

    /// True if the agent is still receiving/processing messages.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == AgentStatus::Active
    }

    /// Marks the agent terminated, recording the timestamp.
    pub fn terminate(&mut self, now: DateTime<Utc>) {
        self.status = AgentStatus::Terminated;
        self.terminated_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminate_sets_status_and_timestamp() {
        let now = Utc::now();
        let mut agent = Agent::root(TaskId::generate(), now);
        assert!(agent.is_active());
        agent.terminate(now);
        assert!(!agent.is_active());
        assert_eq!(agent.terminated_at, Some(now));
    }
}
