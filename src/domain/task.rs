//! Task records: the entry point agent for a logical task thread.

use crate::domain_types::{AgentId, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A task groups one or more agents spawned to pursue a single submitted
/// unit of work, rooted at `entry_agent_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier, also used to scope cross-agent isolation.
    pub task_id: TaskId,
    /// The agent `submitTask` spawned to handle this task.
    pub entry_agent_id: AgentId,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Task {
    /// Builds a fresh task record rooted at `entry_agent_id`.
    #[must_use]
    pub fn new(task_id: TaskId, entry_agent_id: AgentId, now: DateTime<Utc>) -> Self {
        Self {
            task_id,
            entry_agent_id,
            created_at: now,
        }
    }
}
