//! Conversation Store: per-agent turn history, with compaction, shared
//! process-wide across every task.
//!
//! Holds each agent's turn history in memory behind a
//! `dashmap::DashMap<(TaskId, AgentId), Conversation>`, the same per-agent-map
//! idiom `crate::bus` and `AgentRegistry` use, keyed by task alongside agent
//! since the store is one long-lived instance shared by every task a process
//! runs and the two system agents reuse the same fixed ID in every task.
//! Compression preserves the leading system turn byte-for-byte and keeps
//! only the most recent `K` turns after it so context can be trimmed without
//! losing the role's framing. Persisting this history to disk is an
//! external collaborator's responsibility; this store itself is in-memory
//! only.

use crate::domain::{Conversation, Turn, TurnRole};
use crate::domain_types::{AgentId, KeepRecentCount, TaskId};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::instrument;

const SUMMARY_PREFIX: &str = "[历史摘要]\n";

/// Thread-safe handle to the store, cheap to clone.
#[derive(Clone, Default)]
pub struct ConversationStore {
    conversations: Arc<DashMap<(TaskId, AgentId), Conversation>>,
}

impl ConversationStore {
    /// Builds an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the conversation for `agent_id` within `task_id` if it
    /// doesn't exist yet, seeding it with a system turn. Idempotent:
    /// calling this again with the same agent is a no-op.
    pub fn ensure_conversation(
        &self,
        task_id: &TaskId,
        agent_id: AgentId,
        system_prompt: Option<String>,
    ) {
        self.conversations
            .entry((task_id.clone(), agent_id))
            .or_insert_with(|| {
                let mut convo = Conversation::new(agent_id);
                if let Some(prompt) = system_prompt {
                    convo.append(Turn::text(TurnRole::System, prompt));
                }
                convo
            });
    }

    /// Appends a turn to an agent's conversation within `task_id`. No-op if
    /// the conversation hasn't been created (callers must
    /// `ensure_conversation` first).
    pub fn append(&self, task_id: &TaskId, agent_id: AgentId, turn: Turn) {
        if let Some(mut convo) = self.conversations.get_mut(&(task_id.clone(), agent_id)) {
            convo.append(turn);
        }
    }

    /// Returns a clone of an agent's full conversation within `task_id`.
    #[must_use]
    pub fn get_conversation(&self, task_id: &TaskId, agent_id: AgentId) -> Option<Conversation> {
        self.conversations
            .get(&(task_id.clone(), agent_id))
            .map(|c| c.clone())
    }

    /// Drops an agent's conversation entirely within `task_id`.
    pub fn delete_conversation(&self, task_id: &TaskId, agent_id: AgentId) {
        self.conversations.remove(&(task_id.clone(), agent_id));
    }

    /// Compacts an agent's history within `task_id`: keeps the leading
    /// system turn untouched, inserts `summary` as a synthetic system turn
    /// immediately after it, then keeps only the `keep_recent` most recent
    /// turns that followed.
    #[instrument(skip(self, summary))]
    pub fn compress(
        &self,
        task_id: &TaskId,
        agent_id: AgentId,
        summary: String,
        keep_recent: KeepRecentCount,
    ) {
        let Some(mut convo) = self.conversations.get_mut(&(task_id.clone(), agent_id)) else {
            return;
        };

        let system_turn = convo.system_turn().cloned();
        let rest_start = usize::from(system_turn.is_some());
        let rest = &convo.turns[rest_start..];
        let keep_from = rest.len().saturating_sub(keep_recent.as_usize());
        let kept: Vec<Turn> = rest[keep_from..].to_vec();

        let mut rebuilt = Vec::with_capacity(kept.len() + 2);
        if let Some(system) = system_turn {
            rebuilt.push(system);
        }
        rebuilt.push(Turn::text(
            TurnRole::System,
            format!("{SUMMARY_PREFIX}{summary}"),
        ));
        rebuilt.extend(kept);
        convo.turns = rebuilt;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compression_preserves_leading_system_turn() {
        let store = ConversationStore::new();
        let task_id = TaskId::generate();
        let agent = AgentId::generate();
        store.ensure_conversation(&task_id, agent, Some("you are a helper".to_string()));
        for i in 0..10 {
            store.append(&task_id, agent, Turn::text(TurnRole::User, format!("turn {i}")));
        }

        store.compress(
            &task_id,
            agent,
            "summary of earlier turns".to_string(),
            KeepRecentCount::try_new(2).unwrap(),
        );

        let convo = store.get_conversation(&task_id, agent).unwrap();
        assert_eq!(convo.turns[0].content.as_deref(), Some("you are a helper"));
        assert_eq!(convo.turns[0].role, TurnRole::System);
        assert!(convo.turns[1]
            .content
            .as_deref()
            .unwrap()
            .starts_with(SUMMARY_PREFIX));
        assert_eq!(convo.turns[1].role, TurnRole::System);
        assert_eq!(convo.turns.len(), 4);
        assert_eq!(convo.turns.last().unwrap().content.as_deref(), Some("turn 9"));
    }

    #[test]
    fn ensure_conversation_is_idempotent() {
        let store = ConversationStore::new();
        let task_id = TaskId::generate();
        let agent = AgentId::generate();
        store.ensure_conversation(&task_id, agent, Some("seed".to_string()));
        store.append(&task_id, agent, Turn::text(TurnRole::User, "hi"));
        store.ensure_conversation(&task_id, agent, Some("different seed".to_string()));

        let convo = store.get_conversation(&task_id, agent).unwrap();
        assert_eq!(convo.turns[0].content.as_deref(), Some("seed"));
        assert_eq!(convo.turns.len(), 2);
    }

    #[test]
    fn conversations_do_not_leak_across_tasks() {
        let store = ConversationStore::new();
        let task_a = TaskId::generate();
        let task_b = TaskId::generate();
        let agent = AgentId::generate();
        store.ensure_conversation(&task_a, agent, Some("seed a".to_string()));

        assert!(store.get_conversation(&task_a, agent).is_some());
        assert!(store.get_conversation(&task_b, agent).is_none());
    }

    #[test]
    fn delete_conversation_removes_only_that_tasks_entry() {
        let store = ConversationStore::new();
        let task_a = TaskId::generate();
        let task_b = TaskId::generate();
        let agent = AgentId::generate();
        store.ensure_conversation(&task_a, agent, Some("seed a".to_string()));
        store.ensure_conversation(&task_b, agent, Some("seed b".to_string()));

        store.delete_conversation(&task_a, agent);

        assert!(store.get_conversation(&task_a, agent).is_none());
        assert!(store.get_conversation(&task_b, agent).is_some());
    }
}
