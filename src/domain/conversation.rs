//! Per-agent conversation history.
//!
//! Mirrors the turn shape an LLM chat completion wire format expects
//! (`role`/`content`/`tool_calls`/`tool_call_id`), since the Tool-Call Loop
//! builds exactly this list to send to the [`crate::llm_client::LlmClient`].
//! Kept in-memory by default; `crate::storage` is the optional persistence
//! adapter for it.

use crate::domain_types::{AgentId, CallId, ToolName};
use serde::{Deserialize, Serialize};

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    /// The system prompt, always the first turn when present.
    System,
    /// An inbound message rendered as a user turn.
    User,
    /// An LLM response.
    Assistant,
    /// A tool's result, correlated to a prior assistant tool call.
    Tool,
}

/// A tool call emitted by the assistant within a turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnToolCall {
    /// Correlation id, echoed back by the matching tool turn.
    pub call_id: CallId,
    /// Name of the invoked tool.
    pub tool_name: ToolName,
    /// Arguments as emitted by the LLM.
    pub args: serde_json::Value,
}

/// A single turn in an agent's conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    /// Who produced this turn.
    pub role: TurnRole,
    /// Rendered text content, if any.
    pub content: Option<String>,
    /// Tool calls requested by an assistant turn.
    pub tool_calls: Vec<TurnToolCall>,
    /// For a tool turn, which call this result answers.
    pub tool_call_id: Option<CallId>,
    /// Chain-of-thought style content some LLM services return alongside the
    /// visible reply.
    pub reasoning_content: Option<String>,
}

impl Turn {
    /// A plain system/user/assistant turn with no tool calls.
    #[must_use]
    pub fn text(role: TurnRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
            reasoning_content: None,
        }
    }

    /// A tool-result turn.
    #[must_use]
    pub fn tool_result(call_id: CallId, content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Tool,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id),
            reasoning_content: None,
        }
    }
}

/// The full turn history for one agent.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Conversation {
    /// Owning agent.
    pub agent_id: Option<AgentId>,
    /// Ordered turns, leading with a system turn when one has been set.
    pub turns: Vec<Turn>,
}

impl Conversation {
    /// Creates an empty conversation for the given agent.
    #[must_use]
    pub fn new(agent_id: AgentId) -> Self {
        Self {
            agent_id: Some(agent_id),
            turns: Vec::new(),
        }
    }

    /// Appends a turn.
    pub fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// The leading system turn, if the conversation has been seeded with one.
    #[must_use]
    pub fn system_turn(&self) -> Option<&Turn> {
        self.turns
            .first()
            .filter(|turn| turn.role == TurnRole::System)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_turn_is_only_recognized_when_leading() {
        let mut convo = Conversation::new(AgentId::generate());
        convo.append(Turn::text(TurnRole::User, "hi"));
        assert!(convo.system_turn().is_none());

        let mut convo = Conversation::new(AgentId::generate());
        convo.append(Turn::text(TurnRole::System, "you are a helper"));
        convo.append(Turn::text(TurnRole::User, "hi"));
        assert!(convo.system_turn().is_some());
    }
}
