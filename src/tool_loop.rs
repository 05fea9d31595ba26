//! Tool-Call Loop: runs one agent turn to completion.
//!
//! Runs one inbound message through an agent's behavior: compose the system
//! turn, append the inbound content (routed through the Content Router),
//! call the LLM via the Concurrency Controller, dispatch any tool calls,
//! and repeat until the model stops calling tools or `max_rounds` is hit.
//! The bounded-rounds/streaming-accumulation shape is grounded in
//! `other_examples`' `run_llm_phase`; the per-round tool dispatch loop is
//! this crate's own composition of `crate::tools::ToolRegistry` and
//! `crate::conversation_store::ConversationStore`.

use crate::content_router::{route_for_recipient, Capabilities};
use crate::conversation_store::ConversationStore;
use crate::domain::{Message, Turn, TurnRole, TurnToolCall};
use crate::domain_types::{AgentId, MaxToolRounds, TaskId, ToolGroup};
use crate::error::ToolError;
use crate::llm_client::{ChatMeta, ChatRequest, LlmClient, LlmClientError};
use crate::tools::{ToolContext, ToolRegistry};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

/// Everything the loop needs to know about the calling agent's role for one
/// run: its system prompt, the tools it may call, and its content
/// capabilities.
#[derive(Clone)]
pub struct RoleContext {
    /// Base prompt shared by every role; omitted for the `root`/`user` system
    /// agents.
    pub base_prompt: Option<String>,
    /// This role's own prompt text.
    pub role_prompt: String,
    /// Tool-usage rules/workspace hints appended after the role prompt;
    /// also omitted for system agents.
    pub tool_rules: Option<String>,
    /// Tool groups this role carries. `None` means every tool group is
    /// allowed (the bootstrapping `root`/`user` roles carry this).
    pub tool_groups: Option<BTreeSet<ToolGroup>>,
    /// Content capabilities for routing inbound attachments.
    pub capabilities: Capabilities,
}

impl RoleContext {
    fn compose_system_prompt(&self) -> String {
        let mut sections = Vec::new();
        if let Some(base) = &self.base_prompt {
            sections.push(base.clone());
        }
        sections.push(self.role_prompt.clone());
        if let Some(rules) = &self.tool_rules {
            sections.push(rules.clone());
        }
        sections.join("\n\n")
    }
}

/// Outcome of running the loop once for an inbound message.
#[derive(Debug)]
pub enum LoopOutcome {
    /// The model produced a final reply with no further tool calls.
    Completed {
        /// The assistant's visible reply text, if any.
        reply: Option<String>,
    },
    /// The round budget was exhausted before the model stopped calling tools.
    MaxRoundsExceeded,
    /// The call was aborted mid-flight.
    Aborted,
}

/// Runs the tool-call loop for one inbound message to `agent_id`.
#[instrument(skip(conversations, tools, llm, inbound, cancel))]
#[allow(clippy::too_many_arguments)]
pub async fn run_tool_call_loop(
    agent_id: AgentId,
    task_id: TaskId,
    role: &RoleContext,
    conversations: &ConversationStore,
    tools: &ToolRegistry,
    tool_ctx: &ToolContext,
    llm: &Arc<dyn LlmClient>,
    inbound: Option<Message>,
    max_rounds: MaxToolRounds,
    cancel: &CancellationToken,
) -> Result<LoopOutcome, ToolError> {
    conversations.ensure_conversation(&task_id, agent_id, Some(role.compose_system_prompt()));

    if let Some(message) = inbound {
        let routed = route_for_recipient(&message.payload, &role.capabilities);
        let text = routed.text.unwrap_or_default();
        conversations.append(&task_id, agent_id, Turn::text(TurnRole::User, text));
    }

    let tool_definitions = tools.definitions_for_role(role.tool_groups.as_ref());

    for round in 0..max_rounds.as_usize() {
        if cancel.is_cancelled() {
            return Ok(LoopOutcome::Aborted);
        }

        let messages = conversations
            .get_conversation(&task_id, agent_id)
            .map(|c| c.turns)
            .unwrap_or_default();

        let request = ChatRequest {
            messages,
            tools: tool_definitions.clone(),
            temperature: 0.2,
            meta: ChatMeta { agent_id },
        };

        let response = match llm.chat(request, cancel).await {
            Ok(response) => response,
            Err(LlmClientError::Aborted) => return Ok(LoopOutcome::Aborted),
            Err(LlmClientError::Transport(reason)) => {
                return Err(ToolError::InvalidArgs(reason));
            }
        };

        let assistant_turn = Turn {
            role: TurnRole::Assistant,
            content: response.content.clone(),
            tool_calls: response.tool_calls.clone(),
            tool_call_id: None,
            reasoning_content: response.reasoning_content.clone(),
        };
        conversations.append(&task_id, agent_id, assistant_turn);

        if response.tool_calls.is_empty() {
            return Ok(LoopOutcome::Completed {
                reply: response.content,
            });
        }

        for call in &response.tool_calls {
            dispatch_one_call(agent_id, &task_id, call, tools, role, tool_ctx, conversations)
                .await;
        }

        if round + 1 == max_rounds.as_usize() {
            warn!(agent = %agent_id, "tool-call loop exhausted its round budget");
            append_round_budget_failure(conversations, &task_id, agent_id);
            return Ok(LoopOutcome::MaxRoundsExceeded);
        }
    }

    append_round_budget_failure(conversations, &task_id, agent_id);
    Ok(LoopOutcome::MaxRoundsExceeded)
}

/// Records the round-budget exhaustion in the conversation itself as a
/// synthetic tool-failure turn, so a later round (or a human reading the
/// transcript) can see why the loop stopped without further tool results.
fn append_round_budget_failure(conversations: &ConversationStore, task_id: &TaskId, agent_id: AgentId) {
    conversations.append(
        task_id,
        agent_id,
        Turn::text(
            TurnRole::Tool,
            serde_json::json!({ "error": ToolError::MaxToolRoundsExceeded.to_string() }).to_string(),
        ),
    );
}

async fn dispatch_one_call(
    agent_id: AgentId,
    task_id: &TaskId,
    call: &TurnToolCall,
    tools: &ToolRegistry,
    role: &RoleContext,
    tool_ctx: &ToolContext,
    conversations: &ConversationStore,
) {
    let result = tools
        .dispatch(
            &call.tool_name,
            call.args.clone(),
            role.tool_groups.as_ref(),
            tool_ctx,
        )
        .await;

    let content = match result {
        Ok(value) => value.to_string(),
        Err(err) => serde_json::json!({ "error": err.to_string() }).to_string(),
    };

    conversations.append(task_id, agent_id, Turn::tool_result(call.call_id, content));
}
