//! Built-in tools every agent's role may be granted:
//! `send_message`, `spawn_agent`, `terminate_agent`, `compress_context`.

use super::{Tool, ToolContext, ToolDefinition};
use crate::domain::{Message, Payload};
use crate::domain_types::{
    AgentId, DelayMs, KeepRecentCount, MessageId, RoleId, ToolGroup, ToolName,
};
use crate::error::{RegistryError, ToolError};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeSet;

fn core_group() -> BTreeSet<ToolGroup> {
    BTreeSet::from([ToolGroup::try_new("core").expect("literal is valid")])
}

fn invalid_args(err: impl std::fmt::Display) -> ToolError {
    ToolError::InvalidArgs(err.to_string())
}

/// `send_message({to, text, delay_ms?})` — enqueues a message from the
/// calling agent to `to`, scoped to the caller's task.
pub struct SendMessage {
    definition: ToolDefinition,
}

#[derive(Deserialize)]
struct SendMessageArgs {
    to: uuid::Uuid,
    text: String,
    #[serde(default)]
    delay_ms: u64,
}

impl Default for SendMessage {
    fn default() -> Self {
        Self {
            definition: ToolDefinition {
                name: ToolName::try_new("send_message").expect("literal is valid"),
                description: "Send a text message to another agent in this task.".to_string(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "to": {"type": "string", "description": "Recipient agent id"},
                        "text": {"type": "string"},
                        "delay_ms": {"type": "integer", "minimum": 0}
                    },
                    "required": ["to", "text"]
                }),
                groups: core_group(),
            },
        }
    }
}

#[async_trait]
impl Tool for SendMessage {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(
        &self,
        args: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<serde_json::Value, ToolError> {
        let args: SendMessageArgs = serde_json::from_value(args).map_err(invalid_args)?;
        let to = AgentId::try_from(args.to).map_err(invalid_args)?;

        let send_seq = ctx.bus.next_send_seq();
        let message = Message {
            message_id: MessageId::generate(),
            from: ctx.caller,
            to,
            task_id: ctx.task_id.clone(),
            payload: Payload::text(args.text),
            delay: DelayMs::new(args.delay_ms),
            send_seq,
            created_at: chrono::Utc::now(),
        };

        let from_ok = ctx.registry.is_authorized_for_task(&ctx.task_id, ctx.caller);
        let to_ok = ctx.registry.is_authorized_for_task(&ctx.task_id, to);
        ctx.bus
            .send(message, from_ok, to_ok)
            .map_err(|e| ToolError::InvalidArgs(e.to_string()))?;
        Ok(serde_json::json!({ "sent": true }))
    }
}

/// `spawn_agent({role_id, task_brief})` — spawns a new child agent of the
/// named role and sends it `task_brief` as its first message, deduplicated
/// on (caller, task_id, role_id).
pub struct SpawnAgent {
    definition: ToolDefinition,
}

#[derive(Deserialize)]
struct SpawnAgentArgs {
    role_id: uuid::Uuid,
    task_brief: String,
}

impl Default for SpawnAgent {
    fn default() -> Self {
        Self {
            definition: ToolDefinition {
                name: ToolName::try_new("spawn_agent").expect("literal is valid"),
                description: "Spawn a new child agent under a given role.".to_string(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "role_id": {"type": "string"},
                        "task_brief": {"type": "string"}
                    },
                    "required": ["role_id", "task_brief"]
                }),
                groups: core_group(),
            },
        }
    }
}

#[async_trait]
impl Tool for SpawnAgent {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(
        &self,
        args: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<serde_json::Value, ToolError> {
        let args: SpawnAgentArgs = serde_json::from_value(args).map_err(invalid_args)?;
        let role_id = RoleId::try_from(args.role_id).map_err(invalid_args)?;

        let caller_role = ctx
            .registry
            .get_agent(&ctx.task_id, ctx.caller)
            .ok_or(RegistryError::AgentNotFound(ctx.caller))
            .map_err(|e| ToolError::InvalidArgs(e.to_string()))?
            .role_id;

        if !ctx.registry.role_is_descendant(caller_role, role_id) && caller_role != role_id {
            return Err(ToolError::InvalidArgs("not_child_role".to_string()));
        }

        let placeholder = AgentId::generate();
        if let Some(existing) =
            ctx.registry
                .dedup_spawn(ctx.caller, ctx.task_id.clone(), role_id, placeholder)
        {
            return Ok(serde_json::json!({ "agent_id": existing.to_string(), "deduplicated": true }));
        }

        let agent = ctx
            .registry
            .create_agent(role_id, ctx.caller, ctx.task_id.clone(), chrono::Utc::now())
            .map_err(|e| ToolError::InvalidArgs(e.to_string()))?;

        let send_seq = ctx.bus.next_send_seq();
        let brief = Message {
            message_id: MessageId::generate(),
            from: ctx.caller,
            to: agent.agent_id,
            task_id: ctx.task_id.clone(),
            payload: Payload::text(args.task_brief),
            delay: DelayMs::zero(),
            send_seq,
            created_at: chrono::Utc::now(),
        };
        ctx.bus
            .send(brief, true, true)
            .map_err(|e| ToolError::InvalidArgs(e.to_string()))?;

        Ok(serde_json::json!({ "agent_id": agent.agent_id.to_string(), "deduplicated": false }))
    }
}

/// `terminate_agent({agent_id})` — terminates a direct child of the caller.
pub struct TerminateAgent {
    definition: ToolDefinition,
}

#[derive(Deserialize)]
struct TerminateAgentArgs {
    agent_id: uuid::Uuid,
}

impl Default for TerminateAgent {
    fn default() -> Self {
        Self {
            definition: ToolDefinition {
                name: ToolName::try_new("terminate_agent").expect("literal is valid"),
                description: "Terminate a direct child agent.".to_string(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {"agent_id": {"type": "string"}},
                    "required": ["agent_id"]
                }),
                groups: core_group(),
            },
        }
    }
}

#[async_trait]
impl Tool for TerminateAgent {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(
        &self,
        args: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<serde_json::Value, ToolError> {
        let args: TerminateAgentArgs = serde_json::from_value(args).map_err(invalid_args)?;
        let target = AgentId::try_from(args.agent_id).map_err(invalid_args)?;
        ctx.registry
            .record_termination(&ctx.task_id, ctx.caller, target, chrono::Utc::now())
            .map_err(|e| ToolError::InvalidArgs(e.to_string()))?;
        ctx.bus.clear_queue(&ctx.task_id, target);
        ctx.conversations.delete_conversation(&ctx.task_id, target);
        Ok(serde_json::json!({ "terminated": true }))
    }
}

/// `compress_context({summary, keep_recent})` — compacts the caller's own
/// conversation history.
pub struct CompressContext {
    definition: ToolDefinition,
}

#[derive(Deserialize)]
struct CompressContextArgs {
    summary: String,
    #[serde(default)]
    keep_recent: usize,
}

impl Default for CompressContext {
    fn default() -> Self {
        Self {
            definition: ToolDefinition {
                name: ToolName::try_new("compress_context").expect("literal is valid"),
                description: "Compact this agent's own conversation history into a summary."
                    .to_string(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "summary": {"type": "string"},
                        "keep_recent": {"type": "integer", "minimum": 0}
                    },
                    "required": ["summary"]
                }),
                groups: core_group(),
            },
        }
    }
}

#[async_trait]
impl Tool for CompressContext {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(
        &self,
        args: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<serde_json::Value, ToolError> {
        let args: CompressContextArgs = serde_json::from_value(args).map_err(invalid_args)?;
        let keep_recent = KeepRecentCount::try_new(args.keep_recent).map_err(invalid_args)?;
        ctx.conversations
            .compress(&ctx.task_id, ctx.caller, args.summary, keep_recent);
        Ok(serde_json::json!({ "compressed": true }))
    }
}
