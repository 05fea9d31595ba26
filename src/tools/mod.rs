//! Tool Executor & Registry.
//!
//! A `ToolDefinition` carries the JSON schema the LLM sees plus the tool
//! groups that gate which roles may call it; a `Tool` is the async handler
//! dispatched once the caller's role has been checked against those groups.
//! This mirrors the `async_trait`-object pattern used for router
//! collaborators (`MessageRouter`, `DeliveryEngine` in
//! `message_router/traits.rs`) generalized from message routing to tool
//! dispatch.

pub mod builtin;
pub mod http_request;
pub mod sandbox_js;

use crate::domain_types::{ToolGroup, ToolName};
use crate::error::ToolError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Metadata describing a tool to the LLM and to the role-gating check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Name the LLM uses to invoke this tool.
    pub name: ToolName,
    /// Human-readable description shown to the LLM.
    pub description: String,
    /// JSON Schema for the arguments object.
    pub parameters: serde_json::Value,
    /// Tool groups this tool belongs to; a role must carry every one of
    /// these groups to call it.
    pub groups: BTreeSet<ToolGroup>,
}

/// An executable tool handler.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Static metadata for this tool.
    fn definition(&self) -> &ToolDefinition;

    /// Executes the tool against validated arguments, returning a
    /// JSON-serializable result.
    async fn execute(
        &self,
        args: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<serde_json::Value, ToolError>;
}

/// Context passed to every tool invocation: which agent is calling, and
/// handles onto the subsystems tools like `send_message`/`spawn_agent` need
/// to enforce caller-identity policy checks and perform their effect.
#[derive(Clone)]
pub struct ToolContext {
    /// The agent whose behavior invoked this tool.
    pub caller: crate::domain_types::AgentId,
    /// The task the caller belongs to.
    pub task_id: crate::domain_types::TaskId,
    /// Message bus handle, for `send_message`.
    pub bus: crate::bus::MessageBus,
    /// Organization registry handle, for `spawn_agent`/`terminate_agent`.
    pub registry: crate::registry::OrganizationRegistry,
    /// Conversation store handle, for `compress_context`.
    pub conversations: crate::conversation_store::ConversationStore,
}

/// Holds every registered tool, keyed by name.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: std::collections::HashMap<ToolName, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Builds an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry carrying every tool this crate ships:
    /// `send_message`, `spawn_agent`, `terminate_agent`, `compress_context`,
    /// `http_request`, and `run_javascript`.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(builtin::SendMessage::default()));
        registry.register(Arc::new(builtin::SpawnAgent::default()));
        registry.register(Arc::new(builtin::TerminateAgent::default()));
        registry.register(Arc::new(builtin::CompressContext::default()));
        registry.register(Arc::new(http_request::HttpRequest::default()));
        registry.register(Arc::new(sandbox_js::RunJavascript::default()));
        registry
    }

    /// Registers a tool, replacing any prior registration under the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.definition().name.clone(), tool);
    }

    /// Looks up a tool by name.
    #[must_use]
    pub fn get(&self, name: &ToolName) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Definitions for every tool a role carrying `role_groups` may call,
    /// used to compose the tool list sent to the LLM. `None` means the role
    /// carries every tool group (the bootstrapping `root`/`user` roles).
    #[must_use]
    pub fn definitions_for_role(
        &self,
        role_groups: Option<&BTreeSet<ToolGroup>>,
    ) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .filter(|t| role_groups.is_none_or(|groups| t.definition().groups.is_subset(groups)))
            .map(|t| t.definition().clone())
            .collect()
    }

    /// Dispatches a call, checking the caller's role groups first. `None`
    /// means the role carries every tool group.
    pub async fn dispatch(
        &self,
        name: &ToolName,
        args: serde_json::Value,
        role_groups: Option<&BTreeSet<ToolGroup>>,
        ctx: &ToolContext,
    ) -> Result<serde_json::Value, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::ToolNotFound(name.clone().into_inner()))?;
        if !role_groups.is_none_or(|groups| tool.definition().groups.is_subset(groups)) {
            return Err(ToolError::ToolNotAllowedForRole);
        }
        tool.execute(args, ctx).await
    }
}
