//! Agent Dispatcher: drives one dispatch cycle per agent per inbound message.
//!
//! Holds one `tokio::sync::Mutex` per agent guarding that agent's
//! compute-status transitions, so at most one dispatch loop ever runs for a
//! given agent while other agents keep dispatching concurrently — the same
//! granularity `AgentLifecycleManager` applies per-agent state
//! transitions at, just generalized from a lifecycle event channel to a
//! direct async call per inbound message. A panic or error from an agent's
//! tool-call loop is caught and turned into an error-notification sent to
//! the agent's parent rather than propagated, so one agent's failure can
//! never take down dispatch for the rest of the society.
//!
//! One dispatcher is built per task (see `Runtime::submit_task`) over the
//! process-wide bus/registry/conversation store, so its `task_id` is the
//! scope every per-agent lookup is made within.

use crate::bus::MessageBus;
use crate::concurrency::ConcurrencyController;
use crate::conversation_store::ConversationStore;
use crate::domain::{ComputeStatus, Payload};
use crate::domain_types::{AgentId, MaxToolRounds, TaskId};
use crate::error::{CoreError, RegistryError};
use crate::llm_client::LlmClient;
use crate::registry::OrganizationRegistry;
use crate::tool_loop::{run_tool_call_loop, LoopOutcome, RoleContext};
use crate::tools::{ToolContext, ToolRegistry};
use dashmap::DashMap;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, instrument, warn};

/// Resolves a role into the context the tool-call loop needs, and picks the
/// `LlmClient` a role's `llm_service_id` maps to in the configured service
/// registry. Kept as a trait so the runtime can swap in a config-driven
/// resolver without the dispatcher knowing about config parsing.
pub trait RoleResolver: Send + Sync {
    /// Builds the loop context for `role_id`, or `None` if unknown/deleted.
    fn resolve(&self, role_id: crate::domain_types::RoleId) -> Option<RoleContext>;

    /// The LLM client for `role_id`'s configured service.
    fn llm_client(&self, role_id: crate::domain_types::RoleId) -> Option<Arc<dyn LlmClient>>;
}

/// Ties every runtime subsystem together to dispatch inbound messages to
/// agent behaviors for one task.
#[derive(Clone)]
pub struct AgentDispatcher {
    task_id: TaskId,
    bus: MessageBus,
    registry: OrganizationRegistry,
    conversations: ConversationStore,
    concurrency: ConcurrencyController,
    tools: ToolRegistry,
    roles: Arc<dyn RoleResolver>,
    locks: Arc<DashMap<AgentId, Arc<AsyncMutex<()>>>>,
    abort_tokens: Arc<DashMap<AgentId, CancellationToken>>,
    stop_requested: Arc<std::sync::atomic::AtomicBool>,
}

impl AgentDispatcher {
    /// Builds a dispatcher over the given subsystem handles, scoped to `task_id`.
    #[must_use]
    pub fn new(
        task_id: TaskId,
        bus: MessageBus,
        registry: OrganizationRegistry,
        conversations: ConversationStore,
        concurrency: ConcurrencyController,
        tools: ToolRegistry,
        roles: Arc<dyn RoleResolver>,
    ) -> Self {
        Self {
            task_id,
            bus,
            registry,
            conversations,
            concurrency,
            tools,
            roles,
            locks: Arc::new(DashMap::new()),
            abort_tokens: Arc::new(DashMap::new()),
            stop_requested: Arc::new(std::sync::atomic::AtomicBool::new(false)),
        }
    }

    fn lock_for(&self, agent_id: AgentId) -> Arc<AsyncMutex<()>> {
        self.locks
            .entry(agent_id)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Spawns a new agent within this dispatcher's task. Enforces
    /// `invalid_parentAgentId` (a non-root caller may only name itself as
    /// parent) and `not_child_role`.
    pub fn spawn_agent(
        &self,
        caller: AgentId,
        parent_agent_id: AgentId,
        role_id: crate::domain_types::RoleId,
    ) -> Result<crate::domain::Agent, CoreError> {
        if caller != AgentId::root() && parent_agent_id != caller {
            return Err(RegistryError::InvalidParentAgentId.into());
        }

        let caller_role = self
            .registry
            .get_agent(&self.task_id, caller)
            .ok_or(RegistryError::AgentNotFound(caller))?
            .role_id;
        if caller != AgentId::root()
            && caller_role != role_id
            && !self.registry.role_is_descendant(caller_role, role_id)
        {
            return Err(RegistryError::NotChildRole.into());
        }

        Ok(self.registry.create_agent(
            role_id,
            parent_agent_id,
            self.task_id.clone(),
            chrono::Utc::now(),
        )?)
    }

    /// Terminates an agent within this dispatcher's task. Only the target's
    /// direct parent may call this.
    pub fn terminate_agent(&self, caller: AgentId, target: AgentId) -> Result<(), CoreError> {
        self.registry
            .record_termination(&self.task_id, caller, target, chrono::Utc::now())?;
        self.bus.clear_queue(&self.task_id, target);
        self.conversations.delete_conversation(&self.task_id, target);
        self.locks.remove(&target);
        Ok(())
    }

    /// Runs one dispatch cycle for `agent_id`: pops its next message (if
    /// any), transitions it through `idle -> processing -> waiting_llm ->
    /// idle`, and runs its tool-call loop. Returns without doing anything if
    /// the agent is already being dispatched (the per-agent mutex is held)
    /// or has no pending message.
    #[instrument(skip(self))]
    pub async fn dispatch_once(&self, agent_id: AgentId) {
        if self.stop_requested.load(std::sync::atomic::Ordering::Acquire) {
            return;
        }
        let lock = self.lock_for(agent_id);
        let Ok(_guard) = lock.try_lock() else {
            return;
        };

        let Some(agent) = self.registry.get_agent(&self.task_id, agent_id) else {
            return;
        };
        if !agent.is_active() {
            return;
        }
        let Some(message) = self.bus.receive_next(&self.task_id, agent_id) else {
            return;
        };

        let Some(role) = self.roles.resolve(agent.role_id) else {
            warn!(agent = %agent_id, "agent's role could not be resolved, dropping message");
            return;
        };
        let Some(llm) = self.roles.llm_client(agent.role_id) else {
            warn!(agent = %agent_id, "agent's role has no llm service, dropping message");
            return;
        };

        self.registry
            .set_compute_status(&self.task_id, agent_id, ComputeStatus::Processing);

        let tool_ctx = ToolContext {
            caller: agent_id,
            task_id: agent.task_id.clone(),
            bus: self.bus.clone(),
            registry: self.registry.clone(),
            conversations: self.conversations.clone(),
        };
        let cancel = CancellationToken::new();
        self.abort_tokens.insert(agent_id, cancel.clone());

        let run = run_tool_call_loop(
            agent_id,
            agent.task_id.clone(),
            &role,
            &self.conversations,
            &self.tools,
            &tool_ctx,
            &llm,
            Some(message),
            MaxToolRounds::default(),
            &cancel,
        );

        match catch_panic(run).await {
            Ok(Ok(LoopOutcome::Completed { .. } | LoopOutcome::MaxRoundsExceeded)) => {}
            Ok(Ok(LoopOutcome::Aborted)) => {
                warn!(agent = %agent_id, "tool-call loop aborted");
            }
            Ok(Err(err)) => {
                self.notify_parent_of_error(&agent, &err.to_string());
            }
            Err(panic_msg) => {
                error!(agent = %agent_id, panic = %panic_msg, "agent behavior panicked");
                self.notify_parent_of_error(&agent, &panic_msg);
            }
        }

        self.abort_tokens.remove(&agent_id);
        self.registry
            .set_compute_status(&self.task_id, agent_id, ComputeStatus::Idle);
    }

    /// Cancels `agent_id`'s in-flight LLM call, if one is running. Returns
    /// `true` if a call was actually cancelled.
    pub fn abort_agent(&self, agent_id: AgentId) -> bool {
        if let Some(token) = self.abort_tokens.get(&agent_id) {
            token.cancel();
            true
        } else {
            false
        }
    }

    fn notify_parent_of_error(&self, agent: &crate::domain::Agent, reason: &str) {
        let Some(parent) = agent.parent_agent_id else {
            return;
        };
        let send_seq = self.bus.next_send_seq();
        let message = crate::domain::Message {
            message_id: crate::domain_types::MessageId::generate(),
            from: agent.agent_id,
            to: parent,
            task_id: agent.task_id.clone(),
            payload: Payload::text(format!("agent {} failed: {reason}", agent.agent_id)),
            delay: crate::domain_types::DelayMs::zero(),
            send_seq,
            created_at: chrono::Utc::now(),
        };
        let from_allowed = self
            .registry
            .is_authorized_for_task(&self.task_id, agent.agent_id);
        let to_allowed = self.registry.is_authorized_for_task(&self.task_id, parent);
        if let Err(err) = self.bus.send(message, from_allowed, to_allowed) {
            error!(error = %err, "failed to deliver error notification to parent");
        }
    }

    /// Sets the dispatcher into draining mode: no further `dispatch_once`
    /// calls will process messages. Used during graceful shutdown. Idempotent.
    pub fn request_stop(&self) {
        self.stop_requested
            .store(true, std::sync::atomic::Ordering::Release);
    }

    /// True once `request_stop` has been called.
    #[must_use]
    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(std::sync::atomic::Ordering::Acquire)
    }
}

async fn catch_panic<F, T>(fut: F) -> Result<T, String>
where
    F: Future<Output = T>,
{
    // `AssertUnwindSafe` is sound here: on panic we discard the future's
    // partial state entirely and only keep a formatted message.
    std::panic::AssertUnwindSafe(fut)
        .catch_unwind()
        .await
        .map_err(|panic| {
            panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content_router::Capabilities;
    use crate::domain_types::{LlmServiceId, RoleId, RoleName};
    use crate::llm_client::test_double::ScriptedLlmClient;
    use crate::llm_client::ChatResponse;
    use crate::time_provider::test_time_provider;
    use std::collections::BTreeSet;

    struct StaticResolver {
        client: Arc<dyn LlmClient>,
    }

    impl RoleResolver for StaticResolver {
        fn resolve(&self, _role_id: RoleId) -> Option<RoleContext> {
            Some(RoleContext {
                base_prompt: None,
                role_prompt: "you are a test agent".to_string(),
                tool_rules: None,
                tool_groups: Some(BTreeSet::new()),
                capabilities: Capabilities::default(),
            })
        }

        fn llm_client(&self, _role_id: RoleId) -> Option<Arc<dyn LlmClient>> {
            Some(self.client.clone())
        }
    }

    #[tokio::test]
    async fn dispatch_once_processes_a_pending_message() {
        let task_id = TaskId::generate();
        let registry = OrganizationRegistry::new();
        registry.seed_task(task_id.clone(), chrono::Utc::now());
        let bus = MessageBus::new(test_time_provider());
        let conversations = ConversationStore::new();
        let concurrency = ConcurrencyController::new(
            crate::domain_types::MaxConcurrentRequests::default(),
            test_time_provider(),
        );
        let tools = ToolRegistry::new();
        let client: Arc<dyn LlmClient> = Arc::new(ScriptedLlmClient::new(vec![ChatResponse {
            role: "assistant".to_string(),
            content: Some("ack".to_string()),
            tool_calls: Vec::new(),
            reasoning_content: None,
        }]));
        let roles = Arc::new(StaticResolver { client });

        let role = registry
            .create_role(
                RoleName::try_new("worker").unwrap(),
                "prompt".to_string(),
                LlmServiceId::try_new("svc").unwrap(),
                BTreeSet::new(),
                RoleId::root(),
                chrono::Utc::now(),
            )
            .unwrap();
        let agent = registry
            .create_agent(role.role_id, AgentId::root(), task_id.clone(), chrono::Utc::now())
            .unwrap();

        let dispatcher = AgentDispatcher::new(
            task_id.clone(),
            bus.clone(),
            registry.clone(),
            conversations,
            concurrency,
            tools,
            roles,
        );

        let send_seq = bus.next_send_seq();
        let message = crate::domain::Message {
            message_id: crate::domain_types::MessageId::generate(),
            from: AgentId::root(),
            to: agent.agent_id,
            task_id: task_id.clone(),
            payload: Payload::text("hello"),
            delay: crate::domain_types::DelayMs::zero(),
            send_seq,
            created_at: chrono::Utc::now(),
        };
        bus.send(message, true, true).unwrap();

        dispatcher.dispatch_once(agent.agent_id).await;

        assert_eq!(bus.pending_count(&task_id, agent.agent_id), 0);
    }
}
