//! Top-level runtime assembly.
//!
//! Wires the Message Bus, Organization Registry, Agent Dispatcher,
//! Conversation Store, Concurrency Controller and Tool Registry together and
//! exposes the operations the external collaborator surface (HTTP API,
//! CLI) drives: `submit_task`, `send_to_agent`, `list_agents`/`list_roles`,
//! `get_agent_messages`, `delete_agent`/`delete_role`, `update_role`. Every
//! method below performs the real operation against the wired-up
//! subsystems rather than returning a placeholder value.

use crate::bus::MessageBus;
use crate::concurrency::ConcurrencyController;
use crate::conversation_store::ConversationStore;
use crate::dispatcher::{AgentDispatcher, RoleResolver};
use crate::domain::{Agent, Conversation, Role};
use crate::domain_types::{MaxConcurrentRequests, RoleId, RoleName, TaskId};
use crate::domain_types::AgentId;
use crate::error::CoreError;
use crate::registry::OrganizationRegistry;
use crate::time_provider::SharedTimeProvider;
use crate::tools::ToolRegistry;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

/// Summary emitted once graceful shutdown completes.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct ShutdownSummary {
    /// Wall-clock time the drain took.
    pub duration_ms: u64,
    /// Messages still queued once the drain timeout elapsed.
    pub pending_messages: usize,
    /// Agents still active (not terminated) at shutdown.
    pub active_agents: usize,
}

struct DispatchLoop {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

/// Handle returned by [`Runtime::spawn_dispatch_loop`].
pub struct DispatchLoopHandle {
    inner: DispatchLoop,
}

/// The running society for a single task. One `Runtime` per `submit_task`
/// call, wired to subsystems shared process-wide so cross-task isolation is
/// enforced by the registry's authorization check rather than by simply
/// never connecting two tasks' state.
#[derive(Clone)]
pub struct Runtime {
    bus: MessageBus,
    registry: OrganizationRegistry,
    conversations: ConversationStore,
    concurrency: ConcurrencyController,
    dispatcher: AgentDispatcher,
    task_id: TaskId,
}

impl Runtime {
    /// Spins up a new task's agent society over process-wide `bus`,
    /// `registry` and `conversations` handles, seeding the task's system
    /// roles/agents in the shared registry. This is `submit_task`'s entry
    /// point: the caller is expected to then
    /// `send_to_agent(AgentId::user(), ...)` to deliver the initial
    /// instruction.
    ///
    /// `make_resolver` receives the shared `OrganizationRegistry` handle so
    /// the resolver it builds (e.g. `ConfigRoleResolver`) resolves roles
    /// created later in this same task.
    #[instrument(skip(bus, registry, conversations, make_resolver, time))]
    pub fn submit_task(
        max_concurrent: MaxConcurrentRequests,
        bus: MessageBus,
        registry: OrganizationRegistry,
        conversations: ConversationStore,
        make_resolver: impl FnOnce(OrganizationRegistry) -> Arc<dyn RoleResolver>,
        time: SharedTimeProvider,
    ) -> Self {
        let task_id = TaskId::generate();
        let now = chrono::Utc::now();
        registry.seed_task(task_id.clone(), now);
        let roles = make_resolver(registry.clone());
        let concurrency = ConcurrencyController::new(max_concurrent, time);
        let tools = ToolRegistry::with_builtins();

        let dispatcher = AgentDispatcher::new(
            task_id.clone(),
            bus.clone(),
            registry.clone(),
            conversations.clone(),
            concurrency.clone(),
            tools,
            roles,
        );

        info!(task_id = %task_id, "task submitted");

        Self {
            bus,
            registry,
            conversations,
            concurrency,
            dispatcher,
            task_id,
        }
    }

    /// The task this runtime is scoped to.
    #[must_use]
    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// Sends a message from `from` to `to` within this task. `from_allowed`
    /// and `to_allowed` are computed from the registry's task membership:
    /// both must resolve to the task's entry agent or a descendant of it
    /// (or to the `user` system agent), which is what makes a cross-task
    /// send actually rejectable rather than vacuously true.
    pub fn send_to_agent(
        &self,
        from: AgentId,
        to: AgentId,
        text: String,
        delay: crate::domain_types::DelayMs,
    ) -> Result<(), CoreError> {
        let from_ok = self.registry.is_authorized_for_task(&self.task_id, from);
        let to_ok = self.registry.is_authorized_for_task(&self.task_id, to);
        let send_seq = self.bus.next_send_seq();
        let message = crate::domain::Message {
            message_id: crate::domain_types::MessageId::generate(),
            from,
            to,
            task_id: self.task_id.clone(),
            payload: crate::domain::Payload::text(text),
            delay,
            send_seq,
            created_at: chrono::Utc::now(),
        };
        self.bus.send(message, from_ok, to_ok)?;
        Ok(())
    }

    /// Lists every agent in this task.
    #[must_use]
    pub fn list_agents(&self) -> Vec<Agent> {
        self.registry.list_agents(&self.task_id)
    }

    /// Lists every role reachable in this task.
    #[must_use]
    pub fn list_roles(&self) -> Vec<Role> {
        self.registry.list_roles()
    }

    /// Returns an agent's full conversation history.
    #[must_use]
    pub fn get_agent_messages(&self, agent_id: AgentId) -> Option<Conversation> {
        self.conversations.get_conversation(&self.task_id, agent_id)
    }

    /// Terminates an agent on behalf of its direct parent.
    pub fn delete_agent(&self, caller: AgentId, target: AgentId) -> Result<(), CoreError> {
        self.dispatcher.terminate_agent(caller, target)
    }

    /// Aborts an agent's in-flight LLM call, if any. Returns `true` if a
    /// call was actually cancelled.
    pub fn abort_agent_llm_call(&self, agent_id: AgentId) -> bool {
        self.dispatcher.abort_agent(agent_id)
    }

    /// Soft-deletes a role and its descendants.
    pub fn delete_role(&self, role_id: RoleId) -> Result<Vec<RoleId>, CoreError> {
        Ok(self.registry.delete_role(role_id)?)
    }

    /// Updates a role's prompt/tool groups.
    pub fn update_role(
        &self,
        role_id: RoleId,
        role_prompt: Option<String>,
        tool_groups: Option<BTreeSet<crate::domain_types::ToolGroup>>,
    ) -> Result<Role, CoreError> {
        Ok(self.registry.update_role(role_id, role_prompt, tool_groups)?)
    }

    /// Registers a new role.
    pub fn create_role(
        &self,
        name: RoleName,
        role_prompt: String,
        llm_service_id: crate::domain_types::LlmServiceId,
        tool_groups: BTreeSet<crate::domain_types::ToolGroup>,
        created_by: RoleId,
    ) -> Result<Role, CoreError> {
        Ok(self.registry.create_role(
            name,
            role_prompt,
            llm_service_id,
            tool_groups,
            created_by,
            chrono::Utc::now(),
        )?)
    }

    /// Updates the global concurrency cap.
    pub fn update_max_concurrent_requests(&self, max: MaxConcurrentRequests) {
        self.concurrency.update_max_concurrent(max);
    }

    /// Snapshot of concurrency controller statistics.
    #[must_use]
    pub fn concurrency_stats(&self) -> crate::concurrency::ConcurrencyStats {
        self.concurrency.stats()
    }

    /// Starts the background dispatch loop: on every tick, flush due delayed
    /// messages and attempt a dispatch cycle for every active agent in this
    /// task. Returns a handle whose cancellation token stops the loop (used
    /// by graceful shutdown).
    pub fn spawn_dispatch_loop(&self, tick_interval: Duration) -> DispatchLoopHandle {
        let cancel = CancellationToken::new();
        let runtime = self.clone();
        let loop_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick_interval);
            loop {
                tokio::select! {
                    () = loop_cancel.cancelled() => break,
                    _ = interval.tick() => {
                        runtime.bus.tick();
                        for agent in runtime.registry.list_agents(&runtime.task_id) {
                            if agent.is_active() {
                                runtime.dispatcher.dispatch_once(agent.agent_id).await;
                            }
                        }
                    }
                }
            }
        });
        DispatchLoopHandle {
            inner: DispatchLoop { handle, cancel },
        }
    }

    /// Performs a graceful shutdown: stops admitting new dispatch cycles,
    /// waits up to `timeout` for in-flight work to drain, then flushes any
    /// remaining delayed messages belonging to this task so nothing is
    /// silently lost. Other tasks sharing the same bus/registry are
    /// unaffected.
    #[instrument(skip(self, loop_handle))]
    pub async fn shutdown(
        &self,
        loop_handle: DispatchLoopHandle,
        timeout: Duration,
    ) -> ShutdownSummary {
        let start = std::time::Instant::now();
        self.dispatcher.request_stop();
        loop_handle.inner.cancel.cancel();
        let _ = tokio::time::timeout(timeout, loop_handle.inner.handle).await;

        self.bus.flush_delayed_for_task(&self.task_id);
        let pending_messages = self.bus.total_pending(&self.task_id);
        let active_agents = self
            .registry
            .list_agents(&self.task_id)
            .iter()
            .filter(|a| a.is_active())
            .count();

        let summary = ShutdownSummary {
            duration_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            pending_messages,
            active_agents,
        };
        info!(?summary, "task shutdown complete");
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content_router::Capabilities;
    use crate::llm_client::test_double::ScriptedLlmClient;
    use crate::llm_client::{ChatResponse, LlmClient};
    use crate::time_provider::test_time_provider;
    use crate::tool_loop::RoleContext;

    struct StaticResolver {
        client: Arc<dyn LlmClient>,
    }

    impl RoleResolver for StaticResolver {
        fn resolve(&self, _role_id: RoleId) -> Option<RoleContext> {
            Some(RoleContext {
                base_prompt: None,
                role_prompt: "test".to_string(),
                tool_rules: None,
                tool_groups: Some(BTreeSet::new()),
                capabilities: Capabilities::default(),
            })
        }

        fn llm_client(&self, _role_id: RoleId) -> Option<Arc<dyn LlmClient>> {
            Some(self.client.clone())
        }
    }

    fn fresh_subsystems() -> (MessageBus, OrganizationRegistry, ConversationStore) {
        (
            MessageBus::new(test_time_provider()),
            OrganizationRegistry::new(),
            ConversationStore::new(),
        )
    }

    #[tokio::test]
    async fn submit_task_seeds_system_agents() {
        let client: Arc<dyn LlmClient> = Arc::new(ScriptedLlmClient::new(vec![]));
        let (bus, registry, conversations) = fresh_subsystems();
        let runtime = Runtime::submit_task(
            MaxConcurrentRequests::default(),
            bus,
            registry,
            conversations,
            |_registry| Arc::new(StaticResolver { client }) as Arc<dyn RoleResolver>,
            test_time_provider(),
        );
        let agents = runtime.list_agents();
        assert_eq!(agents.len(), 2);
    }

    #[tokio::test]
    async fn shutdown_flushes_pending_delayed_messages() {
        let client: Arc<dyn LlmClient> = Arc::new(ScriptedLlmClient::new(vec![]));
        let (bus, registry, conversations) = fresh_subsystems();
        let runtime = Runtime::submit_task(
            MaxConcurrentRequests::default(),
            bus,
            registry,
            conversations,
            |_registry| Arc::new(StaticResolver { client }) as Arc<dyn RoleResolver>,
            test_time_provider(),
        );
        runtime
            .send_to_agent(
                AgentId::root(),
                AgentId::user(),
                "hi".to_string(),
                crate::domain_types::DelayMs::new(60_000),
            )
            .unwrap();

        let loop_handle = runtime.spawn_dispatch_loop(Duration::from_millis(5));
        let summary = runtime.shutdown(loop_handle, Duration::from_secs(1)).await;
        assert_eq!(summary.pending_messages, 1);
    }

    #[tokio::test]
    async fn two_tasks_sharing_subsystems_cannot_message_each_other() {
        let client_a: Arc<dyn LlmClient> = Arc::new(ScriptedLlmClient::new(vec![]));
        let client_b: Arc<dyn LlmClient> = Arc::new(ScriptedLlmClient::new(vec![]));
        let bus = MessageBus::new(test_time_provider());
        let registry = OrganizationRegistry::new();
        let conversations = ConversationStore::new();

        let runtime_a = Runtime::submit_task(
            MaxConcurrentRequests::default(),
            bus.clone(),
            registry.clone(),
            conversations.clone(),
            |_registry| Arc::new(StaticResolver { client: client_a }) as Arc<dyn RoleResolver>,
            test_time_provider(),
        );
        let runtime_b = Runtime::submit_task(
            MaxConcurrentRequests::default(),
            bus,
            registry,
            conversations,
            |_registry| Arc::new(StaticResolver { client: client_b }) as Arc<dyn RoleResolver>,
            test_time_provider(),
        );

        let role_b = runtime_b
            .create_role(
                RoleName::try_new("worker").unwrap(),
                "prompt".to_string(),
                crate::domain_types::LlmServiceId::try_new("svc").unwrap(),
                BTreeSet::new(),
                RoleId::root(),
            )
            .unwrap();
        let agent_b = runtime_b
            .dispatcher
            .spawn_agent(AgentId::root(), AgentId::root(), role_b.role_id)
            .unwrap();

        let err = runtime_a
            .send_to_agent(
                AgentId::root(),
                agent_b.agent_id,
                "leak".to_string(),
                crate::domain_types::DelayMs::zero(),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Bus(crate::error::BusError::CrossTaskCommunicationDenied { .. })
        ));
    }
}
