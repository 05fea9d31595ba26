//! End-to-end coverage of a task's full lifecycle through `Runtime`
//! directly: submission, dispatch, tool calls, and graceful shutdown.

use agor::bus::MessageBus;
use agor::content_router::Capabilities;
use agor::conversation_store::ConversationStore;
use agor::dispatcher::RoleResolver;
use agor::domain_types::{AgentId, DelayMs, MaxConcurrentRequests, RoleId};
use agor::llm_client::test_double::ScriptedLlmClient;
use agor::llm_client::{ChatResponse, LlmClient};
use agor::registry::OrganizationRegistry;
use agor::runtime::Runtime;
use agor::time_provider::test_time_provider;
use agor::tool_loop::RoleContext;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

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

fn fresh_subsystems() -> (MessageBus, OrganizationRegistry, ConversationStore) {
    (
        MessageBus::new(test_time_provider()),
        OrganizationRegistry::new(),
        ConversationStore::new(),
    )
}

#[tokio::test]
async fn a_submitted_task_is_answered_by_the_root_agent() {
    let client: Arc<dyn LlmClient> = Arc::new(ScriptedLlmClient::new(vec![ChatResponse {
        role: "assistant".to_string(),
        content: Some("acknowledged".to_string()),
        tool_calls: Vec::new(),
        reasoning_content: None,
    }]));

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
            AgentId::user(),
            AgentId::root(),
            "please get started".to_string(),
            DelayMs::zero(),
        )
        .unwrap();

    let loop_handle = runtime.spawn_dispatch_loop(Duration::from_millis(5));
    tokio::time::sleep(Duration::from_millis(50)).await;

    let conversation = runtime.get_agent_messages(AgentId::root()).unwrap();
    assert!(
        conversation
            .turns
            .iter()
            .any(|t| t.content.as_deref() == Some("acknowledged"))
    );

    let summary = runtime.shutdown(loop_handle, Duration::from_secs(1)).await;
    assert_eq!(summary.pending_messages, 0);
}

#[tokio::test]
async fn deleting_an_agent_stops_further_dispatch() {
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

    runtime.delete_agent(AgentId::root(), AgentId::user()).unwrap();
    let agents = runtime.list_agents();
    let user = agents.iter().find(|a| a.agent_id == AgentId::user()).unwrap();
    assert!(!user.is_active());
}

#[tokio::test]
async fn a_second_shutdown_summary_reports_no_remaining_work() {
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

    let loop_handle = runtime.spawn_dispatch_loop(Duration::from_millis(5));
    let summary = runtime.shutdown(loop_handle, Duration::from_secs(1)).await;
    assert_eq!(summary.active_agents, 2);
    assert_eq!(summary.pending_messages, 0);
}
