//! HTTP surface over [`crate::runtime::Runtime`].
//!
//! Exposes task submission, agent messaging, and role/agent administration
//! as JSON-over-HTTP endpoints. The wire shapes here are this crate's own
//! choice — the actual REST contract is an external collaborator's concern —
//! kept deliberately thin so it is easy to swap for a different transport.

use crate::bus::MessageBus;
use crate::config::{RuntimeConfig, ServiceRegistry};
use crate::conversation_store::ConversationStore;
use crate::domain::{Agent, Conversation, Role};
use crate::domain_types::{AgentId, DelayMs, LlmServiceId, RoleId, RoleName, ToolGroup};
use crate::error::{BusError, CoreError};
use crate::llm_client::LlmClient;
use crate::registry::OrganizationRegistry;
use crate::role_resolver::ConfigRoleResolver;
use crate::runtime::Runtime;
use crate::time_provider::SharedTimeProvider;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Registry(crate::error::RegistryError::RoleNotFound(_))
            | Self::Registry(crate::error::RegistryError::AgentNotFound(_))
            | Self::MessageNotFound(_) => StatusCode::NOT_FOUND,
            Self::Registry(_) | Self::Bus(_) | Self::MissingAgentId | Self::MissingText => {
                StatusCode::BAD_REQUEST
            }
            Self::Concurrency(_) | Self::Tool(_) | Self::HttpTool(_) | Self::Runtime(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Everything a running task needs for the HTTP layer: the runtime itself
/// plus its background dispatch loop handle, so shutdown can stop it.
struct TaskHandle {
    runtime: Runtime,
    loop_handle: crate::runtime::DispatchLoopHandle,
}

/// Shared application state: every task this process has submitted, plus
/// the configuration used to spin up new ones. `bus`/`registry`/
/// `conversations` are process-wide, long-lived instances shared by every
/// task, so cross-task isolation is enforced by the registry's
/// authorization check rather than by each task simply never sharing state
/// with any other.
pub struct AppState {
    tasks: DashMap<String, TaskHandle>,
    config: RuntimeConfig,
    services: ServiceRegistry,
    clients: HashMap<LlmServiceId, Arc<dyn LlmClient>>,
    base_prompt: String,
    tool_rules: String,
    time: SharedTimeProvider,
    bus: MessageBus,
    registry: OrganizationRegistry,
    conversations: ConversationStore,
}

impl AppState {
    /// Builds fresh, empty application state.
    #[must_use]
    pub fn new(
        config: RuntimeConfig,
        services: ServiceRegistry,
        clients: HashMap<LlmServiceId, Arc<dyn LlmClient>>,
        base_prompt: String,
        tool_rules: String,
        time: SharedTimeProvider,
    ) -> Self {
        Self {
            tasks: DashMap::new(),
            bus: MessageBus::new(time.clone()),
            registry: OrganizationRegistry::new(),
            conversations: ConversationStore::new(),
            config,
            services,
            clients,
            base_prompt,
            tool_rules,
            time,
        }
    }
}

type SharedState = Arc<AppState>;

/// Builds the Axum router over the given application state.
#[must_use]
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/tasks", post(submit_task))
        .route("/tasks/{task_id}/messages", post(send_to_agent))
        .route("/tasks/{task_id}/agents", get(list_agents))
        .route("/tasks/{task_id}/roles", get(list_roles).post(create_role))
        .route(
            "/tasks/{task_id}/agents/{agent_id}/messages",
            get(get_agent_messages),
        )
        .route(
            "/tasks/{task_id}/agents/{agent_id}/abort",
            post(abort_agent_llm_call),
        )
        .route("/tasks/{task_id}/agents/{agent_id}", axum::routing::delete(delete_agent))
        .route(
            "/tasks/{task_id}/roles/{role_id}",
            axum::routing::delete(delete_role).patch(update_role),
        )
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

#[derive(Debug, Deserialize)]
struct SubmitTaskRequest {
    text: String,
}

#[derive(Debug, Serialize)]
struct SubmitTaskResponse {
    task_id: String,
}

async fn submit_task(
    State(state): State<SharedState>,
    Json(req): Json<SubmitTaskRequest>,
) -> Result<Json<SubmitTaskResponse>, CoreError> {
    let services = state.services.clone();
    let clients = state.clients.clone();
    let base_prompt = state.base_prompt.clone();
    let tool_rules = state.tool_rules.clone();

    let runtime = Runtime::submit_task(
        state.config.max_concurrent_requests,
        state.bus.clone(),
        state.registry.clone(),
        state.conversations.clone(),
        move |registry| {
            Arc::new(ConfigRoleResolver::new(
                registry, services, clients, base_prompt, tool_rules,
            )) as Arc<dyn crate::dispatcher::RoleResolver>
        },
        state.time.clone(),
    );

    let loop_handle = runtime.spawn_dispatch_loop(state.config.dispatch_tick());
    runtime.send_to_agent(AgentId::user(), AgentId::root(), req.text, DelayMs::zero())?;

    let task_id = runtime.task_id().to_string();
    info!(task_id = %task_id, "task submitted via HTTP");
    state
        .tasks
        .insert(task_id.clone(), TaskHandle { runtime, loop_handle });

    Ok(Json(SubmitTaskResponse { task_id }))
}

fn lookup(state: &SharedState, task_id: &str) -> Result<Runtime, CoreError> {
    state
        .tasks
        .get(task_id)
        .map(|entry| entry.runtime.clone())
        .ok_or(CoreError::Runtime(format!("unknown task: {task_id}")))
}

fn parse_agent(id: &str) -> Result<AgentId, CoreError> {
    uuid::Uuid::from_str(id)
        .map(AgentId::new)
        .map_err(|e| CoreError::Runtime(format!("invalid agent id: {e}")))
}

fn parse_role(id: &str) -> Result<RoleId, CoreError> {
    uuid::Uuid::from_str(id)
        .map(RoleId::new)
        .map_err(|e| CoreError::Runtime(format!("invalid role id: {e}")))
}

#[derive(Debug, Deserialize)]
struct SendToAgentRequest {
    from: String,
    to: String,
    text: String,
    #[serde(default)]
    delay_ms: u64,
}

async fn send_to_agent(
    State(state): State<SharedState>,
    Path(task_id): Path<String>,
    Json(req): Json<SendToAgentRequest>,
) -> Result<StatusCode, CoreError> {
    if req.from.is_empty() {
        return Err(CoreError::Bus(BusError::MissingFrom));
    }
    if req.to.is_empty() {
        return Err(CoreError::Bus(BusError::MissingTo));
    }
    let runtime = lookup(&state, &task_id)?;
    runtime.send_to_agent(
        parse_agent(&req.from)?,
        parse_agent(&req.to)?,
        req.text,
        DelayMs::new(req.delay_ms),
    )?;
    Ok(StatusCode::ACCEPTED)
}

async fn list_agents(
    State(state): State<SharedState>,
    Path(task_id): Path<String>,
) -> Result<Json<Vec<Agent>>, CoreError> {
    let runtime = lookup(&state, &task_id)?;
    Ok(Json(runtime.list_agents()))
}

async fn list_roles(
    State(state): State<SharedState>,
    Path(task_id): Path<String>,
) -> Result<Json<Vec<Role>>, CoreError> {
    let runtime = lookup(&state, &task_id)?;
    Ok(Json(runtime.list_roles()))
}

async fn get_agent_messages(
    State(state): State<SharedState>,
    Path((task_id, agent_id)): Path<(String, String)>,
) -> Result<Json<Conversation>, CoreError> {
    let runtime = lookup(&state, &task_id)?;
    let agent_id = parse_agent(&agent_id)?;
    runtime
        .get_agent_messages(agent_id)
        .map(Json)
        .ok_or(CoreError::Registry(crate::error::RegistryError::AgentNotFound(agent_id)))
}

async fn abort_agent_llm_call(
    State(state): State<SharedState>,
    Path((task_id, agent_id)): Path<(String, String)>,
) -> Result<Json<bool>, CoreError> {
    let runtime = lookup(&state, &task_id)?;
    Ok(Json(runtime.abort_agent_llm_call(parse_agent(&agent_id)?)))
}

#[derive(Debug, Deserialize)]
struct DeleteAgentRequest {
    caller: String,
}

async fn delete_agent(
    State(state): State<SharedState>,
    Path((task_id, agent_id)): Path<(String, String)>,
    Json(req): Json<DeleteAgentRequest>,
) -> Result<StatusCode, CoreError> {
    let runtime = lookup(&state, &task_id)?;
    runtime.delete_agent(parse_agent(&req.caller)?, parse_agent(&agent_id)?)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_role(
    State(state): State<SharedState>,
    Path((task_id, role_id)): Path<(String, String)>,
) -> Result<Json<Vec<RoleId>>, CoreError> {
    let runtime = lookup(&state, &task_id)?;
    Ok(Json(runtime.delete_role(parse_role(&role_id)?)?))
}

#[derive(Debug, Deserialize)]
struct UpdateRoleRequest {
    role_prompt: Option<String>,
    tool_groups: Option<BTreeSet<String>>,
}

async fn update_role(
    State(state): State<SharedState>,
    Path((task_id, role_id)): Path<(String, String)>,
    Json(req): Json<UpdateRoleRequest>,
) -> Result<Json<Role>, CoreError> {
    let runtime = lookup(&state, &task_id)?;
    let tool_groups = req
        .tool_groups
        .map(|groups| {
            groups
                .into_iter()
                .map(|g| ToolGroup::try_new(g).map_err(|e| CoreError::Runtime(e.to_string())))
                .collect::<Result<BTreeSet<_>, _>>()
        })
        .transpose()?;
    Ok(Json(runtime.update_role(
        parse_role(&role_id)?,
        req.role_prompt,
        tool_groups,
    )?))
}

#[derive(Debug, Deserialize)]
struct CreateRoleRequest {
    name: String,
    role_prompt: String,
    llm_service_id: String,
    tool_groups: BTreeSet<String>,
    created_by: String,
}

async fn create_role(
    State(state): State<SharedState>,
    Path(task_id): Path<String>,
    Json(req): Json<CreateRoleRequest>,
) -> Result<Json<Role>, CoreError> {
    let runtime = lookup(&state, &task_id)?;
    let tool_groups = req
        .tool_groups
        .into_iter()
        .map(|g| ToolGroup::try_new(g).map_err(|e| CoreError::Runtime(e.to_string())))
        .collect::<Result<BTreeSet<_>, _>>()?;
    let role = runtime.create_role(
        RoleName::try_new(req.name).map_err(|e| CoreError::Runtime(e.to_string()))?,
        req.role_prompt,
        LlmServiceId::try_new(req.llm_service_id).map_err(|e| CoreError::Runtime(e.to_string()))?,
        tool_groups,
        parse_role(&req.created_by)?,
    )?;
    Ok(Json(role))
}

/// Requests graceful shutdown of every task this process is hosting,
/// draining with `config.shutdown_drain()` before returning.
pub async fn shutdown_all(state: &SharedState) {
    let task_ids: Vec<String> = state.tasks.iter().map(|e| e.key().clone()).collect();
    for task_id in task_ids {
        if let Some((_, handle)) = state.tasks.remove(&task_id) {
            let summary = handle
                .runtime
                .shutdown(handle.loop_handle, state.config.shutdown_drain())
                .await;
            info!(task_id = %task_id, ?summary, "task drained on shutdown");
        }
    }
}
