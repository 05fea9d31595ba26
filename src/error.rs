//! Error types for the agent society runtime
//!
//! Each subsystem gets its own `thiserror` enum (mirroring the
//! crate's `RouterError`/`DeliveryError`/`RegistryError` split) so call sites
//! match on the error kind they actually care about. [`CoreError`] is the
//! top-level enum the HTTP/REST collaborator and the dispatcher see; it wraps
//! every subsystem error via `#[from]`, the same way
//! `DatabaseError` wraps `StorageError`.
//!
//! All of these are returned *as values* from their operation —
//! never panics, never raised exceptions. Only the dispatcher's behavior
//! invocation is caught-and-isolated; everywhere else the caller
//! is expected to match on the `Result`.

use crate::domain_types::{AgentId, MessageId, RoleId, TaskId};
use thiserror::Error;

/// Errors raised by the Message Bus.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// `to` field of a send was empty or unresolvable.
    #[error("missing_to")]
    MissingTo,

    /// `from` field of a send was empty or unresolvable.
    #[error("missing_from")]
    MissingFrom,

    /// The sender/recipient pair violates the cross-task isolation rule.
    #[error("cross_task_communication_denied: {from} -> {to} (task {task_id})")]
    CrossTaskCommunicationDenied {
        /// Sending agent.
        from: AgentId,
        /// Intended recipient.
        to: AgentId,
        /// Task the send was scoped to.
        task_id: TaskId,
    },
}

/// Errors raised by the Organization Registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// No role with this ID is registered.
    #[error("role_not_found: {0}")]
    RoleNotFound(RoleId),

    /// No agent with this ID is registered (or is active).
    #[error("agent_not_found: {0}")]
    AgentNotFound(AgentId),

    /// A system role (`root`/`user`) cannot be deleted.
    #[error("cannot_delete_system_role")]
    CannotDeleteSystemRole,

    /// A system agent (`root`/`user`) cannot be terminated.
    #[error("cannot_delete_system_agent")]
    CannotDeleteSystemAgent,

    /// The role has already been soft-deleted.
    #[error("role_already_deleted: {0}")]
    RoleAlreadyDeleted(RoleId),

    /// The agent has already been terminated.
    #[error("agent_already_terminated: {0}")]
    AgentAlreadyTerminated(AgentId),

    /// A non-root spawn caller supplied a `parentAgentId` other than itself.
    #[error("invalid_parentAgentId")]
    InvalidParentAgentId,

    /// `terminateAgent` was called by an agent other than the target's direct parent.
    #[error("not_child_agent")]
    NotChildAgent,

    /// A spawned role is not reachable from the caller's role via the `createdBy` chain.
    #[error("not_child_role")]
    NotChildRole,
}

/// Errors raised by the Concurrency Controller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConcurrencyError {
    /// `executeRequest` called with an empty agent ID.
    #[error("rejected_missing_agent_id")]
    RejectedMissingAgentId,

    /// The agent already has an active (or queued) LLM request.
    #[error("agent_already_active")]
    AgentAlreadyActive,

    /// The in-flight call was aborted via its abort handle.
    #[error("request_aborted")]
    RequestAborted,

    /// A queued request was cancelled before it became active.
    #[error("request_cancelled")]
    RequestCancelled,

    /// All retries were exhausted without a successful response.
    #[error("llm_call_failed_after_retries")]
    LlmCallFailedAfterRetries,
}

/// Errors raised by the Tool Executor & Registry and the
/// sandboxed `run_javascript` tool.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    /// No tool is registered under this name.
    #[error("tool_not_found: {0}")]
    ToolNotFound(String),

    /// The supplied arguments failed schema/shape validation.
    #[error("invalid_args: {0}")]
    InvalidArgs(String),

    /// The caller's role does not carry every tool group this tool belongs to.
    #[error("tool_not_allowed_for_role")]
    ToolNotAllowedForRole,

    /// `run_javascript` source contained a forbidden identifier.
    #[error("blocked_code: {0}")]
    BlockedCode(String),

    /// `run_javascript`'s return value could not be represented as JSON.
    #[error("non_json_serializable_return")]
    NonJsonSerializableReturn,

    /// The tool-call loop exhausted its round budget.
    #[error("max_tool_rounds_exceeded")]
    MaxToolRoundsExceeded,
}

/// Errors raised by the `http_request` tool's HTTP client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HttpToolError {
    /// The URL scheme was not `https://`.
    #[error("only_https_allowed")]
    OnlyHttpsAllowed,

    /// The method is not in the allow-list.
    #[error("invalid_method: {0}")]
    InvalidMethod(String),

    /// The request did not complete before the configured timeout.
    #[error("request_timeout")]
    RequestTimeout,

    /// The underlying transport failed.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Top-level error surfaced to the HTTP/REST collaborator and the dispatcher.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A required field was missing from a request.
    #[error("missing_agent_id")]
    MissingAgentId,

    /// A request required text content that was absent.
    #[error("missing_text")]
    MissingText,

    /// Message bus failure.
    #[error(transparent)]
    Bus(#[from] BusError),

    /// Organization registry failure.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Concurrency controller failure.
    #[error(transparent)]
    Concurrency(#[from] ConcurrencyError),

    /// Tool execution failure.
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// HTTP tool failure.
    #[error(transparent)]
    HttpTool(#[from] HttpToolError),

    /// A message referenced by ID was not found (e.g. for correlation in tests/tools).
    #[error("message_not_found: {0}")]
    MessageNotFound(MessageId),

    /// Catch-all for conditions not covered by a dedicated variant above.
    #[error("runtime error: {0}")]
    Runtime(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_tokens_match_wire_names() {
        assert_eq!(BusError::MissingTo.to_string(), "missing_to");
        assert_eq!(BusError::MissingFrom.to_string(), "missing_from");
        assert_eq!(
            RegistryError::InvalidParentAgentId.to_string(),
            "invalid_parentAgentId"
        );
        assert_eq!(
            ConcurrencyError::AgentAlreadyActive.to_string(),
            "agent_already_active"
        );
        assert_eq!(
            ToolError::MaxToolRoundsExceeded.to_string(),
            "max_tool_rounds_exceeded"
        );
        assert_eq!(
            HttpToolError::OnlyHttpsAllowed.to_string(),
            "only_https_allowed"
        );
    }

    #[test]
    fn core_error_wraps_subsystem_errors() {
        let err: CoreError = BusError::MissingTo.into();
        assert!(matches!(err, CoreError::Bus(BusError::MissingTo)));
    }
}
