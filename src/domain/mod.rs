//! Core data model: roles, agents, messages, conversations, tool calls and
//! tasks.

pub mod agent;
pub mod conversation;
pub mod message;
pub mod role;
pub mod task;
pub mod tool_call;

pub use agent::{Agent, AgentStatus, ComputeStatus};
pub use conversation::{Conversation, Turn, TurnRole, TurnToolCall};
pub use message::{Attachment, Message, Payload};
pub use role::{Role, RoleStatus};
pub use task::Task;
pub use tool_call::ToolCall;
