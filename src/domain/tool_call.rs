//! Tool call records exchanged during the tool-call loop.

use crate::domain_types::{CallId, ToolName};
use serde::{Deserialize, Serialize};

/// A single tool invocation requested by the LLM and its eventual result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Correlates the request and its result within a round.
    pub call_id: CallId,
    /// Name of the tool being invoked.
    pub tool_name: ToolName,
    /// Arguments as supplied by the LLM, unvalidated until dispatch.
    pub args: serde_json::Value,
    /// Result once the tool has executed. `None` while still in flight.
    pub result: Option<serde_json::Value>,
}

impl ToolCall {
    /// Builds a pending call with no result yet.
    #[must_use]
    pub fn requested(tool_name: ToolName, args: serde_json::Value) -> Self {
        Self {
            call_id: CallId::generate(),
            tool_name,
            args,
            result: None,
        }
    }

    /// Attaches a result to this call.
    pub fn resolve(&mut self, result: serde_json::Value) {
        self.result = Some(result);
    }
}
