//! `run_javascript` — sandboxed ECMAScript evaluation tool.
//!
//! Backed by `boa_engine`, a pure-Rust interpreter with no native FFI
//! surface to escape through. Two checks enforce the sandbox before and
//! after evaluation: a lexical scan rejects source referencing any
//! filesystem/process/network-shaped identifier before it ever runs, and the
//! return value must round-trip through `serde_json` or the call fails —
//! this backend has no host-function bridge for those identifiers to reach
//! in the first place, but the scan gives a clear, early rejection instead
//! of a confusing `ReferenceError` from the engine.

use super::{Tool, ToolContext, ToolDefinition};
use crate::domain_types::{ToolGroup, ToolName};
use crate::error::ToolError;
use async_trait::async_trait;
use boa_engine::{Context, JsValue, Source};
use serde::Deserialize;
use std::collections::BTreeSet;

/// Identifiers that would suggest an attempt to reach outside the sandbox.
/// None of these are actually exposed by this engine's default global
/// object, but rejecting them lexically gives a clean `blocked_code` error
/// rather than a runtime `ReferenceError`.
const FORBIDDEN_IDENTIFIERS: &[&str] = &[
    "require",
    "import",
    "process",
    "fetch",
    "XMLHttpRequest",
    "WebSocket",
    "eval",
    "Function",
    "global",
    "globalThis",
];

fn scan_for_forbidden(source: &str) -> Result<(), ToolError> {
    for ident in FORBIDDEN_IDENTIFIERS {
        if contains_identifier(source, ident) {
            return Err(ToolError::BlockedCode(format!(
                "source references forbidden identifier `{ident}`"
            )));
        }
    }
    Ok(())
}

fn contains_identifier(source: &str, ident: &str) -> bool {
    let bytes = source.as_bytes();
    let ident_bytes = ident.as_bytes();
    let is_word_byte = |b: u8| b.is_ascii_alphanumeric() || b == b'_' || b == b'$';

    let mut start = 0;
    while let Some(pos) = source[start..].find(ident) {
        let idx = start + pos;
        let before_ok = idx == 0 || !is_word_byte(bytes[idx - 1]);
        let after_idx = idx + ident_bytes.len();
        let after_ok = after_idx >= bytes.len() || !is_word_byte(bytes[after_idx]);
        if before_ok && after_ok {
            return true;
        }
        start = idx + 1;
    }
    false
}

fn js_value_to_json(value: &JsValue, ctx: &mut Context) -> Result<serde_json::Value, ToolError> {
    value
        .to_json(ctx)
        .map_err(|_| ToolError::NonJsonSerializableReturn)?
        .ok_or(ToolError::NonJsonSerializableReturn)
}

/// `run_javascript({source})` — evaluates `source` in a fresh sandboxed
/// engine instance and returns its last expression value as JSON.
pub struct RunJavascript {
    definition: ToolDefinition,
}

#[derive(Deserialize)]
struct RunJavascriptArgs {
    source: String,
}

impl Default for RunJavascript {
    fn default() -> Self {
        Self {
            definition: ToolDefinition {
                name: ToolName::try_new("run_javascript").expect("literal is valid"),
                description: "Evaluate a snippet of JavaScript in a sandbox and return its result as JSON.".to_string(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {"source": {"type": "string"}},
                    "required": ["source"]
                }),
                groups: BTreeSet::from([ToolGroup::try_new("compute").expect("literal is valid")]),
            },
        }
    }
}

#[async_trait]
impl Tool for RunJavascript {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(
        &self,
        args: serde_json::Value,
        _ctx: &ToolContext,
    ) -> Result<serde_json::Value, ToolError> {
        let args: RunJavascriptArgs = serde_json::from_value(args)
            .map_err(|e| ToolError::InvalidArgs(e.to_string()))?;
        scan_for_forbidden(&args.source)?;

        let source = args.source;
        tokio::task::spawn_blocking(move || {
            let mut ctx = Context::default();
            let result = ctx
                .eval(Source::from_bytes(source.as_bytes()))
                .map_err(|e| ToolError::BlockedCode(e.to_string()))?;
            js_value_to_json(&result, &mut ctx)
        })
        .await
        .map_err(|e| ToolError::InvalidArgs(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forbidden_identifier_is_rejected_lexically() {
        assert!(scan_for_forbidden("require('fs')").is_err());
        assert!(scan_for_forbidden("const x = process.env").is_err());
    }

    #[test]
    fn identifier_match_respects_word_boundaries() {
        // `processed` contains `process` as a substring but is not the identifier.
        assert!(scan_for_forbidden("let processed = 1 + 1; processed").is_ok());
    }

    #[test]
    fn plain_arithmetic_passes_scan() {
        assert!(scan_for_forbidden("1 + 2 * 3").is_ok());
    }
}
