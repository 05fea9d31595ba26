//! LLM Client Adapter: the wire contract a registered LLM service speaks.
//!
//! Models the wire contract a registered LLM service speaks:
//! `chat({messages, tools, temperature, meta}) -> {role, content?,
//! tool_calls?, reasoning_content?}`. No concrete provider wire format is
//! implemented here — the same scope boundary as mocking the
//! WASM execution backend behind a `Sandbox`/`Engine` trait seam in tests —
//! but the abort-aware, retryable call shape is grounded in the streaming
//! accumulation loop of `other_examples`' `llm_phase.rs`
//! (`run_llm_phase`'s `tokio::select!` against an abort channel).

use crate::domain::{Turn, TurnToolCall};
use crate::domain_types::AgentId;
use crate::tools::ToolDefinition;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// A single chat completion request.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    /// Full turn history to send, including the composed system turn.
    pub messages: Vec<Turn>,
    /// Tool definitions available to the model this round.
    pub tools: Vec<ToolDefinition>,
    /// Sampling temperature.
    pub temperature: f32,
    /// Metadata describing which agent this call is on behalf of.
    pub meta: ChatMeta,
}

/// Request metadata attached to every chat call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMeta {
    /// The agent this completion is being generated for.
    pub agent_id: AgentId,
}

/// A single chat completion response.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    /// Always `"assistant"` in practice; kept for wire-shape fidelity.
    pub role: String,
    /// Visible reply text, if any.
    pub content: Option<String>,
    /// Tool calls the model wants executed.
    #[serde(default)]
    pub tool_calls: Vec<TurnToolCall>,
    /// Chain-of-thought style content some services return alongside the reply.
    pub reasoning_content: Option<String>,
}

/// An LLM service client. One implementation per registered service;
/// `chat` is expected to retry internally or delegate retry to
/// [`crate::concurrency::ConcurrencyController::with_retry`] at the call site.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Sends a chat completion request, honoring `cancel` for abort
    /// (the `abortAgentLlmCall` operation).
    async fn chat(
        &self,
        request: ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<ChatResponse, LlmClientError>;
}

/// Errors a concrete `LlmClient` implementation may surface.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmClientError {
    /// The call was aborted via its cancellation token.
    #[error("request_aborted")]
    Aborted,
    /// The underlying transport or provider call failed.
    #[error("transport error: {0}")]
    Transport(String),
}

/// A generic `LlmClient` that POSTs a [`ChatRequest`]/[`ChatResponse`]
/// pair to a configured service's `base_url` over HTTPS, carrying the
/// exact wire shape this crate already defines rather than adapting to
/// any particular provider's own request/response format.
pub struct HttpLlmClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpLlmClient {
    /// Builds a client for one configured service entry.
    #[must_use]
    pub fn new(base_url: String, api_key: String, timeout: std::time::Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .expect("reqwest client config is valid"),
            base_url,
            api_key,
        }
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn chat(
        &self,
        request: ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<ChatResponse, LlmClientError> {
        if cancel.is_cancelled() {
            return Err(LlmClientError::Aborted);
        }

        let send = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send();

        tokio::select! {
            () = cancel.cancelled() => Err(LlmClientError::Aborted),
            result = send => {
                let response = result.map_err(|e| LlmClientError::Transport(e.to_string()))?;
                response
                    .json::<ChatResponse>()
                    .await
                    .map_err(|e| LlmClientError::Transport(e.to_string()))
            }
        }
    }
}
