//! `http_request` — outbound HTTPS tool.
//!
//! HTTPS-only, method allow-listed, response body logged only up to a
//! configurable cap so a large response doesn't flood `tracing` output.
//! Built on `reqwest` with `rustls-tls` rather than the platform TLS stack,
//! matching the `default-features = false` + `rustls-tls` choice already
//! made in `Cargo.toml`.

use super::{Tool, ToolContext, ToolDefinition};
use crate::domain_types::{ToolGroup, ToolName};
use crate::error::{HttpToolError, ToolError};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::time::{Duration, Instant};
use tracing::debug;
use uuid::Uuid;

const ALLOWED_METHODS: &[&str] = &[
    "GET", "POST", "PUT", "DELETE", "PATCH", "HEAD", "OPTIONS",
];
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const LOG_BODY_CAP: usize = 10 * 1024;

/// Configuration for the `http_request` tool.
#[derive(Debug, Clone, Copy)]
pub struct HttpRequestConfig {
    /// Request timeout.
    pub timeout: Duration,
    /// How many bytes of the response body to include in trace logs.
    pub log_body_cap: usize,
}

impl Default for HttpRequestConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            log_body_cap: LOG_BODY_CAP,
        }
    }
}

/// The `http_request` tool.
pub struct HttpRequest {
    definition: ToolDefinition,
    client: reqwest::Client,
    config: HttpRequestConfig,
}

#[derive(Deserialize)]
struct HttpRequestArgs {
    method: String,
    url: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    headers: std::collections::BTreeMap<String, String>,
}

impl HttpRequest {
    /// Builds the tool with the given configuration.
    #[must_use]
    pub fn new(config: HttpRequestConfig) -> Self {
        Self {
            definition: ToolDefinition {
                name: ToolName::try_new("http_request").expect("literal is valid"),
                description: "Make an outbound HTTPS request.".to_string(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "method": {"type": "string", "enum": ALLOWED_METHODS},
                        "url": {"type": "string"},
                        "body": {"type": "string"},
                        "headers": {"type": "object"}
                    },
                    "required": ["method", "url"]
                }),
                groups: BTreeSet::from([
                    ToolGroup::try_new("network").expect("literal is valid"),
                ]),
            },
            client: reqwest::Client::builder()
                .timeout(config.timeout)
                .build()
                .expect("reqwest client config is valid"),
            config,
        }
    }
}

impl Default for HttpRequest {
    fn default() -> Self {
        Self::new(HttpRequestConfig::default())
    }
}

#[async_trait]
impl Tool for HttpRequest {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(
        &self,
        args: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<serde_json::Value, ToolError> {
        let request_id = Uuid::new_v4();
        let args: HttpRequestArgs =
            serde_json::from_value(args).map_err(|e| ToolError::InvalidArgs(e.to_string()))?;

        let method = args.method.to_uppercase();
        if !ALLOWED_METHODS.contains(&method.as_str()) {
            return Err(HttpToolError::InvalidMethod(method).into());
        }
        if !args.url.starts_with("https://") {
            return Err(HttpToolError::OnlyHttpsAllowed.into());
        }

        let method = reqwest::Method::from_bytes(method.as_bytes())
            .map_err(|e| ToolError::InvalidArgs(e.to_string()))?;
        let mut request = self.client.request(method.clone(), &args.url);
        for (key, value) in &args.headers {
            request = request.header(key, value);
        }
        if let Some(body) = args.body {
            request = request.body(body);
        }

        let started = Instant::now();
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                HttpToolError::RequestTimeout
            } else {
                HttpToolError::Transport(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| HttpToolError::Transport(e.to_string()))?;
        let logged: String = text.chars().take(self.config.log_body_cap).collect();
        let latency_ms = started.elapsed().as_millis();
        debug!(
            %request_id,
            agent_id = %ctx.caller,
            url = %args.url,
            method = %method,
            status,
            latency_ms,
            body_preview = %logged,
            "http_request completed"
        );

        Ok(serde_json::json!({ "status": status, "body": text }))
    }
}

impl From<HttpToolError> for ToolError {
    fn from(err: HttpToolError) -> Self {
        ToolError::InvalidArgs(err.to_string())
    }
}
