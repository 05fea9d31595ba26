//! Runtime configuration and the LLM service registry.
//!
//! Follows the `message_router::config`'s `development()`/`production()`
//! preset style, adapted from router-tuning knobs to the handful of values
//! this runtime actually exposes: the global concurrency cap, the tool-call
//! round budget, retry counts, and the dispatch tick interval. The service
//! registry (`ServiceRegistry`) loads the `llmservices.json` shape the
//! collaborator is expected to provide, defaulting missing `capabilities` to
//! text-only.

use crate::content_router::Capabilities;
use crate::domain_types::{
    LlmServiceId, MaxConcurrentRequests, MaxRetries, MaxToolRounds,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field failed validation.
    #[error("invalid configuration: {field} - {reason}")]
    Validation {
        /// The offending field.
        field: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The service registry file could not be read.
    #[error("io error reading service registry: {0}")]
    Io(#[from] std::io::Error),

    /// The service registry file was not valid JSON.
    #[error("malformed service registry: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Top-level runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Global cap on concurrent in-flight LLM requests.
    pub max_concurrent_requests: MaxConcurrentRequests,
    /// Tool-call round budget per inbound message.
    pub max_tool_rounds: MaxToolRounds,
    /// Retry attempts for a failing LLM call.
    pub max_retries: MaxRetries,
    /// How often the dispatch loop flushes delayed messages and sweeps
    /// active agents for pending work.
    pub dispatch_tick_ms: u64,
    /// How long `Runtime::shutdown` waits for in-flight work to drain.
    pub shutdown_drain_ms: u64,
    /// Whether structured logs are emitted as JSON (production) or
    /// human-readable (development).
    pub json_logs: bool,
}

impl RuntimeConfig {
    /// Development preset: short intervals, human-readable logs, low
    /// concurrency so behavior is easy to follow in a terminal.
    #[must_use]
    pub fn development() -> Self {
        Self {
            max_concurrent_requests: MaxConcurrentRequests::try_new(2)
                .expect("2 is within bounds"),
            max_tool_rounds: MaxToolRounds::default(),
            max_retries: MaxRetries::default(),
            dispatch_tick_ms: 50,
            shutdown_drain_ms: 5_000,
            json_logs: false,
        }
    }

    /// Production preset: higher concurrency, JSON logs, a more patient
    /// shutdown drain.
    #[must_use]
    pub fn production() -> Self {
        Self {
            max_concurrent_requests: MaxConcurrentRequests::try_new(32)
                .expect("32 is within bounds"),
            max_tool_rounds: MaxToolRounds::default(),
            max_retries: MaxRetries::default(),
            dispatch_tick_ms: 50,
            shutdown_drain_ms: 30_000,
            json_logs: true,
        }
    }

    /// The dispatch tick interval as a `Duration`.
    #[must_use]
    pub fn dispatch_tick(&self) -> Duration {
        Duration::from_millis(self.dispatch_tick_ms)
    }

    /// The shutdown drain timeout as a `Duration`.
    #[must_use]
    pub fn shutdown_drain(&self) -> Duration {
        Duration::from_millis(self.shutdown_drain_ms)
    }

    /// Validates the configuration for internally-consistent, reasonable
    /// values beyond what the newtypes already enforce.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dispatch_tick_ms == 0 {
            return Err(ConfigError::Validation {
                field: "dispatch_tick_ms".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.shutdown_drain_ms < self.dispatch_tick_ms {
            return Err(ConfigError::Validation {
                field: "shutdown_drain_ms".to_string(),
                reason: "must be at least one dispatch tick".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::development()
    }
}

/// One entry in the LLM service registry (`llmservices.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEntry {
    /// Identifier roles reference via `llm_service_id`.
    pub id: LlmServiceId,
    /// Human-readable name.
    pub name: String,
    /// Base URL of the provider endpoint.
    pub base_url: String,
    /// Model identifier to request.
    pub model: String,
    /// API key, kept out of logs by callers.
    pub api_key: String,
    /// Content capabilities this service's model supports; defaults to
    /// text-only when the registry entry omits it.
    #[serde(default)]
    pub capabilities: Capabilities,
    /// Free-form capability tags for operator-facing filtering.
    #[serde(default)]
    pub capability_tags: Vec<String>,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
}

/// The loaded LLM service registry, keyed by service ID.
#[derive(Debug, Clone, Default)]
pub struct ServiceRegistry {
    entries: HashMap<LlmServiceId, ServiceEntry>,
}

impl ServiceRegistry {
    /// Loads a registry from a `llmservices.json`-shaped file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Parses a registry from a JSON string (an array of `ServiceEntry`).
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let entries: Vec<ServiceEntry> = serde_json::from_str(raw)?;
        Ok(Self {
            entries: entries.into_iter().map(|e| (e.id.clone(), e)).collect(),
        })
    }

    /// Looks up a service entry by ID.
    #[must_use]
    pub fn get(&self, id: &LlmServiceId) -> Option<&ServiceEntry> {
        self.entries.get(id)
    }

    /// Every registered service.
    #[must_use]
    pub fn entries(&self) -> Vec<&ServiceEntry> {
        self.entries.values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn production_has_higher_concurrency_than_development() {
        let dev = RuntimeConfig::development();
        let prod = RuntimeConfig::production();
        assert!(prod.max_concurrent_requests.as_usize() > dev.max_concurrent_requests.as_usize());
    }

    #[test]
    fn zero_tick_interval_fails_validation() {
        let mut config = RuntimeConfig::development();
        config.dispatch_tick_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_capabilities_default_to_text_only() {
        let raw = r#"[{"id":"svc-a","name":"A","base_url":"https://example.com","model":"m","api_key":"k"}]"#;
        let registry = ServiceRegistry::from_json(raw).unwrap();
        let entry = registry.get(&LlmServiceId::try_new("svc-a").unwrap()).unwrap();
        assert!(entry.capabilities.input.contains("text"));
        assert!(entry.capabilities.output.contains("text"));
    }
}
