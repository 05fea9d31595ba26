//! Tracing initialization.
//!
//! One place to build the `tracing_subscriber` setup so `main.rs` and
//! integration tests configure logging identically: an `EnvFilter` seeded
//! from `RUST_LOG` (defaulting to `agor=info`), human-readable output in
//! development and newline-delimited JSON in production, matching
//! `RuntimeConfig::json_logs`.

use thiserror::Error;

/// Errors building the tracing subscriber.
#[derive(Debug, Error)]
pub enum ObservabilityError {
    /// The default directive failed to parse (should not happen for a
    /// literal constant, but `EnvFilter::Directive` parsing is fallible).
    #[error("invalid log filter directive: {0}")]
    InvalidDirective(#[from] tracing_subscriber::filter::ParseError),
}

/// Installs the global tracing subscriber. Must be called at most once per
/// process, before any `tracing` macros are used.
pub fn init_tracing(json_logs: bool) -> Result<(), ObservabilityError> {
    let filter =
        tracing_subscriber::EnvFilter::from_default_env().add_directive("agor=info".parse()?);

    if json_logs {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}
