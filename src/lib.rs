//! # agor — a runtime for hosting and orchestrating societies of LLM-backed agents
//!
//! Agents are organized by role in a tree rooted at the built-in `root`
//! system role, communicate exclusively through the [`bus`] Message Bus,
//! and carry out inbound instructions by running the [`tool_loop`]
//! tool-call loop against an [`llm_client::LlmClient`]. The [`dispatcher`]
//! ties messages, agents and behaviors together; [`runtime`] assembles a
//! whole running task from the individual subsystems.
//!
//! File-format persistence, the HTTP/REST surface, and the LLM wire
//! format are treated as external collaborators: this crate models their
//! contracts ([`config`], [`role_resolver`], [`llm_client`]) without
//! implementing the collaborator itself. [`server`] wires a minimal Axum
//! surface over [`runtime::Runtime`] for local use and integration
//! testing.

pub mod bus;
pub mod concurrency;
pub mod config;
pub mod content_router;
pub mod conversation_store;
pub mod dispatcher;
pub mod domain;
pub mod domain_types;
pub mod error;
pub mod llm_client;
pub mod observability;
pub mod registry;
pub mod role_resolver;
pub mod runtime;
pub mod server;
pub mod time_provider;
pub mod tool_loop;
pub mod tools;

pub use crate::error::CoreError;
pub use crate::runtime::Runtime;
