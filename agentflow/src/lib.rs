//! Tool-calling agents and sequential multi-agent workflows.
//!
//! This crate bundles the runtime crates behind feature flags so downstream
//! users can enable or disable components as needed.

#![warn(missing_docs, clippy::pedantic)]

/// Re-export shared primitives for convenience.
pub use agent_primitives as primitives;

/// Agent execution loop (enabled by `kernel` feature).
#[cfg(feature = "kernel")]
pub use agent_kernel as kernel;

/// Model and search service adapters (enabled by `adapters` feature).
#[cfg(feature = "adapters")]
pub use agent_adapters as adapters;

/// Tool registry and built-in tools (enabled by `tools` feature).
#[cfg(feature = "tools")]
pub use agent_tools as tools;

/// Tracing setup (enabled by `telemetry` feature).
#[cfg(feature = "telemetry")]
pub use agent_telemetry as telemetry;

/// Prompt templates (enabled by `prompts` feature).
#[cfg(feature = "prompts")]
pub use agent_prompts as prompts;

/// Environment configuration (enabled by `config` feature).
#[cfg(feature = "config")]
pub use agent_config as config;

/// Sequential workflows (enabled by `workflow` feature).
#[cfg(feature = "workflow")]
pub use agent_workflow as workflow;

#[cfg(feature = "connect")]
pub mod connect;

#[cfg(feature = "repl")]
pub mod repl;
