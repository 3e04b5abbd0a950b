//! Core shared types for agentflow agents and workflows.

#![warn(missing_docs, clippy::pedantic)]

mod agent_spec;
mod error;
mod ids;

/// Static agent persona configuration.
pub use agent_spec::{AgentSpec, AgentSpecBuilder};
/// Error type and result alias shared by the primitives.
pub use error::{Error, Result};
/// Identifier attached to each workflow run.
pub use ids::RunId;
