//! Tool registration, schema validation and dispatch.
//!
//! Tools are named, schema-described async functions an agent may call
//! mid-conversation. The [`ToolRegistry`] validates model-issued arguments
//! against each tool's [`ToolDefinition`] before the handler runs, and its
//! [`ToolRegistry::dispatch`] never fails: every problem comes back as a
//! [`ToolOutcome::Failure`] the model can read.

#![warn(missing_docs, clippy::pedantic)]

pub mod builtin;
pub mod registry;
pub mod schema;

pub use registry::{
    Tool, ToolError, ToolHandler, ToolInvocationRequest, ToolOutcome, ToolRegistry, ToolResult,
};
pub use schema::{ParamType, ParameterSpec, ToolArgs, ToolDefinition, UnknownArgumentPolicy};
