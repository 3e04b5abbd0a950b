//! Agent execution kernel.
//!
//! An [`Agent`] pairs a stateless [`AgentSpec`](agent_primitives::AgentSpec)
//! with a model adapter and the tools it declares, and answers one prompt per
//! call, looping through tool calls until the model replies with text.
//! Anything else that can answer prompts implements [`AgentRunner`]; closures
//! do so via [`agent_fn`]. [`AdmissionLimit`] caps how many calls run at once.

#![warn(missing_docs, clippy::pedantic)]

mod admission;
mod agent;

pub use admission::{AdmissionConfig, AdmissionError, AdmissionLimit, AdmissionResult};
pub use agent::{
    Agent, AgentBuilder, AgentError, AgentResult, AgentRunner, CallOutcome, CallOutcomeSink,
    CollectingSink, DEFAULT_MAX_TOOL_ROUNDS, FnAgent, ToolCallRecord, TracingCallSink, agent_fn,
};
