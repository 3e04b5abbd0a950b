//! Sequential multi-agent workflows.
//!
//! A [`SequentialWorkflow`] runs its [`Stage`]s strictly in order. Each stage
//! renders a prompt from the current [`WorkflowContext`] snapshot, asks its
//! agent, and records the answer under its own name; the next stage sees the
//! new snapshot. The first failure ends the run and no later stage is called.
//!
//! ```
//! use std::sync::Arc;
//!
//! use agent_kernel::{AgentError, agent_fn};
//! use agent_primitives::AgentSpec;
//! use agent_workflow::{PromptBuilder, SequentialWorkflow, Stage};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let shout = AgentSpec::builder("Shouter").instructions("Shout.").build()?;
//! let agent = Arc::new(agent_fn(shout, |prompt: String| async move {
//!     Ok::<_, AgentError>(prompt.to_uppercase())
//! }));
//!
//! let workflow = SequentialWorkflow::builder("shout")
//!     .stage(Stage::new("loud", agent, PromptBuilder::template("say {{request}}")?))
//!     .build()?;
//!
//! assert_eq!(workflow.run("hi").await?, "SAY HI");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs, clippy::pedantic)]

mod context;
mod error;
mod observer;
mod orchestrator;
pub mod pipeline;
mod stage;
mod state;

pub use context::{REQUEST_FIELD, WorkflowContext};
pub use error::{StageError, WorkflowError, WorkflowResult};
pub use observer::{CollectingObserver, TracingObserver, WorkflowEvent, WorkflowObserver};
pub use orchestrator::{SequentialWorkflow, WorkflowBuilder};
pub use pipeline::research_pipeline;
pub use stage::{PromptBuilder, Stage};
pub use state::{RunEvent, RunLifecycle, RunState};
