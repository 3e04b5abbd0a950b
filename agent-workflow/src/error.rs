use agent_kernel::AgentError;
use agent_prompts::TemplateError;
use thiserror::Error;

use crate::state::{RunEvent, RunState};

/// Result alias for workflow operations.
pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// Why a single stage could not produce its output.
#[derive(Debug, Error)]
pub enum StageError {
    /// The stage prompt could not be rendered from the context.
    #[error(transparent)]
    Prompt(#[from] TemplateError),

    /// The stage agent failed.
    #[error(transparent)]
    Agent(#[from] AgentError),
}

/// Errors produced while assembling or running a workflow.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// The workflow definition was rejected at build time.
    #[error("invalid workflow stage: {reason}")]
    InvalidStage {
        /// Why the stage list is unusable.
        reason: String,
    },

    /// A stage failed; no later stage ran.
    #[error("stage `{stage}` (#{index}) failed: {source}")]
    StageFailed {
        /// Name of the failing stage.
        stage: String,
        /// Zero-based position of the failing stage.
        index: usize,
        /// What went wrong.
        #[source]
        source: StageError,
    },

    /// The run was cancelled while `stage` was in flight.
    #[error("workflow cancelled during stage `{stage}`")]
    Cancelled {
        /// Stage that was running when cancellation arrived.
        stage: String,
    },

    /// A context field was written twice.
    #[error("context field `{field}` already written")]
    FieldAlreadyWritten {
        /// Offending field.
        field: String,
    },

    /// The run state machine rejected an event.
    #[error("invalid run transition from {from:?} via {event:?}")]
    InvalidTransition {
        /// State before the event.
        from: RunState,
        /// Rejected event.
        event: RunEvent,
    },

    /// A preset could not construct one of its agents.
    #[error("failed to set up agent `{agent}`: {source}")]
    AgentSetup {
        /// Persona that could not be built.
        agent: String,
        /// Underlying error.
        #[source]
        source: AgentError,
    },
}

impl WorkflowError {
    pub(crate) fn invalid_stage(reason: impl Into<String>) -> Self {
        Self::InvalidStage {
            reason: reason.into(),
        }
    }
}
