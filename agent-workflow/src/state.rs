//! Run state machine: `Init → Running(0) → … → Running(n-1) → Done`, with
//! `Failed` and `Cancelled` as the other terminal states.

use agent_primitives::RunId;
use tracing::debug;

use crate::error::{WorkflowError, WorkflowResult};

/// States a workflow run can occupy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Run created, no stage started yet.
    Init,
    /// The stage at `stage` (zero-based) is executing.
    Running {
        /// Index of the executing stage.
        stage: usize,
    },
    /// Every stage completed.
    Done,
    /// A stage failed; the run is over.
    Failed,
    /// The run was cancelled before completing.
    Cancelled,
}

impl RunState {
    /// Returns `true` for `Done`, `Failed` and `Cancelled`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Cancelled)
    }
}

/// Events that move a run between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunEvent {
    /// Begin the stage at the given index.
    StartStage(usize),
    /// The last stage completed.
    Finish,
    /// The running stage failed.
    Fail,
    /// Cancellation arrived.
    Cancel,
}

/// Tracks the state of one run over a fixed number of stages.
#[derive(Debug, Clone, Copy)]
pub struct RunLifecycle {
    run_id: RunId,
    stages: usize,
    state: RunState,
}

impl RunLifecycle {
    /// Creates a lifecycle in [`RunState::Init`].
    #[must_use]
    pub const fn new(run_id: RunId, stages: usize) -> Self {
        Self {
            run_id,
            stages,
            state: RunState::Init,
        }
    }

    /// Returns the run this lifecycle belongs to.
    #[must_use]
    pub const fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> RunState {
        self.state
    }

    /// Applies `event`, returning the new state.
    ///
    /// Stages must start strictly in order and `Finish` is only accepted
    /// while the last stage runs. Terminal states accept nothing.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::InvalidTransition`] when `event` is not
    /// allowed from the current state.
    pub fn transition(&mut self, event: RunEvent) -> WorkflowResult<RunState> {
        let next = match (self.state, event) {
            (RunState::Init, RunEvent::StartStage(0)) if self.stages > 0 => {
                Some(RunState::Running { stage: 0 })
            }
            (RunState::Running { stage }, RunEvent::StartStage(next))
                if next == stage + 1 && next < self.stages =>
            {
                Some(RunState::Running { stage: next })
            }
            (RunState::Running { stage }, RunEvent::Finish) if stage + 1 == self.stages => {
                Some(RunState::Done)
            }
            (RunState::Running { .. }, RunEvent::Fail) => Some(RunState::Failed),
            (RunState::Init | RunState::Running { .. }, RunEvent::Cancel) => {
                Some(RunState::Cancelled)
            }
            _ => None,
        };

        let Some(next_state) = next else {
            return Err(WorkflowError::InvalidTransition {
                from: self.state,
                event,
            });
        };

        debug!(
            run_id = %self.run_id,
            ?self.state,
            ?next_state,
            ?event,
            "workflow run transition"
        );
        self.state = next_state;
        Ok(next_state)
    }
}
