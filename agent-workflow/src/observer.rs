//! Progress events emitted while a workflow runs.

use std::sync::{Arc, Mutex};

use agent_primitives::RunId;
use tracing::{info, warn};

/// Something observable that happened during a run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkflowEvent {
    /// The run was accepted and is about to start its first stage.
    RunStarted {
        /// Run identifier.
        run_id: RunId,
        /// Original request.
        request: String,
    },
    /// A stage is about to call its agent.
    StageStarted {
        /// Run identifier.
        run_id: RunId,
        /// Stage name.
        stage: String,
        /// Zero-based stage index.
        index: usize,
    },
    /// A stage recorded its output.
    StageCompleted {
        /// Run identifier.
        run_id: RunId,
        /// Stage name.
        stage: String,
        /// Zero-based stage index.
        index: usize,
        /// Text written to the context.
        output: String,
    },
    /// A stage failed and the run stopped.
    StageFailed {
        /// Run identifier.
        run_id: RunId,
        /// Stage name.
        stage: String,
        /// Zero-based stage index.
        index: usize,
        /// Rendered error.
        error: String,
    },
    /// Every stage completed.
    RunCompleted {
        /// Run identifier.
        run_id: RunId,
    },
    /// The run was cancelled while `stage` was in flight.
    RunCancelled {
        /// Run identifier.
        run_id: RunId,
        /// Stage that was interrupted.
        stage: String,
    },
}

impl WorkflowEvent {
    /// Run the event belongs to.
    #[must_use]
    pub const fn run_id(&self) -> RunId {
        match self {
            Self::RunStarted { run_id, .. }
            | Self::StageStarted { run_id, .. }
            | Self::StageCompleted { run_id, .. }
            | Self::StageFailed { run_id, .. }
            | Self::RunCompleted { run_id }
            | Self::RunCancelled { run_id, .. } => *run_id,
        }
    }
}

/// Receives workflow events; closures implement it directly.
pub trait WorkflowObserver: Send + Sync {
    /// Handles one event. Called inline, in event order.
    fn on_event(&self, event: &WorkflowEvent);
}

impl<F> WorkflowObserver for F
where
    F: Fn(&WorkflowEvent) + Send + Sync,
{
    fn on_event(&self, event: &WorkflowEvent) {
        self(event);
    }
}

/// Observer that logs progress to tracing.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl WorkflowObserver for TracingObserver {
    fn on_event(&self, event: &WorkflowEvent) {
        match event {
            WorkflowEvent::RunStarted { .. } => info!("workflow run started"),
            WorkflowEvent::StageStarted { stage, index, .. } => {
                info!(stage = %stage, phase = index + 1, "stage started");
            }
            WorkflowEvent::StageCompleted { stage, output, .. } => {
                info!(stage = %stage, chars = output.len(), "stage completed");
            }
            WorkflowEvent::StageFailed { stage, error, .. } => {
                warn!(stage = %stage, error = %error, "stage failed");
            }
            WorkflowEvent::RunCompleted { .. } => info!("workflow run completed"),
            WorkflowEvent::RunCancelled { stage, .. } => {
                warn!(stage = %stage, "workflow run cancelled");
            }
        }
    }
}

/// Observer used during testing to capture events.
#[derive(Debug, Default)]
pub struct CollectingObserver {
    events: Mutex<Vec<WorkflowEvent>>,
}

impl CollectingObserver {
    /// Creates a new collecting observer.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns and clears the collected events.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex has been poisoned by a previous panic.
    #[must_use]
    pub fn drain(&self) -> Vec<WorkflowEvent> {
        let mut lock = self.events.lock().expect("collecting observer poisoned");
        lock.drain(..).collect()
    }
}

impl WorkflowObserver for CollectingObserver {
    fn on_event(&self, event: &WorkflowEvent) {
        self.events
            .lock()
            .expect("collecting observer poisoned")
            .push(event.clone());
    }
}
