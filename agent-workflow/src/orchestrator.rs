//! Sequential execution of stages over a shared context.

use std::collections::HashSet;
use std::fmt;
use std::future::{self, Future};
use std::pin::pin;
use std::sync::Arc;

use agent_primitives::RunId;
use tracing::{Instrument, debug, info_span};

use crate::context::{REQUEST_FIELD, WorkflowContext};
use crate::error::{StageError, WorkflowError, WorkflowResult};
use crate::observer::{WorkflowEvent, WorkflowObserver};
use crate::stage::Stage;
use crate::state::{RunEvent, RunLifecycle};

/// Runs a fixed list of stages strictly in order.
///
/// Each run owns its context; the workflow itself holds no per-run state, so
/// one instance may serve concurrent runs.
#[derive(Clone)]
pub struct SequentialWorkflow {
    name: String,
    stages: Vec<Stage>,
    observers: Vec<Arc<dyn WorkflowObserver>>,
}

impl fmt::Debug for SequentialWorkflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequentialWorkflow")
            .field("name", &self.name)
            .field("stages", &self.stages)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl SequentialWorkflow {
    /// Returns a builder for a workflow called `name`.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> WorkflowBuilder {
        WorkflowBuilder::new(name)
    }

    /// Workflow name, attached to run spans.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stages in execution order.
    #[must_use]
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Runs every stage for `request` and returns the last stage's output.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::StageFailed`] for the first stage whose prompt
    /// or agent fails; no later stage is invoked.
    pub async fn run(&self, request: &str) -> WorkflowResult<String> {
        let ctx = self.run_context(request).await?;
        Ok(ctx.last_output().unwrap_or_default().to_owned())
    }

    /// Like [`SequentialWorkflow::run`] but returns the whole final context.
    ///
    /// # Errors
    ///
    /// See [`SequentialWorkflow::run`].
    pub async fn run_context(&self, request: &str) -> WorkflowResult<WorkflowContext> {
        self.execute(request, future::pending()).await
    }

    /// Runs the workflow until it finishes or `cancel` resolves.
    ///
    /// Cancellation drops the in-flight agent call and starts no further
    /// stage.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Cancelled`] when `cancel` wins, otherwise as
    /// [`SequentialWorkflow::run`].
    pub async fn run_until<C>(&self, request: &str, cancel: C) -> WorkflowResult<String>
    where
        C: Future<Output = ()>,
    {
        let ctx = self.execute(request, cancel).await?;
        Ok(ctx.last_output().unwrap_or_default().to_owned())
    }

    async fn execute<C>(&self, request: &str, cancel: C) -> WorkflowResult<WorkflowContext>
    where
        C: Future<Output = ()>,
    {
        let run_id = RunId::random();
        let span = info_span!("workflow", workflow = %self.name, %run_id);
        self.execute_in_span(run_id, request, cancel)
            .instrument(span)
            .await
    }

    async fn execute_in_span<C>(
        &self,
        run_id: RunId,
        request: &str,
        cancel: C,
    ) -> WorkflowResult<WorkflowContext>
    where
        C: Future<Output = ()>,
    {
        let mut cancel = pin!(cancel);
        let mut lifecycle = RunLifecycle::new(run_id, self.stages.len());
        let mut ctx = WorkflowContext::new(request);

        self.emit(&WorkflowEvent::RunStarted {
            run_id,
            request: request.to_owned(),
        });

        for (index, stage) in self.stages.iter().enumerate() {
            lifecycle.transition(RunEvent::StartStage(index))?;
            self.emit(&WorkflowEvent::StageStarted {
                run_id,
                stage: stage.name().to_owned(),
                index,
            });

            let prompt = match stage.prompt().build(&ctx) {
                Ok(prompt) => prompt,
                Err(err) => {
                    lifecycle.transition(RunEvent::Fail)?;
                    return Err(self.stage_failed(run_id, index, stage, err.into()));
                }
            };
            debug!(stage = stage.name(), chars = prompt.len(), "stage prompt built");

            let result = tokio::select! {
                biased;
                () = &mut cancel => {
                    lifecycle.transition(RunEvent::Cancel)?;
                    self.emit(&WorkflowEvent::RunCancelled {
                        run_id,
                        stage: stage.name().to_owned(),
                    });
                    return Err(WorkflowError::Cancelled {
                        stage: stage.name().to_owned(),
                    });
                }
                result = stage.agent().run(&prompt) => result,
            };

            let output = match result {
                Ok(output) => output,
                Err(err) => {
                    lifecycle.transition(RunEvent::Fail)?;
                    return Err(self.stage_failed(run_id, index, stage, err.into()));
                }
            };

            ctx = ctx.with_output(stage.name(), output.as_str())?;
            self.emit(&WorkflowEvent::StageCompleted {
                run_id,
                stage: stage.name().to_owned(),
                index,
                output,
            });
        }

        lifecycle.transition(RunEvent::Finish)?;
        self.emit(&WorkflowEvent::RunCompleted { run_id });
        Ok(ctx)
    }

    fn stage_failed(
        &self,
        run_id: RunId,
        index: usize,
        stage: &Stage,
        source: StageError,
    ) -> WorkflowError {
        self.emit(&WorkflowEvent::StageFailed {
            run_id,
            stage: stage.name().to_owned(),
            index,
            error: source.to_string(),
        });
        WorkflowError::StageFailed {
            stage: stage.name().to_owned(),
            index,
            source,
        }
    }

    fn emit(&self, event: &WorkflowEvent) {
        for observer in &self.observers {
            observer.on_event(event);
        }
    }
}

/// Builder validating a stage list before it can run.
#[derive(Default)]
pub struct WorkflowBuilder {
    name: String,
    stages: Vec<Stage>,
    observers: Vec<Arc<dyn WorkflowObserver>>,
}

impl fmt::Debug for WorkflowBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowBuilder")
            .field("name", &self.name)
            .field("stages", &self.stages)
            .finish_non_exhaustive()
    }
}

impl WorkflowBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Appends a stage.
    #[must_use]
    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    /// Adds an observer notified of every run event.
    #[must_use]
    pub fn observer(mut self, observer: Arc<dyn WorkflowObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Validates the stages and builds the workflow.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::InvalidStage`] when there are no stages, a
    /// stage name is blank, reserved or repeated, or a template references a
    /// field that is neither `request` nor written by an earlier stage.
    pub fn build(self) -> WorkflowResult<SequentialWorkflow> {
        if self.stages.is_empty() {
            return Err(WorkflowError::invalid_stage("workflow needs at least one stage"));
        }

        let mut written: HashSet<&str> = HashSet::new();
        for stage in &self.stages {
            let name = stage.name();
            if name.trim().is_empty() {
                return Err(WorkflowError::invalid_stage("stage name cannot be empty"));
            }
            if name == REQUEST_FIELD {
                return Err(WorkflowError::invalid_stage(format!(
                    "stage name `{REQUEST_FIELD}` is reserved"
                )));
            }
            if written.contains(name) {
                return Err(WorkflowError::invalid_stage(format!(
                    "duplicate stage `{name}`"
                )));
            }
            for field in stage.prompt().references() {
                if field != REQUEST_FIELD && !written.contains(field) {
                    return Err(WorkflowError::invalid_stage(format!(
                        "stage `{name}` references `{field}`, which no earlier stage writes"
                    )));
                }
            }
            written.insert(name);
        }

        Ok(SequentialWorkflow {
            name: self.name,
            stages: self.stages,
            observers: self.observers,
        })
    }
}
