//! Per-run context snapshots.

use std::sync::Arc;

use crate::error::{WorkflowError, WorkflowResult};

/// Field name under which the original request is addressable.
pub const REQUEST_FIELD: &str = "request";

/// The request of one run plus every stage output recorded so far.
///
/// Snapshots are immutable. [`WorkflowContext::with_output`] returns the next
/// snapshot and refuses to overwrite a field, so each field is written at most
/// once per run. Cloning is cheap: text is shared behind [`Arc`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkflowContext {
    request: Arc<str>,
    outputs: Vec<(String, Arc<str>)>,
}

impl WorkflowContext {
    /// Starts a context holding only `request`.
    #[must_use]
    pub fn new(request: impl Into<Arc<str>>) -> Self {
        Self {
            request: request.into(),
            outputs: Vec::new(),
        }
    }

    /// Returns the original request.
    #[must_use]
    pub fn request(&self) -> &str {
        &self.request
    }

    /// Resolves a field by name; `request` maps to the original request.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&str> {
        if field == REQUEST_FIELD {
            return Some(self.request());
        }
        self.output(field)
    }

    /// Returns the output recorded by `stage`, if it has run.
    #[must_use]
    pub fn output(&self, stage: &str) -> Option<&str> {
        self.outputs
            .iter()
            .find(|(name, _)| name == stage)
            .map(|(_, output)| &**output)
    }

    /// Iterates over recorded outputs in the order they were written.
    pub fn outputs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.outputs
            .iter()
            .map(|(name, output)| (name.as_str(), &**output))
    }

    /// Returns the most recently written output.
    #[must_use]
    pub fn last_output(&self) -> Option<&str> {
        self.outputs.last().map(|(_, output)| &**output)
    }

    /// Returns the next snapshot with `output` recorded under `stage`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::FieldAlreadyWritten`] if `stage` already has an
    /// output or names the request field.
    pub fn with_output(
        &self,
        stage: impl Into<String>,
        output: impl Into<Arc<str>>,
    ) -> WorkflowResult<Self> {
        let stage = stage.into();
        if stage == REQUEST_FIELD || self.output(&stage).is_some() {
            return Err(WorkflowError::FieldAlreadyWritten { field: stage });
        }
        let mut next = self.clone();
        next.outputs.push((stage, output.into()));
        Ok(next)
    }
}
