//! Workflow stages: an agent plus the rule that builds its prompt.

use std::fmt;
use std::sync::Arc;

use agent_kernel::AgentRunner;
use agent_prompts::{PromptTemplate, TemplateResult};

use crate::context::WorkflowContext;

type PromptFn = dyn Fn(&WorkflowContext) -> String + Send + Sync;

/// Builds a stage prompt from the context snapshot.
#[derive(Clone)]
pub enum PromptBuilder {
    /// Template whose variables name `request` or earlier stages.
    Template(PromptTemplate),
    /// Arbitrary function of the context.
    Custom(Arc<PromptFn>),
}

impl PromptBuilder {
    /// Parses `text` as a `{{variable}}` template.
    ///
    /// # Errors
    ///
    /// Returns the parse error for malformed placeholders.
    pub fn template(text: impl Into<String>) -> TemplateResult<Self> {
        PromptTemplate::parse(text).map(Self::Template)
    }

    /// Wraps a closure over the context.
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&WorkflowContext) -> String + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(f))
    }

    /// Renders the prompt for `ctx`.
    ///
    /// # Errors
    ///
    /// Returns [`agent_prompts::TemplateError::MissingVariable`] when a
    /// template references a field the context does not hold.
    pub fn build(&self, ctx: &WorkflowContext) -> TemplateResult<String> {
        match self {
            Self::Template(template) => template.render_lookup(|name| ctx.get(name)),
            Self::Custom(f) => Ok(f(ctx)),
        }
    }

    /// Context fields the builder reads; empty for closures, which cannot be
    /// inspected.
    #[must_use]
    pub fn references(&self) -> Vec<&str> {
        match self {
            Self::Template(template) => template.variables(),
            Self::Custom(_) => Vec::new(),
        }
    }
}

impl fmt::Debug for PromptBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Template(template) => f.debug_tuple("Template").field(&template.template()).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl From<PromptTemplate> for PromptBuilder {
    fn from(template: PromptTemplate) -> Self {
        Self::Template(template)
    }
}

/// One step of a workflow; its name is the context field it writes.
#[derive(Clone)]
pub struct Stage {
    name: String,
    agent: Arc<dyn AgentRunner>,
    prompt: PromptBuilder,
}

impl Stage {
    /// Creates a stage writing `name` with `agent`'s answer to `prompt`.
    pub fn new(
        name: impl Into<String>,
        agent: Arc<dyn AgentRunner>,
        prompt: impl Into<PromptBuilder>,
    ) -> Self {
        Self {
            name: name.into(),
            agent,
            prompt: prompt.into(),
        }
    }

    /// Context field this stage writes.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Agent invoked by the stage.
    #[must_use]
    pub fn agent(&self) -> &Arc<dyn AgentRunner> {
        &self.agent
    }

    /// Prompt rule of the stage.
    #[must_use]
    pub fn prompt(&self) -> &PromptBuilder {
        &self.prompt
    }
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("name", &self.name)
            .field("agent", &self.agent.spec().name())
            .field("prompt", &self.prompt)
            .finish()
    }
}
