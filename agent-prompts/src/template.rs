//! Prompt templates with `{{variable}}` substitution.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Result alias for template operations.
pub type TemplateResult<T> = Result<T, TemplateError>;

/// Errors that can occur during template operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TemplateError {
    /// A referenced variable had no value and no default.
    #[error("missing required variable: {name}")]
    MissingVariable {
        /// Name of the missing variable.
        name: String,
    },

    /// The template text is malformed.
    #[error("invalid template: {reason}")]
    Parse {
        /// Reason for the failure.
        reason: String,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Text(String),
    Variable(String),
}

/// A prompt template with variable substitution.
///
/// Templates use `{{variable}}` placeholders; whitespace inside the braces is
/// ignored. Rendering is a single pass, so substituted values are never
/// scanned for further placeholders. Every referenced variable must be
/// supplied at render time or carry a default.
///
/// # Examples
///
/// ```
/// use agent_prompts::PromptTemplate;
///
/// let template = PromptTemplate::builder("Create a plan for: {{request}}")
///     .build()
///     .unwrap();
///
/// let rendered = template
///     .render_lookup(|name| (name == "request").then_some("a launch checklist"))
///     .unwrap();
/// assert_eq!(rendered, "Create a plan for: a launch checklist");
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(try_from = "TemplateSource", into = "TemplateSource")]
pub struct PromptTemplate {
    template: String,
    segments: Vec<Segment>,
    defaults: HashMap<String, String>,
}

#[derive(Serialize, Deserialize)]
struct TemplateSource {
    template: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    defaults: HashMap<String, String>,
}

impl TryFrom<TemplateSource> for PromptTemplate {
    type Error = TemplateError;

    fn try_from(source: TemplateSource) -> TemplateResult<Self> {
        Ok(Self {
            segments: parse(&source.template)?,
            template: source.template,
            defaults: source.defaults,
        })
    }
}

impl From<PromptTemplate> for TemplateSource {
    fn from(template: PromptTemplate) -> Self {
        Self {
            template: template.template,
            defaults: template.defaults,
        }
    }
}

impl PromptTemplate {
    /// Parses a template without defaults.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::Parse`] when a placeholder is unclosed or empty.
    pub fn parse(template: impl Into<String>) -> TemplateResult<Self> {
        Self::builder(template).build()
    }

    /// Returns a builder for constructing templates.
    #[must_use]
    pub fn builder(template: impl Into<String>) -> TemplateBuilder {
        TemplateBuilder::new(template)
    }

    /// Returns the distinct variable names referenced by the template, in
    /// order of first appearance.
    #[must_use]
    pub fn variables(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for segment in &self.segments {
            if let Segment::Variable(name) = segment {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Returns the default value of a variable if one is set.
    #[must_use]
    pub fn default_value(&self, name: &str) -> Option<&str> {
        self.defaults.get(name).map(String::as_str)
    }

    /// Renders the template using only its defaults.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::MissingVariable`] if a variable has no default.
    pub fn render(&self) -> TemplateResult<String> {
        self.render_lookup(|_| None)
    }

    /// Renders the template with runtime variables, which override defaults.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::MissingVariable`] if a variable is neither
    /// supplied nor defaulted.
    pub fn render_with(&self, runtime_vars: &HashMap<String, String>) -> TemplateResult<String> {
        self.render_lookup(|name| runtime_vars.get(name).map(String::as_str))
    }

    /// Renders the template, resolving each variable through `lookup` first
    /// and the defaults second.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::MissingVariable`] for the first variable that
    /// resolves to nothing.
    pub fn render_lookup<'a, F>(&'a self, lookup: F) -> TemplateResult<String>
    where
        F: Fn(&str) -> Option<&'a str>,
    {
        let mut rendered = String::with_capacity(self.template.len());
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => rendered.push_str(text),
                Segment::Variable(name) => {
                    let value = lookup(name)
                        .or_else(|| self.default_value(name))
                        .ok_or_else(|| TemplateError::MissingVariable { name: name.clone() })?;
                    rendered.push_str(value);
                }
            }
        }
        Ok(rendered)
    }

    /// Returns the raw template string.
    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }
}

impl fmt::Display for PromptTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.template)
    }
}

/// Builder for constructing prompt templates.
#[derive(Debug)]
pub struct TemplateBuilder {
    template: String,
    defaults: HashMap<String, String>,
}

impl TemplateBuilder {
    /// Creates a new builder with the supplied template text.
    #[must_use]
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            defaults: HashMap::new(),
        }
    }

    /// Sets a default value for a variable.
    #[must_use]
    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.defaults.insert(name.into(), value.into());
        self
    }

    /// Parses the template text.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::Parse`] when a placeholder is unclosed or empty.
    pub fn build(self) -> TemplateResult<PromptTemplate> {
        Ok(PromptTemplate {
            segments: parse(&self.template)?,
            template: self.template,
            defaults: self.defaults,
        })
    }
}

fn parse(template: &str) -> TemplateResult<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        if open > 0 {
            segments.push(Segment::Text(rest[..open].to_owned()));
        }
        let after_open = &rest[open + 2..];
        let close = after_open.find("}}").ok_or_else(|| TemplateError::Parse {
            reason: format!(
                "unclosed placeholder at byte {}",
                template.len() - rest.len() + open
            ),
        })?;

        let name = after_open[..close].trim();
        if name.is_empty() {
            return Err(TemplateError::Parse {
                reason: "empty placeholder `{{}}`".into(),
            });
        }
        if name.contains("{{") {
            return Err(TemplateError::Parse {
                reason: format!("nested placeholder in `{name}`"),
            });
        }
        segments.push(Segment::Variable(name.to_owned()));
        rest = &after_open[close + 2..];
    }

    if !rest.is_empty() {
        segments.push(Segment::Text(rest.to_owned()));
    }
    Ok(segments)
}
