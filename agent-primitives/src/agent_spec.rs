//! Static agent configuration: persona name, instructions, and tool set.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const MAX_NAME_LEN: usize = 64;

/// Stateless description of an agent persona.
///
/// A spec is pure configuration, not a session: it carries no conversation
/// history and can be shared across any number of concurrent invocations.
/// The instruction text is reference counted so clones stay cheap.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSpec {
    name: String,
    instructions: Arc<str>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tools: Vec<String>,
}

impl AgentSpec {
    /// Starts building an [`AgentSpec`] with the supplied display name.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> AgentSpecBuilder {
        AgentSpecBuilder {
            name: name.into(),
            instructions: None,
            tools: Vec::new(),
        }
    }

    /// Returns the agent display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the system instructions sent with every request.
    #[must_use]
    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    /// Returns the names of the tools this agent may call, in declaration order.
    #[must_use]
    pub fn tools(&self) -> &[String] {
        &self.tools
    }

    /// Returns `true` when the agent declares at least one tool.
    #[must_use]
    pub fn has_tools(&self) -> bool {
        !self.tools.is_empty()
    }
}

/// Builder for [`AgentSpec`].
#[derive(Debug)]
pub struct AgentSpecBuilder {
    name: String,
    instructions: Option<String>,
    tools: Vec<String>,
}

impl AgentSpecBuilder {
    /// Sets the system instructions.
    #[must_use]
    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Declares a tool the agent is allowed to call.
    #[must_use]
    pub fn tool(mut self, name: impl Into<String>) -> Self {
        self.tools.push(name.into());
        self
    }

    /// Declares several tools at once.
    #[must_use]
    pub fn tools<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools.extend(names.into_iter().map(Into::into));
        self
    }

    /// Consumes the builder and validates the persona.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAgentSpec`] when the name is empty or too long,
    /// the instructions are missing or blank, or a tool is declared twice.
    pub fn build(self) -> Result<AgentSpec> {
        let name = self.name.trim().to_owned();
        if name.is_empty() {
            return Err(Error::invalid_spec("agent name cannot be empty"));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(Error::invalid_spec(format!(
                "agent name length must be <= {MAX_NAME_LEN}"
            )));
        }

        let instructions = self
            .instructions
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| Error::invalid_spec(format!("agent `{name}` requires instructions")))?;

        let mut seen = std::collections::HashSet::new();
        for tool in &self.tools {
            if tool.trim().is_empty() {
                return Err(Error::invalid_spec("tool name cannot be empty"));
            }
            if !seen.insert(tool.as_str()) {
                return Err(Error::invalid_spec(format!(
                    "tool `{tool}` declared twice for agent `{name}`"
                )));
            }
        }

        Ok(AgentSpec {
            name,
            instructions: Arc::from(instructions),
            tools: self.tools,
        })
    }
}
