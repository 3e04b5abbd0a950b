//! Runtime registry for tool metadata and dispatch.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::{debug, warn};

use crate::schema::{ToolArgs, ToolDefinition, UnknownArgumentPolicy};

/// Result alias for tool operations.
pub type ToolResult<T> = Result<T, ToolError>;

/// Trait implemented by tool handlers.
///
/// Handlers receive arguments that already passed schema validation.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Executes the tool.
    async fn call(&self, args: ToolArgs) -> ToolResult<Value>;
}

#[async_trait]
impl<F, Fut> ToolHandler for F
where
    F: Send + Sync + Fn(ToolArgs) -> Fut,
    Fut: Future<Output = ToolResult<Value>> + Send,
{
    async fn call(&self, args: ToolArgs) -> ToolResult<Value> {
        (self)(args).await
    }
}

/// A named, schema-described tool. Immutable once constructed.
#[derive(Clone)]
pub struct Tool {
    definition: ToolDefinition,
    handler: Arc<dyn ToolHandler>,
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.definition.name())
            .field("parameters", &self.definition.parameters().len())
            .finish_non_exhaustive()
    }
}

impl Tool {
    /// Pairs a definition with its handler.
    pub fn new<H>(definition: ToolDefinition, handler: H) -> Self
    where
        H: ToolHandler + 'static,
    {
        Self {
            definition,
            handler: Arc::new(handler),
        }
    }

    /// Returns the tool definition.
    #[must_use]
    pub fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    /// Returns the tool name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.definition.name()
    }

    /// Validates `raw` against the schema and runs the handler.
    ///
    /// A panic inside the handler is caught and reported as
    /// [`ToolError::Execution`].
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidArguments`] when validation fails, or the
    /// handler's error when execution fails.
    pub async fn call(
        &self,
        raw: &Map<String, Value>,
        policy: UnknownArgumentPolicy,
    ) -> ToolResult<Value> {
        let args = self.definition.validate(raw, policy)?;
        AssertUnwindSafe(self.handler.call(args))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| {
                Err(ToolError::execution(format!(
                    "tool `{}` panicked: {}",
                    self.name(),
                    panic_message(payload.as_ref())
                )))
            })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// A tool call emitted by the remote model.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolInvocationRequest {
    name: String,
    arguments: Map<String, Value>,
}

impl ToolInvocationRequest {
    /// Creates a request from an argument map.
    #[must_use]
    pub fn new(name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }

    /// Creates a request from a JSON value, which must be an object or `null`.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidArguments`] when `arguments` is neither an
    /// object nor `null`.
    pub fn from_value(name: impl Into<String>, arguments: Value) -> ToolResult<Self> {
        let name = name.into();
        match arguments {
            Value::Object(map) => Ok(Self::new(name, map)),
            Value::Null => Ok(Self::new(name, Map::new())),
            other => Err(ToolError::InvalidArguments {
                tool: name,
                reason: format!("arguments must be a JSON object, got `{other}`"),
            }),
        }
    }

    /// Parses the JSON-encoded argument string most model APIs emit.
    /// An empty string means no arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidArguments`] when the string is not a JSON
    /// object.
    pub fn from_json(name: impl Into<String>, arguments: &str) -> ToolResult<Self> {
        let name = name.into();
        if arguments.trim().is_empty() {
            return Ok(Self::new(name, Map::new()));
        }
        let value = serde_json::from_str::<Value>(arguments).map_err(|err| {
            ToolError::InvalidArguments {
                tool: name.clone(),
                reason: format!("arguments are not valid JSON: {err}"),
            }
        })?;
        Self::from_value(name, value)
    }

    /// Returns the requested tool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the raw, unvalidated arguments.
    #[must_use]
    pub fn arguments(&self) -> &Map<String, Value> {
        &self.arguments
    }
}

/// Result of a dispatch, always materialised as data.
#[derive(Clone, Debug, PartialEq)]
pub enum ToolOutcome {
    /// The tool ran and produced a value.
    Success(Value),
    /// The tool was unknown, rejected its arguments, or failed.
    Failure(String),
}

impl ToolOutcome {
    /// Returns `true` for [`ToolOutcome::Success`].
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Returns the success value, if any.
    #[must_use]
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Success(value) => Some(value),
            Self::Failure(_) => None,
        }
    }

    /// Returns the failure message, if any.
    #[must_use]
    pub fn failure(&self) -> Option<&str> {
        match self {
            Self::Success(_) => None,
            Self::Failure(message) => Some(message),
        }
    }

    /// Renders the outcome as the content of a `tool` message.
    ///
    /// String values are passed through verbatim, other values as JSON, and
    /// failures as `{"error": "<message>"}` so the model can react to them.
    #[must_use]
    pub fn to_model_content(&self) -> String {
        match self {
            Self::Success(Value::String(text)) => text.clone(),
            Self::Success(value) => value.to_string(),
            Self::Failure(message) => json!({ "error": message }).to_string(),
        }
    }
}

impl From<ToolResult<Value>> for ToolOutcome {
    fn from(result: ToolResult<Value>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(err) => Self::Failure(err.failure_message()),
        }
    }
}

#[derive(Default)]
struct Entries {
    tools: Vec<Tool>,
    index: HashMap<String, usize>,
}

/// Registry that stores tools in registration order and dispatches calls.
///
/// Registration takes `&self` so a registry can be filled after being wrapped
/// in an `Arc`; after start-up it is only read.
#[derive(Default)]
pub struct ToolRegistry {
    entries: RwLock<Entries>,
    unknown_arguments: UnknownArgumentPolicy,
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let names: Vec<_> = entries.tools.iter().map(Tool::name).collect();
        f.debug_struct("ToolRegistry")
            .field("registered", &names)
            .field("unknown_arguments", &self.unknown_arguments)
            .finish()
    }
}

impl ToolRegistry {
    /// Creates an empty registry that ignores undeclared argument keys.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the policy for argument keys the schema does not declare.
    #[must_use]
    pub fn with_unknown_argument_policy(mut self, policy: UnknownArgumentPolicy) -> Self {
        self.unknown_arguments = policy;
        self
    }

    /// Returns the configured unknown-argument policy.
    #[must_use]
    pub const fn unknown_argument_policy(&self) -> UnknownArgumentPolicy {
        self.unknown_arguments
    }

    /// Registers a tool.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::DuplicateTool`] if the name is already present; the
    /// registry is left unchanged.
    pub fn register(&self, tool: Tool) -> ToolResult<()> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let name = tool.name().to_owned();
        if entries.index.contains_key(&name) {
            return Err(ToolError::DuplicateTool { name });
        }

        debug!(tool = %name, "registered tool");
        let position = entries.tools.len();
        entries.tools.push(tool);
        entries.index.insert(name, position);
        Ok(())
    }

    /// Registers a handler under the supplied definition.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::DuplicateTool`] if the name is already present.
    pub fn register_fn<H>(&self, definition: ToolDefinition, handler: H) -> ToolResult<()>
    where
        H: ToolHandler + 'static,
    {
        self.register(Tool::new(definition, handler))
    }

    /// Returns the tool registered under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Tool> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .index
            .get(name)
            .map(|&position| entries.tools[position].clone())
    }

    /// Returns `true` when a tool named `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.index.contains_key(name)
    }

    /// Returns the number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.tools.len()
    }

    /// Returns `true` when no tools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lists every tool definition in registration order.
    #[must_use]
    pub fn describe_all(&self) -> Vec<ToolDefinition> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .tools
            .iter()
            .map(|tool| tool.definition().clone())
            .collect()
    }

    /// Validates and invokes a registered tool, surfacing failures as errors.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::UnknownTool`] when the tool is not found,
    /// [`ToolError::InvalidArguments`] when validation fails, or the handler's
    /// error when execution fails.
    pub async fn invoke(&self, name: &str, arguments: &Map<String, Value>) -> ToolResult<Value> {
        let tool = self.get(name).ok_or_else(|| ToolError::UnknownTool {
            name: name.to_owned(),
        })?;
        tool.call(arguments, self.unknown_arguments).await
    }

    /// Dispatches a model-issued tool call.
    ///
    /// Never fails: unknown tools, invalid arguments, handler errors and
    /// handler panics all come back as [`ToolOutcome::Failure`].
    pub async fn dispatch(&self, request: &ToolInvocationRequest) -> ToolOutcome {
        let result = self.invoke(request.name(), request.arguments()).await;
        match &result {
            Ok(_) => debug!(tool = request.name(), "tool call succeeded"),
            Err(err) => warn!(tool = request.name(), error = %err, "tool call failed"),
        }
        ToolOutcome::from(result)
    }
}

/// Errors produced by tool registration and invocation.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Tool metadata failed validation.
    #[error("invalid tool metadata: {reason}")]
    InvalidMetadata {
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// Tool name collided with an existing registration.
    #[error("tool `{name}` is already registered")]
    DuplicateTool {
        /// Name of the offending tool.
        name: String,
    },

    /// Requested tool does not exist.
    #[error("unknown tool: {name}")]
    UnknownTool {
        /// Name of the missing tool.
        name: String,
    },

    /// Arguments did not satisfy the tool's parameter schema.
    #[error("invalid arguments for `{tool}`: {reason}")]
    InvalidArguments {
        /// Tool whose schema rejected the arguments.
        tool: String,
        /// What was wrong with them.
        reason: String,
    },

    /// Tool execution failed.
    #[error("tool execution failed: {reason}")]
    Execution {
        /// Human-readable error returned by the tool implementation.
        reason: String,
    },
}

impl ToolError {
    /// Creates an execution error from the supplied reason.
    #[must_use]
    pub fn execution(reason: impl Into<String>) -> Self {
        Self::Execution {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_metadata(reason: impl Into<String>) -> Self {
        Self::InvalidMetadata {
            reason: reason.into(),
        }
    }

    /// Message carried by [`ToolOutcome::Failure`] for this error.
    ///
    /// Execution errors surface the handler's own reason unchanged.
    #[must_use]
    pub fn failure_message(&self) -> String {
        match self {
            Self::Execution { reason } => reason.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::schema::{ParamType, ParameterSpec};

    fn echo_definition() -> ToolDefinition {
        ToolDefinition::new("echo", "Echo incoming payload")
            .unwrap()
            .with_parameter(ParameterSpec::required("message", ParamType::String))
            .unwrap()
    }

    fn echo_registry() -> ToolRegistry {
        let registry = ToolRegistry::new();
        registry
            .register_fn(echo_definition(), |args: ToolArgs| async move {
                Ok::<_, ToolError>(Value::from(args.str("message")?.to_owned()))
            })
            .unwrap();
        registry
    }

    fn request(name: &str, arguments: Value) -> ToolInvocationRequest {
        ToolInvocationRequest::from_value(name, arguments).unwrap()
    }

    #[tokio::test]
    async fn register_and_dispatch_tool() {
        let registry = echo_registry();
        let outcome = registry
            .dispatch(&request("echo", json!({"message": "hello"})))
            .await;
        assert_eq!(outcome, ToolOutcome::Success(json!("hello")));
    }

    #[tokio::test]
    async fn duplicate_registration_leaves_registry_unchanged() {
        let registry = echo_registry();
        let err = registry
            .register_fn(echo_definition(), |_: ToolArgs| async move {
                Ok::<_, ToolError>(Value::Null)
            })
            .expect_err("duplicate registration should fail");

        assert!(matches!(err, ToolError::DuplicateTool { ref name } if name == "echo"));
        assert_eq!(registry.len(), 1);

        let outcome = registry
            .dispatch(&request("echo", json!({"message": "still original"})))
            .await;
        assert_eq!(outcome, ToolOutcome::Success(json!("still original")));
    }

    #[tokio::test]
    async fn unknown_tool_is_a_failure_value() {
        let registry = ToolRegistry::new();
        let outcome = registry.dispatch(&request("missing", Value::Null)).await;
        assert_eq!(outcome, ToolOutcome::Failure("unknown tool: missing".into()));
    }

    #[tokio::test]
    async fn invalid_arguments_never_reach_handler() {
        let registry = ToolRegistry::new();
        registry
            .register_fn(echo_definition(), |_: ToolArgs| async move {
                assert!(false, "handler must not run");
                Ok::<_, ToolError>(Value::Null)
            })
            .unwrap();

        let outcome = registry.dispatch(&request("echo", json!({}))).await;
        let message = outcome.failure().expect("failure");
        assert!(message.contains("missing required parameter `message`"));
    }

    #[tokio::test]
    async fn handler_errors_and_panics_become_failures() {
        let registry = ToolRegistry::new();
        registry
            .register_fn(
                ToolDefinition::new("flaky", "Always fails").unwrap(),
                |_: ToolArgs| async move {
                    Err::<Value, _>(ToolError::execution("backend offline"))
                },
            )
            .unwrap();
        registry
            .register_fn(
                ToolDefinition::new("boom", "Always panics").unwrap(),
                |_: ToolArgs| async move {
                    let payload: Option<Value> = None;
                    Ok::<_, ToolError>(payload.expect("kaboom"))
                },
            )
            .unwrap();

        let flaky = registry.dispatch(&request("flaky", Value::Null)).await;
        assert_eq!(flaky, ToolOutcome::Failure("backend offline".into()));

        let boom = registry.dispatch(&request("boom", Value::Null)).await;
        let message = boom.failure().expect("panic should be a failure");
        assert!(message.contains("boom"));
        assert!(message.contains("kaboom"));
    }

    #[tokio::test]
    async fn reject_policy_applies_to_dispatch() {
        let registry = ToolRegistry::new().with_unknown_argument_policy(UnknownArgumentPolicy::Reject);
        registry
            .register_fn(echo_definition(), |args: ToolArgs| async move {
                Ok::<_, ToolError>(Value::from(args.str("message")?.to_owned()))
            })
            .unwrap();

        let outcome = registry
            .dispatch(&request("echo", json!({"message": "hi", "loud": true})))
            .await;
        assert!(!outcome.is_success());
    }

    #[test]
    fn describe_all_keeps_registration_order() {
        let registry = ToolRegistry::new();
        for name in ["zeta", "alpha", "mid"] {
            registry
                .register_fn(
                    ToolDefinition::new(name, "Test tool").unwrap(),
                    |_: ToolArgs| async move { Ok::<_, ToolError>(Value::Null) },
                )
                .unwrap();
        }

        let names: Vec<String> = registry
            .describe_all()
            .iter()
            .map(|definition| definition.name().to_owned())
            .collect();
        assert_eq!(names, ["zeta", "alpha", "mid"]);
    }

    #[test]
    fn parses_model_argument_strings() {
        let parsed = ToolInvocationRequest::from_json("echo", r#"{"message":"hi"}"#).unwrap();
        assert_eq!(parsed.arguments()["message"], "hi");

        let empty = ToolInvocationRequest::from_json("get_current_time", "").unwrap();
        assert!(empty.arguments().is_empty());

        assert!(ToolInvocationRequest::from_json("echo", "{not json").is_err());
        assert!(ToolInvocationRequest::from_json("echo", "[1, 2]").is_err());
    }

    #[test]
    fn model_content_rendering() {
        assert_eq!(ToolOutcome::Success(json!("8")).to_model_content(), "8");
        assert_eq!(
            ToolOutcome::Success(json!([{"title": "t"}])).to_model_content(),
            r#"[{"title":"t"}]"#
        );
        assert_eq!(
            ToolOutcome::Failure("invalid characters".into()).to_model_content(),
            r#"{"error":"invalid characters"}"#
        );
    }
}
