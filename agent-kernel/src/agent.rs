//! Agent execution: one prompt in, one answer out, with tool calls in between.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};

use agent_adapters::traits::{
    AdapterError, Completion, InferenceRequest, ModelAdapter, PromptMessage, ToolCall,
};
use agent_primitives::AgentSpec;
use agent_tools::{ToolDefinition, ToolInvocationRequest, ToolOutcome, ToolRegistry};
use async_trait::async_trait;
use thiserror::Error;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::admission::AdmissionError;

/// Tool rounds an agent may run before it must answer.
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 8;

/// Result alias for agent invocations.
pub type AgentResult<T> = Result<T, AgentError>;

/// Errors produced while configuring or running an agent.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The agent cannot be assembled as configured.
    #[error("agent misconfigured: {reason}")]
    Configuration {
        /// Why the configuration was rejected.
        reason: String,
    },

    /// The remote completion call failed.
    #[error("agent `{agent}` model call failed: {source}")]
    Adapter {
        /// Agent whose call failed.
        agent: String,
        /// Underlying adapter error.
        #[source]
        source: AdapterError,
    },

    /// The model kept requesting tools past the configured limit.
    #[error("agent `{agent}` did not answer within {limit} tool rounds")]
    ToolRoundsExhausted {
        /// Agent that ran out of rounds.
        agent: String,
        /// Configured limit.
        limit: usize,
    },

    /// The model answered with neither text nor tool calls.
    #[error("agent `{agent}` returned an empty response")]
    EmptyResponse {
        /// Agent that produced nothing.
        agent: String,
    },

    /// No admission permit could be obtained.
    #[error(transparent)]
    Admission(#[from] AdmissionError),

    /// Free-form failure raised by custom runners.
    #[error("{reason}")]
    Failed {
        /// Human-readable failure description.
        reason: String,
    },
}

impl AgentError {
    /// Convenience constructor for custom runner failures.
    #[must_use]
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }
}

/// Anything that turns a prompt into an answer on behalf of an agent persona.
///
/// Implementations are stateless across calls: the same runner may serve any
/// number of concurrent invocations.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    /// Returns the persona this runner speaks for.
    fn spec(&self) -> &AgentSpec;

    /// Produces the agent's answer to `prompt`.
    async fn run(&self, prompt: &str) -> AgentResult<String>;
}

/// Runner backed by a plain async closure; handy for stubs and tests.
pub struct FnAgent<F> {
    spec: AgentSpec,
    f: F,
}

impl<F> fmt::Debug for FnAgent<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnAgent")
            .field("agent", &self.spec.name())
            .finish_non_exhaustive()
    }
}

/// Wraps `f` as an [`AgentRunner`] for `spec`.
pub fn agent_fn<F, Fut>(spec: AgentSpec, f: F) -> FnAgent<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = AgentResult<String>> + Send,
{
    FnAgent { spec, f }
}

#[async_trait]
impl<F, Fut> AgentRunner for FnAgent<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = AgentResult<String>> + Send,
{
    fn spec(&self) -> &AgentSpec {
        &self.spec
    }

    async fn run(&self, prompt: &str) -> AgentResult<String> {
        (self.f)(prompt.to_owned()).await
    }
}

/// A tool call executed during a run, with what it returned.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolCallRecord {
    /// Tool the model asked for.
    pub name: String,
    /// What the dispatcher reported back.
    pub outcome: ToolOutcome,
}

/// Summary of one completed [`Agent::run`].
#[derive(Clone, Debug)]
pub struct CallOutcome {
    agent: String,
    response: String,
    tool_calls: Vec<ToolCallRecord>,
}

impl CallOutcome {
    /// Returns the agent name.
    #[must_use]
    pub fn agent(&self) -> &str {
        &self.agent
    }

    /// Returns the final answer text.
    #[must_use]
    pub fn response(&self) -> &str {
        &self.response
    }

    /// Returns the tool calls made while producing the answer, in order.
    #[must_use]
    pub fn tool_calls(&self) -> &[ToolCallRecord] {
        &self.tool_calls
    }
}

/// Observer trait used to capture call outcomes (for logging, display, etc.).
pub trait CallOutcomeSink: Send + Sync {
    /// Records the outcome of a run.
    fn record(&self, outcome: CallOutcome);
}

/// Sink implementation that logs to tracing.
#[derive(Debug, Default)]
pub struct TracingCallSink;

impl CallOutcomeSink for TracingCallSink {
    fn record(&self, outcome: CallOutcome) {
        let tools: Vec<&str> = outcome
            .tool_calls()
            .iter()
            .map(|call| call.name.as_str())
            .collect();
        info!(
            agent = outcome.agent(),
            chars = outcome.response().len(),
            tools = ?tools,
            "agent call completed"
        );
    }
}

/// Sink used during testing to capture outcomes.
#[derive(Debug, Default)]
pub struct CollectingSink {
    results: Mutex<Vec<CallOutcome>>,
}

impl CollectingSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns the collected outcomes.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex has been poisoned by a previous panic.
    #[must_use]
    pub fn drain(&self) -> Vec<CallOutcome> {
        let mut lock = self.results.lock().expect("collecting sink poisoned");
        lock.drain(..).collect()
    }
}

impl CallOutcomeSink for CollectingSink {
    fn record(&self, outcome: CallOutcome) {
        self.results
            .lock()
            .expect("collecting sink poisoned")
            .push(outcome);
    }
}

/// Agent that answers through a [`ModelAdapter`], calling tools when asked.
///
/// No conversation history survives a call: each [`AgentRunner::run`]
/// starts from the system instructions and the single user prompt.
#[derive(Clone)]
pub struct Agent {
    spec: AgentSpec,
    adapter: Arc<dyn ModelAdapter>,
    tools: Option<Arc<ToolRegistry>>,
    definitions: Vec<ToolDefinition>,
    max_tool_rounds: usize,
    temperature: Option<f32>,
    max_output_tokens: Option<u32>,
    sink: Option<Arc<dyn CallOutcomeSink>>,
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let metadata = self.adapter.metadata();
        f.debug_struct("Agent")
            .field("name", &self.spec.name())
            .field("provider", &metadata.provider())
            .field("model", &metadata.model())
            .field("tools", &self.spec.tools())
            .field("max_tool_rounds", &self.max_tool_rounds)
            .finish_non_exhaustive()
    }
}

impl Agent {
    /// Starts building an agent for `spec` backed by `adapter`.
    #[must_use]
    pub fn builder(spec: AgentSpec, adapter: Arc<dyn ModelAdapter>) -> AgentBuilder {
        AgentBuilder {
            spec,
            adapter,
            tools: None,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            temperature: None,
            max_output_tokens: None,
            sink: None,
        }
    }

    /// Returns the configured tool round limit.
    #[must_use]
    pub const fn max_tool_rounds(&self) -> usize {
        self.max_tool_rounds
    }

    fn request(&self, messages: &[PromptMessage]) -> AgentResult<InferenceRequest> {
        let mut request = InferenceRequest::new(messages.to_vec())
            .map_err(|source| self.adapter_error(source))?
            .with_system_prompt(self.spec.instructions())
            .with_tools(self.definitions.clone());
        if let Some(temperature) = self.temperature {
            request = request.with_temperature(temperature);
        }
        if let Some(tokens) = self.max_output_tokens {
            request = request.with_max_output_tokens(tokens);
        }
        Ok(request)
    }

    fn adapter_error(&self, source: AdapterError) -> AgentError {
        AgentError::Adapter {
            agent: self.spec.name().to_owned(),
            source,
        }
    }

    async fn execute_tool(&self, call: &ToolCall) -> ToolOutcome {
        let declared = self.spec.tools().iter().any(|name| name == &call.name);
        let Some(registry) = self.tools.as_ref().filter(|_| declared) else {
            warn!(tool = %call.name, "model requested an undeclared tool");
            return ToolOutcome::Failure(format!("unknown tool: {}", call.name));
        };

        match ToolInvocationRequest::from_json(call.name.clone(), &call.arguments) {
            Ok(request) => registry.dispatch(&request).await,
            Err(err) => {
                warn!(tool = %call.name, error = %err, "model sent malformed tool arguments");
                ToolOutcome::Failure(err.failure_message())
            }
        }
    }

    async fn run_loop(&self, prompt: &str) -> AgentResult<CallOutcome> {
        let mut messages = vec![PromptMessage::user(prompt)];
        let mut records = Vec::new();
        let mut rounds = 0;

        loop {
            let request = self.request(&messages)?;
            let Completion {
                content,
                tool_calls,
            } = self
                .adapter
                .complete(request)
                .await
                .map_err(|source| self.adapter_error(source))?;

            if tool_calls.is_empty() {
                let response = content.ok_or_else(|| AgentError::EmptyResponse {
                    agent: self.spec.name().to_owned(),
                })?;
                return Ok(CallOutcome {
                    agent: self.spec.name().to_owned(),
                    response,
                    tool_calls: records,
                });
            }

            if rounds == self.max_tool_rounds {
                return Err(AgentError::ToolRoundsExhausted {
                    agent: self.spec.name().to_owned(),
                    limit: self.max_tool_rounds,
                });
            }
            rounds += 1;
            debug!(round = rounds, calls = tool_calls.len(), "executing tool calls");

            messages.push(PromptMessage::assistant_tool_calls(
                content.unwrap_or_default(),
                tool_calls.clone(),
            ));
            for call in tool_calls {
                let outcome = self.execute_tool(&call).await;
                messages.push(PromptMessage::tool_result(
                    call.id,
                    outcome.to_model_content(),
                ));
                records.push(ToolCallRecord {
                    name: call.name,
                    outcome,
                });
            }
        }
    }
}

#[async_trait]
impl AgentRunner for Agent {
    fn spec(&self) -> &AgentSpec {
        &self.spec
    }

    async fn run(&self, prompt: &str) -> AgentResult<String> {
        let span = info_span!("agent", name = self.spec.name());
        let outcome = self.run_loop(prompt).instrument(span).await?;
        let response = outcome.response.clone();
        if let Some(sink) = &self.sink {
            sink.record(outcome);
        }
        Ok(response)
    }
}

/// Builder for [`Agent`].
pub struct AgentBuilder {
    spec: AgentSpec,
    adapter: Arc<dyn ModelAdapter>,
    tools: Option<Arc<ToolRegistry>>,
    max_tool_rounds: usize,
    temperature: Option<f32>,
    max_output_tokens: Option<u32>,
    sink: Option<Arc<dyn CallOutcomeSink>>,
}

impl fmt::Debug for AgentBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentBuilder")
            .field("name", &self.spec.name())
            .field("max_tool_rounds", &self.max_tool_rounds)
            .finish_non_exhaustive()
    }
}

impl AgentBuilder {
    /// Supplies the registry the agent's declared tools are resolved from.
    #[must_use]
    pub fn tools(mut self, registry: Arc<ToolRegistry>) -> Self {
        self.tools = Some(registry);
        self
    }

    /// Caps the number of tool rounds per call.
    #[must_use]
    pub fn max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    /// Sets the sampling temperature.
    #[must_use]
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Sets the output token budget per completion.
    #[must_use]
    pub fn max_output_tokens(mut self, tokens: u32) -> Self {
        self.max_output_tokens = Some(tokens);
        self
    }

    /// Installs a sink that receives every successful call outcome.
    #[must_use]
    pub fn sink(mut self, sink: Arc<dyn CallOutcomeSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Resolves the declared tools and builds the agent.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Configuration`] when the spec declares tools but
    /// no registry was supplied, or a declared tool is not registered.
    pub fn build(self) -> AgentResult<Agent> {
        let mut definitions = Vec::with_capacity(self.spec.tools().len());
        if self.spec.has_tools() {
            let registry = self.tools.as_ref().ok_or_else(|| {
                AgentError::configuration(format!(
                    "agent `{}` declares tools but no registry was supplied",
                    self.spec.name()
                ))
            })?;
            for name in self.spec.tools() {
                let tool = registry.get(name).ok_or_else(|| {
                    AgentError::configuration(format!(
                        "agent `{}` declares unregistered tool `{name}`",
                        self.spec.name()
                    ))
                })?;
                definitions.push(tool.definition().clone());
            }
        }

        Ok(Agent {
            spec: self.spec,
            adapter: self.adapter,
            tools: self.tools,
            definitions,
            max_tool_rounds: self.max_tool_rounds,
            temperature: self.temperature,
            max_output_tokens: self.max_output_tokens,
            sink: self.sink,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use agent_adapters::traits::{AdapterMetadata, AdapterResult, MessageRole};
    use agent_tools::builtin::register_defaults;
    use serde_json::json;

    struct ScriptedAdapter {
        metadata: AdapterMetadata,
        replies: Mutex<VecDeque<AdapterResult<Completion>>>,
        requests: Mutex<Vec<InferenceRequest>>,
    }

    impl ScriptedAdapter {
        fn new(replies: Vec<AdapterResult<Completion>>) -> Arc<Self> {
            Arc::new(Self {
                metadata: AdapterMetadata::new("test", "scripted"),
                replies: Mutex::new(replies.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<InferenceRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ModelAdapter for ScriptedAdapter {
        fn metadata(&self) -> &AdapterMetadata {
            &self.metadata
        }

        async fn complete(&self, request: InferenceRequest) -> AdapterResult<Completion> {
            self.requests.lock().unwrap().push(request);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Completion::text("out of script")))
        }
    }

    fn research_spec() -> AgentSpec {
        AgentSpec::builder("ResearchAssistant")
            .instructions("You are a helpful research assistant.")
            .tools(["get_current_time", "calculate", "create_summary"])
            .build()
            .unwrap()
    }

    fn default_tools() -> Arc<ToolRegistry> {
        let registry = ToolRegistry::new();
        register_defaults(&registry, None).unwrap();
        Arc::new(registry)
    }

    #[tokio::test]
    async fn plain_answer_needs_one_call() {
        let adapter = ScriptedAdapter::new(vec![Ok(Completion::text("Hello!"))]);
        let spec = AgentSpec::builder("BasicAgent")
            .instructions("You are a helpful AI assistant.")
            .build()
            .unwrap();
        let agent = Agent::builder(spec, adapter.clone()).build().unwrap();

        assert_eq!(agent.run("Hi").await.unwrap(), "Hello!");

        let requests = adapter.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].system_prompt(),
            Some("You are a helpful AI assistant.")
        );
        assert!(requests[0].tools().is_empty());
        assert_eq!(requests[0].messages()[0].content(), "Hi");
    }

    #[tokio::test]
    async fn tool_results_are_relayed_to_the_model() {
        let adapter = ScriptedAdapter::new(vec![
            Ok(Completion::with_tool_calls(vec![ToolCall::new(
                "call_1",
                "calculate",
                r#"{"expression":"0.15 * 250"}"#,
            )])),
            Ok(Completion::text("15% of 250 is 37.5.")),
        ]);
        let sink = CollectingSink::new();
        let agent = Agent::builder(research_spec(), adapter.clone())
            .tools(default_tools())
            .sink(sink.clone())
            .build()
            .unwrap();

        let answer = agent.run("What is 15% of 250?").await.unwrap();
        assert_eq!(answer, "15% of 250 is 37.5.");

        let requests = adapter.requests();
        assert_eq!(requests.len(), 2);
        let names: Vec<&str> = requests[0].tools().iter().map(ToolDefinition::name).collect();
        assert_eq!(names, ["get_current_time", "calculate", "create_summary"]);

        let followup = requests[1].messages();
        assert_eq!(followup.len(), 3);
        assert_eq!(followup[1].role(), MessageRole::Assistant);
        assert_eq!(followup[2].role(), MessageRole::Tool);
        assert_eq!(followup[2].tool_call_id(), Some("call_1"));
        assert_eq!(followup[2].content(), "37.5");

        let outcomes = sink.drain();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].tool_calls()[0].name, "calculate");
        assert_eq!(
            outcomes[0].tool_calls()[0].outcome,
            ToolOutcome::Success(json!("37.5"))
        );
    }

    #[tokio::test]
    async fn tool_failures_do_not_abort_the_call() {
        let adapter = ScriptedAdapter::new(vec![
            Ok(Completion::with_tool_calls(vec![
                ToolCall::new("a", "calculate", r#"{"expression":"2+2; import os"}"#),
                ToolCall::new("b", "calculate", "{not json"),
                ToolCall::new("c", "search_documents", r#"{"query":"x"}"#),
            ])),
            Ok(Completion::text("I could not compute that.")),
        ]);
        let agent = Agent::builder(research_spec(), adapter.clone())
            .tools(default_tools())
            .build()
            .unwrap();

        assert_eq!(
            agent.run("compute").await.unwrap(),
            "I could not compute that."
        );

        let followup = adapter.requests()[1].messages().to_vec();
        assert_eq!(followup[2].content(), r#"{"error":"invalid characters"}"#);
        assert!(followup[3].content().contains("not valid JSON"));
        assert_eq!(
            followup[4].content(),
            r#"{"error":"unknown tool: search_documents"}"#
        );
    }

    #[tokio::test]
    async fn tool_rounds_are_bounded() {
        let looping = || {
            Ok(Completion::with_tool_calls(vec![ToolCall::new(
                "t",
                "get_current_time",
                "",
            )]))
        };
        let adapter = ScriptedAdapter::new(vec![looping(), looping(), looping()]);
        let agent = Agent::builder(research_spec(), adapter.clone())
            .tools(default_tools())
            .max_tool_rounds(2)
            .build()
            .unwrap();

        let err = agent.run("loop forever").await.expect_err("bounded");
        assert!(matches!(err, AgentError::ToolRoundsExhausted { limit: 2, .. }));
        assert_eq!(adapter.requests().len(), 3);
    }

    #[tokio::test]
    async fn adapter_failures_propagate() {
        let adapter = ScriptedAdapter::new(vec![Err(AdapterError::transport("connection reset"))]);
        let spec = AgentSpec::builder("Planner")
            .instructions("Plan.")
            .build()
            .unwrap();
        let agent = Agent::builder(spec, adapter).build().unwrap();

        let err = agent.run("plan").await.expect_err("transport error");
        assert!(matches!(err, AgentError::Adapter { ref agent, .. } if agent == "Planner"));
        assert!(err.to_string().contains("connection reset"));
    }

    #[tokio::test]
    async fn empty_completion_is_an_error() {
        let adapter = ScriptedAdapter::new(vec![Ok(Completion::default())]);
        let spec = AgentSpec::builder("Writer")
            .instructions("Write.")
            .build()
            .unwrap();
        let agent = Agent::builder(spec, adapter).build().unwrap();
        assert!(matches!(
            agent.run("draft").await,
            Err(AgentError::EmptyResponse { .. })
        ));
    }

    #[test]
    fn declared_tools_must_be_registered() {
        let adapter = ScriptedAdapter::new(Vec::new());
        let err = Agent::builder(research_spec(), adapter.clone())
            .build()
            .expect_err("no registry");
        assert!(matches!(err, AgentError::Configuration { .. }));

        let spec = AgentSpec::builder("Researcher")
            .instructions("Research.")
            .tool("web_browse")
            .build()
            .unwrap();
        let err = Agent::builder(spec, adapter)
            .tools(default_tools())
            .build()
            .expect_err("unregistered tool");
        assert!(err.to_string().contains("web_browse"));
    }

    #[tokio::test]
    async fn closures_act_as_agents() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let spec = AgentSpec::builder("Echo")
            .instructions("Echo the prompt.")
            .build()
            .unwrap();
        let echo = agent_fn(spec, move |prompt: String| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, AgentError>(format!("echo:{prompt}"))
            }
        });

        assert_eq!(echo.run("hi").await.unwrap(), "echo:hi");
        assert_eq!(echo.spec().name(), "Echo");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
