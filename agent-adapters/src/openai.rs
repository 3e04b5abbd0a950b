//! Chat-completions adapter for `OpenAI` and Azure `OpenAI` deployments.

use std::{fmt, time::Duration};

use agent_tools::ToolDefinition;
use async_trait::async_trait;
use hyper::Uri;
use hyper::header::{AUTHORIZATION, HeaderName};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::http_client::{HyperClient, JsonPost, build_https_client, sanitize_base_url};
use crate::traits::{
    AdapterError, AdapterMetadata, AdapterResult, Completion, InferenceRequest, MessageRole,
    ModelAdapter, PromptMessage, ToolCall,
};

/// Azure `OpenAI` REST API version used when none is configured.
pub const DEFAULT_AZURE_API_VERSION: &str = "2024-06-01";

fn api_key_header() -> HeaderName {
    HeaderName::from_static("api-key")
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Flavor {
    OpenAi,
    Azure { api_version: String },
}

/// Configuration for the [`OpenAiAdapter`].
#[derive(Clone)]
pub struct OpenAiConfig {
    api_key: Option<String>,
    model: String,
    base_url: String,
    flavor: Flavor,
    timeout: Duration,
    default_temperature: Option<f32>,
}

impl fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("flavor", &self.flavor)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl OpenAiConfig {
    /// Creates an `OpenAI` configuration using the supplied model identifier.
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            api_key: None,
            model: model.into(),
            base_url: "https://api.openai.com/".to_owned(),
            flavor: Flavor::OpenAi,
            timeout: Duration::from_secs(60),
            default_temperature: None,
        }
    }

    /// Creates a configuration for an Azure `OpenAI` deployment.
    ///
    /// Requests go to
    /// `{endpoint}/openai/deployments/{deployment}/chat/completions` and
    /// authenticate with the `api-key` header.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] if the endpoint is invalid.
    pub fn azure(
        endpoint: impl AsRef<str>,
        deployment: impl Into<String>,
        api_version: impl Into<String>,
    ) -> AdapterResult<Self> {
        Ok(Self {
            base_url: sanitize_base_url(endpoint.as_ref(), "Azure OpenAI")?,
            flavor: Flavor::Azure {
                api_version: api_version.into(),
            },
            ..Self::new(deployment)
        })
    }

    /// Overrides the base URL used for API calls.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] if the supplied URL is invalid.
    pub fn with_base_url(mut self, base_url: impl AsRef<str>) -> AdapterResult<Self> {
        self.base_url = sanitize_base_url(base_url.as_ref(), "OpenAI")?;
        Ok(self)
    }

    /// Sets the default sampling temperature used when requests omit it.
    #[must_use]
    pub fn with_default_temperature(mut self, temperature: f32) -> Self {
        self.default_temperature = Some(temperature);
        self
    }

    /// Sets the HTTP request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Supplies an explicit API key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    fn endpoint(&self) -> String {
        match &self.flavor {
            Flavor::OpenAi => format!("{}v1/chat/completions", self.base_url),
            Flavor::Azure { api_version } => format!(
                "{}openai/deployments/{}/chat/completions?api-version={api_version}",
                self.base_url, self.model
            ),
        }
    }
}

/// Adapter that calls a chat-completions endpoint over HTTPS.
pub struct OpenAiAdapter {
    client: HyperClient,
    endpoint: Uri,
    metadata: AdapterMetadata,
    auth_header: HeaderName,
    auth_value: String,
    send_model: bool,
    timeout: Duration,
    default_temperature: Option<f32>,
}

impl fmt::Debug for OpenAiAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiAdapter")
            .field("provider", &self.metadata.provider())
            .field("model", &self.metadata.model())
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl OpenAiAdapter {
    /// Constructs a new adapter with the provided configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] if the API key is missing or
    /// the endpoint cannot be parsed.
    pub fn new(config: OpenAiConfig) -> AdapterResult<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| AdapterError::configuration("OpenAI adapter requires an API key"))?;

        let endpoint = config.endpoint().parse::<Uri>().map_err(|err| {
            AdapterError::configuration(format!("invalid OpenAI endpoint: {err}"))
        })?;

        let (provider, auth_header, auth_value, send_model) = match config.flavor {
            Flavor::OpenAi => ("openai", AUTHORIZATION, format!("Bearer {api_key}"), true),
            Flavor::Azure { .. } => ("azure-openai", api_key_header(), api_key, false),
        };

        Ok(Self {
            client: build_https_client()?,
            endpoint,
            metadata: AdapterMetadata::new(provider, config.model),
            auth_header,
            auth_value,
            send_model,
            timeout: config.timeout,
            default_temperature: config.default_temperature,
        })
    }

    /// Returns the resolved chat-completions endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &Uri {
        &self.endpoint
    }

    fn build_request(&self, request: &InferenceRequest) -> ChatCompletionRequest {
        let mut messages = Vec::with_capacity(request.messages().len() + 1);
        if let Some(system) = request.system_prompt() {
            messages.push(OpenAiMessage {
                role: MessageRole::System.to_string(),
                content: Some(system.to_owned()),
                tool_calls: Vec::new(),
                tool_call_id: None,
            });
        }
        messages.extend(request.messages().iter().map(map_prompt_message));

        ChatCompletionRequest {
            model: self.send_model.then(|| self.metadata.model().to_owned()),
            messages,
            temperature: request.temperature().or(self.default_temperature),
            max_tokens: request.max_output_tokens(),
            tools: request.tools().iter().map(map_tool_definition).collect(),
            stream: false,
        }
    }
}

#[async_trait]
impl ModelAdapter for OpenAiAdapter {
    fn metadata(&self) -> &AdapterMetadata {
        &self.metadata
    }

    async fn complete(&self, request: InferenceRequest) -> AdapterResult<Completion> {
        let payload = self.build_request(&request);
        let body = serde_json::to_vec(&payload).map_err(|err| {
            AdapterError::invalid_request(format!("failed to encode OpenAI request: {err}"))
        })?;

        debug!(
            model = self.metadata.model(),
            messages = payload.messages.len(),
            tools = payload.tools.len(),
            "sending chat completion"
        );

        let bytes = JsonPost {
            client: &self.client,
            uri: &self.endpoint,
            auth: (self.auth_header.clone(), &self.auth_value),
            timeout: self.timeout,
            service: "OpenAI",
        }
        .send(body)
        .await?;

        let response: ChatCompletionResponse = serde_json::from_slice(&bytes).map_err(|err| {
            AdapterError::response(format!("failed to decode OpenAI response: {err}"))
        })?;

        parse_completion(response)
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<OpenAiTool>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<OpenAiToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct OpenAiTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: OpenAiFunction,
}

#[derive(Debug, Serialize)]
struct OpenAiFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiToolCall {
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: OpenAiFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

fn function_kind() -> String {
    "function".to_owned()
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<OpenAiToolCall>,
}

fn map_prompt_message(message: &PromptMessage) -> OpenAiMessage {
    let tool_calls: Vec<OpenAiToolCall> = message
        .tool_calls()
        .iter()
        .map(|call| OpenAiToolCall {
            id: call.id.clone(),
            kind: function_kind(),
            function: OpenAiFunctionCall {
                name: call.name.clone(),
                arguments: call.arguments.clone(),
            },
        })
        .collect();

    let content = if tool_calls.is_empty() || !message.content().is_empty() {
        Some(message.content().to_owned())
    } else {
        None
    };

    OpenAiMessage {
        role: message.role().to_string(),
        content,
        tool_calls,
        tool_call_id: message.tool_call_id().map(str::to_owned),
    }
}

fn map_tool_definition(definition: &ToolDefinition) -> OpenAiTool {
    OpenAiTool {
        kind: "function",
        function: OpenAiFunction {
            name: definition.name().to_owned(),
            description: definition.description().to_owned(),
            parameters: definition.json_schema(),
        },
    }
}

fn parse_completion(response: ChatCompletionResponse) -> AdapterResult<Completion> {
    let message = response
        .choices
        .into_iter()
        .find_map(|choice| choice.message)
        .ok_or_else(|| AdapterError::response("OpenAI response contained no choices"))?;

    Ok(Completion {
        content: message.content,
        tool_calls: message
            .tool_calls
            .into_iter()
            .map(|call| ToolCall::new(call.id, call.function.name, call.function.arguments))
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use agent_tools::{ParamType, ParameterSpec};

    #[test]
    fn base_url_requires_scheme() {
        let err = OpenAiConfig::new("gpt-4o")
            .with_base_url("api.openai.com")
            .expect_err("missing scheme should error");

        assert!(matches!(err, AdapterError::Configuration { .. }));
    }

    #[test]
    fn azure_endpoint_targets_deployment() {
        let config = OpenAiConfig::azure("https://contoso.openai.azure.com", "gpt-4o", "2024-06-01")
            .unwrap()
            .with_api_key("secret");
        assert_eq!(
            config.endpoint(),
            "https://contoso.openai.azure.com/openai/deployments/gpt-4o/chat/completions?api-version=2024-06-01"
        );
        assert!(!format!("{config:?}").contains("secret"));

        let adapter = OpenAiAdapter::new(config).unwrap();
        assert_eq!(adapter.metadata().provider(), "azure-openai");
        assert_eq!(adapter.auth_header, api_key_header());
        assert_eq!(adapter.auth_value, "secret");
    }

    #[test]
    fn missing_key_is_a_configuration_error() {
        let err = OpenAiAdapter::new(OpenAiConfig::new("gpt-4o").with_api_key("  "))
            .expect_err("blank key");
        assert!(matches!(err, AdapterError::Configuration { .. }));
    }

    #[test]
    fn build_request_prepends_system_and_advertises_tools() {
        let adapter = OpenAiAdapter::new(
            OpenAiConfig::new("gpt-4o")
                .with_default_temperature(0.2)
                .with_api_key("test_key"),
        )
        .unwrap();
        let calculate = ToolDefinition::new("calculate", "Evaluate a mathematical expression")
            .unwrap()
            .with_parameter(ParameterSpec::required("expression", ParamType::String))
            .unwrap();
        let request = InferenceRequest::new(vec![PromptMessage::user("What is 15% of 250?")])
            .unwrap()
            .with_system_prompt("You are a helpful research assistant.")
            .with_tools(vec![calculate]);

        let chat = adapter.build_request(&request);
        assert_eq!(chat.model.as_deref(), Some("gpt-4o"));
        assert_eq!(chat.messages[0].role, "system");
        assert_eq!(chat.messages[1].role, "user");
        assert_eq!(chat.temperature, Some(0.2));

        let json = serde_json::to_value(&chat).unwrap();
        assert_eq!(json["tools"][0]["type"], "function");
        assert_eq!(json["tools"][0]["function"]["name"], "calculate");
        assert_eq!(
            json["tools"][0]["function"]["parameters"]["required"][0],
            "expression"
        );
    }

    #[test]
    fn tool_turns_map_to_wire_format() {
        let call = ToolCall::new("call_7", "calculate", r#"{"expression":"0.15*250"}"#);
        let assistant = map_prompt_message(&PromptMessage::assistant_tool_calls("", vec![call]));
        let json = serde_json::to_value(&assistant).unwrap();
        assert!(json["content"].is_null());
        assert_eq!(json["tool_calls"][0]["id"], "call_7");
        assert_eq!(json["tool_calls"][0]["type"], "function");
        assert_eq!(json["tool_calls"][0]["function"]["name"], "calculate");

        let reply = map_prompt_message(&PromptMessage::tool_result("call_7", "37.5"));
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["role"], "tool");
        assert_eq!(json["tool_call_id"], "call_7");
        assert_eq!(json["content"], "37.5");
    }

    #[test]
    fn response_parsing_extracts_text_and_tool_calls() {
        let text: ChatCompletionResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":"hi"}}]}"#).unwrap();
        assert_eq!(parse_completion(text).unwrap(), Completion::text("hi"));

        let calls: ChatCompletionResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"content":null,"tool_calls":[
                {"id":"call_1","type":"function","function":{"name":"get_current_time","arguments":"{}"}}
            ]}}]}"#,
        )
        .unwrap();
        let completion = parse_completion(calls).unwrap();
        assert!(completion.requests_tools());
        assert_eq!(
            completion.tool_calls,
            [ToolCall::new("call_1", "get_current_time", "{}")]
        );

        let empty: ChatCompletionResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(
            parse_completion(empty),
            Err(AdapterError::Response { .. })
        ));
    }
}
