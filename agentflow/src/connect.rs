//! Turns a [`ServiceConfig`] into live service clients.

use std::sync::Arc;

use agent_adapters::{
    AdapterError, AzureSearchClient, AzureSearchConfig, ModelAdapter, OpenAiAdapter, OpenAiConfig,
};
use agent_config::{OpenAiSettings, SearchSettings, ServiceConfig};
use agent_tools::builtin::{DocumentSearch, register_defaults};
use agent_tools::{ToolError, ToolRegistry};
use thiserror::Error;
use tracing::info;

/// Errors raised while wiring clients from configuration.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// A client rejected its settings.
    #[error(transparent)]
    Adapter(#[from] AdapterError),

    /// The tool registry could not be populated.
    #[error(transparent)]
    Tool(#[from] ToolError),
}

/// Result alias for wiring helpers.
pub type ConnectResult<T> = Result<T, ConnectError>;

/// Model adapter for the configured Azure `OpenAI` deployment.
///
/// # Errors
///
/// Returns [`ConnectError::Adapter`] if the endpoint is not a valid URL.
pub fn model_adapter(settings: &OpenAiSettings) -> ConnectResult<Arc<dyn ModelAdapter>> {
    let config = OpenAiConfig::azure(
        &settings.endpoint,
        settings.deployment.clone(),
        settings.api_version.clone(),
    )?
    .with_api_key(settings.api_key.clone());
    Ok(Arc::new(OpenAiAdapter::new(config)?))
}

/// Search backend for the configured index, if any.
///
/// # Errors
///
/// Returns [`ConnectError::Adapter`] if the search settings are unusable.
pub fn document_search(
    settings: Option<&SearchSettings>,
) -> ConnectResult<Option<Arc<dyn DocumentSearch>>> {
    let Some(settings) = settings else {
        return Ok(None);
    };
    let config = AzureSearchConfig::new(
        &settings.endpoint,
        settings.index.clone(),
        settings.api_key.clone(),
    )?;
    info!(index = %settings.index, "document search enabled");
    Ok(Some(Arc::new(AzureSearchClient::new(config)?)))
}

/// Registry holding every built-in tool, with search wired to the configured
/// index when there is one.
///
/// # Errors
///
/// Returns [`ConnectError`] if the search client cannot be built.
pub fn builtin_tools(config: &ServiceConfig) -> ConnectResult<Arc<ToolRegistry>> {
    let registry = ToolRegistry::new();
    register_defaults(&registry, document_search(config.search.as_ref())?)?;
    Ok(Arc::new(registry))
}
