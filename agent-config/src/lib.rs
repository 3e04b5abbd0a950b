//! Service configuration read from the environment.
//!
//! Variables, read once at startup:
//! - `AZURE_OPENAI_ENDPOINT` - required. Azure OpenAI resource endpoint.
//! - `AZURE_OPENAI_API_KEY` - required. Key for that resource.
//! - `AZURE_OPENAI_DEPLOYMENT` - optional. Model deployment, defaults to `gpt-4o`.
//! - `AZURE_OPENAI_API_VERSION` - optional. Defaults to `2024-06-01`.
//! - `AZURE_SEARCH_ENDPOINT`, `AZURE_SEARCH_INDEX`, `AZURE_SEARCH_API_KEY` -
//!   optional; document search is enabled only when all three are set.

#![warn(missing_docs, clippy::pedantic)]

use std::fmt;

use thiserror::Error;
use tracing::{debug, warn};

/// Azure OpenAI endpoint variable.
pub const AZURE_OPENAI_ENDPOINT: &str = "AZURE_OPENAI_ENDPOINT";
/// Azure OpenAI key variable.
pub const AZURE_OPENAI_API_KEY: &str = "AZURE_OPENAI_API_KEY";
/// Model deployment variable.
pub const AZURE_OPENAI_DEPLOYMENT: &str = "AZURE_OPENAI_DEPLOYMENT";
/// REST API version variable.
pub const AZURE_OPENAI_API_VERSION: &str = "AZURE_OPENAI_API_VERSION";
/// Search service endpoint variable.
pub const AZURE_SEARCH_ENDPOINT: &str = "AZURE_SEARCH_ENDPOINT";
/// Search index variable.
pub const AZURE_SEARCH_INDEX: &str = "AZURE_SEARCH_INDEX";
/// Search key variable.
pub const AZURE_SEARCH_API_KEY: &str = "AZURE_SEARCH_API_KEY";

/// Deployment used when `AZURE_OPENAI_DEPLOYMENT` is unset.
pub const DEFAULT_DEPLOYMENT: &str = "gpt-4o";
/// API version used when `AZURE_OPENAI_API_VERSION` is unset.
pub const DEFAULT_API_VERSION: &str = "2024-06-01";

/// Result alias for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while reading configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// One or more required variables are unset or blank.
    #[error("missing environment variables: {}", names.join(", "))]
    MissingVariables {
        /// Every missing name, in declaration order.
        names: Vec<String>,
    },
}

impl ConfigError {
    /// Shell lines showing how to set the missing variables.
    #[must_use]
    pub fn example_exports(&self) -> Vec<String> {
        match self {
            Self::MissingVariables { names } => names
                .iter()
                .map(|name| format!("export {name}={}", placeholder(name)))
                .collect(),
        }
    }

    /// Multi-line diagnostic naming the missing variables with example
    /// exports, suitable for printing before exiting.
    #[must_use]
    pub fn help(&self) -> String {
        let mut help = format!("{self}\n\nExample:");
        for line in self.example_exports() {
            help.push_str("\n  ");
            help.push_str(&line);
        }
        help
    }
}

fn placeholder(name: &str) -> &'static str {
    match name {
        AZURE_OPENAI_ENDPOINT => "https://your-resource.openai.azure.com",
        AZURE_SEARCH_ENDPOINT => "https://your-search.search.windows.net",
        AZURE_SEARCH_INDEX => "your-index",
        _ => "<value>",
    }
}

/// Azure OpenAI connection settings.
#[derive(Clone, PartialEq, Eq)]
pub struct OpenAiSettings {
    /// Resource endpoint.
    pub endpoint: String,
    /// Resource key.
    pub api_key: String,
    /// Model deployment name.
    pub deployment: String,
    /// REST API version.
    pub api_version: String,
}

impl fmt::Debug for OpenAiSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiSettings")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .field("deployment", &self.deployment)
            .field("api_version", &self.api_version)
            .finish()
    }
}

/// Azure AI Search connection settings.
#[derive(Clone, PartialEq, Eq)]
pub struct SearchSettings {
    /// Search service endpoint.
    pub endpoint: String,
    /// Index to query.
    pub index: String,
    /// Query key.
    pub api_key: String,
}

impl fmt::Debug for SearchSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchSettings")
            .field("endpoint", &self.endpoint)
            .field("index", &self.index)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Everything the binaries need to reach their services.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Model service.
    pub openai: OpenAiSettings,
    /// Document search, when fully configured.
    pub search: Option<SearchSettings>,
}

impl ServiceConfig {
    /// Reads the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingVariables`] listing every required
    /// variable that is unset or blank.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads variables through `lookup`; blank values count as unset.
    ///
    /// # Errors
    ///
    /// See [`ServiceConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        let endpoint = get(AZURE_OPENAI_ENDPOINT);
        let api_key = get(AZURE_OPENAI_API_KEY);
        let (Some(endpoint), Some(api_key)) = (endpoint.clone(), api_key.clone()) else {
            let names = [
                (AZURE_OPENAI_ENDPOINT, endpoint.is_none()),
                (AZURE_OPENAI_API_KEY, api_key.is_none()),
            ]
            .into_iter()
            .filter_map(|(name, missing)| missing.then(|| name.to_owned()))
            .collect();
            return Err(ConfigError::MissingVariables { names });
        };

        let openai = OpenAiSettings {
            endpoint,
            api_key,
            deployment: get(AZURE_OPENAI_DEPLOYMENT)
                .unwrap_or_else(|| DEFAULT_DEPLOYMENT.to_owned()),
            api_version: get(AZURE_OPENAI_API_VERSION)
                .unwrap_or_else(|| DEFAULT_API_VERSION.to_owned()),
        };

        let search = match (
            get(AZURE_SEARCH_ENDPOINT),
            get(AZURE_SEARCH_INDEX),
            get(AZURE_SEARCH_API_KEY),
        ) {
            (Some(endpoint), Some(index), Some(api_key)) => Some(SearchSettings {
                endpoint,
                index,
                api_key,
            }),
            (None, None, None) => None,
            _ => {
                warn!(
                    "document search disabled: {AZURE_SEARCH_ENDPOINT}, {AZURE_SEARCH_INDEX} \
                     and {AZURE_SEARCH_API_KEY} must all be set"
                );
                None
            }
        };

        debug!(
            deployment = %openai.deployment,
            api_version = %openai.api_version,
            search = search.is_some(),
            "service configuration loaded"
        );
        Ok(Self { openai, search })
    }
}
