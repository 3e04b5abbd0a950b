//! Document search tool backed by a pluggable [`DocumentSearch`] index.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::error;

use crate::registry::{Tool, ToolError, ToolResult};
use crate::schema::{ParamType, ParameterSpec, ToolArgs, ToolDefinition};

/// Registered name of the search tool.
pub const SEARCH_DOCUMENTS: &str = "search_documents";

/// Hits returned when the caller does not ask for a specific count.
pub const DEFAULT_TOP: u64 = 5;

/// Characters of document content kept per hit.
pub const CONTENT_LIMIT: usize = 500;

const UNTITLED: &str = "Untitled";

/// One document returned by a search backend.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Document title, `None` when the index has none.
    #[serde(default)]
    pub title: Option<String>,
    /// Document body.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub content: String,
    /// Source location.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub url: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Failure reported by a search backend.
#[derive(Debug, Error)]
pub enum SearchError {
    /// The backend rejected the query or could not be reached.
    #[error("{0}")]
    Backend(String),
}

/// Ranked full-text search over an external index.
#[async_trait]
pub trait DocumentSearch: Send + Sync {
    /// Returns at most `top` hits for `query`, best first.
    async fn search(&self, query: &str, top: usize) -> Result<Vec<SearchHit>, SearchError>;
}

/// Builds the `search_documents` tool.
///
/// Without a backend every call returns `[{"error": "search not configured"}]`
/// as a successful outcome rather than a tool failure: the model reads the
/// marker and answers without documents. Backend failures are logged and
/// returned the same way.
///
/// # Errors
///
/// Only fails if the static definition is invalid.
pub fn search_tool(backend: Option<Arc<dyn DocumentSearch>>) -> ToolResult<Tool> {
    let definition = ToolDefinition::new(
        SEARCH_DOCUMENTS,
        "Search for documents in the knowledge base",
    )?
    .with_parameter(
        ParameterSpec::required("query", ParamType::String).describe("The search query"),
    )?
    .with_parameter(
        ParameterSpec::with_default("top", ParamType::Integer, DEFAULT_TOP)
            .describe("Number of results to return"),
    )?;

    Ok(Tool::new(definition, move |args: ToolArgs| {
        let backend = backend.clone();
        async move {
            let query = args.str("query")?;
            let top = usize::try_from(args.i64("top")?)
                .ok()
                .filter(|top| *top >= 1)
                .ok_or_else(|| ToolError::execution("top must be at least 1"))?;

            let Some(backend) = backend else {
                return Ok::<_, ToolError>(json!([{ "error": "search not configured" }]));
            };

            match backend.search(query, top).await {
                Ok(hits) => Ok(Value::Array(hits.into_iter().map(render_hit).collect())),
                Err(err) => {
                    error!(query, error = %err, "document search failed");
                    Ok(json!([{ "error": err.to_string() }]))
                }
            }
        }
    }))
}

fn render_hit(hit: SearchHit) -> Value {
    let title = hit
        .title
        .filter(|title| !title.is_empty())
        .unwrap_or_else(|| UNTITLED.to_owned());
    let content: String = hit.content.chars().take(CONTENT_LIMIT).collect();
    json!({
        "title": title,
        "content": content,
        "url": hit.url,
    })
}
