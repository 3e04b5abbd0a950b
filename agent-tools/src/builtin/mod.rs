//! Tools shipped with the runtime.

mod calculator;
mod search;
mod summary;
mod time;

use std::sync::Arc;

pub use calculator::{CALCULATE, CalcError, calculate, calculator_tool, evaluate};
pub use search::{
    CONTENT_LIMIT, DEFAULT_TOP, DocumentSearch, SEARCH_DOCUMENTS, SearchError, SearchHit,
    search_tool,
};
pub use summary::{CREATE_SUMMARY, DEFAULT_MAX_SENTENCES, summarize, summary_tool};
pub use time::{GET_CURRENT_TIME, current_time, time_tool};

use crate::registry::{ToolRegistry, ToolResult};

/// Registers every built-in tool: time, search, calculator, then summary.
///
/// Search is always registered; without a backend it reports that it is not
/// configured.
///
/// # Errors
///
/// Returns [`crate::ToolError::DuplicateTool`] if one of the names is taken.
pub fn register_defaults(
    registry: &ToolRegistry,
    search: Option<Arc<dyn DocumentSearch>>,
) -> ToolResult<()> {
    registry.register(time_tool()?)?;
    registry.register(search_tool(search)?)?;
    registry.register(calculator_tool()?)?;
    registry.register(summary_tool()?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::registry::{ToolInvocationRequest, ToolOutcome};

    #[test]
    fn defaults_register_in_order() {
        let registry = ToolRegistry::new();
        register_defaults(&registry, None).unwrap();

        let names: Vec<String> = registry
            .describe_all()
            .into_iter()
            .map(|definition| definition.name().to_owned())
            .collect();
        assert_eq!(
            names,
            [GET_CURRENT_TIME, SEARCH_DOCUMENTS, CALCULATE, CREATE_SUMMARY]
        );
        assert!(register_defaults(&registry, None).is_err());
        assert_eq!(registry.len(), 4);
    }

    #[tokio::test]
    async fn dispatches_builtin_tools() {
        let registry = ToolRegistry::new();
        register_defaults(&registry, None).unwrap();

        let outcome = registry
            .dispatch(&ToolInvocationRequest::from_json(CALCULATE, r#"{"expression":"2 + 2 * 3"}"#).unwrap())
            .await;
        assert_eq!(outcome, ToolOutcome::Success(json!("8")));

        let outcome = registry
            .dispatch(
                &ToolInvocationRequest::from_json(CALCULATE, r#"{"expression":"2+2; import os"}"#)
                    .unwrap(),
            )
            .await;
        assert_eq!(outcome, ToolOutcome::Failure("invalid characters".into()));

        let outcome = registry
            .dispatch(
                &ToolInvocationRequest::from_value(
                    CREATE_SUMMARY,
                    json!({"text": "Hi! Are you there? Yes.", "max_sentences": 2}),
                )
                .unwrap(),
            )
            .await;
        assert_eq!(outcome, ToolOutcome::Success(json!("Hi. Are you there.")));
    }
}
