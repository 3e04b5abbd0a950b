//! Extractive summary tool: keeps the leading sentences of a text.

use serde_json::Value;

use crate::registry::{Tool, ToolError, ToolResult};
use crate::schema::{ParamType, ParameterSpec, ToolArgs, ToolDefinition};

/// Registered name of the summary tool.
pub const CREATE_SUMMARY: &str = "create_summary";

/// Sentences kept when the caller does not say otherwise.
pub const DEFAULT_MAX_SENTENCES: usize = 3;

/// Returns the first `max_sentences` sentences of `text`.
///
/// `!` and `?` end a sentence just like `.`. Sentences are trimmed, empty ones
/// dropped, and the survivors joined with `". "` followed by a single `.`.
#[must_use]
pub fn summarize(text: &str, max_sentences: usize) -> String {
    let sentences: Vec<&str> = text
        .split(['.', '!', '?'])
        .map(str::trim)
        .filter(|sentence| !sentence.is_empty())
        .take(max_sentences)
        .collect();

    let mut summary = sentences.join(". ");
    summary.push('.');
    summary
}

/// Builds the `create_summary` tool.
///
/// # Errors
///
/// Only fails if the static definition is invalid.
pub fn summary_tool() -> ToolResult<Tool> {
    let definition = ToolDefinition::new(CREATE_SUMMARY, "Summarize text content")?
        .with_parameter(
            ParameterSpec::required("text", ParamType::String).describe("The text to summarize"),
        )?
        .with_parameter(
            ParameterSpec::with_default(
                "max_sentences",
                ParamType::Integer,
                DEFAULT_MAX_SENTENCES as u64,
            )
            .describe("Maximum number of sentences in the summary"),
        )?;

    Ok(Tool::new(definition, |args: ToolArgs| async move {
        let text = args.str("text")?;
        let max_sentences = usize::try_from(args.i64("max_sentences")?)
            .map_err(|_| ToolError::execution("max_sentences must not be negative"))?;
        Ok::<_, ToolError>(Value::from(summarize(text, max_sentences)))
    }))
}
