//! Wall-clock tool.

use chrono::{Local, SecondsFormat};
use serde_json::Value;

use crate::registry::{Tool, ToolError, ToolResult};
use crate::schema::{ToolArgs, ToolDefinition};

/// Registered name of the time tool.
pub const GET_CURRENT_TIME: &str = "get_current_time";

/// Returns the local time as an RFC 3339 timestamp with second precision,
/// e.g. `2024-05-01T13:37:00+02:00`.
#[must_use]
pub fn current_time() -> String {
    Local::now().to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// Builds the `get_current_time` tool.
///
/// # Errors
///
/// Only fails if the static definition is invalid.
pub fn time_tool() -> ToolResult<Tool> {
    let definition = ToolDefinition::new(GET_CURRENT_TIME, "Get the current date and time")?;
    Ok(Tool::new(definition, |_: ToolArgs| async move {
        Ok::<_, ToolError>(Value::from(current_time()))
    }))
}
