//! Tools the CLI offers the model out of the box.

use async_trait::async_trait;
use chatweave_core::error::ToolError;
use chatweave_core::progress::Progress;
use chatweave_core::tool::{Tool, ToolRegistry, ToolResult};
use chrono::{FixedOffset, Utc};

/// Current date and time, optionally shifted to a fixed UTC offset.
pub struct CurrentTimeTool;

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        "current_time"
    }

    fn description(&self) -> &str {
        "Get the current date and time in RFC 3339 format. Defaults to UTC."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "utc_offset_hours": {
                    "type": "integer",
                    "description": "Offset from UTC in whole hours, between -12 and 14 (default: 0)"
                }
            }
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        _progress: &Progress<serde_json::Value>,
    ) -> Result<ToolResult, ToolError> {
        let hours = arguments["utc_offset_hours"].as_i64().unwrap_or(0);
        let offset = i32::try_from(hours)
            .ok()
            .filter(|h| (-12..=14).contains(h))
            .and_then(|h| FixedOffset::east_opt(h * 3600))
            .ok_or_else(|| {
                ToolError::InvalidArguments(format!("utc_offset_hours out of range: {hours}"))
            })?;

        let now = Utc::now().with_timezone(&offset);
        Ok(ToolResult {
            output: now.to_rfc3339(),
            data: Some(serde_json::json!({ "utc_offset_hours": hours })),
        })
    }
}

/// Registry with every built-in tool.
pub fn builtin_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(CurrentTimeTool));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatweave_core::tool::Toolset;

    #[tokio::test]
    async fn defaults_to_utc() {
        let result = CurrentTimeTool
            .execute(serde_json::json!({}), &Progress::noop())
            .await
            .unwrap();
        let parsed = chrono::DateTime::parse_from_rfc3339(&result.output).unwrap();
        assert_eq!(parsed.offset().local_minus_utc(), 0);
    }

    #[tokio::test]
    async fn applies_offset() {
        let result = CurrentTimeTool
            .execute(serde_json::json!({"utc_offset_hours": -5}), &Progress::noop())
            .await
            .unwrap();
        assert!(result.output.ends_with("-05:00"));
    }

    #[tokio::test]
    async fn rejects_out_of_range_offset() {
        let err = CurrentTimeTool
            .execute(serde_json::json!({"utc_offset_hours": 30}), &Progress::noop())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[test]
    fn registry_advertises_current_time() {
        let names: Vec<String> = builtin_registry()
            .available_tools()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["current_time"]);
    }
}
