//! Completion signal. Agents call this once their sub-task is answered.
//!
//! The executor never waits on the tool's output: the reasoning step turns
//! the call itself into a completion decision. The tool still executes so
//! the model sees a normal tool result in its conversation.

use async_trait::async_trait;
use convoy_core::error::ToolError;
use convoy_core::tool::{Tool, ToolResult};

pub const MARK_TASK_COMPLETE: &str = "mark_task_complete";

pub struct MarkTaskCompleteTool;

#[async_trait]
impl Tool for MarkTaskCompleteTool {
    fn name(&self) -> &str {
        MARK_TASK_COMPLETE
    }

    fn description(&self) -> &str {
        "Signal that the assigned task is finished. Call this only after the answer \
         has been written out in full."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "task_summary": {
                    "type": "string",
                    "description": "One-line summary of what was accomplished"
                },
                "completion_message": {
                    "type": "string",
                    "description": "Final message for the user"
                }
            },
            "required": ["task_summary", "completion_message"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let summary = arguments["task_summary"].as_str().unwrap_or_default().trim();
        let message = arguments["completion_message"]
            .as_str()
            .unwrap_or_default()
            .trim();

        let output = if summary.is_empty() {
            "Task marked complete".to_string()
        } else {
            format!("Task marked complete: {summary}")
        };
        Ok(ToolResult::text(output).with_data(serde_json::json!({
            "status": "completed",
            "task_summary": summary,
            "completion_message": message,
        })))
    }
}
