//! Agent capabilities.
//!
//! A [`Tool`] is something an agent can call between reasoning steps to look
//! something up or compute a value. The [`ToolRegistry`] is assembled once at
//! startup and then shared read-only, behind an `Arc`, by every agent of a run.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ToolError;
use crate::provider::ToolDefinition;

/// One invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned id, echoed back with the observation.
    pub id: String,
    pub name: String,
    /// Decoded arguments. Tools expect a JSON object.
    pub arguments: serde_json::Value,
}

/// What a tool hands back to the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Filled in by [`ToolRegistry::execute`].
    pub call_id: String,
    pub success: bool,
    /// Text the agent sees as its observation.
    pub output: String,
    /// Machine-readable payload for callers that want more than text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ToolResult {
    /// A successful result carrying only text.
    pub fn text(output: impl Into<String>) -> Self {
        Self {
            call_id: String::new(),
            success: true,
            output: output.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// A named capability with a JSON-schema argument contract.
///
/// Implementations should report bad input as [`ToolError::InvalidArguments`]
/// and runtime trouble (network, math domain) as
/// [`ToolError::ExecutionFailed`]; the agent turns either into an error
/// observation and keeps going.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Registry key and the name the model calls it by.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameters_schema(&self) -> serde_json::Value;

    async fn execute(&self, arguments: serde_json::Value) -> std::result::Result<ToolResult, ToolError>;

    /// The advertisement sent to the model with each agent request.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().into(),
            description: self.description().into(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Tools keyed by name, iterated in name order so the definitions sent to
/// the model are stable between requests.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `tool`, replacing any earlier tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.insert(tool.name().to_owned(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(Box::as_ref)
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|tool| tool.to_definition()).collect()
    }

    /// Runs the tool called `name`.
    pub async fn invoke(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> std::result::Result<ToolResult, ToolError> {
        match self.get(name) {
            Some(tool) => tool.execute(arguments).await,
            None => Err(ToolError::NotFound(name.to_owned())),
        }
    }

    /// Runs a model-issued call and tags the result with the call's id.
    pub async fn execute(&self, call: &ToolCall) -> std::result::Result<ToolResult, ToolError> {
        let result = self.invoke(&call.name, call.arguments.clone()).await?;
        Ok(ToolResult {
            call_id: call.id.clone(),
            ..result
        })
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }
}
