//! The model backend seam.
//!
//! Agents, task generation and synthesis reach the model only through
//! [`Provider::complete`], so tests swap in scripted providers and the CLI
//! plugs in whichever HTTP backend the config names.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::Message;

const DEFAULT_TEMPERATURE: f32 = 0.7;

fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// Backend-specific model id, e.g. "moonshotai/kimi-k2" or "gpt-4o".
    pub model: String,
    pub messages: Vec<Message>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// `None` leaves the completion length to the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Tools offered to the model for this turn. Empty for task generation
    /// and synthesis.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

impl ProviderRequest {
    /// A request without tools.
    pub fn plain(model: impl Into<String>, messages: Vec<Message>, temperature: f32) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature,
            max_tokens: None,
            tools: Vec::new(),
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }
}

/// How a tool is advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the call arguments.
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// The assistant turn: text, tool calls, or both.
    pub message: Message,
    pub usage: Option<Usage>,
    /// The model that actually answered, as reported by the backend.
    pub model: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A chat-completion backend.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Short identifier such as "openrouter" or "ollama".
    fn name(&self) -> &str;

    async fn complete(&self, request: ProviderRequest) -> std::result::Result<ProviderResponse, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_request_offers_no_tools() {
        let req = ProviderRequest::plain("gpt-4o", vec![Message::user("hi")], 0.3);
        assert!(req.tools.is_empty());
        assert_eq!(req.max_tokens, None);
        assert!((req.temperature - 0.3).abs() < f32::EPSILON);
    }

    #[test]
    fn with_tools_attaches_definitions() {
        let def = ToolDefinition {
            name: "calculator".into(),
            description: "Evaluate arithmetic".into(),
            parameters: serde_json::json!({ "type": "object" }),
        };
        let req = ProviderRequest::plain("m", Vec::new(), 0.7).with_tools(vec![def.clone()]);
        assert_eq!(req.tools, vec![def]);
    }

    #[test]
    fn missing_temperature_deserializes_to_default() {
        let req: ProviderRequest =
            serde_json::from_str(r#"{"model": "m", "messages": []}"#).unwrap();
        assert!((req.temperature - DEFAULT_TEMPERATURE).abs() < f32::EPSILON);
        assert!(req.tools.is_empty());
    }

    #[test]
    fn unset_optionals_are_skipped() {
        let json = serde_json::to_value(ProviderRequest::plain("m", Vec::new(), 0.5)).unwrap();
        assert!(json.get("max_tokens").is_none());
        assert!(json.get("tools").is_none());
    }
}
