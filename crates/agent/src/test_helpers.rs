//! Shared test doubles for the agent crate.

use crate::executor::{Decision, ExecutionState, ReasoningStep};
use async_trait::async_trait;
use convoy_core::error::{ProviderError, ToolError};
use convoy_core::message::{Message, MessageToolCall};
use convoy_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use convoy_core::task::TaskSpec;
use convoy_core::tool::{Tool, ToolCall, ToolRegistry, ToolResult};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// A reasoning step that replays scripted decisions.
///
/// Once the script runs out it keeps returning the `repeat` decision if one
/// was given, otherwise it panics.
pub struct ScriptedReasoner {
    script: Vec<Result<Decision, ProviderError>>,
    repeat: Option<Decision>,
    delays: HashMap<usize, Duration>,
    calls: Mutex<usize>,
}

impl ScriptedReasoner {
    pub fn new(script: Vec<Result<Decision, ProviderError>>) -> Self {
        Self {
            script,
            repeat: None,
            delays: HashMap::new(),
            calls: Mutex::new(0),
        }
    }

    pub fn repeating(decision: Decision) -> Self {
        Self {
            repeat: Some(decision),
            ..Self::new(vec![])
        }
    }

    /// Sleep before answering the `call`-th request (0-based).
    pub fn with_delay(mut self, call: usize, delay: Duration) -> Self {
        self.delays.insert(call, delay);
        self
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl ReasoningStep for ScriptedReasoner {
    async fn decide(
        &self,
        _task: &TaskSpec,
        _state: &ExecutionState,
    ) -> Result<Decision, ProviderError> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            *calls - 1
        };
        if let Some(delay) = self.delays.get(&call) {
            tokio::time::sleep(*delay).await;
        }
        match self.script.get(call) {
            Some(step) => step.clone(),
            None => match &self.repeat {
                Some(decision) => Ok(decision.clone()),
                None => panic!("ScriptedReasoner: script exhausted at call #{call}"),
            },
        }
    }
}

/// Echoes its `text` argument back.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo the text argument"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "text": { "type": "string" } },
            "required": ["text"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let text = arguments["text"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("missing text".into()))?;
        Ok(ToolResult::text(text))
    }
}

pub fn echo_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(EchoTool));
    registry
}

pub fn tool_call(name: &str, arguments: serde_json::Value) -> ToolCall {
    ToolCall {
        id: format!("call_{name}"),
        name: name.to_string(),
        arguments,
    }
}

/// A provider that returns scripted responses in order and keeps every
/// request it was sent.
pub struct SequentialMockProvider {
    responses: Mutex<Vec<Result<ProviderResponse, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn texts(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| Ok(make_text_response(t))).collect())
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let call = requests.len();
        requests.push(request);

        let responses = self.responses.lock().unwrap();
        match responses.get(call) {
            Some(response) => response.clone(),
            None => panic!(
                "SequentialMockProvider: no more responses (call #{call}, have {})",
                responses.len()
            ),
        }
    }
}

pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

pub fn make_tool_call_response(tool_calls: Vec<MessageToolCall>, thought: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant_tool_calls(thought, tool_calls),
        ..make_text_response(thought)
    }
}

pub fn make_tool_call(name: &str, arguments: &str) -> MessageToolCall {
    MessageToolCall {
        id: format!("call_{name}"),
        name: name.to_string(),
        arguments: arguments.to_string(),
    }
}
