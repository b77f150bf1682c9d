//! Provider-backed reasoning step.
//!
//! Each call rebuilds the conversation from the execution state (system
//! prompt, task, then every earlier iteration's drafts, tool calls and
//! observations) and asks the model for the next move.

use crate::executor::{Action, Decision, ExecutionState, ReasoningStep, merge_drafts};
use async_trait::async_trait;
use convoy_core::error::ProviderError;
use convoy_core::message::{Message, MessageToolCall};
use convoy_core::provider::{Provider, ProviderRequest, ToolDefinition};
use convoy_core::task::TaskSpec;
use convoy_core::tool::ToolCall;
use convoy_tools::MARK_TASK_COMPLETE;
use std::sync::Arc;
use tracing::debug;

const EARLY_COMPLETION_NOTE: &str = "Task completion was requested before any work was done. \
Work on the task first, then call mark_task_complete.";
const EMPTY_REPLY_NOTE: &str = "The previous reply was empty. Answer the task.";
const DEFAULT_COMPLETION: &str = "Task completed successfully.";

/// Tool-less replies in a row after which the drafts become the answer.
pub const DEFAULT_NO_TOOL_STREAK: usize = 2;

pub struct ProviderReasoner {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    system_prompt: String,
    tools: Vec<ToolDefinition>,
    finalize_after_no_tool_streak: usize,
}

impl ProviderReasoner {
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        system_prompt: impl Into<String>,
        tools: Vec<ToolDefinition>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            system_prompt: system_prompt.into(),
            tools,
            finalize_after_no_tool_streak: DEFAULT_NO_TOOL_STREAK,
        }
    }

    /// Finalize once this many consecutive replies carry no tool calls.
    /// Zero is treated as one.
    pub fn with_no_tool_streak(mut self, streak: usize) -> Self {
        self.finalize_after_no_tool_streak = streak.max(1);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Conversation for the next call, replaying iterations before the
    /// current one.
    fn conversation(&self, task: &TaskSpec, state: &ExecutionState) -> Vec<Message> {
        let mut messages = vec![
            Message::system(&self.system_prompt),
            Message::user(&task.instruction),
        ];

        for iteration in 1..state.iteration {
            let thought = state
                .drafts
                .iter()
                .find(|d| d.iteration == iteration)
                .map(|d| d.text.as_str())
                .unwrap_or_default();
            let steps = state.history.iter().filter(|s| s.iteration == iteration);

            let mut calls = Vec::new();
            let mut results = Vec::new();
            let mut notes = Vec::new();
            for step in steps {
                match &step.action {
                    Action::Tool(call) => {
                        calls.push(MessageToolCall {
                            id: call.id.clone(),
                            name: call.name.clone(),
                            arguments: call.arguments.to_string(),
                        });
                        results.push(Message::tool_result(&call.id, &step.observation));
                    }
                    Action::Reason => notes.push(Message::user(format!("Note: {}", step.observation))),
                }
            }

            if !calls.is_empty() {
                messages.push(Message::assistant_tool_calls(thought, calls));
                messages.extend(results);
            } else if !thought.is_empty() {
                messages.push(Message::assistant(thought));
            }
            messages.extend(notes);
        }
        messages
    }
}

/// Parse raw tool arguments. Anything that is not valid JSON is kept as a
/// string so the executor reports it as a bad-arguments observation.
fn parse_arguments(raw: &str) -> serde_json::Value {
    let raw = raw.trim();
    if raw.is_empty() {
        return serde_json::json!({});
    }
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

#[async_trait]
impl ReasoningStep for ProviderReasoner {
    async fn decide(
        &self,
        task: &TaskSpec,
        state: &ExecutionState,
    ) -> Result<Decision, ProviderError> {
        let mut request =
            ProviderRequest::plain(&self.model, self.conversation(task, state), self.temperature)
                .with_tools(self.tools.clone());
        request.max_tokens = self.max_tokens;
        let response = self.provider.complete(request).await?;
        let content = response.message.content.trim().to_string();

        let mut calls = Vec::new();
        let mut completion = None;
        for call in response.message.tool_calls {
            let arguments = parse_arguments(&call.arguments);
            if call.name == MARK_TASK_COMPLETE {
                completion = Some(arguments);
                continue;
            }
            calls.push(ToolCall {
                id: call.id,
                name: call.name,
                arguments,
            });
        }

        let drafted = state.drafts.iter().map(|d| d.text.as_str());
        let artifact = merge_drafts(drafted.chain(std::iter::once(content.as_str())));

        if let Some(arguments) = completion {
            let has_work = !artifact.is_empty() || state.tool_steps() > 0;
            if has_work {
                let artifact = if artifact.is_empty() {
                    arguments["completion_message"]
                        .as_str()
                        .map(str::trim)
                        .filter(|m| !m.is_empty())
                        .unwrap_or(DEFAULT_COMPLETION)
                        .to_string()
                } else {
                    artifact
                };
                return Ok(Decision::Complete { artifact });
            }
            debug!(agent = task.index, "Ignoring premature completion call");
            if calls.is_empty() {
                return Ok(Decision::Continue {
                    note: EARLY_COMPLETION_NOTE.into(),
                });
            }
        }

        if !calls.is_empty() {
            return Ok(Decision::UseTools {
                thought: content,
                calls,
            });
        }

        let streak = state.drafting_streak() + 1;
        if streak >= self.finalize_after_no_tool_streak && !artifact.is_empty() {
            debug!(agent = task.index, streak, "Finalizing after tool-less replies");
            return Ok(Decision::Complete { artifact });
        }
        if content.is_empty() {
            return Ok(Decision::Continue {
                note: EMPTY_REPLY_NOTE.into(),
            });
        }
        Ok(Decision::UseTools {
            thought: content,
            calls: Vec::new(),
        })
    }
}
