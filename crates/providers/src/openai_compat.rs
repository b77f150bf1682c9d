//! Chat-completions transport for every backend that speaks the OpenAI wire
//! format: OpenRouter, OpenAI, Groq, Cerebras, SambaNova, Mistral, NVIDIA
//! NIM and Ollama.
//!
//! Requests are always non-streaming. Tool definitions ride along when the
//! caller offers any, and tool calls in the reply are mapped back onto
//! [`MessageToolCall`]s.

use std::time::Duration;

use async_trait::async_trait;
use convoy_core::error::ProviderError;
use convoy_core::message::{Message, MessageToolCall, Role};
use convoy_core::provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition, Usage};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, warn};

const HTTP_TIMEOUT: Duration = Duration::from_secs(120);
/// Wait suggested on a 429 that carries no usable `Retry-After`.
const RATE_LIMIT_BACKOFF_SECS: u64 = 5;

pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .unwrap_or_default();
        let mut base_url: String = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }

        Self {
            name: name.into(),
            base_url,
            api_key: api_key.into(),
            client,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.bearer_auth(&self.api_key)
    }
}

/// Maps a non-success HTTP status onto a provider error.
fn status_error(status: u16, body: String, retry_after: Option<u64>) -> ProviderError {
    match status {
        401 | 403 => {
            ProviderError::AuthenticationFailed("Invalid API key or insufficient permissions".into())
        }
        429 => ProviderError::RateLimited {
            retry_after_secs: retry_after.unwrap_or(RATE_LIMIT_BACKOFF_SECS),
        },
        _ => ProviderError::ApiError {
            status_code: status,
            message: body,
        },
    }
}

/// `Retry-After` in its delay-seconds form. HTTP dates are ignored.
fn retry_after_secs(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

fn transport_error(error: reqwest::Error) -> ProviderError {
    if error.is_timeout() {
        ProviderError::Timeout(error.to_string())
    } else {
        ProviderError::Network(error.to_string())
    }
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

impl From<&Message> for WireMessage {
    fn from(message: &Message) -> Self {
        let tool_calls = message.has_tool_calls().then(|| {
            message
                .tool_calls
                .iter()
                .map(|call| WireToolCall {
                    id: call.id.clone(),
                    kind: FUNCTION.into(),
                    function: WireFunction {
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    },
                })
                .collect()
        });

        Self {
            role: role_name(message.role).into(),
            // Some backends reject assistant turns whose content is missing.
            content: Some(message.content.clone()),
            tool_calls,
            tool_call_id: message.tool_call_id.clone(),
        }
    }
}

impl From<&ToolDefinition> for WireTool {
    fn from(def: &ToolDefinition) -> Self {
        Self {
            kind: FUNCTION.into(),
            function: WireToolSchema {
                name: def.name.clone(),
                description: def.description.clone(),
                parameters: def.parameters.clone(),
            },
        }
    }
}

impl From<&ProviderRequest> for ChatRequest {
    fn from(request: &ProviderRequest) -> Self {
        Self {
            model: request.model.clone(),
            messages: request.messages.iter().map(WireMessage::from).collect(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            tools: request.tools.iter().map(WireTool::from).collect(),
            stream: false,
        }
    }
}

impl TryFrom<ChatResponse> for ProviderResponse {
    type Error = ProviderError;

    fn try_from(response: ChatResponse) -> Result<Self, Self::Error> {
        let Some(choice) = response.choices.into_iter().next() else {
            return Err(ProviderError::ApiError {
                status_code: 200,
                message: "Response contained no choices".into(),
            });
        };

        // Backends that omit call ids get positional ones so observations
        // can still be matched to their call.
        let calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .filter(|call| !call.function.name.is_empty())
            .enumerate()
            .map(|(position, call)| MessageToolCall {
                id: if call.id.is_empty() {
                    format!("call_{position}")
                } else {
                    call.id
                },
                name: call.function.name,
                arguments: call.function.arguments,
            })
            .collect();

        Ok(ProviderResponse {
            message: Message::assistant_tool_calls(choice.message.content.unwrap_or_default(), calls),
            usage: response.usage.map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
            model: response.model,
        })
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        debug!(
            provider = %self.name,
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Requesting chat completion"
        );

        let response = self
            .authorized(self.client.post(self.endpoint("chat/completions")))
            .json(&ChatRequest::from(&request))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = retry_after_secs(response.headers());
            let body = response.text().await.unwrap_or_default();
            warn!(provider = %self.name, status = status.as_u16(), body = %body, "Chat completion rejected");
            return Err(status_error(status.as_u16(), body, retry_after));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| ProviderError::ApiError {
            status_code: status.as_u16(),
            message: format!("Unreadable completion body: {e}"),
        })?;
        parsed.try_into()
    }
}

// Wire format

const FUNCTION: &str = "function";

fn function_kind() -> String {
    FUNCTION.into()
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    #[serde(default)]
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: WireFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunction {
    #[serde(default)]
    name: String,
    #[serde(default, deserialize_with = "arguments_as_string")]
    arguments: String,
}

/// Ollama and a few others send arguments as a JSON object rather than an
/// encoded string.
fn arguments_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => "{}".into(),
        Some(serde_json::Value::String(encoded)) => encoded,
        Some(other) => other.to_string(),
    })
}

#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: String,
    function: WireToolSchema,
}

#[derive(Debug, Serialize)]
struct WireToolSchema {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: String,
    choices: Vec<ChatChoice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: WireMessage,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}
