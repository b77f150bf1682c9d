//! Task decomposition: one request in, exactly N task descriptions out.

use async_trait::async_trait;
use convoy_core::error::DecompositionError;
use convoy_core::message::Message;
use convoy_core::provider::{Provider, ProviderRequest};
use convoy_core::task::{Request, TaskSpec};
use std::sync::Arc;
use tracing::{debug, info};

/// Produces an ordered list of task descriptions for a request.
#[async_trait]
pub trait TaskGenerator: Send + Sync {
    async fn generate(
        &self,
        request: &Request,
        num_agents: usize,
    ) -> Result<Vec<String>, DecompositionError>;
}

/// Asks the model for a JSON array of task strings.
pub struct ProviderTaskGenerator {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    prompt_template: String,
}

impl ProviderTaskGenerator {
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        prompt_template: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.7,
            prompt_template: prompt_template.into(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn prompt(&self, request: &Request, num_agents: usize) -> String {
        self.prompt_template
            .replace("{user_input}", request.as_str())
            .replace("{num_agents}", &num_agents.to_string())
    }
}

#[async_trait]
impl TaskGenerator for ProviderTaskGenerator {
    async fn generate(
        &self,
        request: &Request,
        num_agents: usize,
    ) -> Result<Vec<String>, DecompositionError> {
        let messages = vec![Message::user(self.prompt(request, num_agents))];
        let response = self
            .provider
            .complete(ProviderRequest::plain(&self.model, messages, self.temperature))
            .await?;
        parse_task_list(&response.message.content)
    }
}

/// Parse a JSON array of strings, optionally wrapped in a Markdown fence.
pub fn parse_task_list(text: &str) -> Result<Vec<String>, DecompositionError> {
    let body = strip_code_fence(text.trim());
    let values: Vec<serde_json::Value> = serde_json::from_str(body)
        .map_err(|e| DecompositionError::Unparseable(format!("expected a JSON array: {e}")))?;

    let mut tasks = Vec::with_capacity(values.len());
    for (i, value) in values.into_iter().enumerate() {
        let serde_json::Value::String(task) = value else {
            return Err(DecompositionError::Unparseable(format!(
                "item {i} is not a string"
            )));
        };
        let task = task.trim();
        if !task.is_empty() {
            tasks.push(task.to_string());
        }
    }

    if tasks.is_empty() {
        return Err(DecompositionError::Empty);
    }
    Ok(tasks)
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string ("json") on the opening line.
    let rest = rest.split_once('\n').map_or("", |(_, body)| body);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

/// Force a generated list to exactly `n` entries: repeat the last item when
/// short, truncate when long.
pub fn fit_to_count(mut tasks: Vec<String>, n: usize) -> Result<Vec<TaskSpec>, DecompositionError> {
    let last = tasks.last().cloned().ok_or(DecompositionError::Empty)?;
    tasks.truncate(n);
    tasks.resize(n, last);
    Ok(tasks
        .into_iter()
        .enumerate()
        .map(|(index, instruction)| TaskSpec::new(index, instruction))
        .collect())
}

pub struct TaskDecomposer {
    generator: Arc<dyn TaskGenerator>,
}

impl TaskDecomposer {
    pub fn new(generator: Arc<dyn TaskGenerator>) -> Self {
        Self { generator }
    }

    /// Exactly `num_agents` task specs for `request`.
    pub async fn decompose(
        &self,
        request: &Request,
        num_agents: usize,
    ) -> Result<Vec<TaskSpec>, DecompositionError> {
        let generated = self.generator.generate(request, num_agents).await?;
        if generated.len() != num_agents {
            debug!(
                generated = generated.len(),
                expected = num_agents,
                "Adjusting generated task count"
            );
        }
        let tasks = fit_to_count(generated, num_agents)?;
        info!(count = tasks.len(), "Request decomposed");
        Ok(tasks)
    }

    /// The batch used when decomposition fails: the request itself, once
    /// per agent.
    pub fn fallback(request: &Request, num_agents: usize) -> Vec<TaskSpec> {
        (0..num_agents)
            .map(|index| TaskSpec::new(index, request.as_str()))
            .collect()
    }
}
