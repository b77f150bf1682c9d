//! Result aggregation.
//!
//! The consensus strategy merges every usable artifact, in task order,
//! through a single synthesis call. Outcomes without an artifact are left
//! out of the merge but still counted.

use async_trait::async_trait;
use chrono::Utc;
use convoy_config::AggregationStrategy;
use convoy_core::error::{AggregationError, ProviderError};
use convoy_core::event::{DomainEvent, EventBus};
use convoy_core::message::Message;
use convoy_core::provider::{Provider, ProviderRequest};
use convoy_core::task::{AggregatedResult, Outcome, OutcomeCounts, Request};
use std::sync::Arc;
use tracing::{info, warn};

/// Merges candidate artifacts into one.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn merge(&self, request: &Request, artifacts: &[String]) -> Result<String, ProviderError>;
}

/// Synthesis through one tool-less model call.
pub struct ProviderSynthesizer {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    prompt_template: String,
}

impl ProviderSynthesizer {
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        prompt_template: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            prompt_template: prompt_template.into(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn prompt(&self, request: &Request, artifacts: &[String]) -> String {
        let responses: String = artifacts
            .iter()
            .enumerate()
            .map(|(i, a)| format!("=== AGENT {} RESPONSE ===\n{a}\n\n", i + 1))
            .collect();
        self.prompt_template
            .replace("{user_input}", request.as_str())
            .replace("{num_responses}", &artifacts.len().to_string())
            .replace("{agent_responses}", &responses)
    }
}

#[async_trait]
impl Synthesizer for ProviderSynthesizer {
    async fn merge(&self, request: &Request, artifacts: &[String]) -> Result<String, ProviderError> {
        let mut req = ProviderRequest::plain(
            &self.model,
            vec![Message::user(self.prompt(request, artifacts))],
            self.temperature,
        );
        req.max_tokens = self.max_tokens;
        let response = self.provider.complete(req).await?;
        Ok(response.message.content.trim().to_string())
    }
}

/// Plain concatenation used when synthesis is unavailable.
pub fn concatenate(artifacts: &[String]) -> String {
    artifacts
        .iter()
        .enumerate()
        .map(|(i, a)| format!("=== Agent {} Response ===\n{a}", i + 1))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub struct Aggregator {
    strategy: AggregationStrategy,
    synthesizer: Arc<dyn Synthesizer>,
    events: Arc<EventBus>,
}

impl Aggregator {
    pub fn new(
        strategy: AggregationStrategy,
        synthesizer: Arc<dyn Synthesizer>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            strategy,
            synthesizer,
            events,
        }
    }

    /// Merge `outcomes` (ordered by task index) into one result.
    pub async fn aggregate(
        &self,
        request: &Request,
        outcomes: Vec<Outcome>,
    ) -> Result<AggregatedResult, AggregationError> {
        let counts = OutcomeCounts::from_outcomes(&outcomes);
        let (contributors, artifacts): (Vec<usize>, Vec<String>) = outcomes
            .iter()
            .enumerate()
            .filter_map(|(i, o)| o.usable_artifact().map(|a| (i, a.trim().to_string())))
            .unzip();

        if artifacts.is_empty() {
            return Err(AggregationError::NoUsableResults {
                completed: counts.completed,
                failed: counts.failed,
                timed_out: counts.timed_out,
            });
        }

        let (artifact, synthesized) = match self.strategy {
            AggregationStrategy::Consensus => self.consensus(request, &artifacts).await,
        };

        info!(
            contributors = contributors.len(),
            completed = counts.completed,
            failed = counts.failed,
            timed_out = counts.timed_out,
            synthesized,
            "Aggregation finished"
        );
        self.events.publish(DomainEvent::AggregationFinished {
            contributors: contributors.len(),
            synthesized,
            timestamp: Utc::now(),
        });

        Ok(AggregatedResult {
            artifact,
            counts,
            contributors,
            outcomes,
        })
    }

    /// Returns the merged artifact and whether synthesis produced it.
    async fn consensus(&self, request: &Request, artifacts: &[String]) -> (String, bool) {
        if let [only] = artifacts {
            return (only.clone(), false);
        }
        match self.synthesizer.merge(request, artifacts).await {
            Ok(merged) if !merged.trim().is_empty() => (merged, true),
            Ok(_) => {
                warn!("Synthesis returned nothing; concatenating agent responses");
                (concatenate(artifacts), false)
            }
            Err(e) => {
                warn!("Synthesis failed: {e}; concatenating agent responses");
                (concatenate(artifacts), false)
            }
        }
    }
}
