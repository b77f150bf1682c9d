//! The orchestrator: decompose, fan out, fan in, aggregate.
//!
//! One tokio task per [`TaskSpec`]. A semaphore caps how many run at once;
//! each agent's deadline is armed when it gets a slot, so queued agents do
//! not burn their budget waiting. Outcomes are slotted by task position, so
//! completion order never leaks into the result.

use crate::aggregator::{Aggregator, ProviderSynthesizer};
use crate::decomposer::{ProviderTaskGenerator, TaskDecomposer};
use crate::executor::AgentExecutor;
use crate::reasoner::ProviderReasoner;
use chrono::Utc;
use convoy_config::AppConfig;
use convoy_core::error::Result;
use convoy_core::event::{DomainEvent, EventBus};
use convoy_core::provider::Provider;
use convoy_core::task::{AggregatedResult, FailureKind, Outcome, Request, TaskSpec};
use convoy_core::tool::ToolRegistry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{error, info, warn};

pub struct Orchestrator {
    decomposer: TaskDecomposer,
    executor: Arc<AgentExecutor>,
    aggregator: Aggregator,
    events: Arc<EventBus>,
    num_agents: usize,
    concurrency: usize,
    task_timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        decomposer: TaskDecomposer,
        executor: AgentExecutor,
        aggregator: Aggregator,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            decomposer,
            executor: Arc::new(executor),
            aggregator,
            events,
            num_agents: 4,
            concurrency: 4,
            task_timeout: Duration::from_secs(300),
        }
    }

    /// Number of agents per request. Also resets the concurrency cap.
    pub fn with_agents(mut self, num_agents: usize) -> Self {
        self.num_agents = num_agents;
        self.concurrency = num_agents;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }

    /// Wire the provider-backed generator, reasoner and synthesizer from
    /// configuration.
    pub fn from_config(
        config: &AppConfig,
        provider: Arc<dyn Provider>,
        model: &str,
        tools: Arc<ToolRegistry>,
        events: Arc<EventBus>,
    ) -> Self {
        let orchestration = &config.orchestrator;
        let temperature = config.default_temperature;

        let generator = ProviderTaskGenerator::new(
            provider.clone(),
            model,
            &orchestration.question_generation_prompt,
        )
        .with_temperature(temperature);

        let reasoner = ProviderReasoner::new(
            provider.clone(),
            model,
            &config.agent.system_prompt,
            tools.definitions(),
        )
        .with_temperature(temperature)
        .with_max_tokens(config.max_tokens)
        .with_no_tool_streak(config.agent.finalize_after_no_tool_streak);

        let synthesizer = ProviderSynthesizer::new(provider, model, &orchestration.synthesis_prompt)
            .with_temperature(temperature)
            .with_max_tokens(config.max_tokens);

        let executor = AgentExecutor::new(
            Arc::new(reasoner),
            tools,
            config.agent.max_iterations,
            events.clone(),
        );
        let aggregator = Aggregator::new(
            orchestration.aggregation_strategy,
            Arc::new(synthesizer),
            events.clone(),
        );

        Self::new(
            TaskDecomposer::new(Arc::new(generator)),
            executor,
            aggregator,
            events,
        )
        .with_agents(orchestration.parallel_agents)
        .with_concurrency(orchestration.concurrency())
        .with_task_timeout(orchestration.task_timeout())
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Handle one request end to end.
    ///
    /// Fails only when no agent produced a usable artifact.
    pub async fn run(&self, request: &Request) -> Result<AggregatedResult> {
        info!(agents = self.num_agents, concurrency = self.concurrency, "Orchestrating request");
        let tasks = self.plan(request).await;
        let outcomes = self.dispatch(tasks).await;
        Ok(self.aggregator.aggregate(request, outcomes).await?)
    }

    /// Decompose, substituting the fallback batch on failure.
    async fn plan(&self, request: &Request) -> Vec<TaskSpec> {
        let (tasks, fallback) = match self.decomposer.decompose(request, self.num_agents).await {
            Ok(tasks) => (tasks, false),
            Err(e) => {
                warn!("Decomposition failed: {e}; every agent gets the original request");
                (TaskDecomposer::fallback(request, self.num_agents), true)
            }
        };
        self.events.publish(DomainEvent::TasksDecomposed {
            count: tasks.len(),
            fallback,
            timestamp: Utc::now(),
        });
        tasks
    }

    /// Run every task to an outcome. `result[i]` belongs to `tasks[i]`.
    pub async fn dispatch(&self, tasks: Vec<TaskSpec>) -> Vec<Outcome> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency.max(1)));
        let mut slots: Vec<Option<Outcome>> = vec![None; tasks.len()];
        let mut positions = HashMap::new();
        let mut set = JoinSet::new();

        for (position, task) in tasks.into_iter().enumerate() {
            self.events.publish(DomainEvent::AgentQueued {
                index: task.index,
                timestamp: Utc::now(),
            });

            let executor = self.executor.clone();
            let semaphore = semaphore.clone();
            let events = self.events.clone();
            let timeout = self.task_timeout;

            let handle = set.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (position, aborted("scheduler closed before the agent started"));
                };
                let deadline = Instant::now() + timeout;
                events.publish(DomainEvent::AgentStarted {
                    index: task.index,
                    timestamp: Utc::now(),
                });

                let run = executor.run(&task, deadline).await;
                info!(
                    agent = task.index,
                    status = run.outcome.label(),
                    iterations = run.iterations(),
                    "Agent finished"
                );
                events.publish(DomainEvent::AgentFinished {
                    index: task.index,
                    status: run.outcome.label().to_string(),
                    iterations: run.iterations(),
                    timestamp: Utc::now(),
                });
                (position, run.outcome)
            });
            positions.insert(handle.id(), position);
        }

        while let Some(joined) = set.join_next_with_id().await {
            match joined {
                Ok((_, (position, outcome))) => slots[position] = Some(outcome),
                Err(e) => {
                    error!("Agent task died: {e}");
                    if let Some(&position) = positions.get(&e.id()) {
                        slots[position] = Some(aborted(&e.to_string()));
                    }
                }
            }
        }

        slots
            .into_iter()
            .map(|slot| slot.unwrap_or_else(|| aborted("agent produced no outcome")))
            .collect()
    }
}

fn aborted(detail: &str) -> Outcome {
    Outcome::Failed {
        kind: FailureKind::Aborted,
        detail: detail.to_string(),
        partial: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::Synthesizer;
    use crate::decomposer::TaskGenerator;
    use crate::executor::{Decision, ExecutionState, ReasoningStep};
    use crate::test_helpers::{SequentialMockProvider, echo_registry};
    use async_trait::async_trait;
    use convoy_config::AggregationStrategy;
    use convoy_core::error::{AggregationError, DecompositionError, Error, ProviderError};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Completes each task with "part{index}" after a per-index delay.
    #[derive(Default)]
    struct PartsReasoner {
        delays: HashMap<usize, Duration>,
        failing: HashSet<usize>,
        panicking: HashSet<usize>,
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl ReasoningStep for PartsReasoner {
        async fn decide(
            &self,
            task: &TaskSpec,
            _state: &ExecutionState,
        ) -> std::result::Result<Decision, ProviderError> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let delay = self.delays.get(&task.index).copied().unwrap_or(Duration::from_secs(1));
            tokio::time::sleep(delay).await;
            self.running.fetch_sub(1, Ordering::SeqCst);

            if self.panicking.contains(&task.index) {
                panic!("agent {} blew up", task.index);
            }
            if self.failing.contains(&task.index) {
                return Err(ProviderError::Network("unreachable".into()));
            }
            Ok(Decision::Complete { artifact: format!("part{}", task.index) })
        }
    }

    struct Generated(std::result::Result<Vec<String>, DecompositionError>);

    #[async_trait]
    impl TaskGenerator for Generated {
        async fn generate(
            &self,
            _: &Request,
            _: usize,
        ) -> std::result::Result<Vec<String>, DecompositionError> {
            self.0.clone()
        }
    }

    struct CommaMerge;

    #[async_trait]
    impl Synthesizer for CommaMerge {
        async fn merge(
            &self,
            _: &Request,
            artifacts: &[String],
        ) -> std::result::Result<String, ProviderError> {
            Ok(artifacts.join(","))
        }
    }

    fn orchestrator(
        reasoner: Arc<PartsReasoner>,
        generated: std::result::Result<Vec<String>, DecompositionError>,
        agents: usize,
    ) -> Orchestrator {
        let events = Arc::new(EventBus::default());
        Orchestrator::new(
            TaskDecomposer::new(Arc::new(Generated(generated))),
            AgentExecutor::new(reasoner, Arc::new(echo_registry()), 1, events.clone()),
            Aggregator::new(AggregationStrategy::Consensus, Arc::new(CommaMerge), events.clone()),
            events,
        )
        .with_agents(agents)
        .with_task_timeout(Duration::from_secs(30))
    }

    fn tasks(n: usize) -> std::result::Result<Vec<String>, DecompositionError> {
        Ok((0..n).map(|i| format!("task {i}")).collect())
    }

    #[tokio::test(start_paused = true)]
    async fn outcomes_are_indexed_by_task_not_completion_order() {
        let reasoner = Arc::new(PartsReasoner {
            delays: HashMap::from([
                (0, Duration::from_secs(4)),
                (1, Duration::from_secs(3)),
                (2, Duration::from_secs(2)),
                (3, Duration::from_secs(1)),
            ]),
            ..Default::default()
        });
        let result = orchestrator(reasoner, tasks(4), 4)
            .run(&Request::new("r"))
            .await
            .unwrap();

        assert_eq!(result.outcomes.len(), 4);
        assert_eq!(result.artifact, "part0,part1,part2,part3");
        assert_eq!(result.contributors, vec![0, 1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_agent_times_out_without_blocking_siblings() {
        let reasoner = Arc::new(PartsReasoner {
            delays: HashMap::from([(1, Duration::from_secs(3600))]),
            ..Default::default()
        });
        let start = Instant::now();
        let result = orchestrator(reasoner, tasks(4), 4)
            .run(&Request::new("r"))
            .await
            .unwrap();

        assert_eq!(result.outcomes[1], Outcome::TimedOut { partial: None });
        for i in [0, 2, 3] {
            assert_eq!(result.outcomes[i], Outcome::Completed { artifact: format!("part{i}") });
        }
        assert_eq!(result.counts.timed_out, 1);
        assert_eq!(result.artifact, "part0,part2,part3");
        assert!(start.elapsed() < Duration::from_secs(3600));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_cap_queues_agents_and_arms_deadline_on_start() {
        let reasoner = Arc::new(PartsReasoner {
            delays: (0..4).map(|i| (i, Duration::from_secs(20))).collect(),
            ..Default::default()
        });
        let start = Instant::now();
        // Each agent needs 20s of its 30s budget; the queued pair would
        // time out if their deadline started at dispatch.
        let result = orchestrator(reasoner.clone(), tasks(4), 4)
            .with_concurrency(2)
            .run(&Request::new("r"))
            .await
            .unwrap();

        assert_eq!(reasoner.peak.load(Ordering::SeqCst), 2);
        assert_eq!(result.counts.completed, 4);
        assert!(start.elapsed() >= Duration::from_secs(40));
    }

    #[tokio::test(start_paused = true)]
    async fn decomposition_failure_uses_fallback_batch() {
        let reasoner = Arc::new(PartsReasoner::default());
        let orchestrator = orchestrator(
            reasoner,
            Err(DecompositionError::Unparseable("prose".into())),
            3,
        );
        let mut events = orchestrator.events().subscribe();
        let result = orchestrator.run(&Request::new("r")).await.unwrap();

        assert_eq!(result.counts.completed, 3);
        match events.recv().await.unwrap().as_ref() {
            DomainEvent::TasksDecomposed { count, fallback, .. } => {
                assert_eq!(*count, 3);
                assert!(*fallback);
            }
            other => panic!("unexpected first event {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_agent_still_yields_an_outcome() {
        let reasoner = Arc::new(PartsReasoner {
            panicking: HashSet::from([2]),
            ..Default::default()
        });
        let result = orchestrator(reasoner, tasks(3), 3)
            .run(&Request::new("r"))
            .await
            .unwrap();

        assert!(matches!(
            result.outcomes[2],
            Outcome::Failed { kind: FailureKind::Aborted, .. }
        ));
        assert_eq!(result.artifact, "part0,part1");
    }

    #[tokio::test(start_paused = true)]
    async fn all_agents_failing_is_a_hard_error() {
        let reasoner = Arc::new(PartsReasoner {
            failing: (0..3).collect(),
            ..Default::default()
        });
        let err = orchestrator(reasoner, tasks(3), 3)
            .run(&Request::new("r"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Aggregation(AggregationError::NoUsableResults { failed: 3, .. })
        ));
    }

    #[tokio::test]
    async fn from_config_runs_on_one_provider() {
        let mut config = AppConfig::default();
        config.orchestrator.parallel_agents = 2;
        config.orchestrator.max_concurrency = Some(1);

        // Sequential: decomposition, two drafts per agent, synthesis.
        let provider = Arc::new(SequentialMockProvider::texts(&[
            r#"["first angle", "second angle"]"#,
            "answer one",
            "more on one",
            "answer two",
            "more on two",
            "final merged answer",
        ]));
        let orchestrator = Orchestrator::from_config(
            &config,
            provider.clone(),
            "mock-model",
            Arc::new(echo_registry()),
            Arc::new(EventBus::default()),
        );
        let result = orchestrator.run(&Request::new("topic")).await.unwrap();

        assert_eq!(result.artifact, "final merged answer");
        assert_eq!(result.counts.completed, 2);
        assert_eq!(provider.call_count(), 6);

        let synthesis = &provider.requests()[5];
        assert!(synthesis.messages.iter().any(|m| m.content.contains("answer one\n\nmore on one")));
    }
}
