//! The agent executor: one bounded Plan → Act → Observe loop per task.
//!
//! ```text
//! Planning ──decide──▶ ToolInvoking ──result──▶ Observing ──▶ Planning
//!    │                                                          │
//!    ├──complete──▶ Completed        budget exhausted ──▶ Failed
//!    └──────────────── deadline at any suspension point ──▶ TimedOut
//! ```
//!
//! Every await in the loop (the reasoning step and each tool call) is raced
//! against the deadline the orchestrator hands in. When the deadline wins,
//! the in-flight future is dropped and the outcome is built from the state
//! this executor still owns.

use async_trait::async_trait;
use chrono::Utc;
use convoy_core::error::ProviderError;
use convoy_core::event::{DomainEvent, EventBus};
use convoy_core::task::{FailureKind, Outcome, TaskSpec};
use convoy_core::tool::{ToolCall, ToolRegistry};
use std::sync::Arc;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};

/// Where the state machine currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentPhase {
    Planning,
    ToolInvoking,
    Observing,
    Completed,
    Failed,
    TimedOut,
}

impl AgentPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::TimedOut)
    }
}

/// What the agent did in one history entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// A tool invocation.
    Tool(ToolCall),
    /// The reasoning step itself produced no usable decision.
    Reason,
}

/// One (action, observation) pair.
#[derive(Debug, Clone)]
pub struct Step {
    /// Iteration (1-based) the step belongs to.
    pub iteration: usize,
    pub action: Action,
    pub observation: String,
    pub success: bool,
}

/// Text the reasoning step wrote alongside its tool calls.
#[derive(Debug, Clone)]
pub struct Draft {
    pub iteration: usize,
    pub text: String,
}

/// Per-agent mutable state. Owned by exactly one executor run.
#[derive(Debug, Clone)]
pub struct ExecutionState {
    pub iteration: usize,
    pub history: Vec<Step>,
    pub drafts: Vec<Draft>,
    pub completed: bool,
    pub artifact: Option<String>,
    pub last_error: Option<String>,
    phase: AgentPhase,
}

impl Default for ExecutionState {
    fn default() -> Self {
        Self {
            iteration: 0,
            history: Vec::new(),
            drafts: Vec::new(),
            completed: false,
            artifact: None,
            last_error: None,
            phase: AgentPhase::Planning,
        }
    }
}

impl ExecutionState {
    pub fn phase(&self) -> AgentPhase {
        self.phase
    }

    fn transition(&mut self, to: AgentPhase) {
        debug!(from = ?self.phase, ?to, iteration = self.iteration, "Agent phase change");
        self.phase = to;
    }

    fn record(&mut self, action: Action, observation: impl Into<String>, success: bool) {
        self.history.push(Step {
            iteration: self.iteration,
            action,
            observation: observation.into(),
            success,
        });
    }

    fn add_draft(&mut self, text: &str) {
        let text = text.trim();
        if !text.is_empty() {
            self.drafts.push(Draft {
                iteration: self.iteration,
                text: text.to_string(),
            });
        }
    }

    /// Number of tool invocations made so far, successful or not.
    pub fn tool_steps(&self) -> usize {
        self.history
            .iter()
            .filter(|s| matches!(s.action, Action::Tool(_)))
            .count()
    }

    /// Consecutive iterations, ending with the previous one, that produced
    /// text but neither invoked a tool nor recorded a note or error.
    pub fn drafting_streak(&self) -> usize {
        (1..self.iteration)
            .rev()
            .take_while(|&i| {
                !self.history.iter().any(|s| s.iteration == i)
                    && self.drafts.iter().any(|d| d.iteration == i)
            })
            .count()
    }

    /// Best artifact available before completion: the drafts so far,
    /// de-duplicated and joined with blank lines.
    pub fn partial_artifact(&self) -> Option<String> {
        let merged = merge_drafts(self.drafts.iter().map(|d| d.text.as_str()));
        (!merged.is_empty()).then_some(merged)
    }
}

/// Blocks shorter than this are only dropped as exact repeats.
const NEAR_DUPLICATE_MIN_CHARS: usize = 100;
const NEAR_DUPLICATE_SIMILARITY: f64 = 0.94;

/// Join text blocks with blank lines, dropping blanks and blocks that repeat
/// an earlier one modulo case and whitespace. Long blocks that are nearly
/// identical to an earlier long block are dropped too.
pub fn merge_drafts<'a>(blocks: impl IntoIterator<Item = &'a str>) -> String {
    let mut seen: Vec<String> = Vec::new();
    let mut kept = Vec::new();
    for block in blocks {
        let block = block.trim();
        if block.is_empty() {
            continue;
        }
        let normalized = block
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        if !seen.iter().any(|earlier| repeats(&normalized, earlier)) {
            seen.push(normalized);
            kept.push(block);
        }
    }
    kept.join("\n\n")
}

fn repeats(block: &str, earlier: &str) -> bool {
    if block == earlier {
        return true;
    }
    let long = |s: &str| s.chars().count() >= NEAR_DUPLICATE_MIN_CHARS;
    long(block)
        && long(earlier)
        && strsim::normalized_levenshtein(block, earlier) >= NEAR_DUPLICATE_SIMILARITY
}

/// What the reasoning step wants to do next.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Invoke these tools in order, with optional accompanying text.
    UseTools { thought: String, calls: Vec<ToolCall> },
    /// The task is done.
    Complete { artifact: String },
    /// Nothing to execute this iteration; the note becomes an observation.
    Continue { note: String },
}

/// The reasoning step an executor consults once per iteration.
#[async_trait]
pub trait ReasoningStep: Send + Sync {
    async fn decide(
        &self,
        task: &TaskSpec,
        state: &ExecutionState,
    ) -> Result<Decision, ProviderError>;
}

/// Terminal outcome plus the state it was built from.
#[derive(Debug, Clone)]
pub struct AgentRun {
    pub outcome: Outcome,
    pub state: ExecutionState,
}

impl AgentRun {
    pub fn iterations(&self) -> usize {
        self.state.iteration
    }
}

pub struct AgentExecutor {
    reasoner: Arc<dyn ReasoningStep>,
    tools: Arc<ToolRegistry>,
    max_iterations: usize,
    events: Arc<EventBus>,
}

impl AgentExecutor {
    pub fn new(
        reasoner: Arc<dyn ReasoningStep>,
        tools: Arc<ToolRegistry>,
        max_iterations: usize,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            reasoner,
            tools,
            max_iterations,
            events,
        }
    }

    /// Drive `task` to a terminal state, giving up at `deadline`.
    pub async fn run(&self, task: &TaskSpec, deadline: Instant) -> AgentRun {
        let mut state = ExecutionState::default();

        while state.iteration < self.max_iterations {
            if Instant::now() >= deadline {
                return Self::timed_out(task, state);
            }
            state.iteration += 1;
            debug!(
                agent = task.index,
                iteration = state.iteration,
                max = self.max_iterations,
                "Agent iteration"
            );

            let decision = match timeout_at(deadline, self.reasoner.decide(task, &state)).await {
                Err(_) => return Self::timed_out(task, state),
                Ok(Err(e)) => {
                    warn!(agent = task.index, iteration = state.iteration, "Reasoning step failed: {e}");
                    state.last_error = Some(e.to_string());
                    state.record(Action::Reason, format!("Reasoning step failed: {e}"), false);
                    continue;
                }
                Ok(Ok(decision)) => decision,
            };

            match decision {
                Decision::Complete { artifact } => {
                    let artifact = if artifact.trim().is_empty() {
                        state.partial_artifact().unwrap_or(artifact)
                    } else {
                        artifact
                    };
                    state.completed = true;
                    state.artifact = Some(artifact.clone());
                    state.transition(AgentPhase::Completed);
                    info!(agent = task.index, iterations = state.iteration, "Agent completed");
                    return AgentRun {
                        outcome: Outcome::Completed { artifact },
                        state,
                    };
                }
                Decision::Continue { note } => {
                    state.record(Action::Reason, note, true);
                }
                Decision::UseTools { thought, calls } => {
                    state.add_draft(&thought);
                    for call in calls {
                        state.transition(AgentPhase::ToolInvoking);
                        let Some((observation, success)) =
                            self.invoke(task, call.clone(), deadline).await
                        else {
                            return Self::timed_out(task, state);
                        };
                        state.transition(AgentPhase::Observing);
                        state.record(Action::Tool(call), observation, success);
                    }
                    state.transition(AgentPhase::Planning);
                }
            }
        }

        let detail = match &state.last_error {
            Some(err) => format!(
                "no completion after {} iterations (last error: {err})",
                self.max_iterations
            ),
            None => format!("no completion after {} iterations", self.max_iterations),
        };
        warn!(agent = task.index, "{detail}");
        state.transition(AgentPhase::Failed);
        AgentRun {
            outcome: Outcome::Failed {
                kind: FailureKind::IterationBudgetExceeded,
                detail,
                partial: state.partial_artifact(),
            },
            state,
        }
    }

    /// Run one tool call. `None` means the deadline passed mid-call.
    ///
    /// Failures (unknown tool, bad arguments, tool errors) become
    /// observations rather than errors.
    async fn invoke(
        &self,
        task: &TaskSpec,
        call: ToolCall,
        deadline: Instant,
    ) -> Option<(String, bool)> {
        let started = std::time::Instant::now();

        let (observation, success) = if !call.arguments.is_object() {
            (
                format!("Error: Invalid arguments for '{}': expected a JSON object", call.name),
                false,
            )
        } else {
            match timeout_at(deadline, self.tools.execute(&call)).await {
                Err(_) => return None,
                Ok(Ok(result)) => (result.output, result.success),
                Ok(Err(e)) => (format!("Error: {e}"), false),
            }
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        if success {
            debug!(agent = task.index, tool = %call.name, duration_ms, "Tool executed");
        } else {
            warn!(agent = task.index, tool = %call.name, "Tool failed: {observation}");
        }
        self.events.publish(DomainEvent::ToolExecuted {
            agent_index: task.index,
            tool_name: call.name,
            success,
            duration_ms,
            timestamp: Utc::now(),
        });
        Some((observation, success))
    }

    fn timed_out(task: &TaskSpec, mut state: ExecutionState) -> AgentRun {
        warn!(agent = task.index, iteration = state.iteration, "Agent deadline elapsed");
        state.transition(AgentPhase::TimedOut);
        AgentRun {
            outcome: Outcome::TimedOut {
                partial: state.partial_artifact(),
            },
            state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ScriptedReasoner, echo_registry, tool_call};
    use std::time::Duration;

    fn executor(reasoner: Arc<dyn ReasoningStep>, max_iterations: usize) -> AgentExecutor {
        AgentExecutor::new(
            reasoner,
            Arc::new(echo_registry()),
            max_iterations,
            Arc::new(EventBus::default()),
        )
    }

    fn far_deadline() -> Instant {
        Instant::now() + Duration::from_secs(3600)
    }

    #[test]
    fn merge_drafts_dedupes_by_normalized_text() {
        let merged = merge_drafts(["First  point", "", "first point", "Second"]);
        assert_eq!(merged, "First  point\n\nSecond");
    }

    #[test]
    fn merge_drafts_drops_near_duplicate_long_blocks() {
        let first = "Rust's ownership model guarantees memory safety without a garbage collector, \
                     and the borrow checker enforces it at compile time.";
        let reworded = "Rust's ownership model guarantees memory safety without a garbage collector; \
                        the borrow checker enforces it at compile time.";
        let different = "Async Rust builds on futures that are polled by an executor such as tokio, \
                         which schedules tasks across a pool of worker threads.";
        assert!(first.len() >= NEAR_DUPLICATE_MIN_CHARS);

        let merged = merge_drafts([first, reworded, different]);
        assert_eq!(merged, format!("{first}\n\n{different}"));

        // Short blocks need an exact match.
        assert_eq!(merge_drafts(["The answer is 42.", "The answer is 43."]).lines().count(), 3);
    }

    #[test]
    fn drafting_streak_stops_at_tool_use() {
        let mut state = ExecutionState {
            iteration: 1,
            ..Default::default()
        };
        state.record(Action::Tool(tool_call("echo", serde_json::json!({}))), "x", true);
        for iteration in 2..=3 {
            state.iteration = iteration;
            state.add_draft("thinking aloud");
        }
        state.iteration = 4;
        assert_eq!(state.drafting_streak(), 2);

        state.record(Action::Reason, "note", true);
        state.iteration = 5;
        assert_eq!(state.drafting_streak(), 0);
    }

    #[tokio::test]
    async fn completes_immediately() {
        let reasoner = Arc::new(ScriptedReasoner::new(vec![Ok(Decision::Complete {
            artifact: "answer".into(),
        })]));
        let run = executor(reasoner, 5)
            .run(&TaskSpec::new(0, "task"), far_deadline())
            .await;

        assert_eq!(run.outcome, Outcome::Completed { artifact: "answer".into() });
        assert_eq!(run.iterations(), 1);
        assert_eq!(run.state.phase(), AgentPhase::Completed);
        assert!(run.state.completed);
        assert!(run.state.phase().is_terminal());
    }

    #[tokio::test]
    async fn tool_results_become_ordered_observations() {
        let reasoner = Arc::new(ScriptedReasoner::new(vec![
            Ok(Decision::UseTools {
                thought: "looking things up".into(),
                calls: vec![
                    tool_call("echo", serde_json::json!({"text": "one"})),
                    tool_call("echo", serde_json::json!({"text": "two"})),
                ],
            }),
            Ok(Decision::UseTools {
                thought: String::new(),
                calls: vec![tool_call("echo", serde_json::json!({"text": "three"}))],
            }),
            Ok(Decision::Complete { artifact: "done".into() }),
        ]));
        let run = executor(reasoner, 5)
            .run(&TaskSpec::new(0, "task"), far_deadline())
            .await;

        let observations: Vec<_> = run.state.history.iter().map(|s| s.observation.as_str()).collect();
        assert_eq!(observations, vec!["one", "two", "three"]);
        let iterations: Vec<_> = run.state.history.iter().map(|s| s.iteration).collect();
        assert_eq!(iterations, vec![1, 1, 2]);
        assert_eq!(run.iterations(), 3);
    }

    #[tokio::test]
    async fn tool_failures_are_observations_not_errors() {
        let reasoner = Arc::new(ScriptedReasoner::new(vec![
            Ok(Decision::UseTools {
                thought: String::new(),
                calls: vec![
                    tool_call("missing_tool", serde_json::json!({})),
                    tool_call("echo", serde_json::json!("not an object")),
                ],
            }),
            Ok(Decision::Complete { artifact: "recovered".into() }),
        ]));
        let run = executor(reasoner, 5)
            .run(&TaskSpec::new(0, "task"), far_deadline())
            .await;

        assert!(matches!(run.outcome, Outcome::Completed { .. }));
        assert_eq!(run.state.history.len(), 2);
        assert!(run.state.history.iter().all(|s| !s.success));
        assert!(run.state.history[0].observation.contains("Tool not found"));
        assert!(run.state.history[1].observation.contains("expected a JSON object"));
    }

    #[tokio::test]
    async fn iteration_budget_is_never_exceeded() {
        let reasoner = Arc::new(ScriptedReasoner::repeating(Decision::UseTools {
            thought: "still working".into(),
            calls: vec![tool_call("echo", serde_json::json!({"text": "x"}))],
        }));
        let run = executor(reasoner.clone(), 4)
            .run(&TaskSpec::new(0, "task"), far_deadline())
            .await;

        assert_eq!(run.iterations(), 4);
        assert_eq!(reasoner.calls(), 4);
        assert_eq!(run.state.phase(), AgentPhase::Failed);
        match run.outcome {
            Outcome::Failed { kind, partial, .. } => {
                assert_eq!(kind, FailureKind::IterationBudgetExceeded);
                assert_eq!(partial.as_deref(), Some("still working"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn provider_errors_consume_iterations() {
        let reasoner = Arc::new(ScriptedReasoner::new(vec![
            Err(ProviderError::Timeout("30s".into())),
            Err(ProviderError::Network("reset".into())),
        ]));
        let run = executor(reasoner, 2)
            .run(&TaskSpec::new(0, "task"), far_deadline())
            .await;

        match run.outcome {
            Outcome::Failed { kind, detail, partial } => {
                assert_eq!(kind, FailureKind::IterationBudgetExceeded);
                assert!(detail.contains("reset"));
                assert!(partial.is_none());
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(run.state.history.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_cancels_slow_reasoning_with_partial() {
        let reasoner = Arc::new(
            ScriptedReasoner::new(vec![
                Ok(Decision::UseTools {
                    thought: "halfway there".into(),
                    calls: vec![],
                }),
                Ok(Decision::Complete { artifact: "too late".into() }),
            ])
            .with_delay(1, Duration::from_secs(60)),
        );
        let start = Instant::now();
        let deadline = start + Duration::from_secs(10);
        let run = executor(reasoner, 5).run(&TaskSpec::new(0, "task"), deadline).await;

        assert_eq!(
            run.outcome,
            Outcome::TimedOut { partial: Some("halfway there".into()) }
        );
        assert_eq!(run.state.phase(), AgentPhase::TimedOut);
        assert!(Instant::now() < start + Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_deadline_times_out_without_calling_reasoner() {
        let reasoner = Arc::new(ScriptedReasoner::new(vec![]));
        let run = executor(reasoner.clone(), 5)
            .run(&TaskSpec::new(0, "task"), Instant::now())
            .await;

        assert_eq!(run.outcome, Outcome::TimedOut { partial: None });
        assert_eq!(reasoner.calls(), 0);
    }

    #[tokio::test]
    async fn blank_completion_falls_back_to_drafts() {
        let reasoner = Arc::new(ScriptedReasoner::new(vec![
            Ok(Decision::UseTools {
                thought: "the answer is 42".into(),
                calls: vec![],
            }),
            Ok(Decision::Complete { artifact: "  ".into() }),
        ]));
        let run = executor(reasoner, 5)
            .run(&TaskSpec::new(0, "task"), far_deadline())
            .await;

        assert_eq!(
            run.outcome,
            Outcome::Completed { artifact: "the answer is 42".into() }
        );
    }

    #[tokio::test]
    async fn tool_executions_are_published() {
        let events = Arc::new(EventBus::default());
        let mut rx = events.subscribe();
        let reasoner = Arc::new(ScriptedReasoner::new(vec![
            Ok(Decision::UseTools {
                thought: String::new(),
                calls: vec![tool_call("echo", serde_json::json!({"text": "hi"}))],
            }),
            Ok(Decision::Complete { artifact: "ok".into() }),
        ]));
        let executor = AgentExecutor::new(reasoner, Arc::new(echo_registry()), 3, events);
        executor.run(&TaskSpec::new(7, "task"), far_deadline()).await;

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            DomainEvent::ToolExecuted { agent_index, tool_name, success, .. } => {
                assert_eq!(*agent_index, 7);
                assert_eq!(tool_name, "echo");
                assert!(success);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
