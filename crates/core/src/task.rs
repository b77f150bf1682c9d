//! Orchestration domain types.
//!
//! A [`Request`] is split into [`TaskSpec`]s, each agent run ends in exactly
//! one [`Outcome`], and the outcomes are merged into an [`AggregatedResult`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// The original user text for one orchestration run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Request(String);

impl Request {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One decomposed unit of work, handed by value to a single agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Position in the batch (0..N-1); outcomes are collated by it.
    pub index: usize,

    /// Free-text instruction for the agent.
    pub instruction: String,
}

impl TaskSpec {
    pub fn new(index: usize, instruction: impl Into<String>) -> Self {
        Self {
            index,
            instruction: instruction.into(),
        }
    }
}

/// Why an agent ended in [`Outcome::Failed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The iteration budget ran out before the task completed.
    IterationBudgetExceeded,
    /// The agent task died (panicked or was aborted) before reporting.
    Aborted,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IterationBudgetExceeded => f.write_str("iteration budget exceeded"),
            Self::Aborted => f.write_str("aborted"),
        }
    }
}

/// Terminal result of one agent run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Completed {
        artifact: String,
    },
    Failed {
        kind: FailureKind,
        detail: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        partial: Option<String>,
    },
    TimedOut {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        partial: Option<String>,
    },
}

impl Outcome {
    /// The artifact this outcome contributes to aggregation, if any.
    ///
    /// Blank text never counts as usable.
    pub fn usable_artifact(&self) -> Option<&str> {
        let text = match self {
            Self::Completed { artifact } => Some(artifact.as_str()),
            Self::Failed { partial, .. } | Self::TimedOut { partial } => partial.as_deref(),
        };
        text.filter(|t| !t.trim().is_empty())
    }

    /// Short status label used in logs and progress output.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
            Self::TimedOut { .. } => "timed_out",
        }
    }
}

/// How many agents ended in each terminal state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    pub completed: usize,
    pub failed: usize,
    pub timed_out: usize,
}

impl OutcomeCounts {
    pub fn from_outcomes(outcomes: &[Outcome]) -> Self {
        outcomes.iter().fold(Self::default(), |mut counts, outcome| {
            match outcome {
                Outcome::Completed { .. } => counts.completed += 1,
                Outcome::Failed { .. } => counts.failed += 1,
                Outcome::TimedOut { .. } => counts.timed_out += 1,
            }
            counts
        })
    }

    pub fn total(&self) -> usize {
        self.completed + self.failed + self.timed_out
    }
}

/// The merged artifact of one run plus bookkeeping about the agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedResult {
    /// The final merged artifact.
    pub artifact: String,

    /// Terminal-state counts over all agents.
    pub counts: OutcomeCounts,

    /// Task indices whose artifacts went into the merge, ascending.
    pub contributors: Vec<usize>,

    /// Every outcome, ordered by task index.
    pub outcomes: Vec<Outcome>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usable_artifact_rules() {
        assert_eq!(
            Outcome::Completed { artifact: "done".into() }.usable_artifact(),
            Some("done")
        );
        assert_eq!(Outcome::TimedOut { partial: None }.usable_artifact(), None);
        assert_eq!(
            Outcome::TimedOut { partial: Some("half".into()) }.usable_artifact(),
            Some("half")
        );
        assert_eq!(
            Outcome::Failed {
                kind: FailureKind::IterationBudgetExceeded,
                detail: "ran out".into(),
                partial: Some("   ".into()),
            }
            .usable_artifact(),
            None
        );
    }

    #[test]
    fn counts_from_outcomes() {
        let outcomes = vec![
            Outcome::Completed { artifact: "a".into() },
            Outcome::TimedOut { partial: None },
            Outcome::Completed { artifact: "b".into() },
            Outcome::Failed {
                kind: FailureKind::Aborted,
                detail: "panic".into(),
                partial: None,
            },
        ];
        let counts = OutcomeCounts::from_outcomes(&outcomes);
        assert_eq!(counts.completed, 2);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.timed_out, 1);
        assert_eq!(counts.total(), 4);
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let json = serde_json::to_value(Outcome::TimedOut { partial: None }).unwrap();
        assert_eq!(json["status"], "timed_out");
        assert!(json.get("partial").is_none());
    }
}
