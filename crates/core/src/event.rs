//! Progress events for an orchestration run.
//!
//! The orchestrator and agents publish events as a run progresses; the CLI
//! subscribes to render per-agent status lines. Nobody is required to listen.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// The request was split into task descriptions
    TasksDecomposed {
        count: usize,
        /// True when the fallback batch replaced a failed decomposition
        fallback: bool,
        timestamp: DateTime<Utc>,
    },

    /// An agent is waiting for a concurrency slot
    AgentQueued {
        index: usize,
        timestamp: DateTime<Utc>,
    },

    /// An agent acquired a slot and its deadline is armed
    AgentStarted {
        index: usize,
        timestamp: DateTime<Utc>,
    },

    /// An agent reached a terminal state
    AgentFinished {
        index: usize,
        /// "completed", "failed" or "timed_out"
        status: String,
        iterations: usize,
        timestamp: DateTime<Utc>,
    },

    /// A tool was executed
    ToolExecuted {
        agent_index: usize,
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// The aggregator produced the final artifact
    AggregationFinished {
        contributors: usize,
        synthesized: bool,
        timestamp: DateTime<Utc>,
    },
}

const DEFAULT_CAPACITY: usize = 256;

/// Fan-out of [`DomainEvent`]s over a tokio `broadcast` channel.
///
/// Publishing never blocks and never fails. Subscribers that fall more than
/// `capacity` events behind see `RecvError::Lagged` and skip ahead.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            sender: broadcast::channel(capacity).0,
        }
    }

    pub fn publish(&self, event: DomainEvent) {
        // Err only means nobody is listening.
        let _ = self.sender.send(Arc::new(event));
    }

    /// Receives every event published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
