//! # Convoy Core
//!
//! Domain types, traits, and error definitions for the Convoy multi-agent
//! orchestrator. This crate has **no runtime dependencies beyond tokio's sync
//! primitives**: it defines the domain model every other crate builds on.
//!
//! ## Layout
//!
//! - [`task`]: requests, task specs, per-agent outcomes, aggregated results
//! - [`tool`]: the `Tool` capability trait and the name-keyed `ToolRegistry`
//! - [`provider`]: the LLM `Provider` trait consumed by reasoning, task
//!   generation, and synthesis
//! - [`event`]: broadcast event bus used for progress reporting

pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod task;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{AggregationError, DecompositionError, Error, Result};
pub use event::{DomainEvent, EventBus};
pub use message::{Message, MessageToolCall, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition};
pub use task::{AggregatedResult, FailureKind, Outcome, OutcomeCounts, Request, TaskSpec};
pub use tool::{Tool, ToolCall, ToolRegistry, ToolResult};
