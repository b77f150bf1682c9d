//! The orchestration core of Convoy.
//!
//! A request flows through four stages:
//!
//! 1. **Decompose**: [`TaskDecomposer`] turns the request into exactly N
//!    task descriptions (or the fallback batch if generation fails)
//! 2. **Dispatch**: [`Orchestrator`] runs one [`AgentExecutor`] per task,
//!    concurrently, under a concurrency cap and a per-agent deadline
//! 3. **Execute**: each executor loops Plan → Act → Observe until it
//!    completes, runs out of iterations, or its deadline passes
//! 4. **Aggregate**: [`Aggregator`] merges every usable artifact, in task
//!    order, into one result
//!
//! Only the last stage can fail the whole request, and only when no agent
//! produced anything usable.

pub mod aggregator;
pub mod decomposer;
pub mod executor;
pub mod orchestrator;
pub mod reasoner;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use aggregator::{Aggregator, ProviderSynthesizer, Synthesizer};
pub use decomposer::{ProviderTaskGenerator, TaskDecomposer, TaskGenerator};
pub use executor::{
    Action, AgentExecutor, AgentPhase, AgentRun, Decision, ExecutionState, ReasoningStep, Step,
};
pub use orchestrator::Orchestrator;
pub use reasoner::ProviderReasoner;
