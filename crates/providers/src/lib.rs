//! Model backends for Convoy.
//!
//! One OpenAI-compatible HTTP provider covers every built-in backend; the
//! router picks it by name from configuration.

pub mod openai_compat;
pub mod router;

pub use openai_compat::OpenAiCompatProvider;
pub use router::{BUILTIN_PROVIDERS, BuiltinProvider, ProviderRouter, build_from_config, model_for};
