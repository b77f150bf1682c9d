//! Built-in tools for Convoy agents.
//!
//! Every agent of a run shares one read-only registry holding arithmetic,
//! web search and the completion signal.

pub mod calculator;
pub mod mark_task_complete;
pub mod search;

use convoy_core::tool::ToolRegistry;

pub use calculator::CalculatorTool;
pub use mark_task_complete::{MARK_TASK_COMPLETE, MarkTaskCompleteTool};
pub use search::SearchWebTool;

/// Registry with every built-in tool.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(CalculatorTool));
    registry.register(Box::new(SearchWebTool::default()));
    registry.register(Box::new(MarkTaskCompleteTool));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_holds_builtins() {
        let registry = default_registry();
        assert_eq!(
            registry.names(),
            vec!["calculator", MARK_TASK_COMPLETE, "search_web"]
        );
    }
}
