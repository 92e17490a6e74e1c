//! Process-wide hook bus for observing agent execution.
//!
//! Hooks fire at fixed points in the agent loop — run, iteration, LLM
//! call, and tool call boundaries — and receive immutable snapshot
//! structs. They observe; they cannot mutate agent state. The loop
//! awaits each hook inline, so handlers should return promptly (spawn
//! anything slow).
//!
//! Registration is process-wide and single-slot: [`set_hooks`] installs
//! a sink (replacing any previous one), `set_hooks(None)` clears it, and
//! [`get_hooks`] returns the current sink. Readers clone an `Arc`
//! snapshot under a read lock, so an in-flight run keeps using the sink
//! it started with even if another thread swaps it.
//!
//! # Examples
//!
//! ```rust,no_run
//! use agentry::hooks::{self, Hooks, ToolStartEvent};
//! use std::sync::Arc;
//!
//! struct Logger;
//!
//! #[async_trait::async_trait]
//! impl Hooks for Logger {
//!     async fn on_tool_start(&self, event: &ToolStartEvent) {
//!         println!("[{}] tool {} starting", event.agent, event.tool);
//!     }
//! }
//!
//! hooks::set_hooks(Some(Arc::new(Logger)));
//! ```

use crate::types::{StopReason, Usage};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, RwLock};

// ============================================================================
// EVENT SNAPSHOTS
// ============================================================================

/// A run began.
#[derive(Debug, Clone)]
pub struct RunStartEvent {
    pub agent: String,
    pub input: String,
}

/// A run finished (successfully or not).
#[derive(Debug, Clone)]
pub struct RunEndEvent {
    pub agent: String,
    /// Error text when the run aborted
    pub error: Option<String>,
    pub iterations: u32,
    pub usage: Usage,
}

/// An iteration of the ReAct loop began or ended.
#[derive(Debug, Clone)]
pub struct IterationEvent {
    pub agent: String,
    /// 1-based iteration number
    pub iteration: u32,
}

/// An LLM request is about to be issued.
#[derive(Debug, Clone)]
pub struct LlmRequestEvent {
    pub agent: String,
    pub iteration: u32,
    pub message_count: usize,
    pub tool_count: usize,
}

/// An LLM response arrived.
#[derive(Debug, Clone)]
pub struct LlmResponseEvent {
    pub agent: String,
    pub iteration: u32,
    pub stop_reason: StopReason,
    pub usage: Usage,
}

/// A tool invocation is about to run.
#[derive(Debug, Clone)]
pub struct ToolStartEvent {
    pub agent: String,
    pub iteration: u32,
    pub tool: String,
    pub tool_use_id: String,
    pub input: Value,
}

/// A tool invocation finished.
#[derive(Debug, Clone)]
pub struct ToolEndEvent {
    pub agent: String,
    pub iteration: u32,
    pub tool: String,
    pub tool_use_id: String,
    /// Tool output text, or the normalized error payload
    pub output: String,
    pub is_error: bool,
}

// ============================================================================
// SINK TRAIT AND BUS
// ============================================================================

/// Observer for agent lifecycle events. Every method defaults to a no-op;
/// implement only the points you care about.
#[async_trait]
pub trait Hooks: Send + Sync {
    async fn on_run_start(&self, _event: &RunStartEvent) {}
    async fn on_run_end(&self, _event: &RunEndEvent) {}
    async fn on_iter_start(&self, _event: &IterationEvent) {}
    async fn on_iter_end(&self, _event: &IterationEvent) {}
    async fn on_llm_request(&self, _event: &LlmRequestEvent) {}
    async fn on_llm_response(&self, _event: &LlmResponseEvent) {}
    async fn on_tool_start(&self, _event: &ToolStartEvent) {}
    async fn on_tool_end(&self, _event: &ToolEndEvent) {}
}

static HOOKS: RwLock<Option<Arc<dyn Hooks>>> = RwLock::new(None);

/// Install (or, with `None`, clear) the process-wide hook sink.
pub fn set_hooks(hooks: Option<Arc<dyn Hooks>>) {
    *HOOKS.write().expect("hook bus poisoned") = hooks;
}

/// The currently installed sink, if any.
pub fn get_hooks() -> Option<Arc<dyn Hooks>> {
    HOOKS.read().expect("hook bus poisoned").clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // The bus is process-wide; serialize tests that touch it.
    static BUS_LOCK: Mutex<()> = Mutex::new(());

    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Hooks for Recorder {
        async fn on_run_start(&self, event: &RunStartEvent) {
            self.events
                .lock()
                .unwrap()
                .push(format!("run_start:{}", event.agent));
        }

        async fn on_tool_end(&self, event: &ToolEndEvent) {
            self.events
                .lock()
                .unwrap()
                .push(format!("tool_end:{}:{}", event.tool, event.is_error));
        }
    }

    #[tokio::test]
    async fn test_set_get_clear() {
        let _guard = BUS_LOCK.lock().unwrap();

        let recorder = Arc::new(Recorder {
            events: Mutex::new(Vec::new()),
        });
        set_hooks(Some(recorder.clone()));
        assert!(get_hooks().is_some());

        set_hooks(None);
        assert!(get_hooks().is_none());
    }

    #[tokio::test]
    async fn test_default_methods_are_noops() {
        let _guard = BUS_LOCK.lock().unwrap();

        let recorder = Arc::new(Recorder {
            events: Mutex::new(Vec::new()),
        });
        set_hooks(Some(recorder.clone()));

        let sink = get_hooks().unwrap();
        sink.on_run_start(&RunStartEvent {
            agent: "researcher".to_string(),
            input: "hi".to_string(),
        })
        .await;
        // Not overridden: must not panic or record.
        sink.on_iter_start(&IterationEvent {
            agent: "researcher".to_string(),
            iteration: 1,
        })
        .await;
        sink.on_tool_end(&ToolEndEvent {
            agent: "researcher".to_string(),
            iteration: 1,
            tool: "add".to_string(),
            tool_use_id: "tu_1".to_string(),
            output: "5".to_string(),
            is_error: false,
        })
        .await;

        let events = recorder.events.lock().unwrap().clone();
        assert_eq!(events, ["run_start:researcher", "tool_end:add:false"]);

        set_hooks(None);
    }

    #[tokio::test]
    async fn test_replacing_sink_is_single_slot() {
        let _guard = BUS_LOCK.lock().unwrap();

        let first = Arc::new(Recorder {
            events: Mutex::new(Vec::new()),
        });
        let second = Arc::new(Recorder {
            events: Mutex::new(Vec::new()),
        });

        set_hooks(Some(first.clone()));
        set_hooks(Some(second.clone()));

        get_hooks()
            .unwrap()
            .on_run_start(&RunStartEvent {
                agent: "a".to_string(),
                input: String::new(),
            })
            .await;

        assert!(first.events.lock().unwrap().is_empty());
        assert_eq!(second.events.lock().unwrap().len(), 1);

        set_hooks(None);
    }
}
