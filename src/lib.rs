//! # agentry
//!
//! A streaming-first Rust library for building ReAct agents over
//! OpenAI-compatible and Anthropic LLM providers.
//!
//! ## Overview
//!
//! An agent couples a language model with a registry of callable tools
//! and iterates — reason, act, observe — until the model produces a
//! terminal answer. The library provides every layer of that loop:
//!
//! - **Provider adapters**: one behavioral contract over two wire
//!   protocols (chat-completions and Anthropic Messages), including SSE
//!   streaming with interleaved thinking blocks
//! - **Connection pool**: a bounded, origin-keyed pool that amortizes
//!   TLS handshakes across parallel agent runs
//! - **Tool system**: schema generation, argument decoding, and result
//!   marshalling back into the conversation
//! - **Agent engine**: the ReAct executor with iteration caps, forced
//!   final synthesis, and contained tool failures
//! - **Hooks**: process-wide trace callbacks at run/iteration/LLM/tool
//!   boundaries
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use agentry::{tool, Agent, Llm, LlmConfig, Session};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> agentry::Result<()> {
//!     // Reads ANTHROPIC_API_KEY from the environment.
//!     let llm = Arc::new(Llm::new(
//!         LlmConfig::builder().provider("anthropic").build()?,
//!     )?);
//!
//!     let mut registry = agentry::ToolRegistry::new();
//!     registry.add(
//!         tool("add", "Add two integers")
//!             .param("a", "integer")
//!             .param("b", "integer")
//!             .build(|args| async move {
//!                 let a = args["a"].as_i64().unwrap_or(0);
//!                 let b = args["b"].as_i64().unwrap_or(0);
//!                 Ok((a + b).to_string())
//!             }),
//!     )?;
//!
//!     let mut session = Session::open();
//!     let tools = session.register_tools(registry);
//!     let agent = session.create_agent(
//!         Agent::builder()
//!             .name("calculator")
//!             .instructions("Use the add tool for arithmetic.")
//!             .llm(llm)
//!             .tools(tools)
//!             .max_iterations(4),
//!     )?;
//!
//!     let result = session.run(agent, "What is 2 + 3?").await?;
//!     println!("{}", result.content);
//!     Ok(())
//! }
//! ```
//!
//! ## Concurrency Model
//!
//! Agents run on the caller's task; independent agents may run in
//! parallel, with the HTTP pool as the only arbitration point. An agent
//! with memory cannot run concurrently with itself (`run` takes
//! `&mut self`). Streaming events are delivered in arrival order on the
//! initiating task.

/// ReAct executor: the agent loop, its builder, and run results.
mod agent;

/// Client configuration, compat modes, and environment resolution.
mod config;

/// Error enum, stable codes, and the strerror lookup.
mod error;

/// LLM client: chat and streaming chat over a resolved provider.
mod llm;

/// Bounded origin-keyed connection pool.
mod pool;

/// Provider adapters and the registry resolving them by name.
mod providers;

/// Session scope owning agents and registries.
mod session;

/// Incremental SSE frame parser shared by the streaming decoders.
mod sse;

/// Tool definitions, schema normalization, and the tool registry.
mod tools;

/// Process-wide hook bus; public module so sinks can be implemented
/// downstream.
pub mod hooks;

/// Opt-in exponential-backoff retry helpers.
pub mod retry;

/// Provider-neutral message, chat, and streaming types.
pub mod types;

// --- Agent Engine ---

pub use agent::{Agent, AgentBuilder, AgentResult, TerminalReason, TOOL_ERROR_PREFIX};

// --- Configuration ---

pub use config::{Compat, LlmConfig, LlmConfigBuilder};

// --- Error Handling ---

pub use error::{strerror, Error, Result};

// --- LLM Client ---

pub use llm::Llm;

// --- HTTP Pool ---

pub use pool::{HttpPool, PoolConfig, PoolStats, PooledTransport};

// --- Providers ---

pub use providers::{register as register_provider, resolve as resolve_provider, Provider,
    StreamParser};

// --- Session ---

pub use session::{AgentId, Session};

// --- Tool System ---

pub use tools::{format_decimal, tool, Tool, ToolBuilder, ToolHandler, ToolRegistry};

// --- Core Types ---

pub use types::{
    ChatRequest, ChatResponse, ContentBlock, Message, MessageRole, StopReason, StreamControl,
    StreamEvent, TextBlock, Thinking, ThinkingBlock, ToolResultBlock, ToolSpec, ToolUseBlock,
    Usage,
};

/// Convenience module with the most commonly used items.
///
/// Import with `use agentry::prelude::*;`.
pub mod prelude {
    pub use crate::{
        tool, Agent, AgentResult, ContentBlock, Error, Llm, LlmConfig, Message, Result, Session,
        StreamControl, StreamEvent, TerminalReason, Tool, ToolRegistry,
    };
}
