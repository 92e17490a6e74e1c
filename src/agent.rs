//! Agent engine: the ReAct loop.
//!
//! An [`Agent`] binds an LLM client, a tool registry, instructions, and
//! an iteration cap into an executor. One [`Agent::run`] drives the
//! conversation to a terminal answer:
//!
//! ```text
//! user input ─▶ LLM ─┬─▶ final text ──────────────▶ AgentResult
//!                    └─▶ tool_use blocks ─▶ registry ─▶ tool results
//!                          ▲                                │
//!                          └── appended to conversation ◀───┘
//! ```
//!
//! Loop rules, in order of precedence:
//!
//! - Tools are advertised on every iteration **except the last**: the
//!   final permitted call goes out tool-free, forcing the model to
//!   synthesize a human-readable answer. A cap of 1 therefore disables
//!   tool use entirely.
//! - Multiple tool-use blocks in one assistant message execute
//!   sequentially in provider order, and a failing tool never
//!   short-circuits the rest of the batch — providers require every
//!   emitted tool_use to be answered.
//! - Tool and schema failures are contained: the error text is injected
//!   as the tool result (prefixed with [`TOOL_ERROR_PREFIX`]) and the
//!   model gets a chance to recover. LLM-level failures abort the run.
//! - The assistant message is appended verbatim, thinking blocks
//!   included, before any tool executes.
//!
//! Agents without memory seed a fresh conversation per run; agents built
//! with [`AgentBuilder::memory`] keep an explicit per-agent buffer that
//! survives runs and is accessible through [`Agent::history`]. An agent
//! with memory must not run concurrently with itself — `run` takes
//! `&mut self`, so the borrow checker enforces that.

use crate::hooks::{
    self, IterationEvent, LlmRequestEvent, LlmResponseEvent, RunEndEvent, RunStartEvent,
    ToolEndEvent, ToolStartEvent,
};
use crate::llm::Llm;
use crate::tools::ToolRegistry;
use crate::types::{Message, StopReason, ToolResultBlock, ToolUseBlock, Usage};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Prefix of every tool result injected after a failed invocation.
///
/// The model sees `"tool error: <description>"` and may recover, retry
/// with different arguments, or apologize.
pub const TOOL_ERROR_PREFIX: &str = "tool error: ";

/// Why a run terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalReason {
    /// The model produced a final answer
    End,
    /// Generation stopped at the response token cap
    MaxTokens,
    /// The iteration cap was hit while the model still wanted tools
    MaxIterations,
}

/// Outcome of one [`Agent::run`] call.
#[derive(Debug, Clone)]
pub struct AgentResult {
    /// Final assistant text
    pub content: String,

    /// Iterations consumed (1-based; always ≤ the cap)
    pub iterations: u32,

    /// Token usage accumulated across every LLM call in the run
    pub usage: Usage,

    /// Why the run stopped
    pub terminal: TerminalReason,
}

/// A ReAct executor over one LLM and one tool registry.
pub struct Agent {
    name: String,
    instructions: String,
    llm: Arc<Llm>,
    tools: Arc<ToolRegistry>,
    max_iterations: u32,
    /// Persistent conversation buffer; `None` for stateless agents
    memory: Option<Vec<Message>>,
}

impl Agent {
    /// Creates a new builder for constructing an [`Agent`].
    pub fn builder() -> AgentBuilder {
        AgentBuilder::default()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    /// The persistent conversation buffer, when memory is enabled.
    pub fn history(&self) -> Option<&[Message]> {
        self.memory.as_deref()
    }

    /// Clear the persistent conversation buffer.
    pub fn clear_history(&mut self) {
        if let Some(memory) = &mut self.memory {
            memory.clear();
        }
    }

    /// Execute one ReAct run for the given user input.
    pub async fn run(&mut self, input: &str) -> Result<AgentResult> {
        let sink = hooks::get_hooks();

        if let Some(sink) = &sink {
            sink.on_run_start(&RunStartEvent {
                agent: self.name.clone(),
                input: input.to_string(),
            })
            .await;
        }
        debug!(agent = %self.name, "run start");

        let mut conversation = self.seed_conversation(input);
        let result = self.react_loop(&mut conversation, sink.as_deref()).await;

        match &result {
            Ok(outcome) => {
                if self.memory.is_some() {
                    self.memory = Some(conversation);
                }
                debug!(
                    agent = %self.name,
                    iterations = outcome.iterations,
                    terminal = ?outcome.terminal,
                    "run end"
                );
                if let Some(sink) = &sink {
                    sink.on_run_end(&RunEndEvent {
                        agent: self.name.clone(),
                        error: None,
                        iterations: outcome.iterations,
                        usage: outcome.usage,
                    })
                    .await;
                }
            }
            Err(e) => {
                warn!(agent = %self.name, error = %e, "run aborted");
                if let Some(sink) = &sink {
                    sink.on_run_end(&RunEndEvent {
                        agent: self.name.clone(),
                        error: Some(e.to_string()),
                        iterations: 0,
                        usage: Usage::default(),
                    })
                    .await;
                }
            }
        }

        result
    }

    fn seed_conversation(&self, input: &str) -> Vec<Message> {
        let mut conversation = self.memory.clone().unwrap_or_default();
        if conversation.is_empty() && !self.instructions.is_empty() {
            conversation.push(Message::system(self.instructions.clone()));
        }
        conversation.push(Message::user(input));
        conversation
    }

    async fn react_loop(
        &self,
        conversation: &mut Vec<Message>,
        sink: Option<&dyn hooks::Hooks>,
    ) -> Result<AgentResult> {
        let advertised = self.tools.advertise();
        let mut usage = Usage::default();

        for iteration in 1..=self.max_iterations {
            if let Some(sink) = sink {
                sink.on_iter_start(&IterationEvent {
                    agent: self.name.clone(),
                    iteration,
                })
                .await;
            }

            // The last permitted call goes out tool-free so the model is
            // forced to synthesize instead of requesting more work.
            let final_iteration = iteration == self.max_iterations;
            let tools: &[_] = if final_iteration { &[] } else { &advertised };

            if let Some(sink) = sink {
                sink.on_llm_request(&LlmRequestEvent {
                    agent: self.name.clone(),
                    iteration,
                    message_count: conversation.len(),
                    tool_count: tools.len(),
                })
                .await;
            }

            let response = self.llm.chat(conversation, tools).await?;
            usage.add(response.usage);

            if let Some(sink) = sink {
                sink.on_llm_response(&LlmResponseEvent {
                    agent: self.name.clone(),
                    iteration,
                    stop_reason: response.stop_reason,
                    usage: response.usage,
                })
                .await;
            }

            let tool_uses: Vec<ToolUseBlock> =
                response.tool_uses().into_iter().cloned().collect();

            if response.stop_reason == StopReason::ToolUse
                && !final_iteration
                && !tool_uses.is_empty()
            {
                // Verbatim append, thinking blocks and all; providers
                // validate replayed reasoning.
                conversation.push(Message::assistant(response.content.clone()));

                for tool_use in &tool_uses {
                    self.execute_tool(conversation, tool_use, iteration, sink)
                        .await;
                }

                if let Some(sink) = sink {
                    sink.on_iter_end(&IterationEvent {
                        agent: self.name.clone(),
                        iteration,
                    })
                    .await;
                }
                continue;
            }

            // Terminal response.
            let terminal = match response.stop_reason {
                StopReason::MaxTokens => TerminalReason::MaxTokens,
                StopReason::ToolUse if final_iteration => {
                    warn!(agent = %self.name, "iteration cap hit with outstanding tool requests");
                    TerminalReason::MaxIterations
                }
                _ => TerminalReason::End,
            };

            conversation.push(Message::assistant(response.content.clone()));

            if let Some(sink) = sink {
                sink.on_iter_end(&IterationEvent {
                    agent: self.name.clone(),
                    iteration,
                })
                .await;
            }

            return Ok(AgentResult {
                content: response.text(),
                iterations: iteration,
                usage,
                terminal,
            });
        }

        // The final iteration always takes the terminal branch above.
        Err(Error::MaxIterations(self.max_iterations))
    }

    async fn execute_tool(
        &self,
        conversation: &mut Vec<Message>,
        tool_use: &ToolUseBlock,
        iteration: u32,
        sink: Option<&dyn hooks::Hooks>,
    ) {
        if let Some(sink) = sink {
            sink.on_tool_start(&ToolStartEvent {
                agent: self.name.clone(),
                iteration,
                tool: tool_use.name.clone(),
                tool_use_id: tool_use.id.clone(),
                input: tool_use.input.clone(),
            })
            .await;
        }

        // Failures become results: the model is told what went wrong and
        // the batch keeps going, because every tool_use must be answered.
        let (output, is_error) = match self.tools.invoke(&tool_use.name, &tool_use.input).await {
            Ok(text) => (text, false),
            Err(e) => {
                warn!(agent = %self.name, tool = %tool_use.name, error = %e, "tool failed");
                (format!("{TOOL_ERROR_PREFIX}{e}"), true)
            }
        };

        if let Some(sink) = sink {
            sink.on_tool_end(&ToolEndEvent {
                agent: self.name.clone(),
                iteration,
                tool: tool_use.name.clone(),
                tool_use_id: tool_use.id.clone(),
                output: output.clone(),
                is_error,
            })
            .await;
        }

        let result = if is_error {
            ToolResultBlock::error(&tool_use.id, output)
        } else {
            ToolResultBlock::new(&tool_use.id, output)
        };
        conversation.push(Message::tool(&tool_use.id, result));
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("max_iterations", &self.max_iterations)
            .field("tools", &self.tools.count())
            .field("memory", &self.memory.is_some())
            .finish()
    }
}

// ============================================================================
// BUILDER
// ============================================================================

/// Builder for [`Agent`] with validation at `build()`.
#[derive(Default)]
pub struct AgentBuilder {
    name: Option<String>,
    instructions: Option<String>,
    llm: Option<Arc<Llm>>,
    tools: Option<Arc<ToolRegistry>>,
    max_iterations: Option<u32>,
    memory: bool,
}

impl AgentBuilder {
    /// Sets the agent's name (used in hook events and logs).
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the system prompt seeded into every conversation.
    pub fn instructions(mut self, text: impl Into<String>) -> Self {
        self.instructions = Some(text.into());
        self
    }

    /// Sets the LLM client (required).
    pub fn llm(mut self, llm: Arc<Llm>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// Sets the tool registry shared by this agent.
    pub fn tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Sets the iteration cap (must be ≥ 1; a cap of 1 disables tools).
    pub fn max_iterations(mut self, cap: u32) -> Self {
        self.max_iterations = Some(cap);
        self
    }

    /// Enables the persistent per-agent conversation buffer.
    pub fn memory(mut self, enabled: bool) -> Self {
        self.memory = enabled;
        self
    }

    /// Validates and builds the final [`Agent`].
    pub fn build(self) -> Result<Agent> {
        let llm = self
            .llm
            .ok_or_else(|| Error::invalid_arg("agent requires an LLM client"))?;

        let max_iterations = self.max_iterations.unwrap_or(5);
        if max_iterations == 0 {
            return Err(Error::invalid_arg("max_iterations must be at least 1"));
        }

        Ok(Agent {
            name: self.name.unwrap_or_else(|| "agent".to_string()),
            instructions: self.instructions.unwrap_or_default(),
            llm,
            tools: self.tools.unwrap_or_else(|| Arc::new(ToolRegistry::new())),
            max_iterations,
            memory: self.memory.then(Vec::new),
        })
    }
}
