//! Core type definitions for the agentry library.
//!
//! This module contains the provider-neutral data structures that flow
//! through the whole stack:
//!
//! # Message System
//!
//! - [`Message`]: container for conversation messages with role and content
//! - [`MessageRole`]: who sent the message (System, User, Assistant, Tool)
//! - [`ContentBlock`]: typed fragments (text, thinking, tool use, tool result)
//!
//! # Chat Round-Trip
//!
//! - [`ChatRequest`]: one model call (messages, tool advertisements,
//!   sampling parameters, thinking toggle, stream flag)
//! - [`ChatResponse`]: the model's reply (content blocks, stop reason, usage)
//! - [`StreamEvent`]: normalized incremental events during a streaming call
//!
//! Provider adapters translate between these shapes and each provider's
//! wire format; nothing outside `providers/` ever sees wire JSON.
//!
//! # Design Notes
//!
//! Messages are immutable once appended to a conversation: the agent loop
//! only ever pushes. Thinking blocks are opaque — some providers validate
//! a signature over them, so they are preserved byte-for-byte on replay
//! and never edited or summarized.

use serde::{Deserialize, Serialize};

// ============================================================================
// MESSAGES
// ============================================================================

/// Identifies the sender/role of a message in the conversation.
///
/// Serializes to lowercase strings (`"system"`, `"user"`, ...) matching
/// both providers' wire conventions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Establishes agent behavior and context
    System,
    /// Human or application input
    User,
    /// Model output; may contain tool-use requests
    Assistant,
    /// Result of a tool execution, answering a prior tool-use block
    Tool,
}

/// Typed content fragments that make up a message.
///
/// Serialized with an internal `"type"` tag:
/// ```json
/// {"type": "text", "text": "Hello"}
/// {"type": "thinking", "text": "...", "signature": "..."}
/// {"type": "tool_use", "id": "call_1", "name": "add", "input": {...}}
/// {"type": "tool_result", "tool_use_id": "call_1", "content": "5"}
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text content
    Text(TextBlock),

    /// Provider-exposed reasoning, separate from user-visible output
    Thinking(ThinkingBlock),

    /// Assistant-authored intent to call a named tool
    ToolUse(ToolUseBlock),

    /// Tool execution result sent back to the model
    ToolResult(ToolResultBlock),
}

impl ContentBlock {
    /// Convenience constructor for a text block.
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text(TextBlock::new(text))
    }
}

/// Plain text content in a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextBlock {
    /// The text content
    pub text: String,
}

impl TextBlock {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Model reasoning emitted on a separate channel.
///
/// Opaque to the core: providers may sign thinking content and reject a
/// replay that does not match, so both `text` and `signature` must be
/// carried back verbatim in subsequent requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThinkingBlock {
    /// The reasoning text
    pub text: String,

    /// Provider-issued signature over the reasoning; replayed verbatim
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl ThinkingBlock {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            signature: None,
        }
    }
}

/// Tool use request from the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolUseBlock {
    /// Unique identifier for this tool call, used to correlate the result
    pub id: String,

    /// Name of the tool to execute; must match a registered tool
    pub name: String,

    /// JSON arguments matching the tool's parameter schema
    pub input: serde_json::Value,
}

impl ToolUseBlock {
    pub fn new(id: impl Into<String>, name: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input,
        }
    }
}

/// Tool execution result sent back to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResultBlock {
    /// ID of the tool-use block this result answers
    pub tool_use_id: String,

    /// Textual output of the tool (or the normalized error payload)
    pub content: String,

    /// True when the tool failed and `content` carries the error text
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl ToolResultBlock {
    pub fn new(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
            is_error: false,
        }
    }

    /// Result for a failed invocation; `content` should already carry the
    /// documented error marker.
    pub fn error(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
            is_error: true,
        }
    }
}

/// A complete message in a conversation.
///
/// Immutable once appended. A `Tool`-role message must carry a
/// `tool_call_id` equal to the `id` of a preceding assistant
/// [`ToolUseBlock`] in the same conversation — the role-specific
/// constructors keep that invariant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// The role/sender of this message
    pub role: MessageRole,

    /// The content blocks that make up this message
    pub content: Vec<ContentBlock>,

    /// For `Tool`-role messages, the tool-use id this message answers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    /// General constructor. Prefer the role-specific helpers below.
    pub fn new(role: MessageRole, content: Vec<ContentBlock>) -> Self {
        Self {
            role,
            content,
            tool_call_id: None,
        }
    }

    /// System message from plain text.
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(MessageRole::System, vec![ContentBlock::text(text)])
    }

    /// User message from plain text.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(MessageRole::User, vec![ContentBlock::text(text)])
    }

    /// Assistant message from arbitrary content blocks.
    pub fn assistant(content: Vec<ContentBlock>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    /// Tool-result message answering the given tool-use id.
    pub fn tool(tool_use_id: impl Into<String>, result: ToolResultBlock) -> Self {
        let tool_use_id = tool_use_id.into();
        Self {
            role: MessageRole::Tool,
            content: vec![ContentBlock::ToolResult(result)],
            tool_call_id: Some(tool_use_id),
        }
    }

    /// Concatenated text of all `Text` blocks in this message.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text(t) => Some(t.text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

// ============================================================================
// CHAT ROUND-TRIP
// ============================================================================

/// Thinking channel configuration for one request.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Thinking {
    /// Whether the provider should emit thinking blocks
    pub enabled: bool,

    /// Token budget for reasoning; ignored unless `enabled`
    #[serde(default)]
    pub budget_tokens: u32,
}

/// Advertisement of one tool to the model.
///
/// Produced by the tool registry in registration order; embedded into
/// the request by the provider adapter in provider-specific shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON Schema object describing the parameters
    pub parameters: serde_json::Value,
}

/// One model call, constructed per iteration of the agent loop.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Ordered conversation so far
    pub messages: Vec<Message>,

    /// Tool advertisements; empty disables tool use for this call
    pub tools: Vec<ToolSpec>,

    /// Sampling temperature, if overriding the provider default
    pub temperature: Option<f32>,

    /// Response token cap
    pub max_tokens: u32,

    /// Per-request deadline
    pub timeout: std::time::Duration,

    /// Thinking channel toggle and budget
    pub thinking: Thinking,

    /// Whether the transfer uses SSE streaming
    pub stream: bool,
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Natural end of turn
    End,
    /// Hit the response token cap
    MaxTokens,
    /// The model wants one or more tools executed
    ToolUse,
    /// Provider-reported generation error
    Error,
}

/// Token accounting for one call, accumulated across an agent run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

impl Usage {
    /// Accumulate another call's counters into this one.
    pub fn add(&mut self, other: Usage) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
    }

    pub fn total(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

/// The model's complete reply to one [`ChatRequest`].
#[derive(Debug, Clone)]
pub struct ChatResponse {
    /// Final content blocks in provider order
    pub content: Vec<ContentBlock>,

    /// Why generation stopped
    pub stop_reason: StopReason,

    /// Token counters reported by the provider
    pub usage: Usage,
}

impl ChatResponse {
    /// Concatenated text of all `Text` blocks.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text(t) => Some(t.text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// All tool-use blocks, in provider-emitted order.
    pub fn tool_uses(&self) -> Vec<&ToolUseBlock> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse(t) => Some(t),
                _ => None,
            })
            .collect()
    }
}

// ============================================================================
// STREAMING
// ============================================================================

/// Kind of content block announced by a `BlockStart` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Text,
    Thinking,
    ToolUse,
}

/// Kind of payload carried by a `Delta` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaKind {
    /// User-visible text
    Text,
    /// Reasoning text
    Thinking,
    /// Partial JSON for a tool-use block's arguments
    InputJson,
}

/// Normalized incremental event during a streaming call.
///
/// For any given block index, a `BlockStart` precedes its `Delta`s which
/// precede its `BlockStop`; events arrive in provider order on the
/// request's initiating task.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Response opened
    MessageStart,

    /// A content block opened. For tool-use blocks, `id` and `name` are
    /// known up front; arguments arrive as `InputJson` deltas.
    BlockStart {
        index: usize,
        kind: BlockKind,
        /// Tool-use id, when `kind` is `ToolUse`
        id: Option<String>,
        /// Tool name, when `kind` is `ToolUse`
        name: Option<String>,
    },

    /// Incremental payload for an open block
    Delta {
        index: usize,
        kind: DeltaKind,
        payload: String,
    },

    /// A content block closed
    BlockStop { index: usize },

    /// Trailing response metadata (stop reason, usage counters)
    MessageDelta {
        stop_reason: Option<StopReason>,
        usage: Option<Usage>,
    },

    /// Response closed
    MessageStop,
}

/// Returned by a streaming callback to continue or abort the transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamControl {
    /// Keep delivering events
    Continue,
    /// Tear down the HTTP transfer; the call returns `Cancelled`
    Abort,
}
