//! Anthropic Messages API adapter.
//!
//! Speaks `POST {base}/v1/messages` with `x-api-key` auth plus the
//! `anthropic-version` header. Unlike the chat-completions dialect,
//! content is always a list of typed blocks — `text`, `thinking`,
//! `tool_use`, `tool_result` — and the SSE stream is explicitly framed
//! with typed events (`message_start`, `content_block_start`,
//! `content_block_delta`, `content_block_stop`, `message_delta`,
//! `message_stop`), so the decoder is mostly a one-to-one mapping.
//!
//! Thinking: when enabled with a positive budget the request carries an
//! `extended_thinking` parameter. Response `thinking` blocks (and their
//! signatures) are preserved and replayed byte-for-byte — the server
//! validates signatures over replayed reasoning.

use super::{Provider, StreamParser};
use crate::sse::SseParser;
use crate::types::{
    BlockKind, ChatRequest, ChatResponse, ContentBlock, DeltaKind, Message, MessageRole,
    StopReason, StreamEvent, TextBlock, ThinkingBlock, ToolUseBlock, Usage,
};
use crate::{Error, Result};
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// The Anthropic provider adapter.
#[derive(Debug)]
pub struct Anthropic;

// ============================================================================
// WIRE TYPES (responses; requests are assembled as JSON values)
// ============================================================================

#[derive(Deserialize)]
struct WireResponse {
    content: Vec<WireBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct WireBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thinking: Option<String>,
    #[serde(default)]
    signature: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    input: Option<serde_json::Value>,
}

#[derive(Deserialize, Default)]
struct WireUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

impl From<WireUsage> for Usage {
    fn from(wire: WireUsage) -> Self {
        Usage {
            input_tokens: wire.input_tokens,
            output_tokens: wire.output_tokens,
        }
    }
}

// Streaming event shapes.

#[derive(Deserialize)]
struct WireEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    index: Option<usize>,
    #[serde(default)]
    content_block: Option<WireBlock>,
    #[serde(default)]
    delta: Option<WireDelta>,
    #[serde(default)]
    message: Option<WireStartMessage>,
    #[serde(default)]
    usage: Option<WireUsage>,
    #[serde(default)]
    error: Option<WireError>,
}

#[derive(Deserialize)]
struct WireStartMessage {
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct WireDelta {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thinking: Option<String>,
    #[serde(default)]
    partial_json: Option<String>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
struct WireError {
    #[serde(default)]
    message: String,
}

// ============================================================================
// ADAPTER
// ============================================================================

fn map_stop_reason(reason: &str) -> StopReason {
    match reason {
        "max_tokens" => StopReason::MaxTokens,
        "tool_use" => StopReason::ToolUse,
        // "end_turn", "stop_sequence", and unknown values all terminate.
        _ => StopReason::End,
    }
}

fn block_to_wire(block: &ContentBlock) -> Option<serde_json::Value> {
    match block {
        ContentBlock::Text(t) => Some(json!({"type": "text", "text": t.text})),
        ContentBlock::Thinking(t) => {
            let mut value = json!({"type": "thinking", "thinking": t.text});
            if let Some(signature) = &t.signature {
                value["signature"] = json!(signature);
            }
            Some(value)
        }
        ContentBlock::ToolUse(t) => Some(json!({
            "type": "tool_use",
            "id": t.id,
            "name": t.name,
            "input": t.input,
        })),
        ContentBlock::ToolResult(r) => {
            let mut value = json!({
                "type": "tool_result",
                "tool_use_id": r.tool_use_id,
                "content": r.content,
            });
            if r.is_error {
                value["is_error"] = json!(true);
            }
            Some(value)
        }
    }
}

impl Provider for Anthropic {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    fn endpoint(&self, api_base: &str) -> String {
        format!("{api_base}/v1/messages")
    }

    fn headers(&self, api_key: &str, extra: &BTreeMap<String, String>) -> Vec<(String, String)> {
        let mut headers = vec![
            ("x-api-key".to_string(), api_key.to_string()),
            (
                "anthropic-version".to_string(),
                ANTHROPIC_VERSION.to_string(),
            ),
        ];
        for (name, value) in extra {
            headers.push((name.clone(), value.clone()));
        }
        headers
    }

    fn build_request(&self, model: &str, request: &ChatRequest) -> Result<serde_json::Value> {
        // System messages lift into the top-level `system` field; the
        // messages array holds only user/assistant turns. Tool results
        // travel as user messages with tool_result blocks.
        let mut system_parts: Vec<&str> = Vec::new();
        let mut messages: Vec<serde_json::Value> = Vec::new();

        for message in &request.messages {
            match message.role {
                MessageRole::System => {
                    for block in &message.content {
                        if let ContentBlock::Text(t) = block {
                            system_parts.push(&t.text);
                        }
                    }
                }
                MessageRole::User | MessageRole::Tool => {
                    let content: Vec<serde_json::Value> =
                        message.content.iter().filter_map(block_to_wire).collect();
                    messages.push(json!({"role": "user", "content": content}));
                }
                MessageRole::Assistant => {
                    let content: Vec<serde_json::Value> =
                        message.content.iter().filter_map(block_to_wire).collect();
                    messages.push(json!({"role": "assistant", "content": content}));
                }
            }
        }

        let mut body = json!({
            "model": model,
            "max_tokens": request.max_tokens,
            "messages": messages,
        });

        if !system_parts.is_empty() {
            body["system"] = json!(system_parts.join("\n\n"));
        }
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }
        if request.stream {
            body["stream"] = json!(true);
        }
        if !request.tools.is_empty() {
            body["tools"] = json!(
                request
                    .tools
                    .iter()
                    .map(|spec| {
                        json!({
                            "name": spec.name,
                            "description": spec.description,
                            "input_schema": spec.parameters,
                        })
                    })
                    .collect::<Vec<_>>()
            );
        }
        if request.thinking.enabled && request.thinking.budget_tokens > 0 {
            body["extended_thinking"] = json!({
                "enabled": true,
                "budget_tokens": request.thinking.budget_tokens,
            });
        }

        Ok(body)
    }

    fn parse_response(&self, body: &str) -> Result<ChatResponse> {
        let wire: WireResponse = serde_json::from_str(body)
            .map_err(|e| Error::backend(format!("malformed messages response: {e}")))?;

        let mut content = Vec::new();
        for block in wire.content {
            match block.kind.as_str() {
                "text" => {
                    content.push(ContentBlock::Text(TextBlock::new(
                        block.text.unwrap_or_default(),
                    )));
                }
                "thinking" => {
                    let mut thinking = ThinkingBlock::new(block.thinking.unwrap_or_default());
                    thinking.signature = block.signature;
                    content.push(ContentBlock::Thinking(thinking));
                }
                "tool_use" => {
                    content.push(ContentBlock::ToolUse(ToolUseBlock::new(
                        block.id.unwrap_or_default(),
                        block.name.unwrap_or_default(),
                        block.input.unwrap_or_else(|| json!({})),
                    )));
                }
                other => {
                    return Err(Error::backend(format!("unknown content block: {other}")));
                }
            }
        }

        Ok(ChatResponse {
            content,
            stop_reason: wire
                .stop_reason
                .as_deref()
                .map(map_stop_reason)
                .unwrap_or(StopReason::End),
            usage: wire.usage.map(Usage::from).unwrap_or_default(),
        })
    }

    fn stream_parser(&self) -> Box<dyn StreamParser> {
        Box::new(AnthropicStream::default())
    }
}

// ============================================================================
// STREAM DECODER
// ============================================================================

/// Decoder for the typed Anthropic event stream.
///
/// The wire framing already matches the normalized model, so this is a
/// direct translation plus usage bookkeeping: `message_start` carries
/// input-token usage, `message_delta` carries output tokens.
#[derive(Default)]
struct AnthropicStream {
    sse: SseParser,
}

impl StreamParser for AnthropicStream {
    fn feed(&mut self, chunk: &[u8]) -> Result<Vec<StreamEvent>> {
        let mut events = Vec::new();

        for frame in self.sse.feed(chunk) {
            let wire: WireEvent = serde_json::from_str(&frame.data)
                .map_err(|e| Error::stream(format!("bad stream event: {e}")))?;

            match wire.kind.as_str() {
                "message_start" => {
                    events.push(StreamEvent::MessageStart);
                    if let Some(usage) = wire.message.and_then(|m| m.usage) {
                        events.push(StreamEvent::MessageDelta {
                            stop_reason: None,
                            usage: Some(usage.into()),
                        });
                    }
                }
                "content_block_start" => {
                    let index = wire
                        .index
                        .ok_or_else(|| Error::stream("content_block_start without index"))?;
                    let block = wire
                        .content_block
                        .ok_or_else(|| Error::stream("content_block_start without block"))?;
                    let (kind, id, name) = match block.kind.as_str() {
                        "text" => (BlockKind::Text, None, None),
                        "thinking" => (BlockKind::Thinking, None, None),
                        "tool_use" => (BlockKind::ToolUse, block.id, block.name),
                        other => {
                            return Err(Error::stream(format!("unknown block kind: {other}")));
                        }
                    };
                    events.push(StreamEvent::BlockStart {
                        index,
                        kind,
                        id,
                        name,
                    });
                }
                "content_block_delta" => {
                    let index = wire
                        .index
                        .ok_or_else(|| Error::stream("content_block_delta without index"))?;
                    let delta = wire
                        .delta
                        .ok_or_else(|| Error::stream("content_block_delta without delta"))?;
                    match delta.kind.as_deref() {
                        Some("text_delta") => events.push(StreamEvent::Delta {
                            index,
                            kind: DeltaKind::Text,
                            payload: delta.text.unwrap_or_default(),
                        }),
                        Some("thinking_delta") => events.push(StreamEvent::Delta {
                            index,
                            kind: DeltaKind::Thinking,
                            payload: delta.thinking.unwrap_or_default(),
                        }),
                        Some("input_json_delta") => events.push(StreamEvent::Delta {
                            index,
                            kind: DeltaKind::InputJson,
                            payload: delta.partial_json.unwrap_or_default(),
                        }),
                        // signature_delta and future kinds carry nothing
                        // the neutral model surfaces.
                        _ => {}
                    }
                }
                "content_block_stop" => {
                    let index = wire
                        .index
                        .ok_or_else(|| Error::stream("content_block_stop without index"))?;
                    events.push(StreamEvent::BlockStop { index });
                }
                "message_delta" => {
                    events.push(StreamEvent::MessageDelta {
                        stop_reason: wire
                            .delta
                            .and_then(|d| d.stop_reason)
                            .as_deref()
                            .map(map_stop_reason),
                        usage: wire.usage.map(Usage::from),
                    });
                }
                "message_stop" => events.push(StreamEvent::MessageStop),
                "error" => {
                    let message = wire.error.map(|e| e.message).unwrap_or_default();
                    return Err(Error::stream(format!("provider error event: {message}")));
                }
                // ping and future event types are ignorable by contract.
                _ => {}
            }
        }

        Ok(events)
    }
}
