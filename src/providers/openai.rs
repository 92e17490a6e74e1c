//! OpenAI-compatible chat-completions adapter.
//!
//! Speaks `POST {base}/chat/completions` with bearer auth. This dialect
//! is also what local inference servers (LM Studio, Ollama, llama.cpp,
//! vLLM) expose, so the adapter doubles as the local-model path.
//!
//! Wire quirks handled here:
//!
//! - Assistant tool-use blocks flatten into a `tool_calls` array whose
//!   `arguments` field is a JSON **string**, not an object; tool results
//!   are separate role-`tool` messages keyed by `tool_call_id`.
//! - Streaming delivers `choices[0].delta` increments. Tool calls arrive
//!   as fragments indexed by position — id and name in the first
//!   fragment, argument JSON split across the rest — and the final frame
//!   carries `finish_reason`. The stream ends with a `data: [DONE]`
//!   sentinel.
//! - There is no thinking channel; thinking blocks are dropped on replay.

use super::{Provider, StreamParser};
use crate::sse::SseParser;
use crate::types::{
    BlockKind, ChatRequest, ChatResponse, ContentBlock, DeltaKind, Message, MessageRole,
    StopReason, StreamEvent, TextBlock, ToolUseBlock, Usage,
};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::HashMap;

/// The OpenAI-compatible provider adapter.
#[derive(Debug)]
pub struct OpenAi;

// ============================================================================
// WIRE TYPES
// ============================================================================

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    stream: bool,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<serde_json::Value>>,
}

#[derive(Serialize)]
struct WireMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    function: WireFunction,
}

#[derive(Serialize, Deserialize)]
struct WireFunction {
    name: String,
    /// JSON-encoded argument object
    arguments: String,
}

#[derive(Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct WireResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

impl From<WireUsage> for Usage {
    fn from(wire: WireUsage) -> Self {
        Usage {
            input_tokens: wire.prompt_tokens,
            output_tokens: wire.completion_tokens,
        }
    }
}

// Streaming chunk shapes.

#[derive(Deserialize)]
struct WireChunk {
    #[serde(default)]
    choices: Vec<WireChunkChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct WireChunkChoice {
    delta: WireDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct WireDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCallDelta>>,
}

#[derive(Deserialize)]
struct WireToolCallDelta {
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<WireFunctionDelta>,
}

#[derive(Deserialize, Default)]
struct WireFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

// ============================================================================
// ADAPTER
// ============================================================================

fn map_finish_reason(reason: &str) -> StopReason {
    match reason {
        "length" => StopReason::MaxTokens,
        "tool_calls" | "function_call" => StopReason::ToolUse,
        // "stop", "content_filter", and anything unrecognized terminate
        // the turn without further action.
        _ => StopReason::End,
    }
}

fn to_wire_messages(messages: &[Message]) -> Vec<WireMessage> {
    let mut wire = Vec::with_capacity(messages.len());

    for message in messages {
        match message.role {
            MessageRole::System | MessageRole::User => {
                wire.push(WireMessage {
                    role: if message.role == MessageRole::System {
                        "system"
                    } else {
                        "user"
                    },
                    content: Some(message.text()),
                    tool_calls: None,
                    tool_call_id: None,
                });
            }
            MessageRole::Assistant => {
                let text = message.text();
                let tool_calls: Vec<WireToolCall> = message
                    .content
                    .iter()
                    .filter_map(|block| match block {
                        ContentBlock::ToolUse(t) => Some(WireToolCall {
                            id: t.id.clone(),
                            kind: "function".to_string(),
                            function: WireFunction {
                                name: t.name.clone(),
                                arguments: t.input.to_string(),
                            },
                        }),
                        // No thinking channel in this dialect.
                        _ => None,
                    })
                    .collect();

                wire.push(WireMessage {
                    role: "assistant",
                    content: if text.is_empty() { None } else { Some(text) },
                    tool_calls: if tool_calls.is_empty() {
                        None
                    } else {
                        Some(tool_calls)
                    },
                    tool_call_id: None,
                });
            }
            MessageRole::Tool => {
                let content = message
                    .content
                    .iter()
                    .filter_map(|block| match block {
                        ContentBlock::ToolResult(r) => Some(r.content.as_str()),
                        _ => None,
                    })
                    .collect::<Vec<_>>()
                    .join("\n");

                wire.push(WireMessage {
                    role: "tool",
                    content: Some(content),
                    tool_calls: None,
                    tool_call_id: message.tool_call_id.clone(),
                });
            }
        }
    }

    wire
}

impl Provider for OpenAi {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn endpoint(&self, api_base: &str) -> String {
        format!("{api_base}/chat/completions")
    }

    fn headers(&self, api_key: &str, extra: &BTreeMap<String, String>) -> Vec<(String, String)> {
        let mut headers = Vec::with_capacity(1 + extra.len());
        // Local servers accept unauthenticated requests; only attach the
        // bearer token when one is configured.
        if !api_key.is_empty() {
            headers.push(("Authorization".to_string(), format!("Bearer {api_key}")));
        }
        for (name, value) in extra {
            headers.push((name.clone(), value.clone()));
        }
        headers
    }

    fn build_request(&self, model: &str, request: &ChatRequest) -> Result<serde_json::Value> {
        let tools = if request.tools.is_empty() {
            None
        } else {
            Some(
                request
                    .tools
                    .iter()
                    .map(|spec| {
                        serde_json::json!({
                            "type": "function",
                            "function": {
                                "name": spec.name,
                                "description": spec.description,
                                "parameters": spec.parameters,
                            }
                        })
                    })
                    .collect(),
            )
        };

        let wire = WireRequest {
            model,
            messages: to_wire_messages(&request.messages),
            stream: request.stream,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            tools,
        };

        Ok(serde_json::to_value(wire)?)
    }

    fn parse_response(&self, body: &str) -> Result<ChatResponse> {
        let wire: WireResponse = serde_json::from_str(body)
            .map_err(|e| Error::backend(format!("malformed chat completion: {e}")))?;

        let choice = wire
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::backend("chat completion carried no choices"))?;

        let mut content = Vec::new();
        if let Some(text) = choice.message.content {
            if !text.is_empty() {
                content.push(ContentBlock::Text(TextBlock::new(text)));
            }
        }

        let mut saw_tool_calls = false;
        for call in choice.message.tool_calls.unwrap_or_default() {
            saw_tool_calls = true;
            let input = decode_arguments(&call.function.arguments)?;
            content.push(ContentBlock::ToolUse(ToolUseBlock::new(
                call.id,
                call.function.name,
                input,
            )));
        }

        let stop_reason = if saw_tool_calls {
            StopReason::ToolUse
        } else {
            choice
                .finish_reason
                .as_deref()
                .map(map_finish_reason)
                .unwrap_or(StopReason::End)
        };

        Ok(ChatResponse {
            content,
            stop_reason,
            usage: wire.usage.map(Usage::from).unwrap_or_default(),
        })
    }

    fn stream_parser(&self) -> Box<dyn StreamParser> {
        Box::new(OpenAiStream::default())
    }
}

fn decode_arguments(arguments: &str) -> Result<serde_json::Value> {
    if arguments.trim().is_empty() {
        return Ok(serde_json::json!({}));
    }
    serde_json::from_str(arguments)
        .map_err(|e| Error::stream(format!("bad tool arguments JSON: {e}")))
}

// ============================================================================
// STREAM DECODER
// ============================================================================

/// Per-stream decoder state.
///
/// The wire has no block_start/block_stop framing, so blocks are
/// synthesized: the first text delta opens a text block, the first
/// fragment of each `tool_calls[i]` opens a tool-use block, and every
/// open block closes when `finish_reason` (or the `[DONE]` sentinel)
/// arrives.
#[derive(Default)]
struct OpenAiStream {
    sse: SseParser,
    started: bool,
    next_index: usize,
    text_index: Option<usize>,
    /// wire tool-call position → synthesized block index
    tool_indices: HashMap<u32, usize>,
    open: Vec<usize>,
    finished: bool,
}

impl OpenAiStream {
    fn close_open_blocks(&mut self, events: &mut Vec<StreamEvent>) {
        for index in std::mem::take(&mut self.open) {
            events.push(StreamEvent::BlockStop { index });
        }
    }

    fn process_chunk(&mut self, chunk: WireChunk, events: &mut Vec<StreamEvent>) {
        let usage_only = chunk.choices.is_empty();

        for choice in chunk.choices {
            if let Some(text) = choice.delta.content {
                if !text.is_empty() {
                    let index = match self.text_index {
                        Some(index) => index,
                        None => {
                            let index = self.next_index;
                            self.next_index += 1;
                            self.text_index = Some(index);
                            self.open.push(index);
                            events.push(StreamEvent::BlockStart {
                                index,
                                kind: BlockKind::Text,
                                id: None,
                                name: None,
                            });
                            index
                        }
                    };
                    events.push(StreamEvent::Delta {
                        index,
                        kind: DeltaKind::Text,
                        payload: text,
                    });
                }
            }

            for fragment in choice.delta.tool_calls.unwrap_or_default() {
                let function = fragment.function.unwrap_or_default();
                let index = match self.tool_indices.get(&fragment.index) {
                    Some(&index) => index,
                    None => {
                        let index = self.next_index;
                        self.next_index += 1;
                        self.tool_indices.insert(fragment.index, index);
                        self.open.push(index);
                        events.push(StreamEvent::BlockStart {
                            index,
                            kind: BlockKind::ToolUse,
                            id: fragment.id.clone(),
                            name: function.name.clone(),
                        });
                        index
                    }
                };
                if let Some(arguments) = function.arguments {
                    if !arguments.is_empty() {
                        events.push(StreamEvent::Delta {
                            index,
                            kind: DeltaKind::InputJson,
                            payload: arguments,
                        });
                    }
                }
            }

            if let Some(reason) = choice.finish_reason {
                self.finished = true;
                self.close_open_blocks(events);
                events.push(StreamEvent::MessageDelta {
                    stop_reason: Some(if self.tool_indices.is_empty() {
                        map_finish_reason(&reason)
                    } else {
                        StopReason::ToolUse
                    }),
                    usage: None,
                });
            }
        }

        // With stream_options.include_usage the counters arrive in a
        // trailing chunk whose choices array is empty.
        if let Some(usage) = chunk.usage {
            if usage_only || self.finished {
                events.push(StreamEvent::MessageDelta {
                    stop_reason: None,
                    usage: Some(usage.into()),
                });
            }
        }
    }
}

impl StreamParser for OpenAiStream {
    fn feed(&mut self, chunk: &[u8]) -> Result<Vec<StreamEvent>> {
        let mut events = Vec::new();

        for frame in self.sse.feed(chunk) {
            if frame.data == "[DONE]" {
                // Some servers skip finish_reason entirely.
                self.close_open_blocks(&mut events);
                events.push(StreamEvent::MessageStop);
                continue;
            }

            if !self.started {
                self.started = true;
                events.push(StreamEvent::MessageStart);
            }

            let wire: WireChunk = serde_json::from_str(&frame.data)
                .map_err(|e| Error::stream(format!("bad stream chunk: {e}")))?;
            self.process_chunk(wire, &mut events);
        }

        Ok(events)
    }
}
