//! LLM client: provider resolution, chat, and streaming chat.
//!
//! [`Llm`] binds a validated [`LlmConfig`] to a provider adapter and a
//! connection pool. It exposes exactly two operations:
//!
//! - [`Llm::chat`]: one synchronous round-trip returning a
//!   [`ChatResponse`]
//! - [`Llm::chat_stream`]: SSE streaming; every normalized
//!   [`StreamEvent`] is handed to a callback which can abort the
//!   transfer, and the accumulated final response is returned
//!
//! HTTP status codes map onto the error taxonomy here (401/403 → `Auth`,
//! 429 → `RateLimit`, other 4xx → `BadRequest`, 5xx → `Server`) with
//! response bodies preserved in the message. Rate limits are surfaced,
//! never retried — callers opt into the [`retry`](crate::retry) helpers
//! if they want backoff.

use crate::config::LlmConfig;
use crate::pool::{origin_of, HttpPool, PooledTransport};
use crate::providers::{self, Provider};
use crate::types::{
    BlockKind, ChatRequest, ChatResponse, ContentBlock, Message, MessageRole, StopReason,
    StreamControl, StreamEvent, TextBlock, ThinkingBlock, ToolSpec, ToolUseBlock, Usage,
};
use crate::{Error, Result};
use futures::StreamExt;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// A configured client for one model behind one provider.
///
/// Cheap to share: wrap in `Arc` and hand to as many agents as needed.
/// All methods take `&self`; concurrent calls are serialized only by the
/// pool's capacity.
pub struct Llm {
    config: LlmConfig,
    provider: Arc<dyn Provider>,
    pool: Arc<HttpPool>,
    model: String,
    api_key: String,
    endpoint: String,
    origin: String,
}

impl Llm {
    /// Build a client on the process-wide shared pool.
    pub fn new(config: LlmConfig) -> Result<Self> {
        Self::with_pool(config, HttpPool::shared())
    }

    /// Build a client on an explicit pool.
    pub fn with_pool(config: LlmConfig, pool: Arc<HttpPool>) -> Result<Self> {
        let provider = providers::resolve(config.provider_name()?)?;
        let model = config.resolved_model()?;
        let api_key = config.resolved_api_key().unwrap_or_default();
        let api_base = config.resolved_api_base()?;
        let endpoint = provider.endpoint(&api_base);
        let origin = origin_of(&endpoint);

        debug!(provider = provider.name(), model, endpoint, "LLM client ready");

        Ok(Self {
            config,
            provider,
            pool,
            model,
            api_key,
            endpoint,
            origin,
        })
    }

    /// The resolved model identifier.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// The provider adapter name.
    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// The configuration this client was built from.
    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    /// One synchronous chat round-trip.
    pub async fn chat(&self, messages: &[Message], tools: &[ToolSpec]) -> Result<ChatResponse> {
        let request = self.chat_request(messages, tools, false);
        let body = self.provider.build_request(&self.model, &request)?;
        trace!(provider = self.provider.name(), "chat request built");

        let transport = self.pool.acquire(&self.origin).await?;
        let response = match self.send(&transport, &body).await {
            Ok(response) => response,
            Err(e) => {
                transport.discard();
                return Err(e);
            }
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                transport.discard();
                return Err(e.into());
            }
        };

        if !status.is_success() {
            return Err(map_status(status.as_u16(), &text));
        }

        let parsed = self.provider.parse_response(&text)?;
        debug!(
            stop_reason = ?parsed.stop_reason,
            input_tokens = parsed.usage.input_tokens,
            output_tokens = parsed.usage.output_tokens,
            "chat response"
        );
        Ok(parsed)
    }

    /// Streaming chat.
    ///
    /// `on_event` sees every normalized event in arrival order on the
    /// calling task. Returning [`StreamControl::Abort`] tears down the
    /// HTTP transfer; the method then returns `Cancelled` and delivers
    /// no further events. On normal completion the accumulated
    /// [`ChatResponse`] is returned.
    pub async fn chat_stream(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
        mut on_event: impl FnMut(&StreamEvent) -> StreamControl,
    ) -> Result<ChatResponse> {
        let request = self.chat_request(messages, tools, true);
        let body = self.provider.build_request(&self.model, &request)?;

        let transport = self.pool.acquire(&self.origin).await?;
        let response = match self.send(&transport, &body).await {
            Ok(response) => response,
            Err(e) => {
                transport.discard();
                return Err(e);
            }
        };

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(map_status(status.as_u16(), &text));
        }

        let mut parser = self.provider.stream_parser();
        let mut accumulator = ResponseAccumulator::default();
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let bytes = match chunk {
                Ok(bytes) => bytes,
                Err(e) => {
                    drop(stream);
                    transport.discard();
                    return Err(e.into());
                }
            };

            let events = match parser.feed(&bytes) {
                Ok(events) => events,
                Err(e) => {
                    drop(stream);
                    transport.discard();
                    return Err(e);
                }
            };

            for event in events {
                accumulator.apply(&event);
                if on_event(&event) == StreamControl::Abort {
                    debug!("stream aborted by callback");
                    // The connection has unread frames; never reuse it.
                    drop(stream);
                    transport.discard();
                    return Err(Error::Cancelled);
                }
            }
        }

        accumulator.finish()
    }

    fn chat_request(&self, messages: &[Message], tools: &[ToolSpec], stream: bool) -> ChatRequest {
        // Client-level instructions apply when the conversation has no
        // system message of its own.
        let mut all = Vec::with_capacity(messages.len() + 1);
        if let Some(instructions) = &self.config.instructions {
            if !messages.iter().any(|m| m.role == MessageRole::System) {
                all.push(Message::system(instructions.clone()));
            }
        }
        all.extend_from_slice(messages);

        ChatRequest {
            messages: all,
            tools: tools.to_vec(),
            temperature: None,
            max_tokens: self.config.max_tokens,
            timeout: self.config.timeout(),
            thinking: self.config.thinking,
            stream,
        }
    }

    async fn send(
        &self,
        transport: &PooledTransport,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response> {
        let mut request = transport
            .client()
            .post(&self.endpoint)
            .timeout(self.config.timeout())
            .json(body);

        for (name, value) in self
            .provider
            .headers(&self.api_key, &self.config.extra_headers)
        {
            request = request.header(name, value);
        }

        Ok(request.send().await?)
    }
}

impl std::fmt::Debug for Llm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Llm")
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            // Key redacted: Debug output lands in logs.
            .field("api_key", &"***")
            .finish()
    }
}

/// Map an HTTP error status onto the taxonomy, preserving the body.
fn map_status(status: u16, body: &str) -> Error {
    let detail = if body.is_empty() {
        format!("HTTP {status}")
    } else {
        format!("HTTP {status}: {body}")
    };
    match status {
        401 | 403 => Error::Auth(detail),
        429 => Error::RateLimit(detail),
        400..=499 => Error::BadRequest(detail),
        _ => Error::Server(detail),
    }
}

// ============================================================================
// STREAM ACCUMULATION
// ============================================================================

/// Rebuilds a [`ChatResponse`] from normalized stream events.
///
/// Blocks accumulate under their provider-assigned index; tool-use
/// argument JSON is concatenated as a raw string and parsed only once
/// the stream completes, so arguments may split at any byte boundary.
#[derive(Default)]
struct ResponseAccumulator {
    blocks: BTreeMap<usize, PartialBlock>,
    stop_reason: Option<StopReason>,
    usage: Usage,
}

struct PartialBlock {
    kind: BlockKind,
    id: Option<String>,
    name: Option<String>,
    payload: String,
}

impl ResponseAccumulator {
    fn apply(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::BlockStart {
                index,
                kind,
                id,
                name,
            } => {
                self.blocks.insert(
                    *index,
                    PartialBlock {
                        kind: *kind,
                        id: id.clone(),
                        name: name.clone(),
                        payload: String::new(),
                    },
                );
            }
            StreamEvent::Delta { index, payload, .. } => {
                if let Some(block) = self.blocks.get_mut(index) {
                    block.payload.push_str(payload);
                }
            }
            StreamEvent::MessageDelta { stop_reason, usage } => {
                if stop_reason.is_some() {
                    self.stop_reason = *stop_reason;
                }
                if let Some(usage) = usage {
                    self.usage.add(*usage);
                }
            }
            StreamEvent::MessageStart
            | StreamEvent::BlockStop { .. }
            | StreamEvent::MessageStop => {}
        }
    }

    fn finish(self) -> Result<ChatResponse> {
        let mut content = Vec::with_capacity(self.blocks.len());
        let mut saw_tool_use = false;

        for (_, block) in self.blocks {
            match block.kind {
                BlockKind::Text => {
                    content.push(ContentBlock::Text(TextBlock::new(block.payload)));
                }
                BlockKind::Thinking => {
                    content.push(ContentBlock::Thinking(ThinkingBlock::new(block.payload)));
                }
                BlockKind::ToolUse => {
                    saw_tool_use = true;
                    let id = block
                        .id
                        .ok_or_else(|| Error::stream("tool_use block without id"))?;
                    let name = block
                        .name
                        .ok_or_else(|| Error::stream("tool_use block without name"))?;
                    let input = if block.payload.trim().is_empty() {
                        serde_json::json!({})
                    } else {
                        serde_json::from_str(&block.payload).map_err(|e| {
                            Error::stream(format!("bad streamed tool arguments: {e}"))
                        })?
                    };
                    content.push(ContentBlock::ToolUse(ToolUseBlock::new(id, name, input)));
                }
            }
        }

        let stop_reason = self.stop_reason.unwrap_or(if saw_tool_use {
            StopReason::ToolUse
        } else {
            StopReason::End
        });

        if content.is_empty() {
            warn!("stream completed with no content blocks");
        }

        Ok(ChatResponse {
            content,
            stop_reason,
            usage: self.usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DeltaKind;

    #[test]
    fn test_map_status() {
        assert!(matches!(map_status(401, "no key"), Error::Auth(_)));
        assert!(matches!(map_status(403, ""), Error::Auth(_)));
        assert!(matches!(map_status(429, "slow down"), Error::RateLimit(_)));
        assert!(matches!(map_status(404, ""), Error::BadRequest(_)));
        assert!(matches!(map_status(422, ""), Error::BadRequest(_)));
        assert!(matches!(map_status(500, "boom"), Error::Server(_)));
        assert!(matches!(map_status(503, ""), Error::Server(_)));
    }

    #[test]
    fn test_map_status_preserves_body() {
        match map_status(429, "quota exceeded") {
            Error::RateLimit(detail) => {
                assert!(detail.contains("429"));
                assert!(detail.contains("quota exceeded"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_accumulator_text_and_tool_use() {
        let mut acc = ResponseAccumulator::default();
        let events = [
            StreamEvent::MessageStart,
            StreamEvent::BlockStart {
                index: 0,
                kind: BlockKind::Text,
                id: None,
                name: None,
            },
            StreamEvent::Delta {
                index: 0,
                kind: DeltaKind::Text,
                payload: "Sure, ".to_string(),
            },
            StreamEvent::Delta {
                index: 0,
                kind: DeltaKind::Text,
                payload: "calling.".to_string(),
            },
            StreamEvent::BlockStop { index: 0 },
            StreamEvent::BlockStart {
                index: 1,
                kind: BlockKind::ToolUse,
                id: Some("tu_1".to_string()),
                name: Some("add".to_string()),
            },
            StreamEvent::Delta {
                index: 1,
                kind: DeltaKind::InputJson,
                payload: "{\"a\":".to_string(),
            },
            StreamEvent::Delta {
                index: 1,
                kind: DeltaKind::InputJson,
                payload: "1}".to_string(),
            },
            StreamEvent::BlockStop { index: 1 },
            StreamEvent::MessageDelta {
                stop_reason: Some(StopReason::ToolUse),
                usage: Some(Usage {
                    input_tokens: 4,
                    output_tokens: 6,
                }),
            },
            StreamEvent::MessageStop,
        ];

        for event in &events {
            acc.apply(event);
        }
        let response = acc.finish().unwrap();

        assert_eq!(response.text(), "Sure, calling.");
        assert_eq!(response.stop_reason, StopReason::ToolUse);
        assert_eq!(response.tool_uses()[0].input, serde_json::json!({"a": 1}));
        assert_eq!(response.usage.output_tokens, 6);
    }

    #[test]
    fn test_accumulator_usage_merges_across_deltas() {
        let mut acc = ResponseAccumulator::default();
        acc.apply(&StreamEvent::MessageDelta {
            stop_reason: None,
            usage: Some(Usage {
                input_tokens: 10,
                output_tokens: 0,
            }),
        });
        acc.apply(&StreamEvent::MessageDelta {
            stop_reason: Some(StopReason::End),
            usage: Some(Usage {
                input_tokens: 0,
                output_tokens: 12,
            }),
        });

        let response = acc.finish().unwrap();
        assert_eq!(response.usage.input_tokens, 10);
        assert_eq!(response.usage.output_tokens, 12);
    }

    #[test]
    fn test_accumulator_tool_use_without_id_fails() {
        let mut acc = ResponseAccumulator::default();
        acc.apply(&StreamEvent::BlockStart {
            index: 0,
            kind: BlockKind::ToolUse,
            id: None,
            name: Some("add".to_string()),
        });
        assert!(acc.finish().is_err());
    }
}
