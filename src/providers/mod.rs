//! Provider adapters: one wire protocol per module, one contract for all.
//!
//! A provider is the translation layer between the neutral chat shapes in
//! [`types`](crate::types) and a vendor's HTTP API. Every adapter
//! implements the same capability set:
//!
//! - [`Provider::build_request`]: neutral request → wire JSON body
//! - [`Provider::parse_response`]: wire response body → [`ChatResponse`]
//! - [`Provider::stream_parser`]: fresh per-stream SSE decoder yielding
//!   normalized [`StreamEvent`]s
//!
//! plus endpoint and header construction (auth scheme and key placement
//! are provider-specific). Adapters are trait objects, not an enum: new
//! protocols plug in through [`register`] without touching this crate.
//!
//! Two adapters ship built in:
//!
//! - [`openai`]: the chat-completions dialect spoken by OpenAI and most
//!   local inference servers
//! - [`anthropic`]: the Anthropic Messages API with typed content blocks
//!   and a thinking channel

pub mod anthropic;
pub mod openai;

use crate::types::{ChatRequest, ChatResponse, StreamEvent};
use crate::{Error, Result};
use once_cell::sync::Lazy;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Wire-protocol adapter for one provider family.
pub trait Provider: Send + Sync + std::fmt::Debug {
    /// Registry name of this adapter.
    fn name(&self) -> &'static str;

    /// Full endpoint URL for a chat call against the given base.
    fn endpoint(&self, api_base: &str) -> String;

    /// HTTP headers for a chat call, including authentication.
    /// `extra` entries are appended after the provider's own headers.
    fn headers(
        &self,
        api_key: &str,
        extra: &BTreeMap<String, String>,
    ) -> Vec<(String, String)>;

    /// Serialize a neutral request into the provider's JSON body.
    fn build_request(&self, model: &str, request: &ChatRequest) -> Result<serde_json::Value>;

    /// Parse a complete (non-streaming) response body.
    fn parse_response(&self, body: &str) -> Result<ChatResponse>;

    /// Fresh decoder state for one streaming response.
    fn stream_parser(&self) -> Box<dyn StreamParser>;
}

/// Incremental decoder turning raw SSE bytes into normalized events.
///
/// State is per-stream: frames split across chunk boundaries stay
/// buffered between [`feed`](StreamParser::feed) calls. For any content
/// block the decoder guarantees `BlockStart` before its `Delta`s before
/// its `BlockStop`, in provider order.
pub trait StreamParser: Send {
    fn feed(&mut self, chunk: &[u8]) -> Result<Vec<StreamEvent>>;
}

// ============================================================================
// REGISTRY
// ============================================================================

static REGISTRY: Lazy<RwLock<HashMap<String, Arc<dyn Provider>>>> = Lazy::new(|| {
    let mut map: HashMap<String, Arc<dyn Provider>> = HashMap::new();
    map.insert("openai".to_string(), Arc::new(openai::OpenAi));
    map.insert("anthropic".to_string(), Arc::new(anthropic::Anthropic));
    RwLock::new(map)
});

/// Look up a provider by registry name.
///
/// The built-ins (`"openai"`, `"anthropic"`) are registered on first
/// use; anything else must have been added via [`register`].
pub fn resolve(name: &str) -> Result<Arc<dyn Provider>> {
    REGISTRY
        .read()
        .expect("provider registry poisoned")
        .get(name)
        .cloned()
        .ok_or_else(|| Error::ProviderNotFound(name.to_string()))
}

/// Register (or replace) a provider under the given name.
pub fn register(name: impl Into<String>, provider: Arc<dyn Provider>) {
    REGISTRY
        .write()
        .expect("provider registry poisoned")
        .insert(name.into(), provider);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_resolve() {
        assert_eq!(resolve("openai").unwrap().name(), "openai");
        assert_eq!(resolve("anthropic").unwrap().name(), "anthropic");
    }

    #[test]
    fn test_unknown_provider() {
        let err = resolve("not-a-provider").unwrap_err();
        assert!(matches!(err, Error::ProviderNotFound(_)));
    }

    #[test]
    fn test_register_custom_provider() {
        #[derive(Debug)]
        struct Echo;
        impl Provider for Echo {
            fn name(&self) -> &'static str {
                "echo"
            }
            fn endpoint(&self, api_base: &str) -> String {
                format!("{api_base}/echo")
            }
            fn headers(
                &self,
                _api_key: &str,
                _extra: &BTreeMap<String, String>,
            ) -> Vec<(String, String)> {
                Vec::new()
            }
            fn build_request(
                &self,
                _model: &str,
                _request: &ChatRequest,
            ) -> Result<serde_json::Value> {
                Ok(serde_json::json!({}))
            }
            fn parse_response(&self, _body: &str) -> Result<ChatResponse> {
                Err(Error::stream("not implemented"))
            }
            fn stream_parser(&self) -> Box<dyn StreamParser> {
                struct Nop;
                impl StreamParser for Nop {
                    fn feed(&mut self, _chunk: &[u8]) -> Result<Vec<StreamEvent>> {
                        Ok(Vec::new())
                    }
                }
                Box::new(Nop)
            }
        }

        register("echo", Arc::new(Echo));
        assert_eq!(resolve("echo").unwrap().name(), "echo");
    }
}
