//! # LLM client configuration
//!
//! This module defines [`LlmConfig`], the enumerated configuration for an
//! [`Llm`](crate::Llm) client, together with the [`Compat`] wire-protocol
//! selector and environment-variable resolution for keys, base URLs, and
//! default models.
//!
//! ## Environment Variables
//!
//! - `OPENAI_API_KEY` / `ANTHROPIC_API_KEY`: API key when not set explicitly
//! - `OPENAI_BASE_URL` / `ANTHROPIC_BASE_URL`: endpoint override
//!
//! ## Examples
//!
//! ```rust,no_run
//! use agentry::LlmConfig;
//!
//! let config = LlmConfig::builder()
//!     .provider("anthropic")
//!     .model("claude-sonnet-4-20250514")
//!     .api_key("sk-ant-...")
//!     .thinking(true, 2048)
//!     .build()
//!     .unwrap();
//! ```
//!
//! Configurations can also be deserialized from JSON; unknown keys are
//! rejected rather than silently ignored.

use crate::types::Thinking;
use crate::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// COMPAT ENUM
// ============================================================================

/// Wire-protocol compatibility mode.
///
/// Selects which of the two built-in adapters speaks for this client.
/// Providers registered under other names are resolved by string through
/// the provider registry and have no compat shortcuts (no env-var or
/// default-model resolution).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compat {
    /// OpenAI chat-completions protocol (`POST {base}/chat/completions`)
    OpenAi,

    /// Anthropic Messages protocol (`POST {base}/v1/messages`)
    Anthropic,
}

impl Compat {
    /// Default endpoint when neither config nor environment overrides it.
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Compat::OpenAi => "https://api.openai.com/v1",
            Compat::Anthropic => "https://api.anthropic.com",
        }
    }

    /// Default model identifier for this protocol.
    pub fn default_model(&self) -> &'static str {
        match self {
            Compat::OpenAi => "gpt-4o-mini",
            Compat::Anthropic => "claude-sonnet-4-20250514",
        }
    }

    /// API key from the conventional environment variable, if present.
    pub fn env_api_key(&self) -> Option<String> {
        let var = match self {
            Compat::OpenAi => "OPENAI_API_KEY",
            Compat::Anthropic => "ANTHROPIC_API_KEY",
        };
        env::var(var).ok().filter(|v| !v.is_empty())
    }

    /// Base URL from the conventional environment variable, if present.
    pub fn env_base_url(&self) -> Option<String> {
        let var = match self {
            Compat::OpenAi => "OPENAI_BASE_URL",
            Compat::Anthropic => "ANTHROPIC_BASE_URL",
        };
        env::var(var).ok().filter(|v| !v.is_empty())
    }
}

impl FromStr for Compat {
    type Err = Error;

    /// Case-insensitive parse of a compatibility-mode name.
    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" | "openai-compatible" | "openai_compatible" => Ok(Compat::OpenAi),
            "anthropic" => Ok(Compat::Anthropic),
            other => Err(Error::ProviderNotFound(other.to_string())),
        }
    }
}

impl std::fmt::Display for Compat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Compat::OpenAi => write!(f, "openai"),
            Compat::Anthropic => write!(f, "anthropic"),
        }
    }
}

// ============================================================================
// LLM CONFIG
// ============================================================================

/// Configuration for an [`Llm`](crate::Llm) client.
///
/// Construct via [`LlmConfig::builder`] or deserialize from JSON. The key
/// set is closed: deserialization rejects unknown fields.
///
/// `provider` names a registered adapter; `compatible` forces one of the
/// built-in wire protocols for providers that merely speak a compatible
/// dialect. When both are set, `compatible` wins.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LlmConfig {
    /// Registered provider name (e.g. `"openai"`, `"anthropic"`)
    #[serde(default)]
    pub provider: Option<String>,

    /// Compatibility override; wins over `provider` when both are set
    #[serde(default)]
    pub compatible: Option<String>,

    /// Model identifier; falls back to the protocol default
    #[serde(default)]
    pub model: Option<String>,

    /// API key; falls back to the conventional environment variable
    #[serde(default)]
    pub api_key: Option<String>,

    /// Endpoint base URL; falls back to env override, then protocol default
    #[serde(default)]
    pub api_base: Option<String>,

    /// System instructions baked into every conversation
    #[serde(default)]
    pub instructions: Option<String>,

    /// Response token cap
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Per-request deadline in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Thinking channel toggle and budget
    #[serde(default)]
    pub thinking: Thinking,

    /// Whether chat calls stream by default
    #[serde(default)]
    pub stream: bool,

    /// Extra HTTP headers appended to every request (sorted for
    /// deterministic emission)
    #[serde(default)]
    pub extra_headers: BTreeMap<String, String>,
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_timeout_ms() -> u64 {
    60_000
}

impl LlmConfig {
    /// Creates a new builder for constructing an [`LlmConfig`].
    pub fn builder() -> LlmConfigBuilder {
        LlmConfigBuilder::default()
    }

    /// Parse a configuration from a JSON value, rejecting unknown keys.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        let config: LlmConfig = serde_json::from_value(value)
            .map_err(|e| Error::invalid_arg(format!("bad config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Effective provider name: `compatible` wins over `provider`.
    pub fn provider_name(&self) -> Result<&str> {
        self.compatible
            .as_deref()
            .or(self.provider.as_deref())
            .ok_or_else(|| Error::invalid_arg("provider is required"))
    }

    /// Model after fallback to the protocol default.
    pub fn resolved_model(&self) -> Result<String> {
        if let Some(model) = &self.model {
            return Ok(model.clone());
        }
        let compat = Compat::from_str(self.provider_name()?)?;
        Ok(compat.default_model().to_string())
    }

    /// API key after fallback to the conventional environment variable.
    ///
    /// `None` when nothing is configured: local OpenAI-compatible servers
    /// accept unauthenticated requests, and hosted providers answer 401
    /// which surfaces as `Auth` through the status mapping.
    pub fn resolved_api_key(&self) -> Option<String> {
        if let Some(key) = &self.api_key {
            return Some(key.clone());
        }
        let compat = Compat::from_str(self.provider_name().ok()?).ok()?;
        compat.env_api_key()
    }

    /// Base URL after env override and protocol default, trailing slash
    /// trimmed so endpoint joining is uniform.
    pub fn resolved_api_base(&self) -> Result<String> {
        let base = if let Some(base) = &self.api_base {
            base.clone()
        } else {
            let compat = Compat::from_str(self.provider_name()?)?;
            compat
                .env_base_url()
                .unwrap_or_else(|| compat.default_base_url().to_string())
        };
        Ok(base.trim_end_matches('/').to_string())
    }

    /// Per-request deadline as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    fn validate(&self) -> Result<()> {
        self.provider_name()?;

        if let Some(base) = &self.api_base {
            if !base.starts_with("http://") && !base.starts_with("https://") {
                return Err(Error::invalid_arg(
                    "api_base must start with http:// or https://",
                ));
            }
        }

        if self.max_tokens == 0 {
            return Err(Error::invalid_arg("max_tokens must be greater than 0"));
        }

        if self.timeout_ms == 0 {
            return Err(Error::invalid_arg("timeout_ms must be greater than 0"));
        }

        Ok(())
    }
}

// ============================================================================
// BUILDER
// ============================================================================

/// Builder for [`LlmConfig`] with validation at `build()`.
#[derive(Default)]
pub struct LlmConfigBuilder {
    provider: Option<String>,
    compatible: Option<String>,
    model: Option<String>,
    api_key: Option<String>,
    api_base: Option<String>,
    instructions: Option<String>,
    max_tokens: Option<u32>,
    timeout_ms: Option<u64>,
    thinking: Thinking,
    stream: bool,
    extra_headers: BTreeMap<String, String>,
}

impl LlmConfigBuilder {
    /// Sets the registered provider name.
    pub fn provider(mut self, name: impl Into<String>) -> Self {
        self.provider = Some(name.into());
        self
    }

    /// Forces a built-in wire protocol; wins over `provider`.
    pub fn compatible(mut self, name: impl Into<String>) -> Self {
        self.compatible = Some(name.into());
        self
    }

    /// Sets the model identifier.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the API key explicitly (otherwise read from the environment).
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the endpoint base URL.
    pub fn api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = Some(base.into());
        self
    }

    /// Sets the system instructions.
    pub fn instructions(mut self, text: impl Into<String>) -> Self {
        self.instructions = Some(text.into());
        self
    }

    /// Sets the response token cap.
    pub fn max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = Some(tokens);
        self
    }

    /// Sets the per-request deadline in milliseconds.
    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = Some(ms);
        self
    }

    /// Enables or disables the thinking channel with a token budget.
    pub fn thinking(mut self, enabled: bool, budget_tokens: u32) -> Self {
        self.thinking = Thinking {
            enabled,
            budget_tokens,
        };
        self
    }

    /// Sets the default streaming flag.
    pub fn stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Appends an extra HTTP header sent with every request.
    pub fn extra_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.insert(name.into(), value.into());
        self
    }

    /// Validates and builds the final [`LlmConfig`].
    ///
    /// # Errors
    ///
    /// Returns `InvalidArg` when no provider is named, the base URL has no
    /// http(s) scheme, or a zero token/timeout budget is given.
    pub fn build(self) -> Result<LlmConfig> {
        let config = LlmConfig {
            provider: self.provider,
            compatible: self.compatible,
            model: self.model,
            api_key: self.api_key,
            api_base: self.api_base,
            instructions: self.instructions,
            max_tokens: self.max_tokens.unwrap_or_else(default_max_tokens),
            timeout_ms: self.timeout_ms.unwrap_or_else(default_timeout_ms),
            thinking: self.thinking,
            stream: self.stream,
            extra_headers: self.extra_headers,
        };
        config.validate()?;
        Ok(config)
    }
}
