//! Error types for the agentry library

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the library.
///
/// Variants are grouped by layer: argument validation, transport, HTTP
/// pool, provider/LLM, tool registry, and agent loop. Each variant maps
/// to a stable integer code via [`Error::code`]; [`strerror`] performs
/// the reverse lookup for callers that only see codes (trace files,
/// logs).
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid argument or configuration
    #[error("invalid argument: {0}")]
    InvalidArg(String),

    /// Request exceeded its deadline
    #[error("request timed out")]
    Timeout,

    /// Caller aborted a streaming transfer mid-flight
    #[error("operation cancelled")]
    Cancelled,

    /// Host name resolution failed
    #[error("DNS resolution failed: {0}")]
    Dns(String),

    /// TLS handshake or certificate failure
    #[error("TLS failure: {0}")]
    Tls(String),

    /// Connection-level network failure
    #[error("network failure: {0}")]
    Network(String),

    /// Transport failure that fits no finer category; message preserved
    #[error("transport failure: {0}")]
    Backend(String),

    /// Pool at capacity and no handle was released within the acquire timeout
    #[error("connection pool exhausted")]
    PoolExhausted,

    /// HTTP 401/403 from the provider
    #[error("authentication failed: {0}")]
    Auth(String),

    /// HTTP 429 from the provider; the core never retries on its own
    #[error("rate limited: {0}")]
    RateLimit(String),

    /// HTTP 4xx other than 401/403/429
    #[error("bad request: {0}")]
    BadRequest(String),

    /// HTTP 5xx from the provider
    #[error("server error: {0}")]
    Server(String),

    /// No provider registered under the requested name
    #[error("provider not found: {0}")]
    ProviderNotFound(String),

    /// Tool arguments failed schema validation
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Tool name not present in the registry
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// Agent hit its iteration cap while the model still wanted tools
    #[error("iteration cap ({0}) reached")]
    MaxIterations(u32),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed streaming frame or event
    #[error("streaming error: {0}")]
    Stream(String),
}

impl Error {
    /// Create a new invalid-argument error
    pub fn invalid_arg(msg: impl Into<String>) -> Self {
        Error::InvalidArg(msg.into())
    }

    /// Create a new backend transport error
    pub fn backend(msg: impl Into<String>) -> Self {
        Error::Backend(msg.into())
    }

    /// Create a new schema-mismatch error
    pub fn schema_mismatch(msg: impl Into<String>) -> Self {
        Error::SchemaMismatch(msg.into())
    }

    /// Create a new streaming error
    pub fn stream(msg: impl Into<String>) -> Self {
        Error::Stream(msg.into())
    }

    /// Stable integer code for this error kind.
    pub fn code(&self) -> i32 {
        match self {
            Error::InvalidArg(_) => 1,
            Error::Timeout => 3,
            Error::Cancelled => 4,
            Error::Dns(_) => 5,
            Error::Tls(_) => 6,
            Error::Network(_) => 7,
            Error::Backend(_) => 8,
            Error::PoolExhausted => 9,
            Error::Auth(_) => 10,
            Error::RateLimit(_) => 11,
            Error::BadRequest(_) => 12,
            Error::Server(_) => 13,
            Error::ProviderNotFound(_) => 14,
            Error::SchemaMismatch(_) => 15,
            Error::UnknownTool(_) => 16,
            Error::MaxIterations(_) => 17,
            Error::Json(_) => 18,
            Error::Stream(_) => 19,
        }
    }
}

/// Static description for a stable error code.
///
/// Unknown codes yield `"unknown error"` rather than panicking, so the
/// function is safe to call with values read back from logs or traces.
pub fn strerror(code: i32) -> &'static str {
    match code {
        1 => "invalid argument",
        3 => "request timed out",
        4 => "operation cancelled",
        5 => "DNS resolution failed",
        6 => "TLS failure",
        7 => "network failure",
        8 => "transport failure",
        9 => "connection pool exhausted",
        10 => "authentication failed",
        11 => "rate limited",
        12 => "bad request",
        13 => "server error",
        14 => "provider not found",
        15 => "schema mismatch",
        16 => "unknown tool",
        17 => "iteration cap reached",
        18 => "JSON error",
        19 => "streaming error",
        _ => "unknown error",
    }
}

/// Classify a reqwest failure into the transport taxonomy.
///
/// reqwest does not expose DNS/TLS failures as typed variants, so the
/// source chain is inspected textually for those two cases. Timeouts and
/// connect failures have dedicated predicates.
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Error::Timeout;
        }

        let mut source: Option<&(dyn std::error::Error + 'static)> = Some(&err);
        while let Some(cause) = source {
            let text = cause.to_string().to_lowercase();
            if text.contains("dns") || text.contains("failed to lookup") {
                return Error::Dns(err.to_string());
            }
            if text.contains("certificate") || text.contains("tls") || text.contains("ssl") {
                return Error::Tls(err.to_string());
            }
            source = cause.source();
        }

        if err.is_connect() {
            Error::Network(err.to_string())
        } else {
            Error::Backend(err.to_string())
        }
    }
}
