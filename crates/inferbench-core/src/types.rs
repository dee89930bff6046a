//! Core data model: endpoints, requests, token events, and request outcomes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default per-request deadline when an endpoint does not specify one
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Streaming protocol variant spoken by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProtocolVariant {
    /// OpenAI-compatible SSE stream (`data:` lines, `[DONE]` terminator)
    OpenAiSse,
    /// HF text-generation style newline-delimited JSON frames
    HfJsonLines,
    /// Ollama style newline-delimited JSON frames
    OllamaJsonLines,
}

impl ProtocolVariant {
    /// Human-readable name of the variant
    pub fn name(&self) -> &'static str {
        match self {
            Self::OpenAiSse => "openai-sse",
            Self::HfJsonLines => "hf-json-lines",
            Self::OllamaJsonLines => "ollama-json-lines",
        }
    }
}

impl std::fmt::Display for ProtocolVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One reachable inference backend, immutable for the duration of a run.
///
/// Created from the service-discovery collaborator's output (backend name to
/// base URL, already health-checked).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendEndpoint {
    /// Backend name, unique key within a run
    pub name: String,
    /// Base URL, e.g. `http://vllm.svc:8000`
    pub base_url: String,
    /// Wire protocol the backend speaks
    pub protocol: ProtocolVariant,
    /// Per-request deadline covering connect through end-of-stream
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub timeout: Duration,
}

fn default_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}

impl BackendEndpoint {
    /// Create an endpoint with the default request timeout
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        protocol: ProtocolVariant,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            protocol,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Set the per-request deadline
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// A single generation request; value object with no identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Prompt text sent to the backend
    pub prompt: String,
    /// Model name, for backends that require one in the request body
    #[serde(default)]
    pub model: Option<String>,
    /// Generation length cap
    pub max_tokens: u32,
    /// Sampling temperature
    #[serde(default)]
    pub temperature: Option<f64>,
    /// Nucleus sampling parameter
    #[serde(default)]
    pub top_p: Option<f64>,
    /// Always true on timing paths; a non-streaming response has no
    /// observable first token
    #[serde(default = "default_stream")]
    pub stream: bool,
}

fn default_stream() -> bool {
    true
}

impl GenerationRequest {
    /// Create a streaming request with the given prompt
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: None,
            max_tokens: 128,
            temperature: None,
            top_p: None,
            stream: true,
        }
    }

    /// Set the model name
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the generation length cap
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

impl Default for GenerationRequest {
    fn default() -> Self {
        Self::new("Explain what a distributed system is in one paragraph.")
    }
}

/// One event observed while draining a backend's token stream.
///
/// A stream is a finite, non-restartable sequence: `First` exactly once at
/// the instant the first content unit is observed on the wire, then zero or
/// more `Content` events, then `End`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum TokenEvent {
    /// The first content unit of the stream
    First {
        /// Incremental text carried by the first unit
        text: String,
    },
    /// A subsequent content unit
    Content {
        /// Incremental text
        text: String,
        /// Cumulative token count, when the backend reports one
        token_count: Option<u32>,
    },
    /// Terminal event of the stream
    EndOfStream {
        /// Total generated tokens, when the backend reports one
        tokens: Option<u32>,
        /// Backend-reported finish reason
        finish_reason: Option<String>,
    },
}

/// Failure taxonomy for a single request attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum FailureKind {
    /// Could not establish or maintain the connection
    ConnectionError,
    /// Deadline exceeded before any content was observed; TTFT unavailable
    TimeoutNoFirstToken,
    /// First token observed, stream stalled before completion; TTFT valid
    TimeoutMidStream,
    /// Backend returned data the adapter could not parse, a protocol or
    /// version mismatch rather than a performance issue
    MalformedFrame,
    /// Non-success status code before streaming began
    #[serde(rename = "http-error-status")]
    HttpErrorStatus { status: u16 },
}

/// Terminal record of one request attempt. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestOutcome {
    /// Backend this attempt ran against
    pub backend: String,
    /// Wall-clock time the request was submitted
    pub started_at: DateTime<Utc>,
    /// Time to first token; `None` if no token ever arrived
    pub ttft: Option<Duration>,
    /// Total elapsed time for the attempt
    pub total_duration: Duration,
    /// Tokens generated before the attempt terminated
    pub tokens: u32,
    /// Whether the attempt completed successfully
    pub success: bool,
    /// Failure classification when `success` is false
    pub failure: Option<FailureKind>,
    /// True when the stream terminated after the first token but before
    /// completion; `total_duration` and `tokens` cover only the observed part
    pub partial: bool,
}

impl RequestOutcome {
    /// Record a successful attempt
    pub fn success(
        backend: impl Into<String>,
        started_at: DateTime<Utc>,
        ttft: Duration,
        total_duration: Duration,
        tokens: u32,
    ) -> Self {
        Self {
            backend: backend.into(),
            started_at,
            ttft: Some(ttft),
            total_duration,
            tokens,
            success: true,
            failure: None,
            partial: false,
        }
    }

    /// Record a failed attempt. `ttft` stays `None` unless a first token was
    /// actually observed before the failure.
    pub fn failure(
        backend: impl Into<String>,
        started_at: DateTime<Utc>,
        ttft: Option<Duration>,
        total_duration: Duration,
        tokens: u32,
        kind: FailureKind,
    ) -> Self {
        let partial = ttft.is_some();
        Self {
            backend: backend.into(),
            started_at,
            ttft,
            total_duration,
            tokens,
            success: false,
            failure: Some(kind),
            partial,
        }
    }
}
