//! Managed Relay
//!
//! Streams completions from a Gemini-style `streamGenerateContent` endpoint.
//!
//! # API
//!
//! `POST {base}/v1beta/models/{model}:streamGenerateContent?alt=sse`
//!
//! The request carries the full history plus the new message, a system
//! instruction, and a generation config picked from the variant's
//! [`ModelProfile`]. The response is a server-sent event stream; every
//! `data:` line is one JSON chunk whose candidate text is one fragment.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use super::traits::{HistoryEntry, Relay, RelayError, RelayRequest};
use crate::messages::{ModelVariant, Role};

/// Default API host
pub const DEFAULT_MANAGED_URL: &str = "https://generativelanguage.googleapis.com";

/// Model settings for one variant
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelProfile {
    /// Backend model name
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Reasoning token budget (None = no extended thinking)
    #[serde(default)]
    pub thinking_budget: Option<u32>,
}

impl ModelProfile {
    /// Default profile for the fast variant
    #[must_use]
    pub fn fast() -> Self {
        Self {
            model: "gemini-3-pro-preview".to_string(),
            temperature: 0.8,
            thinking_budget: None,
        }
    }

    /// Default profile for the reasoning variant
    #[must_use]
    pub fn reasoning() -> Self {
        Self {
            model: "gemini-3-flash-preview".to_string(),
            temperature: 0.7,
            thinking_budget: Some(16_000),
        }
    }
}

/// Managed relay configuration
#[derive(Clone, Debug, PartialEq)]
pub struct ManagedRelayConfig {
    /// API host, without trailing path
    pub base_url: String,
    /// API key sent as `x-goog-api-key`
    pub api_key: String,
    /// System instruction
    pub system_prompt: String,
    /// Profile used for [`ModelVariant::Fast`]
    pub fast: ModelProfile,
    /// Profile used for [`ModelVariant::Reasoning`]
    pub reasoning: ModelProfile,
    /// TCP connect timeout
    pub connect_timeout: Duration,
}

impl Default for ManagedRelayConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_MANAGED_URL.to_string(),
            api_key: String::new(),
            system_prompt: String::new(),
            fast: ModelProfile::fast(),
            reasoning: ModelProfile::reasoning(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl ManagedRelayConfig {
    /// Profile for a variant
    #[must_use]
    pub fn profile(&self, variant: ModelVariant) -> &ModelProfile {
        match variant {
            ModelVariant::Fast => &self.fast,
            ModelVariant::Reasoning => &self.reasoning,
        }
    }
}

// Request types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking_config: Option<ThinkingConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ThinkingConfig {
    thinking_budget: u32,
}

// Response types

#[derive(Debug, Default, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    error: Option<UpstreamError>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<ChunkContent>,
}

#[derive(Debug, Deserialize)]
struct ChunkContent {
    #[serde(default)]
    parts: Vec<ChunkPart>,
}

#[derive(Debug, Deserialize)]
struct ChunkPart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

#[derive(Debug, Deserialize)]
struct UpstreamError {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: UpstreamError,
}

impl StreamChunk {
    /// Visible text of the first candidate (thought parts skipped)
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter(|part| !part.thought)
                    .filter_map(|part| part.text.as_deref())
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn wire_role(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Bot => "model",
    }
}

/// Splits a server-sent event byte stream into `data:` payloads
///
/// Bytes are buffered until a full line is available, so multi-byte UTF-8
/// sequences split across network chunks decode correctly.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Create an empty decoder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes, returning every complete `data:` payload
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let mut payloads = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(payload) = data_payload(&line) {
                payloads.push(payload);
            }
        }
        payloads
    }

    /// Flush a trailing line that had no newline
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        data_payload(&rest)
    }
}

fn data_payload(line: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim_end_matches(['\r', '\n']);
    let payload = line.strip_prefix("data:")?.trim_start();
    if payload.is_empty() || payload == "[DONE]" {
        None
    } else {
        Some(payload.to_string())
    }
}

/// Gemini-style managed-call relay
#[derive(Clone, Debug)]
pub struct ManagedRelay {
    config: ManagedRelayConfig,
    http_client: reqwest::Client,
}

impl ManagedRelay {
    /// Create a managed relay
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: ManagedRelayConfig) -> Result<Self, RelayError> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| RelayError::Connect(e.to_string()))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    /// Streaming endpoint for a model
    fn stream_url(&self, model: &str) -> String {
        format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.config.base_url.trim_end_matches('/'),
            model
        )
    }

    /// Build the request body: history, then the new message
    fn build_body<'a>(&'a self, request: &'a RelayRequest) -> GenerateRequest<'a> {
        let profile = self.config.profile(request.variant);

        let mut contents: Vec<Content<'a>> = request
            .history
            .iter()
            .filter(|entry| !entry.text.is_empty())
            .map(|entry: &'a HistoryEntry| Content {
                role: Some(wire_role(entry.role)),
                parts: vec![Part { text: &entry.text }],
            })
            .collect();

        contents.push(Content {
            role: Some(wire_role(Role::User)),
            parts: vec![Part {
                text: &request.message,
            }],
        });

        let system_instruction = if self.config.system_prompt.is_empty() {
            None
        } else {
            Some(Content {
                role: None,
                parts: vec![Part {
                    text: &self.config.system_prompt,
                }],
            })
        };

        GenerateRequest {
            contents,
            system_instruction,
            generation_config: GenerationConfig {
                temperature: profile.temperature,
                thinking_config: profile
                    .thinking_budget
                    .map(|thinking_budget| ThinkingConfig { thinking_budget }),
            },
        }
    }
}

/// Decode one SSE payload and forward its text
fn deliver(payload: &str, on_fragment: &mut (dyn FnMut(String) + Send)) -> Result<(), RelayError> {
    let chunk: StreamChunk =
        serde_json::from_str(payload).map_err(|e| RelayError::Decode(e.to_string()))?;

    if let Some(error) = chunk.error {
        return Err(RelayError::Upstream(error.message));
    }

    let text = chunk.text();
    if !text.is_empty() {
        on_fragment(text);
    }
    Ok(())
}

#[async_trait]
impl Relay for ManagedRelay {
    fn name(&self) -> &str {
        "managed"
    }

    async fn stream(
        &self,
        request: &RelayRequest,
        on_fragment: &mut (dyn FnMut(String) + Send),
    ) -> Result<(), RelayError> {
        let profile = self.config.profile(request.variant);
        let url = self.stream_url(&profile.model);
        let body = self.build_body(request);

        tracing::debug!(
            model = %profile.model,
            history = request.history.len(),
            "Opening managed stream"
        );

        let response = self
            .http_client
            .post(&url)
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(url = %url, error = %e, "Managed request failed");
                RelayError::Connect(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&body)
                .map(|envelope| envelope.error.message)
                .unwrap_or(body);
            return Err(RelayError::Http {
                status: status.as_u16(),
                message,
            });
        }

        let mut stream = response.bytes_stream();
        let mut decoder = SseDecoder::new();

        while let Some(chunk) = stream.next().await {
            let bytes = chunk.map_err(|e| {
                tracing::error!(error = %e, "Managed stream interrupted");
                RelayError::Transport(e.to_string())
            })?;

            for payload in decoder.push(&bytes) {
                deliver(&payload, on_fragment)?;
            }
        }

        if let Some(payload) = decoder.finish() {
            deliver(&payload, on_fragment)?;
        }

        Ok(())
    }
}
