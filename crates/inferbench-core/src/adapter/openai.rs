//! OpenAI-compatible SSE protocol variant
//!
//! Covers vLLM and other servers exposing `/v1/completions` with
//! `stream: true`: `data:` lines carrying completion chunks, terminated by
//! a `[DONE]` marker.

use super::{Frame, FrameParser};
use crate::error::{BenchError, BenchResult};
use crate::types::{BackendEndpoint, GenerationRequest};
use serde_json::{Value, json};

pub(super) fn request_parts(
    endpoint: &BackendEndpoint,
    request: &GenerationRequest,
) -> (String, Value) {
    let url = format!("{}/v1/completions", endpoint.base_url);
    let mut body = json!({
        "model": request.model.clone().unwrap_or_else(|| "default".to_string()),
        "prompt": request.prompt,
        "max_tokens": request.max_tokens,
        "stream": true,
    });
    if let Some(temperature) = request.temperature {
        body["temperature"] = json!(temperature);
    }
    if let Some(top_p) = request.top_p {
        body["top_p"] = json!(top_p);
    }
    (url, body)
}

/// Parser for OpenAI-style SSE data payloads. Accepts both completion
/// (`choices[0].text`) and chat (`choices[0].delta.content`) shapes.
pub(super) struct OpenAiParser;

impl FrameParser for OpenAiParser {
    fn parse(&mut self, payload: &str) -> BenchResult<Vec<Frame>> {
        if payload.trim() == "[DONE]" {
            return Ok(vec![Frame::End {
                tokens: None,
                finish_reason: Some("stop".to_string()),
            }]);
        }

        let value: Value = serde_json::from_str(payload)
            .map_err(|e| BenchError::malformed(format!("invalid SSE payload: {e}")))?;

        if let Some(error) = value.get("error") {
            return Err(BenchError::Http(format!("backend stream error: {error}")));
        }

        let choice = value
            .get("choices")
            .and_then(|c| c.get(0))
            .ok_or_else(|| BenchError::malformed("SSE payload missing choices"))?;

        let text = choice
            .get("text")
            .and_then(|t| t.as_str())
            .or_else(|| choice.pointer("/delta/content").and_then(|t| t.as_str()));

        match text {
            Some(text) if !text.is_empty() => Ok(vec![Frame::Content {
                text: text.to_string(),
                token_count: None,
            }]),
            // Role-only or finish-reason-only deltas carry no content.
            _ => Ok(Vec::new()),
        }
    }
}
