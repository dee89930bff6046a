//! Ollama protocol variant (newline-delimited JSON)
//!
//! Each line is one frame: `{"response": "...", "done": false}`. The final
//! frame has `done: true` and carries `eval_count` (generated token total)
//! and `done_reason`.

use super::{Frame, FrameParser};
use crate::error::{BenchError, BenchResult};
use crate::types::{BackendEndpoint, GenerationRequest};
use serde_json::{Value, json};

pub(super) fn request_parts(
    endpoint: &BackendEndpoint,
    request: &GenerationRequest,
) -> (String, Value) {
    let url = format!("{}/api/generate", endpoint.base_url);
    let mut options = json!({ "num_predict": request.max_tokens });
    if let Some(temperature) = request.temperature {
        options["temperature"] = json!(temperature);
    }
    if let Some(top_p) = request.top_p {
        options["top_p"] = json!(top_p);
    }
    let body = json!({
        "model": request.model.clone().unwrap_or_else(|| "default".to_string()),
        "prompt": request.prompt,
        "options": options,
        "stream": true,
    });
    (url, body)
}

/// Parser for Ollama generate frames
pub(super) struct OllamaParser;

impl FrameParser for OllamaParser {
    fn parse(&mut self, payload: &str) -> BenchResult<Vec<Frame>> {
        let value: Value = serde_json::from_str(payload)
            .map_err(|e| BenchError::malformed(format!("invalid generate frame: {e}")))?;

        if let Some(error) = value.get("error") {
            return Err(BenchError::Http(format!("backend stream error: {error}")));
        }

        let response = value.get("response").and_then(|r| r.as_str());
        let done = value.get("done").and_then(|d| d.as_bool());
        if response.is_none() && done.is_none() {
            return Err(BenchError::malformed(
                "generate frame missing response and done fields",
            ));
        }

        let mut frames = Vec::new();
        if let Some(text) = response {
            if !text.is_empty() {
                frames.push(Frame::Content {
                    text: text.to_string(),
                    token_count: None,
                });
            }
        }
        if done == Some(true) {
            frames.push(Frame::End {
                tokens: value
                    .get("eval_count")
                    .and_then(|c| c.as_u64())
                    .map(|c| c as u32),
                finish_reason: value
                    .get("done_reason")
                    .and_then(|r| r.as_str())
                    .map(String::from),
            });
        }

        Ok(frames)
    }
}
