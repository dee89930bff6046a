//! HF text-generation protocol variant (newline-delimited JSON)
//!
//! Each line is one token frame: `{"token": {"text": ..., "special": ...},
//! "generated_text": null}`. The final frame carries the full
//! `generated_text` plus generation details.

use super::{Frame, FrameParser};
use crate::error::{BenchError, BenchResult};
use crate::types::{BackendEndpoint, GenerationRequest};
use serde_json::{Value, json};

pub(super) fn request_parts(
    endpoint: &BackendEndpoint,
    request: &GenerationRequest,
) -> (String, Value) {
    let url = format!("{}/generate_stream", endpoint.base_url);
    let mut parameters = json!({ "max_new_tokens": request.max_tokens });
    if let Some(temperature) = request.temperature {
        parameters["temperature"] = json!(temperature);
    }
    if let Some(top_p) = request.top_p {
        parameters["top_p"] = json!(top_p);
    }
    let body = json!({
        "inputs": request.prompt,
        "parameters": parameters,
        "stream": true,
    });
    (url, body)
}

/// Parser for HF-style token frames
pub(super) struct HfParser;

impl FrameParser for HfParser {
    fn parse(&mut self, payload: &str) -> BenchResult<Vec<Frame>> {
        let value: Value = serde_json::from_str(payload)
            .map_err(|e| BenchError::malformed(format!("invalid token frame: {e}")))?;

        if let Some(error) = value.get("error") {
            return Err(BenchError::Http(format!("backend stream error: {error}")));
        }

        let token = value
            .get("token")
            .ok_or_else(|| BenchError::malformed("token frame missing token object"))?;

        let mut frames = Vec::new();
        let special = token
            .get("special")
            .and_then(|s| s.as_bool())
            .unwrap_or(false);
        if let Some(text) = token.get("text").and_then(|t| t.as_str()) {
            if !special && !text.is_empty() {
                frames.push(Frame::Content {
                    text: text.to_string(),
                    token_count: None,
                });
            }
        }

        // Non-null generated_text marks the final frame.
        if value.get("generated_text").is_some_and(|g| !g.is_null()) {
            let tokens = value
                .pointer("/details/generated_tokens")
                .and_then(|t| t.as_u64())
                .map(|t| t as u32);
            let finish_reason = value
                .pointer("/details/finish_reason")
                .and_then(|r| r.as_str())
                .map(String::from);
            frames.push(Frame::End {
                tokens,
                finish_reason,
            });
        }

        Ok(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_frame_yields_content() {
        let frames = HfParser
            .parse(r#"{"token":{"id":450,"text":" the","special":false},"generated_text":null}"#)
            .unwrap();
        assert_eq!(
            frames,
            vec![Frame::Content {
                text: " the".to_string(),
                token_count: None
            }]
        );
    }

    #[test]
    fn special_token_is_skipped() {
        let frames = HfParser
            .parse(r#"{"token":{"id":2,"text":"</s>","special":true},"generated_text":null}"#)
            .unwrap();
        assert!(frames.is_empty());
    }

    #[test]
    fn final_frame_yields_content_then_end() {
        let frames = HfParser
            .parse(
                r#"{"token":{"text":".","special":false},"generated_text":"done.","details":{"finish_reason":"length","generated_tokens":42}}"#,
            )
            .unwrap();
        assert_eq!(frames.len(), 2);
        assert!(matches!(&frames[0], Frame::Content { text, .. } if text == "."));
        assert!(matches!(
            &frames[1],
            Frame::End {
                tokens: Some(42),
                finish_reason: Some(r)
            } if r == "length"
        ));
    }

    #[test]
    fn missing_token_object_is_malformed() {
        let err = HfParser.parse(r#"{"unexpected":"shape"}"#).unwrap_err();
        assert!(matches!(err, BenchError::MalformedFrame(_)));
    }

    #[test]
    fn in_stream_error_is_not_malformed() {
        let err = HfParser
            .parse(r#"{"error":"Model is overloaded","error_type":"overloaded"}"#)
            .unwrap_err();
        assert!(matches!(err, BenchError::Http(_)));
    }

    #[test]
    fn request_body_uses_hf_parameter_names() {
        let endpoint = BackendEndpoint::new(
            "tgi",
            "http://host:8080",
            crate::types::ProtocolVariant::HfJsonLines,
        );
        let request = GenerationRequest::new("hi").with_max_tokens(64);
        let (url, body) = request_parts(&endpoint, &request);
        assert_eq!(url, "http://host:8080/generate_stream");
        assert_eq!(body["parameters"]["max_new_tokens"], 64);
        assert_eq!(body["inputs"], "hi");
    }
}
