//! Backend adapters: one uniform token-event stream over three streaming
//! wire formats
//!
//! An adapter hides a backend's framing behind one capability: submit a
//! generation request, get back a finite, non-restartable, lazy sequence of
//! [`TokenEvent`]s. The `First` event is emitted exactly once, at the instant
//! the first content unit is observed on the wire, not when the connection
//! opens and not when headers arrive, which is what makes TTFT timing from
//! the caller side accurate.
//!
//! Protocol polymorphism is a tagged variant ([`ProtocolVariant`]) with one
//! parser per protocol family, so each parser stays independently testable
//! against recorded fixture frames.

pub mod codec;
mod hf;
mod ollama;
mod openai;

use crate::error::{BenchError, BenchResult};
use crate::types::{BackendEndpoint, GenerationRequest, ProtocolVariant, TokenEvent};
use codec::FrameDecoder;
use futures::{Stream, StreamExt};
use reqwest::Client;
use std::collections::VecDeque;
use std::pin::Pin;

/// Lazy sequence of token events for one request. Finite; draining it to
/// `EndOfStream` or an error exhausts it.
pub type TokenStream = Pin<Box<dyn Stream<Item = BenchResult<TokenEvent>> + Send>>;

/// Protocol-level content extracted from one frame payload
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Frame {
    /// A content unit with incremental text
    Content {
        text: String,
        /// Cumulative token count, when the frame reports one
        token_count: Option<u32>,
    },
    /// Terminal frame
    End {
        tokens: Option<u32>,
        finish_reason: Option<String>,
    },
}

/// Parses one frame payload into zero or more [`Frame`]s.
///
/// A payload the parser cannot interpret under its protocol is a
/// [`BenchError::MalformedFrame`]; the stream fails fast on it.
pub(crate) trait FrameParser: Send {
    fn parse(&mut self, payload: &str) -> BenchResult<Vec<Frame>>;
}

/// Open a new stream against `endpoint` for `request`.
///
/// Each call performs one network request. A non-success status before
/// streaming begins is returned as [`BenchError::HttpStatus`]; connection
/// failures as [`BenchError::Connection`]. Adapters hold no shared mutable
/// state and may be invoked concurrently.
pub async fn open_stream(
    client: &Client,
    endpoint: &BackendEndpoint,
    request: &GenerationRequest,
) -> BenchResult<TokenStream> {
    let (url, body) = match endpoint.protocol {
        ProtocolVariant::OpenAiSse => openai::request_parts(endpoint, request),
        ProtocolVariant::HfJsonLines => hf::request_parts(endpoint, request),
        ProtocolVariant::OllamaJsonLines => ollama::request_parts(endpoint, request),
    };

    tracing::debug!(backend = %endpoint.name, %url, "opening token stream");

    let response = client
        .post(&url)
        .json(&body)
        .send()
        .await
        .map_err(BenchError::from)?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(BenchError::HttpStatus {
            status: status.as_u16(),
            body,
        });
    }

    let bytes = response.bytes_stream();
    Ok(match endpoint.protocol {
        ProtocolVariant::OpenAiSse => drive(codec::SseFrames::new(), openai::OpenAiParser, bytes),
        ProtocolVariant::HfJsonLines => drive(codec::LineFrames::new(), hf::HfParser, bytes),
        ProtocolVariant::OllamaJsonLines => {
            drive(codec::LineFrames::new(), ollama::OllamaParser, bytes)
        }
    })
}

/// Turn a raw byte stream into a token-event stream through a frame decoder
/// and a protocol parser.
///
/// Generic over the byte stream so parsers are testable with fixture chunks
/// instead of live sockets. The produced stream is fused: after
/// `EndOfStream` or an error it yields nothing further.
pub(crate) fn drive<D, P, S, B>(decoder: D, parser: P, bytes: S) -> TokenStream
where
    D: FrameDecoder + 'static,
    P: FrameParser + 'static,
    S: Stream<Item = Result<B, reqwest::Error>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    struct DriveState<D, P, B> {
        decoder: D,
        parser: P,
        bytes: futures::stream::BoxStream<'static, Result<B, reqwest::Error>>,
        pending: VecDeque<BenchResult<TokenEvent>>,
        saw_first: bool,
        content_seen: bool,
        eof: bool,
        done: bool,
    }

    let state = DriveState {
        decoder,
        parser,
        bytes: bytes.boxed(),
        pending: VecDeque::new(),
        saw_first: false,
        content_seen: false,
        eof: false,
        done: false,
    };

    Box::pin(futures::stream::unfold(state, |mut st| async move {
        loop {
            if st.done {
                return None;
            }

            if let Some(item) = st.pending.pop_front() {
                let terminal = matches!(&item, Ok(TokenEvent::EndOfStream { .. })) || item.is_err();
                if terminal {
                    st.done = true;
                }
                return Some((item, st));
            }

            if st.eof {
                st.done = true;
                return None;
            }

            match st.bytes.next().await {
                Some(Ok(chunk)) => {
                    'payloads: for payload in st.decoder.feed(chunk.as_ref()) {
                        match st.parser.parse(&payload) {
                            Ok(frames) => {
                                for frame in frames {
                                    match frame {
                                        Frame::Content { text, token_count } => {
                                            st.content_seen = true;
                                            if st.saw_first {
                                                st.pending.push_back(Ok(TokenEvent::Content {
                                                    text,
                                                    token_count,
                                                }));
                                            } else {
                                                st.saw_first = true;
                                                st.pending.push_back(Ok(TokenEvent::First { text }));
                                            }
                                        }
                                        Frame::End {
                                            tokens,
                                            finish_reason,
                                        } => {
                                            st.pending.push_back(Ok(TokenEvent::EndOfStream {
                                                tokens,
                                                finish_reason,
                                            }));
                                        }
                                    }
                                }
                            }
                            Err(e) => {
                                st.pending.push_back(Err(e));
                                break 'payloads;
                            }
                        }
                    }
                }
                Some(Err(e)) => {
                    st.eof = true;
                    st.pending.push_back(Err(BenchError::from(e)));
                }
                None => {
                    // Every protocol variant has an explicit terminal frame;
                    // reaching EOF without one means the stream was cut off.
                    // Truncation is never reported as success.
                    st.eof = true;
                    let message = if st.decoder.has_remaining() {
                        "stream closed mid-frame"
                    } else if st.content_seen {
                        "stream closed before its terminal frame"
                    } else {
                        "stream closed before any content unit"
                    };
                    st.pending.push_back(Err(BenchError::malformed(message)));
                }
            }
        }
    }))
}
