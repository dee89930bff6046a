//! Single-shot TTFT probe
//!
//! Issues one streaming request and times the first token with a monotonic
//! clock taken immediately before submission. The probe is stateless;
//! repeated invocation is the caller's responsibility (the load driver for
//! load tests, the orchestrator for TTFT-only passes).

use crate::adapter::open_stream;
use crate::error::BenchError;
use crate::types::{BackendEndpoint, GenerationRequest, RequestOutcome, TokenEvent};
use chrono::Utc;
use futures::StreamExt;
use reqwest::Client;
use tokio::time::{Instant, timeout_at};
use tokio_util::sync::CancellationToken;

/// Run one request against `endpoint` and record its outcome.
///
/// The per-request deadline is `endpoint.timeout`, measured from just before
/// submission and enforced at every await boundary, so a stall anywhere in
/// the stream converts to a timeout-classified failure rather than hanging
/// the caller. Cancellation is checked at the same boundaries; an abandoned
/// in-flight request is recorded as a timeout-classified failure, never
/// dropped.
///
/// All request-level errors are recovered here into a failed
/// [`RequestOutcome`]; this function never returns `Err`.
pub async fn probe_once(
    client: &Client,
    endpoint: &BackendEndpoint,
    request: &GenerationRequest,
    cancel: &CancellationToken,
) -> RequestOutcome {
    let started_at = Utc::now();
    let start = Instant::now();
    let deadline = start + endpoint.timeout;

    let open = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(BenchError::Cancelled),
        opened = timeout_at(deadline, open_stream(client, endpoint, request)) => {
            opened.map_err(|_| BenchError::timeout("no response before deadline")).and_then(|r| r)
        }
    };

    let mut stream = match open {
        Ok(stream) => stream,
        Err(e) => {
            tracing::debug!(backend = %endpoint.name, error = %e, "request failed before streaming");
            return RequestOutcome::failure(
                &endpoint.name,
                started_at,
                None,
                start.elapsed(),
                0,
                e.classify(false),
            );
        }
    };

    let mut ttft = None;
    let mut tokens: u32 = 0;
    let mut failure = None;

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => Some(Err(BenchError::Cancelled)),
            event = timeout_at(deadline, stream.next()) => match event {
                Err(_) => Some(Err(BenchError::timeout("stream stalled before completion"))),
                Ok(event) => event,
            },
        };

        match next {
            Some(Ok(TokenEvent::First { .. })) => {
                // TTFT must not include any time spent after the first token.
                ttft = Some(start.elapsed());
                tokens += 1;
            }
            Some(Ok(TokenEvent::Content { token_count, .. })) => match token_count {
                Some(count) => tokens = count,
                None => tokens += 1,
            },
            Some(Ok(TokenEvent::EndOfStream {
                tokens: reported, ..
            })) => {
                if let Some(reported) = reported {
                    tokens = reported;
                }
                break;
            }
            Some(Err(e)) => {
                failure = Some(e.classify(ttft.is_some()));
                break;
            }
            None => break,
        }
    }

    let total_duration = start.elapsed();

    match (failure, ttft) {
        (None, Some(ttft)) => {
            RequestOutcome::success(&endpoint.name, started_at, ttft, total_duration, tokens)
        }
        (Some(kind), ttft) => {
            tracing::debug!(backend = %endpoint.name, kind = ?kind, "request failed");
            RequestOutcome::failure(&endpoint.name, started_at, ttft, total_duration, tokens, kind)
        }
        // Stream ended cleanly without a single content unit; not a success
        // and not a timing problem.
        (None, None) => RequestOutcome::failure(
            &endpoint.name,
            started_at,
            None,
            total_duration,
            tokens,
            crate::types::FailureKind::MalformedFrame,
        ),
    }
}
