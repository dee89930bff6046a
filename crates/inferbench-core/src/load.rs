//! Concurrent synthetic load driver
//!
//! Simulates many independent users against one backend for a bounded
//! wall-clock window. Each user calls the same single-shot probe the
//! TTFT-only path uses, so load-test timings and isolated probes are
//! measured identically and the analyzer compares like with like.

use crate::probe::probe_once;
use crate::samples::SampleCollector;
use crate::types::{BackendEndpoint, GenerationRequest};
use rand::Rng;
use reqwest::Client;
use std::time::Duration;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

/// Load shape for one backend's driver
#[derive(Debug, Clone)]
pub struct LoadSettings {
    /// Number of simulated users
    pub concurrency: usize,
    /// Wall-clock window during which new requests may start
    pub duration: Duration,
    /// Each user delays its first request by a random amount within this
    /// window, so users do not start in lock-step and bias TTFT under a
    /// synchronized thundering herd
    pub ramp_up: Duration,
    /// Optional idle interval range between a user's consecutive requests
    pub think_time: Option<(Duration, Duration)>,
}

impl Default for LoadSettings {
    fn default() -> Self {
        Self {
            concurrency: 5,
            duration: Duration::from_secs(60),
            ramp_up: Duration::from_secs(1),
            think_time: None,
        }
    }
}

/// Drives synthetic users against a single backend.
///
/// Drivers for different backends are independent; run them concurrently
/// from the orchestrator. One user's failure is recorded as a failed outcome
/// and never aborts sibling users.
#[derive(Debug, Clone)]
pub struct LoadDriver {
    settings: LoadSettings,
}

impl LoadDriver {
    pub fn new(settings: LoadSettings) -> Self {
        Self { settings }
    }

    /// Run the load window against `endpoint`, recording one outcome per
    /// attempt into `collector`.
    ///
    /// No new request starts after the window closes; in-flight requests
    /// finish or hit their own per-request deadline before this returns, so
    /// the final sample set reflects only requests started inside the
    /// window. Cancelling `cancel` stops new starts immediately and converts
    /// in-flight requests to timeout-classified failures.
    pub async fn run(
        &self,
        client: Client,
        endpoint: BackendEndpoint,
        request: GenerationRequest,
        collector: SampleCollector,
        cancel: CancellationToken,
    ) {
        let window_end = Instant::now() + self.settings.duration;
        tracing::info!(
            backend = %endpoint.name,
            users = self.settings.concurrency,
            duration_secs = self.settings.duration.as_secs_f64(),
            "starting load window"
        );

        let mut users = Vec::with_capacity(self.settings.concurrency);
        for user in 0..self.settings.concurrency {
            let client = client.clone();
            let endpoint = endpoint.clone();
            let request = request.clone();
            let collector = collector.clone();
            let cancel = cancel.clone();
            let settings = self.settings.clone();
            users.push(tokio::spawn(async move {
                user_loop(
                    user, settings, client, endpoint, request, collector, cancel, window_end,
                )
                .await;
            }));
        }

        for user in users {
            if let Err(e) = user.await {
                tracing::warn!(backend = %endpoint.name, error = %e, "simulated user panicked");
            }
        }

        tracing::info!(
            backend = %endpoint.name,
            recorded = collector.len(),
            "load window closed"
        );
    }
}

#[allow(clippy::too_many_arguments)]
async fn user_loop(
    user: usize,
    settings: LoadSettings,
    client: Client,
    endpoint: BackendEndpoint,
    request: GenerationRequest,
    collector: SampleCollector,
    cancel: CancellationToken,
    window_end: Instant,
) {
    let jitter = random_delay(Duration::ZERO, settings.ramp_up);
    let first_start = Instant::now() + jitter;
    tokio::select! {
        _ = cancel.cancelled() => return,
        _ = sleep_until(first_start.min(window_end)) => {}
    }

    loop {
        if cancel.is_cancelled() || Instant::now() >= window_end {
            break;
        }

        let outcome = probe_once(&client, &endpoint, &request, &cancel).await;
        tracing::debug!(
            backend = %endpoint.name,
            user,
            success = outcome.success,
            ttft_ms = outcome.ttft.map(|t| t.as_secs_f64() * 1000.0),
            "request finished"
        );
        collector.record(outcome);

        if let Some((min, max)) = settings.think_time {
            let think_until = Instant::now() + random_delay(min, max);
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep_until(think_until.min(window_end)) => {}
            }
        }
    }
}

fn random_delay(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let span_ms = (max - min).as_millis() as u64;
    let extra = rand::thread_rng().gen_range(0..=span_ms);
    min + Duration::from_millis(extra)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_delay_stays_in_range() {
        let min = Duration::from_millis(100);
        let max = Duration::from_millis(300);
        for _ in 0..50 {
            let d = random_delay(min, max);
            assert!(d >= min && d <= max);
        }
    }

    #[test]
    fn degenerate_range_returns_min() {
        let d = random_delay(Duration::from_millis(50), Duration::from_millis(50));
        assert_eq!(d, Duration::from_millis(50));
        let d = random_delay(Duration::from_millis(50), Duration::ZERO);
        assert_eq!(d, Duration::from_millis(50));
    }
}
