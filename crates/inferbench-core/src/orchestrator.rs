//! Benchmark orchestration across backends
//!
//! Runs the configured test plan against every backend concurrently,
//! joins the per-backend drivers (the run's single synchronization barrier),
//! then hands the frozen sample sets to the analyzer. Owns the run's global
//! deadline and cancellation trigger; a user interrupt flows through the
//! same cancellation path so partial results remain analyzable.

use crate::config::BenchmarkConfig;
use crate::error::{BenchError, BenchResult};
use crate::load::LoadDriver;
use crate::probe::probe_once;
use crate::samples::{SampleCollector, SampleSet};
use crate::stats::{self, ComparisonResult};
use crate::types::{BackendEndpoint, RequestOutcome};
use futures::future::join_all;
use reqwest::Client;
use std::collections::HashSet;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Which components to run per backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestPlan {
    /// Sequential TTFT probes only (iteration count from config)
    TtftOnly,
    /// Concurrent load window only
    LoadTest,
    /// TTFT probes, then the load window
    Full,
}

/// Everything a run produces: the comparison plus the raw per-backend
/// sample sets, handed off exactly once for reporting.
#[derive(Debug, Clone)]
pub struct RunArtifacts {
    pub comparison: ComparisonResult,
    pub samples: Vec<SampleSet>,
}

/// Coordinates one benchmark run. Create a fresh orchestrator per run; the
/// sample storage it creates is scoped to the run, never process-wide.
pub struct Orchestrator {
    config: BenchmarkConfig,
    cancel: CancellationToken,
    outcome_tap: Option<mpsc::UnboundedSender<RequestOutcome>>,
}

impl Orchestrator {
    /// Create an orchestrator, validating the configuration up front.
    pub fn new(config: BenchmarkConfig) -> BenchResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            cancel: CancellationToken::new(),
            outcome_tap: None,
        })
    }

    /// Forward every recorded outcome to `tx` as it happens, for
    /// collaborators wanting per-request logs.
    pub fn with_outcome_tap(mut self, tx: mpsc::UnboundedSender<RequestOutcome>) -> Self {
        self.outcome_tap = Some(tx);
        self
    }

    /// Handle for cancelling the run from outside (e.g. a Ctrl+C handler).
    /// Cancellation stops new request starts and converts in-flight requests
    /// into timeout-classified failures; the run still completes and returns
    /// a result built from whatever was recorded.
    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run `plan` against all `endpoints` concurrently and return the
    /// comparison built from the collected samples.
    pub async fn run(
        &self,
        endpoints: Vec<BackendEndpoint>,
        plan: TestPlan,
    ) -> BenchResult<RunArtifacts> {
        if endpoints.is_empty() {
            return Err(BenchError::config("no backends configured for this run"));
        }
        let mut names = HashSet::new();
        for endpoint in &endpoints {
            if !names.insert(endpoint.name.as_str()) {
                return Err(BenchError::config(format!(
                    "duplicate backend name '{}'",
                    endpoint.name
                )));
            }
        }

        let client = Client::builder()
            .connect_timeout(self.config.connect_timeout)
            .build()
            .map_err(|e| BenchError::config(format!("failed to build HTTP client: {e}")))?;

        // Child token so the deadline watcher dies with the run while a
        // caller-held cancel handle still propagates down.
        let run_cancel = self.cancel.child_token();
        if let Some(limit) = self.config.max_run_duration {
            let cancel = run_cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(limit) => {
                        warn!(limit_secs = limit.as_secs_f64(), "run deadline reached, cancelling");
                        cancel.cancel();
                    }
                }
            });
        }

        info!(backends = endpoints.len(), plan = ?plan, "starting benchmark run");

        let mut collectors = Vec::with_capacity(endpoints.len());
        let mut tasks = Vec::with_capacity(endpoints.len());
        for endpoint in endpoints {
            let mut collector = SampleCollector::new(&endpoint.name);
            if let Some(tap) = &self.outcome_tap {
                collector = collector.with_tap(tap.clone());
            }
            collectors.push(collector.clone());

            let client = client.clone();
            let config = self.config.clone();
            let cancel = run_cancel.clone();
            tasks.push(tokio::spawn(async move {
                run_backend(client, endpoint, plan, config, collector, cancel).await;
            }));
        }

        // The single synchronization barrier: all per-backend drivers join
        // here before analysis.
        for result in join_all(tasks).await {
            if let Err(e) = result {
                warn!(error = %e, "backend task panicked; its partial samples are kept");
            }
        }
        run_cancel.cancel(); // reaps the deadline watcher

        let samples: Vec<SampleSet> = collectors.iter().map(SampleCollector::freeze).collect();
        let comparison = stats::compare(&samples, &self.config.winner_policy());

        info!(
            winner = comparison.winner.as_deref().unwrap_or("none"),
            "benchmark run complete"
        );

        Ok(RunArtifacts {
            comparison,
            samples,
        })
    }
}

/// One backend's share of the run. Failures are recorded per request and
/// never abort the task; an unreachable backend simply accumulates failed
/// outcomes while the other backends proceed.
async fn run_backend(
    client: Client,
    endpoint: BackendEndpoint,
    plan: TestPlan,
    config: BenchmarkConfig,
    collector: SampleCollector,
    cancel: CancellationToken,
) {
    if matches!(plan, TestPlan::TtftOnly | TestPlan::Full) {
        for iteration in 0..config.ttft_iterations {
            if cancel.is_cancelled() {
                break;
            }
            let outcome = probe_once(&client, &endpoint, &config.request, &cancel).await;
            tracing::debug!(
                backend = %endpoint.name,
                iteration,
                success = outcome.success,
                "ttft probe finished"
            );
            collector.record(outcome);
        }
    }

    if matches!(plan, TestPlan::LoadTest | TestPlan::Full) && !cancel.is_cancelled() {
        let driver = LoadDriver::new(config.load_settings());
        driver
            .run(
                client,
                endpoint,
                config.request.clone(),
                collector.clone(),
                cancel,
            )
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_config_is_fatal_before_any_network_activity() {
        let config = BenchmarkConfig {
            concurrency: 0,
            ..Default::default()
        };
        assert!(matches!(
            Orchestrator::new(config),
            Err(BenchError::Config(_))
        ));
    }

    #[tokio::test]
    async fn zero_backends_is_a_config_error() {
        let orchestrator = Orchestrator::new(BenchmarkConfig::default()).unwrap();
        let result = orchestrator.run(Vec::new(), TestPlan::TtftOnly).await;
        assert!(matches!(result, Err(BenchError::Config(_))));
    }

    #[tokio::test]
    async fn duplicate_backend_names_are_rejected() {
        use crate::types::ProtocolVariant;
        let orchestrator = Orchestrator::new(BenchmarkConfig::default()).unwrap();
        let endpoints = vec![
            BackendEndpoint::new("same", "http://a:1", ProtocolVariant::OpenAiSse),
            BackendEndpoint::new("same", "http://b:2", ProtocolVariant::OllamaJsonLines),
        ];
        let result = orchestrator.run(endpoints, TestPlan::TtftOnly).await;
        assert!(matches!(result, Err(BenchError::Config(_))));
    }
}
