//! Per-backend sample aggregation
//!
//! The collector is pure storage: append-only during a run, concurrent-safe
//! for the load driver's simulated users, snapshotted once after quiescence
//! for the analyzer. No derived statistics live here.

use crate::types::RequestOutcome;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Append-only collector for one backend's request outcomes.
///
/// Cloning is cheap and shares the underlying storage. The lock guards only
/// the in-memory push; it is never held across an await point.
#[derive(Debug, Clone)]
pub struct SampleCollector {
    backend: String,
    outcomes: Arc<Mutex<Vec<RequestOutcome>>>,
    tap: Option<mpsc::UnboundedSender<RequestOutcome>>,
}

impl SampleCollector {
    /// Create a collector for the named backend
    pub fn new(backend: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            outcomes: Arc::new(Mutex::new(Vec::new())),
            tap: None,
        }
    }

    /// Forward every recorded outcome to `tx` as well, for collaborators
    /// that want the raw per-request stream (e.g. a CSV performance log).
    pub fn with_tap(mut self, tx: mpsc::UnboundedSender<RequestOutcome>) -> Self {
        self.tap = Some(tx);
        self
    }

    /// Backend this collector belongs to
    pub fn backend(&self) -> &str {
        &self.backend
    }

    /// Append one outcome. Outcomes for a different backend are rejected
    /// (logged and dropped) so the sample-set invariant holds.
    pub fn record(&self, outcome: RequestOutcome) {
        if outcome.backend != self.backend {
            tracing::warn!(
                expected = %self.backend,
                got = %outcome.backend,
                "dropping outcome recorded against the wrong backend"
            );
            return;
        }
        if let Some(tap) = &self.tap {
            // A dropped receiver only disables the tap, never the run.
            let _ = tap.send(outcome.clone());
        }
        self.outcomes.lock().push(outcome);
    }

    /// Number of outcomes recorded so far
    pub fn len(&self) -> usize {
        self.outcomes.lock().len()
    }

    /// True when nothing has been recorded yet
    pub fn is_empty(&self) -> bool {
        self.outcomes.lock().is_empty()
    }

    /// Snapshot the collected outcomes into a frozen [`SampleSet`].
    ///
    /// Called once per run, after all producers have quiesced.
    pub fn freeze(&self) -> SampleSet {
        SampleSet {
            backend: self.backend.clone(),
            outcomes: self.outcomes.lock().clone(),
        }
    }
}

/// Frozen, read-only collection of one backend's outcomes for one run.
///
/// Insertion order is irrelevant; the analyzer sorts before computing
/// percentiles. Every outcome's backend name matches `backend`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SampleSet {
    /// Backend these outcomes belong to
    pub backend: String,
    /// All recorded attempts, successful and failed
    pub outcomes: Vec<RequestOutcome>,
}

impl SampleSet {
    /// Total attempts
    pub fn attempted(&self) -> usize {
        self.outcomes.len()
    }

    /// Successful attempts
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.success).count()
    }

    /// Iterator over successful outcomes
    pub fn successes(&self) -> impl Iterator<Item = &RequestOutcome> {
        self.outcomes.iter().filter(|o| o.success)
    }
}
