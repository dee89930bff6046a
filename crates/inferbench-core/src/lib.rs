//! Inferbench Core Library
//!
//! This crate provides the benchmark execution and statistical comparison
//! engine for streaming LLM inference backends: protocol adapters that
//! normalize heterogeneous streaming wire formats into token events, a
//! time-to-first-token prober, a concurrent load driver, sample aggregation,
//! and percentile/winner analysis.
//!
//! The crate owns no CLI, report rendering, or service discovery; those are
//! external collaborators that feed a [`config::BenchmarkConfig`] and a set
//! of [`types::BackendEndpoint`]s in, and receive a
//! [`stats::ComparisonResult`] back.

pub mod adapter;
pub mod config;
pub mod error;
pub mod load;
pub mod orchestrator;
pub mod probe;
pub mod samples;
pub mod stats;
pub mod types;

// Re-export commonly used types
pub use config::BenchmarkConfig;
pub use error::{BenchError, BenchResult};
pub use load::{LoadDriver, LoadSettings};
pub use orchestrator::{Orchestrator, RunArtifacts, TestPlan};
pub use samples::{SampleCollector, SampleSet};
pub use stats::{ComparisonResult, StatisticalSummary, WinnerPolicy};
pub use types::{
    BackendEndpoint, FailureKind, GenerationRequest, ProtocolVariant, RequestOutcome, TokenEvent,
};
