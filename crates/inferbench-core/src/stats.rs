//! Statistical analysis and winner ranking
//!
//! Pure, deterministic functions over frozen sample sets: nearest-rank
//! percentiles over successful samples, per-backend summaries, and an
//! explicit, auditable winner policy. Calling any of these twice on the same
//! snapshot yields identical output.

use crate::samples::SampleSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Minimum successful samples required before percentiles are reported
const MIN_SAMPLES: usize = 1;

/// Percentile summary of one latency series, in milliseconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub mean_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
}

/// Nearest-rank percentile on a sorted ascending slice:
/// rank = ceil(p * n) - 1, clamped to a valid index. No interpolation.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    debug_assert!(!sorted.is_empty());
    let n = sorted.len();
    let rank = (p * n as f64).ceil() as usize;
    sorted[rank.saturating_sub(1).min(n - 1)]
}

/// Summarize a latency series. `None` when fewer than [`MIN_SAMPLES`]
/// values exist ("insufficient data"), never NaN.
pub fn latency_stats(samples: &[Duration]) -> Option<LatencyStats> {
    if samples.len() < MIN_SAMPLES {
        return None;
    }
    let mut ms: Vec<f64> = samples.iter().map(|d| d.as_secs_f64() * 1000.0).collect();
    ms.sort_by(f64::total_cmp);
    let mean = ms.iter().sum::<f64>() / ms.len() as f64;
    Some(LatencyStats {
        mean_ms: mean,
        p50_ms: percentile(&ms, 0.50),
        p95_ms: percentile(&ms, 0.95),
        p99_ms: percentile(&ms, 0.99),
        min_ms: ms[0],
        max_ms: ms[ms.len() - 1],
    })
}

/// Derived per-backend statistics for one run. Recomputed fresh each
/// analysis pass, never mutated in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticalSummary {
    pub backend: String,
    pub attempted: usize,
    pub succeeded: usize,
    /// successful / attempted; 0.0 when nothing was attempted
    pub success_rate: f64,
    /// TTFT statistics over successful requests; `None` = insufficient data
    pub ttft: Option<LatencyStats>,
    /// Total-duration statistics over successful requests
    pub total_duration: Option<LatencyStats>,
    /// Fraction of successful requests with TTFT below the target threshold
    pub target_achievement: Option<f64>,
    /// Generated tokens per second across successful requests
    pub tokens_per_second: Option<f64>,
    /// Total tokens generated by successful requests
    pub tokens_generated: u64,
}

/// Compute the summary for one frozen sample set.
pub fn summarize(set: &SampleSet, ttft_target: Duration) -> StatisticalSummary {
    let attempted = set.attempted();
    let succeeded = set.succeeded();

    let ttft_samples: Vec<Duration> = set.successes().filter_map(|o| o.ttft).collect();
    let duration_samples: Vec<Duration> = set.successes().map(|o| o.total_duration).collect();

    let target_achievement = if ttft_samples.is_empty() {
        None
    } else {
        let within = ttft_samples.iter().filter(|t| **t < ttft_target).count();
        Some(within as f64 / ttft_samples.len() as f64)
    };

    let tokens_generated: u64 = set.successes().map(|o| u64::from(o.tokens)).sum();
    let busy_secs: f64 = set.successes().map(|o| o.total_duration.as_secs_f64()).sum();
    let tokens_per_second = if busy_secs > 0.0 && tokens_generated > 0 {
        Some(tokens_generated as f64 / busy_secs)
    } else {
        None
    };

    StatisticalSummary {
        backend: set.backend.clone(),
        attempted,
        succeeded,
        success_rate: if attempted == 0 {
            0.0
        } else {
            succeeded as f64 / attempted as f64
        },
        ttft: latency_stats(&ttft_samples),
        total_duration: latency_stats(&duration_samples),
        target_achievement,
        tokens_per_second,
        tokens_generated,
    }
}

/// Winner-selection policy. Deliberately data, not code: the exact
/// eligibility bar and target are configurable and echoed into the result so
/// the decision is auditable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WinnerPolicy {
    /// Minimum success rate a backend must reach to be eligible
    pub min_success_rate: f64,
    /// TTFT threshold used for the target-achievement ratio
    #[serde(with = "humantime_serde")]
    pub ttft_target: Duration,
}

impl Default for WinnerPolicy {
    fn default() -> Self {
        Self {
            min_success_rate: 0.5,
            ttft_target: Duration::from_millis(100),
        }
    }
}

/// Terminal artifact of a run: per-backend summaries, the declared winner
/// (or none), and the scoring rationale. Plain structured record; serializes
/// losslessly to JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonResult {
    /// Backend name to summary; BTreeMap keeps serialization deterministic
    pub summaries: BTreeMap<String, StatisticalSummary>,
    /// Eligible backends, best first
    pub ranking: Vec<String>,
    /// Declared winner, or `None` when no backend met the eligibility bar
    pub winner: Option<String>,
    /// Human-readable account of how the decision was made
    pub rationale: Vec<String>,
    /// The policy the decision was made under
    pub policy: WinnerPolicy,
}

/// Compare all backends' frozen sample sets under `policy`.
///
/// Eligibility: success rate at or above the policy bar, with at least one
/// valid TTFT sample. Ranking among eligible backends: mean TTFT ascending,
/// ties broken by p95 TTFT ascending, then success rate descending. With
/// zero eligible backends the result declares no winner rather than picking
/// an unreliable backend on speed alone.
pub fn compare(sets: &[SampleSet], policy: &WinnerPolicy) -> ComparisonResult {
    let mut summaries = BTreeMap::new();
    for set in sets {
        summaries.insert(set.backend.clone(), summarize(set, policy.ttft_target));
    }

    let mut rationale = Vec::new();
    let mut eligible: Vec<(&StatisticalSummary, &LatencyStats)> = Vec::new();
    for summary in summaries.values() {
        match &summary.ttft {
            Some(ttft) if summary.success_rate >= policy.min_success_rate => {
                rationale.push(format!(
                    "{}: eligible (success rate {:.1}%, mean TTFT {:.1} ms, p95 {:.1} ms)",
                    summary.backend,
                    summary.success_rate * 100.0,
                    ttft.mean_ms,
                    ttft.p95_ms,
                ));
                eligible.push((summary, ttft));
            }
            Some(_) => {
                rationale.push(format!(
                    "{}: excluded, success rate {:.1}% below the {:.1}% bar",
                    summary.backend,
                    summary.success_rate * 100.0,
                    policy.min_success_rate * 100.0,
                ));
            }
            None => {
                rationale.push(format!(
                    "{}: excluded, no successful request produced a TTFT sample",
                    summary.backend,
                ));
            }
        }
    }

    // Mean TTFT ascending, then p95 ascending, then success rate descending.
    // total_cmp gives a total order, so the ranking is deterministic.
    eligible.sort_by(|(a, ta), (b, tb)| {
        ta.mean_ms
            .total_cmp(&tb.mean_ms)
            .then(ta.p95_ms.total_cmp(&tb.p95_ms))
            .then(b.success_rate.total_cmp(&a.success_rate))
            .then(a.backend.cmp(&b.backend))
    });

    let ranking: Vec<String> = eligible.iter().map(|(s, _)| s.backend.clone()).collect();
    let winner = ranking.first().cloned();
    match &winner {
        Some(name) => rationale.push(format!(
            "winner: {name}, fastest mean TTFT among eligible backends"
        )),
        None => rationale.push(format!(
            "no winner: no backend met the {:.1}% success-rate bar",
            policy.min_success_rate * 100.0
        )),
    }

    ComparisonResult {
        summaries,
        ranking,
        winner,
        rationale,
        policy: policy.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FailureKind, RequestOutcome};
    use chrono::Utc;

    fn set_with(backend: &str, ttfts_ms: &[u64], failures: usize) -> SampleSet {
        let mut outcomes = Vec::new();
        for ms in ttfts_ms {
            outcomes.push(RequestOutcome::success(
                backend,
                Utc::now(),
                Duration::from_millis(*ms),
                Duration::from_millis(ms * 10),
                20,
            ));
        }
        for _ in 0..failures {
            outcomes.push(RequestOutcome::failure(
                backend,
                Utc::now(),
                None,
                Duration::from_secs(30),
                0,
                FailureKind::TimeoutNoFirstToken,
            ));
        }
        SampleSet {
            backend: backend.to_string(),
            outcomes,
        }
    }

    #[test]
    fn percentiles_are_ordered_and_bounded() {
        let samples: Vec<Duration> = [80u64, 90, 100, 110, 120, 95, 105, 85]
            .iter()
            .map(|ms| Duration::from_millis(*ms))
            .collect();
        let stats = latency_stats(&samples).unwrap();
        assert!(stats.p50_ms <= stats.p95_ms);
        assert!(stats.p95_ms <= stats.p99_ms);
        assert!(stats.min_ms <= stats.p50_ms);
        assert!(stats.p99_ms <= stats.max_ms);
        assert_eq!(stats.min_ms, 80.0);
        assert_eq!(stats.max_ms, 120.0);
    }

    #[test]
    fn nearest_rank_matches_known_values() {
        // n = 5: p50 -> rank ceil(2.5)-1 = 2, p95 -> ceil(4.75)-1 = 4
        let sorted = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&sorted, 0.50), 3.0);
        assert_eq!(percentile(&sorted, 0.95), 5.0);
        assert_eq!(percentile(&sorted, 0.99), 5.0);
    }

    #[test]
    fn single_sample_percentiles_collapse() {
        let stats = latency_stats(&[Duration::from_millis(42)]).unwrap();
        assert_eq!(stats.p50_ms, 42.0);
        assert_eq!(stats.p99_ms, 42.0);
    }

    #[test]
    fn empty_series_reports_unavailable() {
        assert!(latency_stats(&[]).is_none());
    }

    #[test]
    fn all_failed_backend_has_no_percentiles_and_no_nan() {
        let set = set_with("down", &[], 10);
        let summary = summarize(&set, Duration::from_millis(100));
        assert!(summary.ttft.is_none());
        assert!(summary.total_duration.is_none());
        assert!(summary.target_achievement.is_none());
        assert_eq!(summary.success_rate, 0.0);
        assert!(!summary.success_rate.is_nan());
    }

    #[test]
    fn target_achievement_counts_only_strictly_under_threshold() {
        let set = set_with("vllm", &[80, 90, 100, 110, 120], 0);
        let summary = summarize(&set, Duration::from_millis(100));
        // Only 80 and 90 are below the 100 ms target; 100 exactly is not.
        assert_eq!(summary.target_achievement, Some(0.4));
    }

    #[test]
    fn eligibility_bar_beats_raw_speed() {
        // A: 5 of 5 successful. B: 2 of 5 time out, survivors slower than A.
        // C: fastest single success but only 1 of 5, below the bar.
        let a = set_with("backend-a", &[80, 90, 100, 110, 120], 0);
        let b = set_with("backend-b", &[100, 110, 120], 2);
        let c = set_with("backend-c", &[70], 4);
        let result = compare(&[a, b, c], &WinnerPolicy::default());

        assert_eq!(result.winner.as_deref(), Some("backend-a"));
        assert!(result.ranking.contains(&"backend-b".to_string()));
        assert!(!result.ranking.contains(&"backend-c".to_string()));
        assert!(
            result
                .rationale
                .iter()
                .any(|line| line.starts_with("backend-c: excluded"))
        );
    }

    #[test]
    fn fully_failing_backend_never_wins() {
        let down = set_with("down", &[], 5);
        let slow = set_with("slow", &[500, 600, 700], 0);
        let result = compare(&[down, slow], &WinnerPolicy::default());
        assert_eq!(result.winner.as_deref(), Some("slow"));
    }

    #[test]
    fn no_eligible_backend_declares_no_winner() {
        let a = set_with("a", &[50], 9);
        let b = set_with("b", &[], 5);
        let result = compare(&[a, b], &WinnerPolicy::default());
        assert_eq!(result.winner, None);
        assert!(result.ranking.is_empty());
        assert!(result.rationale.last().unwrap().starts_with("no winner"));
    }

    #[test]
    fn comparison_is_deterministic() {
        let sets = vec![
            set_with("a", &[80, 90, 100, 110, 120], 1),
            set_with("b", &[85, 95, 105], 0),
        ];
        let policy = WinnerPolicy::default();
        let first = compare(&sets, &policy);
        let second = compare(&sets, &policy);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn mean_tie_breaks_on_p95_then_success_rate() {
        // Same mean (100), different spread: tighter p95 wins.
        let tight = set_with("tight", &[95, 100, 105], 0);
        let wide = set_with("wide", &[80, 100, 120], 0);
        let result = compare(&[tight, wide], &WinnerPolicy::default());
        assert_eq!(result.winner.as_deref(), Some("tight"));
    }

    #[test]
    fn result_round_trips_through_json() {
        let sets = vec![set_with("a", &[80, 90], 0)];
        let result = compare(&sets, &WinnerPolicy::default());
        let json = serde_json::to_string(&result).unwrap();
        let back: ComparisonResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back.winner.as_deref(), Some("a"));
        assert_eq!(back.summaries["a"].attempted, 2);
    }
}
