// Copyright 2025 Agentgauge Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Aggregated run statistics
//!
//! Summaries use the population divisor (n) for the score standard
//! deviation and linear interpolation for percentiles. This differs from
//! the experiment engine's Bessel-corrected variant statistics on purpose;
//! the two feed different consumers with different conventions.

use agentgauge_core::EvalResult;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Aggregated statistics over one run's results
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvalSummary {
    pub total_tasks: usize,
    pub passed: usize,
    pub failed: usize,
    pub pass_rate: f64,

    pub average_score: f64,
    pub score_min: f64,
    pub score_max: f64,
    pub score_median: f64,

    /// Population standard deviation of scores (divisor n)
    pub score_stddev: f64,

    /// p50 / p90 / p95 / p99 of scores, linearly interpolated
    pub percentiles: HashMap<String, f64>,

    /// Per-metric mean over the results that reported the metric
    pub metric_averages: HashMap<String, f64>,

    pub total_tokens: u64,
    pub total_cost: f64,
    pub total_duration: Duration,
}

impl std::fmt::Display for EvalSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{} passed ({:.1}%), avg score {:.3}, {} tokens, ${:.4} cost, {}ms total",
            self.passed,
            self.total_tasks,
            self.pass_rate * 100.0,
            self.average_score,
            self.total_tokens,
            self.total_cost,
            self.total_duration.as_millis()
        )
    }
}

/// Summarize a slice of results; all-zero with empty (non-nil) maps for
/// an empty slice
pub fn summarize(results: &[EvalResult]) -> EvalSummary {
    if results.is_empty() {
        return EvalSummary::default();
    }

    let total = results.len();
    let passed = results.iter().filter(|r| r.success).count();
    let failed = total - passed;

    let scores: Vec<f64> = results.iter().map(|r| r.score).collect();
    let average_score = scores.iter().sum::<f64>() / total as f64;

    let mut sorted = scores.clone();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let variance = scores
        .iter()
        .map(|s| (s - average_score).powi(2))
        .sum::<f64>()
        / total as f64;

    let mut percentiles = HashMap::with_capacity(4);
    for (name, p) in [("p50", 50.0), ("p90", 90.0), ("p95", 95.0), ("p99", 99.0)] {
        percentiles.insert(name.to_string(), percentile(&sorted, p));
    }

    let mut metric_sums: HashMap<String, (f64, usize)> = HashMap::new();
    for result in results {
        for (name, value) in &result.metrics {
            let entry = metric_sums.entry(name.clone()).or_insert((0.0, 0));
            entry.0 += value;
            entry.1 += 1;
        }
    }
    let metric_averages = metric_sums
        .into_iter()
        .map(|(name, (sum, count))| (name, sum / count as f64))
        .collect();

    EvalSummary {
        total_tasks: total,
        passed,
        failed,
        pass_rate: passed as f64 / total as f64,
        average_score,
        score_min: sorted[0],
        score_max: sorted[total - 1],
        score_median: percentile(&sorted, 50.0),
        score_stddev: variance.sqrt(),
        percentiles,
        metric_averages,
        total_tokens: results.iter().map(|r| r.tokens_used).sum(),
        total_cost: results.iter().map(|r| r.cost).sum(),
        total_duration: results.iter().map(|r| r.duration).sum(),
    }
}

/// Percentile by linear interpolation over a sorted slice
///
/// rank = p/100 · (n−1), interpolated between the surrounding indices.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let rank = (p / 100.0).clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            if lo == hi {
                sorted[lo]
            } else {
                let fraction = rank - lo as f64;
                sorted[lo] + (sorted[hi] - sorted[lo]) * fraction
            }
        }
    }
}
