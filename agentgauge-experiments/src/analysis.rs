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

//! Per-variant statistics and winner determination
//!
//! Analysis is recomputed on demand from the stored results; nothing here
//! is persisted. Every configured variant appears in the output map even
//! with zero samples. The raw metric arrays stay private to this module
//! and the report generator.

use crate::experiment::Experiment;
use crate::stats::{mean, sample_stddev, welch_t_test};
use agentgauge_core::EvalResult;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Score values are tracked under this reserved metric name
pub(crate) const SCORE_METRIC: &str = "score";

/// Accumulated statistics for one variant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantResult {
    pub variant_id: String,

    /// Number of recorded results
    pub sample_count: usize,

    /// Per-metric means, keyed by metric name (`score` included)
    pub metrics: HashMap<String, f64>,

    /// Per-metric sample standard deviations (Bessel-corrected)
    pub std_devs: HashMap<String, f64>,

    // Raw arrays feed the t-tests; they never leave the crate.
    #[serde(skip)]
    pub(crate) raw: HashMap<String, Vec<f64>>,
}

impl VariantResult {
    fn empty(variant_id: &str) -> Self {
        Self {
            variant_id: variant_id.to_string(),
            sample_count: 0,
            metrics: HashMap::new(),
            std_devs: HashMap::new(),
            raw: HashMap::new(),
        }
    }

    pub(crate) fn raw_scores(&self) -> &[f64] {
        self.raw.get(SCORE_METRIC).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn mean_score(&self) -> Option<f64> {
        self.metrics.get(SCORE_METRIC).copied()
    }
}

/// Outcome of analyzing an experiment's stored results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentResult {
    pub experiment_id: String,

    /// One entry per configured variant, zero-sample variants included
    pub variant_results: HashMap<String, VariantResult>,

    /// Best treatment with confidence above the winner threshold, if any
    pub winner: Option<String>,

    /// Confidence of the winner; 0 when no winner
    pub confidence: f64,

    /// Total results across all variants
    pub sample_size: usize,

    /// Elapsed experiment time (start to end, or start to now)
    pub duration: Duration,
}

/// Confidence a treatment must clear to be declared winner
pub(crate) const WINNER_CONFIDENCE: f64 = 0.95;

/// Compute per-variant statistics from the stored result sequences
pub(crate) fn compute_variant_results(
    experiment: &Experiment,
    stored: &HashMap<String, Vec<EvalResult>>,
) -> HashMap<String, VariantResult> {
    let mut out = HashMap::with_capacity(experiment.variants.len());

    for variant in &experiment.variants {
        let results = match stored.get(&variant.id) {
            Some(results) if !results.is_empty() => results,
            _ => {
                out.insert(variant.id.clone(), VariantResult::empty(&variant.id));
                continue;
            }
        };

        let mut raw: HashMap<String, Vec<f64>> = HashMap::new();
        for result in results {
            raw.entry(SCORE_METRIC.to_string())
                .or_default()
                .push(result.score);
            for metric_name in &experiment.metrics {
                if let Some(&value) = result.metrics.get(metric_name) {
                    raw.entry(metric_name.clone()).or_default().push(value);
                }
            }
        }

        let mut metrics = HashMap::with_capacity(raw.len());
        let mut std_devs = HashMap::with_capacity(raw.len());
        for (name, values) in &raw {
            metrics.insert(name.clone(), mean(values));
            std_devs.insert(name.clone(), sample_stddev(values));
        }

        out.insert(
            variant.id.clone(),
            VariantResult {
                variant_id: variant.id.clone(),
                sample_count: results.len(),
                metrics,
                std_devs,
                raw,
            },
        );
    }

    out
}

/// Pick the treatment with the greatest positive score improvement over
/// control among those with confidence above [`WINNER_CONFIDENCE`]
pub(crate) fn determine_winner(
    experiment: &Experiment,
    variant_results: &HashMap<String, VariantResult>,
) -> (Option<String>, f64) {
    let control = match experiment.control() {
        Some(control) => control,
        None => return (None, 0.0),
    };
    let control_result = match variant_results.get(&control.id) {
        Some(result) if result.sample_count > 0 => result,
        _ => return (None, 0.0),
    };

    let control_scores = control_result.raw_scores();
    let control_mean = mean(control_scores);

    let mut best: Option<(String, f64, f64)> = None; // (id, improvement, confidence)
    for variant in &experiment.variants {
        if variant.id == control.id {
            continue;
        }
        let result = match variant_results.get(&variant.id) {
            Some(result) if result.sample_count > 0 => result,
            _ => continue,
        };

        let scores = result.raw_scores();
        let improvement = mean(scores) - control_mean;
        let confidence = welch_t_test(control_scores, scores).confidence;

        if improvement > 0.0 && confidence > WINNER_CONFIDENCE {
            let better = match &best {
                Some((_, best_improvement, _)) => improvement > *best_improvement,
                None => true,
            };
            if better {
                best = Some((variant.id.clone(), improvement, confidence));
            }
        }
    }

    match best {
        Some((id, _, confidence)) => (Some(id), confidence),
        None => (None, 0.0),
    }
}

/// Full analysis of an experiment against its stored results
pub(crate) fn analyze_experiment(
    experiment: &Experiment,
    stored: &HashMap<String, Vec<EvalResult>>,
) -> ExperimentResult {
    let variant_results = compute_variant_results(experiment, stored);
    let (winner, confidence) = determine_winner(experiment, &variant_results);
    let sample_size = variant_results.values().map(|v| v.sample_count).sum();

    let duration = match (experiment.start_time, experiment.end_time) {
        (Some(start), Some(end)) => (end - start).to_std().unwrap_or_default(),
        (Some(start), None) => (Utc::now() - start).to_std().unwrap_or_default(),
        _ => Duration::ZERO,
    };

    ExperimentResult {
        experiment_id: experiment.id.clone(),
        variant_results,
        winner,
        confidence,
        sample_size,
        duration,
    }
}
