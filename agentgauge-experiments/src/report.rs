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

//! Statistical report generation
//!
//! Turns an analysis into a caller-facing report: 95% confidence intervals
//! per variant, pairwise control-vs-treatment comparisons with p-values and
//! effect sizes, and a recommendation string. The recommendation strings
//! are a stable external contract; downstream tooling matches on them.

use crate::analysis::{ExperimentResult, VariantResult, SCORE_METRIC};
use crate::experiment::{Experiment, ExperimentStatus};
use crate::stats::{confidence_interval_95, mean, sample_variance, welch_t_test};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Significance level for comparisons and confidence intervals
const SIGNIFICANCE_CONFIDENCE: f64 = 0.95;

/// Effect size interpretation based on Cohen's conventions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectSize {
    Negligible, // |d| < 0.2
    Small,      // 0.2 <= |d| < 0.5
    Medium,     // 0.5 <= |d| < 0.8
    Large,      // |d| >= 0.8
}

impl EffectSize {
    pub fn from_cohens_d(d: f64) -> Self {
        let abs_d = d.abs();
        if abs_d < 0.2 {
            EffectSize::Negligible
        } else if abs_d < 0.5 {
            EffectSize::Small
        } else if abs_d < 0.8 {
            EffectSize::Medium
        } else {
            EffectSize::Large
        }
    }
}

/// One variant's entry in the report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantReport {
    pub variant_id: String,
    pub name: String,
    pub is_control: bool,
    pub sample_count: usize,
    pub mean_score: f64,
    pub std_dev: f64,

    /// 95% CI on the mean score; collapses to the mean below 2 samples
    pub confidence_interval: (f64, f64),
}

/// Treatment-vs-control comparison on a single metric
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricComparison {
    pub metric_name: String,

    /// treatment mean − control mean
    pub delta: f64,

    /// Percent change from the control mean; absent when the control mean is 0
    pub relative_change: Option<f64>,

    pub p_value: f64,
    pub confidence: f64,
    pub significant: bool,

    pub cohens_d: f64,
    pub effect_size: EffectSize,
}

/// All metric comparisons for one treatment variant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub variant_id: String,
    pub control_id: String,
    pub metrics: HashMap<String, MetricComparison>,
}

impl ComparisonReport {
    pub fn has_significant_metric(&self) -> bool {
        self.metrics.values().any(|m| m.significant)
    }
}

/// Caller-owned statistical report for one experiment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticalReport {
    pub experiment_id: String,
    pub experiment_name: String,
    pub status: ExperimentStatus,
    pub duration: Duration,
    pub total_samples: usize,
    pub variants: HashMap<String, VariantReport>,
    pub comparisons: Vec<ComparisonReport>,
    pub winner: Option<String>,
    pub winner_confidence: f64,
    pub recommendation: String,
    pub generated_at: DateTime<Utc>,
}

impl std::fmt::Display for StatisticalReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Experiment '{}' ({}): {}, {} samples",
            self.experiment_name, self.experiment_id, self.status, self.total_samples
        )?;

        // Control first, then treatments by id, for stable output.
        let mut variants: Vec<&VariantReport> = self.variants.values().collect();
        variants.sort_by_key(|v| (!v.is_control, v.variant_id.clone()));
        for variant in variants {
            let role = if variant.is_control { "control" } else { "variant" };
            writeln!(
                f,
                "  {role} '{}': mean {:.4} ± {:.4} (n={}, 95% CI [{:.4}, {:.4}])",
                variant.variant_id,
                variant.mean_score,
                variant.std_dev,
                variant.sample_count,
                variant.confidence_interval.0,
                variant.confidence_interval.1,
            )?;
        }

        for comparison in &self.comparisons {
            let mut names: Vec<&String> = comparison.metrics.keys().collect();
            names.sort();
            for name in names {
                let m = &comparison.metrics[name];
                let relative = m
                    .relative_change
                    .map(|pct| format!(" ({pct:+.1}%)"))
                    .unwrap_or_default();
                writeln!(
                    f,
                    "  '{}' vs '{}' on {}: Δ {:+.4}{relative}, p={:.4}{}",
                    comparison.variant_id,
                    comparison.control_id,
                    m.metric_name,
                    m.delta,
                    m.p_value,
                    if m.significant { ", significant" } else { "" },
                )?;
            }
        }

        if let Some(winner) = &self.winner {
            writeln!(
                f,
                "  winner: '{}' at {:.1}% confidence",
                winner,
                self.winner_confidence * 100.0
            )?;
        }
        write!(f, "  {}", self.recommendation)
    }
}

/// Build the report from an experiment and its analysis
pub(crate) fn build_report(experiment: &Experiment, analysis: &ExperimentResult) -> StatisticalReport {
    let mut variants = HashMap::with_capacity(experiment.variants.len());
    for variant in &experiment.variants {
        if let Some(result) = analysis.variant_results.get(&variant.id) {
            variants.insert(variant.id.clone(), variant_report(variant.is_control, &variant.name, result));
        }
    }

    let comparisons = build_comparisons(experiment, analysis);
    let recommendation = recommendation_text(
        analysis.sample_size,
        analysis.winner.as_deref(),
        analysis.confidence,
        &comparisons,
    );

    StatisticalReport {
        experiment_id: experiment.id.clone(),
        experiment_name: experiment.name.clone(),
        status: experiment.status,
        duration: analysis.duration,
        total_samples: analysis.sample_size,
        variants,
        comparisons,
        winner: analysis.winner.clone(),
        winner_confidence: analysis.confidence,
        recommendation,
        generated_at: Utc::now(),
    }
}

fn variant_report(is_control: bool, name: &str, result: &VariantResult) -> VariantReport {
    let mean_score = result.mean_score().unwrap_or(0.0);
    let std_dev = result
        .std_devs
        .get(SCORE_METRIC)
        .copied()
        .unwrap_or(0.0);

    let confidence_interval = confidence_interval_95(mean_score, std_dev, result.sample_count);

    VariantReport {
        variant_id: result.variant_id.clone(),
        name: name.to_string(),
        is_control,
        sample_count: result.sample_count,
        mean_score,
        std_dev,
        confidence_interval,
    }
}

fn build_comparisons(experiment: &Experiment, analysis: &ExperimentResult) -> Vec<ComparisonReport> {
    let control = match experiment.control() {
        Some(control) => control,
        None => return Vec::new(),
    };
    let control_result = match analysis.variant_results.get(&control.id) {
        Some(result) if result.sample_count > 0 => result,
        _ => return Vec::new(),
    };

    let mut comparisons = Vec::new();
    for variant in &experiment.variants {
        if variant.id == control.id {
            continue;
        }
        let treatment_result = match analysis.variant_results.get(&variant.id) {
            Some(result) if result.sample_count > 0 => result,
            _ => continue,
        };

        let mut metrics = HashMap::new();
        for (metric_name, treatment_values) in &treatment_result.raw {
            let control_values = match control_result.raw.get(metric_name) {
                Some(values) if !values.is_empty() => values,
                _ => continue,
            };
            metrics.insert(
                metric_name.clone(),
                compare_metric(metric_name, control_values, treatment_values),
            );
        }

        comparisons.push(ComparisonReport {
            variant_id: variant.id.clone(),
            control_id: control.id.clone(),
            metrics,
        });
    }

    comparisons
}

fn compare_metric(metric_name: &str, control: &[f64], treatment: &[f64]) -> MetricComparison {
    let control_mean = mean(control);
    let treatment_mean = mean(treatment);
    let delta = treatment_mean - control_mean;

    let relative_change = if control_mean != 0.0 {
        Some(delta / control_mean * 100.0)
    } else {
        None
    };

    let welch = welch_t_test(control, treatment);

    // Cohen's d over the pooled standard deviation
    let n1 = control.len() as f64;
    let n2 = treatment.len() as f64;
    let pooled_variance = if n1 + n2 > 2.0 {
        ((n1 - 1.0) * sample_variance(control) + (n2 - 1.0) * sample_variance(treatment))
            / (n1 + n2 - 2.0)
    } else {
        0.0
    };
    let cohens_d = if pooled_variance > 0.0 {
        delta / pooled_variance.sqrt()
    } else {
        0.0
    };

    MetricComparison {
        metric_name: metric_name.to_string(),
        delta,
        relative_change,
        p_value: welch.p_value,
        confidence: welch.confidence,
        significant: welch.confidence >= SIGNIFICANCE_CONFIDENCE,
        cohens_d,
        effect_size: EffectSize::from_cohens_d(cohens_d),
    }
}

/// Stable recommendation strings; matched verbatim by downstream tooling
fn recommendation_text(
    total_samples: usize,
    winner: Option<&str>,
    winner_confidence: f64,
    comparisons: &[ComparisonReport],
) -> String {
    if total_samples < 100 {
        return "Insufficient sample size. Continue collecting data for reliable results."
            .to_string();
    }

    if let Some(winner) = winner {
        if winner_confidence >= 0.95 {
            return format!(
                "Recommend adopting variant '{}' with {:.1}% confidence.",
                winner,
                winner_confidence * 100.0
            );
        }
        if winner_confidence >= 0.90 {
            return format!(
                "Variant '{}' shows promise ({:.1}% confidence). Consider collecting more data.",
                winner,
                winner_confidence * 100.0
            );
        }
    }

    if let Some(metric) = comparisons
        .iter()
        .flat_map(|c| c.metrics.values())
        .find(|m| m.significant)
    {
        return format!(
            "Significant difference detected in '{}' metric. Review detailed comparison.",
            metric.metric_name
        );
    }

    "No statistically significant difference detected. Consider continuing the experiment or reviewing hypothesis."
        .to_string()
}
