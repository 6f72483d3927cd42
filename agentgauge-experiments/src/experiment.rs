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

//! Experiment and variant model
//!
//! An experiment carries an ordered, immutable set of weighted variants and
//! moves through a small lifecycle: draft → running ⇄ paused → completed.
//! All mutation goes through [`crate::ExperimentEngine`] lifecycle
//! operations.

use crate::{ExperimentError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Lifecycle status of an experiment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExperimentStatus {
    #[default]
    Draft,
    Running,
    Paused,
    Completed,
}

impl ExperimentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExperimentStatus::Draft => "draft",
            ExperimentStatus::Running => "running",
            ExperimentStatus::Paused => "paused",
            ExperimentStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for ExperimentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One arm of an experiment
///
/// Immutable after experiment creation. The free-form `config` mapping is
/// what callers feed into their agent when a user lands on this variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variant {
    /// Unique within the experiment
    pub id: String,

    /// Human-readable name
    pub name: String,

    /// Non-negative traffic weight; share = weight / total weight
    pub weight: f64,

    /// Designated baseline for statistical comparison
    #[serde(default)]
    pub is_control: bool,

    /// Free-form variant configuration (model, prompt, parameters, ...)
    #[serde(default)]
    pub config: HashMap<String, serde_json::Value>,
}

impl Variant {
    pub fn new(id: impl Into<String>, name: impl Into<String>, weight: f64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            weight,
            is_control: false,
            config: HashMap::new(),
        }
    }

    /// Flag this variant as the control arm
    pub fn control(mut self) -> Self {
        self.is_control = true;
        self
    }

    pub fn with_config(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.config.insert(key.into(), value);
        self
    }
}

/// An A/B experiment between competing configurations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experiment {
    /// Unique, non-empty identifier
    pub id: String,

    /// Human-readable name
    pub name: String,

    /// What is being tested and why
    #[serde(default)]
    pub description: String,

    /// Ordered variant list; immutable once created
    pub variants: Vec<Variant>,

    /// Metric names tracked alongside `score` during analysis
    #[serde(default)]
    pub metrics: Vec<String>,

    /// Lifecycle status
    #[serde(default)]
    pub status: ExperimentStatus,

    /// Set when the experiment first starts
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,

    /// Set when the experiment completes
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
}

impl Experiment {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            variants: Vec::new(),
            metrics: Vec::new(),
            status: ExperimentStatus::Draft,
            start_time: None,
            end_time: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_variant(mut self, variant: Variant) -> Self {
        self.variants.push(variant);
        self
    }

    /// Track a metric name in analysis, in addition to `score`
    pub fn with_metric(mut self, metric: impl Into<String>) -> Self {
        self.metrics.push(metric.into());
        self
    }

    /// Validate the invariants enforced at creation time
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(ExperimentError::InvalidArgument(
                "experiment id must not be empty".to_string(),
            ));
        }
        if self.variants.is_empty() {
            return Err(ExperimentError::InvalidArgument(
                "no variants defined".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for variant in &self.variants {
            if !seen.insert(variant.id.as_str()) {
                return Err(ExperimentError::InvalidArgument(format!(
                    "duplicate variant id: {}",
                    variant.id
                )));
            }
            if !variant.weight.is_finite() || variant.weight < 0.0 {
                return Err(ExperimentError::InvalidArgument(format!(
                    "invalid variant weights: weight of '{}' must be non-negative",
                    variant.id
                )));
            }
        }

        if self.total_weight() <= 0.0 {
            return Err(ExperimentError::InvalidArgument(
                "invalid variant weights: total weight must be positive".to_string(),
            ));
        }

        if self.variants.iter().filter(|v| v.is_control).count() > 1 {
            return Err(ExperimentError::InvalidArgument(
                "at most one variant may be flagged as control".to_string(),
            ));
        }

        Ok(())
    }

    pub fn variant(&self, variant_id: &str) -> Option<&Variant> {
        self.variants.iter().find(|v| v.id == variant_id)
    }

    /// The baseline variant: first flagged control, else the first variant
    pub fn control(&self) -> Option<&Variant> {
        self.variants
            .iter()
            .find(|v| v.is_control)
            .or_else(|| self.variants.first())
    }

    pub fn total_weight(&self) -> f64 {
        self.variants.iter().map(|v| v.weight).sum()
    }

    pub fn is_running(&self) -> bool {
        self.status == ExperimentStatus::Running
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_arm() -> Experiment {
        Experiment::new("exp-1", "test")
            .with_variant(Variant::new("control", "a", 0.5).control())
            .with_variant(Variant::new("treatment", "b", 0.5))
    }

    #[test]
    fn test_validate_ok() {
        assert!(two_arm().validate().is_ok());
    }

    #[test]
    fn test_validate_empty_id() {
        let exp = Experiment::new("", "x").with_variant(Variant::new("a", "a", 1.0));
        let err = exp.validate().unwrap_err();
        assert!(err.to_string().contains("invalid argument"));
    }

    #[test]
    fn test_validate_no_variants() {
        let err = Experiment::new("exp-1", "x").validate().unwrap_err();
        assert!(err.to_string().contains("no variants defined"));
    }

    #[test]
    fn test_validate_negative_weight() {
        let exp = Experiment::new("exp-1", "x").with_variant(Variant::new("a", "a", -0.1));
        let err = exp.validate().unwrap_err();
        assert!(err.to_string().contains("invalid variant weights"));
    }

    #[test]
    fn test_validate_zero_total_weight() {
        let exp = Experiment::new("exp-1", "x")
            .with_variant(Variant::new("a", "a", 0.0))
            .with_variant(Variant::new("b", "b", 0.0));
        let err = exp.validate().unwrap_err();
        assert!(err
            .to_string()
            .contains("total weight must be positive"));
    }

    #[test]
    fn test_validate_duplicate_variant_id() {
        let exp = Experiment::new("exp-1", "x")
            .with_variant(Variant::new("a", "a", 0.5))
            .with_variant(Variant::new("a", "a again", 0.5));
        assert!(exp.validate().is_err());
    }

    #[test]
    fn test_validate_two_controls() {
        let exp = Experiment::new("exp-1", "x")
            .with_variant(Variant::new("a", "a", 0.5).control())
            .with_variant(Variant::new("b", "b", 0.5).control());
        assert!(exp.validate().is_err());
    }

    #[test]
    fn test_control_defaults_to_first() {
        let exp = Experiment::new("exp-1", "x")
            .with_variant(Variant::new("a", "a", 0.5))
            .with_variant(Variant::new("b", "b", 0.5));
        assert_eq!(exp.control().map(|v| v.id.as_str()), Some("a"));

        let exp = two_arm();
        assert_eq!(exp.control().map(|v| v.id.as_str()), Some("control"));
    }

    #[test]
    fn test_status_serde() {
        let json = serde_json::to_string(&ExperimentStatus::Running).unwrap();
        assert_eq!(json, "\"running\"");
    }
}
