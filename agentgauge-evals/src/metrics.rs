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

//! Derived metrics
//!
//! A metric computes one float from an `(input, output)` pair. The
//! registry runs every registered metric over a result and reports
//! per-metric values alongside any failures; a failing metric never
//! aborts the pipeline.

use crate::scorers::char_similarity;
use crate::EvalError;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// What went into the agent
#[derive(Debug, Clone, Default)]
pub struct EvalInput {
    pub prompt: String,
    pub expected: String,
}

/// What came out, with its costs
#[derive(Debug, Clone, Default)]
pub struct EvalOutput {
    pub response: String,
    pub tokens_used: u64,
    pub latency: Duration,
    pub cost: f64,
}

/// Computes a single derived float from an evaluation exchange
#[async_trait]
pub trait Metric: Send + Sync {
    fn name(&self) -> &str;

    async fn compute(&self, input: &EvalInput, output: &EvalOutput) -> Result<f64, EvalError>;
}

/// Outcome of running every registered metric once
#[derive(Debug, Clone, Default)]
pub struct MetricReport {
    /// Values for metrics that computed successfully
    pub values: HashMap<String, f64>,

    /// One entry per failing metric, formatted `name: reason`
    pub errors: Vec<String>,

    /// True when no metric failed
    pub passed: bool,
}

/// Registry of metrics with unique names
#[derive(Default)]
pub struct MetricRegistry {
    metrics: RwLock<Vec<Arc<dyn Metric>>>,
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the four built-in metrics
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry
            .register(Arc::new(AccuracyMetric))
            .and_then(|_| registry.register(Arc::new(LatencyMetric)))
            .and_then(|_| registry.register(Arc::new(TokenUsageMetric)))
            .and_then(|_| registry.register(Arc::new(CostMetric)))
            .ok();
        registry
    }

    /// Register a metric; names must be unique
    pub fn register(&self, metric: Arc<dyn Metric>) -> Result<(), EvalError> {
        let mut metrics = self.metrics.write();
        if metrics.iter().any(|m| m.name() == metric.name()) {
            return Err(EvalError::InvalidInput(format!(
                "metric '{}' is already registered",
                metric.name()
            )));
        }
        metrics.push(metric);
        Ok(())
    }

    pub fn names(&self) -> Vec<String> {
        self.metrics
            .read()
            .iter()
            .map(|m| m.name().to_string())
            .collect()
    }

    /// Run every metric; failures land in `errors`, not in the return path
    pub async fn compute_all(&self, input: &EvalInput, output: &EvalOutput) -> MetricReport {
        let metrics: Vec<Arc<dyn Metric>> = self.metrics.read().clone();

        let computations = metrics.iter().map(|metric| {
            let name = metric.name().to_string();
            async move { (name, metric.compute(input, output).await) }
        });
        let outcomes = futures::future::join_all(computations).await;

        let mut report = MetricReport::default();
        for (name, outcome) in outcomes {
            match outcome {
                Ok(value) => {
                    report.values.insert(name, value);
                }
                Err(err) => report.errors.push(format!("{name}: {err}")),
            }
        }
        report.passed = report.errors.is_empty();
        report
    }
}

/// Similarity of the response against the expected text; 1.0 when there
/// is no expected text to compare against
pub struct AccuracyMetric;

#[async_trait]
impl Metric for AccuracyMetric {
    fn name(&self) -> &str {
        "accuracy"
    }

    async fn compute(&self, input: &EvalInput, output: &EvalOutput) -> Result<f64, EvalError> {
        if input.expected.is_empty() {
            return Ok(1.0);
        }
        if input.expected == output.response {
            return Ok(1.0);
        }
        Ok(char_similarity(&input.expected, &output.response))
    }
}

/// Wall-clock latency in milliseconds
pub struct LatencyMetric;

#[async_trait]
impl Metric for LatencyMetric {
    fn name(&self) -> &str {
        "latency"
    }

    async fn compute(&self, _input: &EvalInput, output: &EvalOutput) -> Result<f64, EvalError> {
        Ok(output.latency.as_secs_f64() * 1000.0)
    }
}

/// Tokens consumed by the agent
pub struct TokenUsageMetric;

#[async_trait]
impl Metric for TokenUsageMetric {
    fn name(&self) -> &str {
        "token_usage"
    }

    async fn compute(&self, _input: &EvalInput, output: &EvalOutput) -> Result<f64, EvalError> {
        Ok(output.tokens_used as f64)
    }
}

/// Attributed cost in USD
pub struct CostMetric;

#[async_trait]
impl Metric for CostMetric {
    fn name(&self) -> &str {
        "cost"
    }

    async fn compute(&self, _input: &EvalInput, output: &EvalOutput) -> Result<f64, EvalError> {
        Ok(output.cost)
    }
}
