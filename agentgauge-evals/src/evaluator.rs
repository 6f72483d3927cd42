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

//! The evaluation pipeline
//!
//! Runs every task of a suite against an agent behind a concurrency
//! semaphore, scores each output, optionally computes registered metrics
//! and checks alert thresholds, and aggregates a summary. Results keep
//! task order regardless of completion order, so percentiles and indexed
//! access are deterministic. A panicking task is recovered and recorded
//! as a failed result; the rest of the run proceeds.

use crate::agent::{AgentExecutor, AgentResponse};
use crate::alerts::{Alert, AlertHandler, AlertSink, AlertThreshold};
use crate::metrics::{EvalInput, EvalOutput, MetricRegistry};
use crate::scorers::{ExactMatchScorer, Scorer, ScorerRegistry};
use crate::summary::{self, EvalSummary};
use crate::EvalError;
use agentgauge_core::{EvalResult, EvalSuite, EvalTask};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{error, warn};

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct EvaluatorConfig {
    /// Maximum tasks in flight within one suite
    pub concurrency: usize,

    /// Maximum suites in flight within one batch
    pub batch_size: usize,

    /// Timeout for tasks that don't carry their own
    pub default_timeout: Duration,

    /// Minimum score for a task to count as passed
    pub pass_threshold: f64,

    /// Whether to retry failed agent executions
    pub retry_on_error: bool,

    /// Maximum number of retries after the first attempt
    pub max_retries: u32,

    /// Skip remaining tasks once any task fails
    pub stop_on_failure: bool,

    /// Run the metric registry over every clean result
    pub collect_metrics: bool,

    /// Check alert thresholds over every clean result
    pub enable_alerts: bool,

    /// USD per token, used to attribute cost to results
    pub cost_per_token: f64,

    /// Thresholds checked when alerts are enabled
    pub alert_thresholds: Vec<AlertThreshold>,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            batch_size: 4,
            default_timeout: Duration::from_secs(30),
            pass_threshold: 0.7,
            retry_on_error: true,
            max_retries: 2,
            stop_on_failure: false,
            collect_metrics: false,
            enable_alerts: false,
            cost_per_token: 0.0,
            alert_thresholds: Vec::new(),
        }
    }
}

impl EvaluatorConfig {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_pass_threshold(mut self, threshold: f64) -> Self {
        self.pass_threshold = threshold;
        self
    }

    pub fn retry_on_error(mut self, enabled: bool) -> Self {
        self.retry_on_error = enabled;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn stop_on_failure(mut self, enabled: bool) -> Self {
        self.stop_on_failure = enabled;
        self
    }

    pub fn collect_metrics(mut self, enabled: bool) -> Self {
        self.collect_metrics = enabled;
        self
    }

    pub fn enable_alerts(mut self, enabled: bool) -> Self {
        self.enable_alerts = enabled;
        self
    }

    pub fn with_cost_per_token(mut self, cost: f64) -> Self {
        self.cost_per_token = cost;
        self
    }

    pub fn with_alert_threshold(mut self, threshold: AlertThreshold) -> Self {
        self.alert_thresholds.push(threshold);
        self
    }
}

/// Report for one evaluated suite
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalReport {
    /// Unique id of this run
    pub run_id: uuid::Uuid,

    pub suite_id: String,
    pub suite_name: String,

    /// One result per executed task, in task order
    pub results: Vec<EvalResult>,

    pub summary: EvalSummary,
    pub duration: Duration,
    pub generated_at: DateTime<Utc>,
}

/// Result of a batch run: per-suite reports plus the collected failures
///
/// `reports` stays index-aligned with the input suites; a suite that
/// failed to evaluate keeps its `None` placeholder.
#[derive(Debug)]
pub struct BatchOutcome {
    pub reports: Vec<Option<EvalReport>>,

    /// Per-suite failures, formatted `suite '<id>': <error>`
    pub errors: Vec<String>,
}

/// Aggregation over several suite reports
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchEvalReport {
    /// Input reports, `None` placeholders included
    pub reports: Vec<Option<EvalReport>>,

    pub total_suites: usize,
    pub total_tasks: usize,
    pub passed: usize,
    pub failed: usize,
    pub pass_rate: f64,

    pub average_score: f64,
    pub score_stddev: f64,
    pub score_median: f64,
    pub percentiles: HashMap<String, f64>,

    pub total_tokens: u64,
    pub total_cost: f64,
    pub total_duration: Duration,

    /// Snapshot of the alert buffer at generation time
    pub alerts: Vec<Alert>,

    pub generated_at: DateTime<Utc>,
}

/// Everything a spawned task needs, snapshotted at run start
struct RunContext {
    config: EvaluatorConfig,
    scorers: Arc<ScorerRegistry>,
    metrics: Option<Arc<MetricRegistry>>,
    alerts: Arc<AlertSink>,
    agent: Arc<dyn AgentExecutor>,
}

/// Batch evaluation pipeline
pub struct Evaluator {
    config: EvaluatorConfig,
    scorers: Arc<ScorerRegistry>,
    metric_registry: RwLock<Option<Arc<MetricRegistry>>>,
    alerts: Arc<AlertSink>,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new(EvaluatorConfig::default())
    }
}

impl Evaluator {
    pub fn new(config: EvaluatorConfig) -> Self {
        Self {
            config,
            scorers: Arc::new(ScorerRegistry::new()),
            metric_registry: RwLock::new(None),
            alerts: Arc::new(AlertSink::default()),
        }
    }

    /// Route tasks whose metadata `type` matches to a custom scorer
    pub fn register_scorer(&self, task_type: impl Into<String>, scorer: Arc<dyn Scorer>) {
        self.scorers.register(task_type, scorer);
    }

    /// Install the registry consulted when `collect_metrics` is on
    pub fn set_metric_registry(&self, registry: Arc<MetricRegistry>) {
        *self.metric_registry.write() = Some(registry);
    }

    pub fn add_alert_handler(&self, handler: Arc<dyn AlertHandler>) {
        self.alerts.add_handler(handler);
    }

    /// Copy of the alerts raised so far
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.snapshot()
    }

    /// Run every task of the suite against the agent
    pub async fn evaluate(
        &self,
        suite: &EvalSuite,
        agent: Arc<dyn AgentExecutor>,
    ) -> Result<EvalReport, EvalError> {
        if suite.tasks.is_empty() {
            return Err(EvalError::InvalidInput(format!(
                "suite '{}' has no tasks",
                suite.id
            )));
        }

        let started = Instant::now();
        let ctx = Arc::new(RunContext {
            config: self.config.clone(),
            scorers: self.scorers.clone(),
            metrics: self.metric_registry.read().clone(),
            alerts: self.alerts.clone(),
            agent,
        });

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let stop = Arc::new(AtomicBool::new(false));

        let mut handles = Vec::with_capacity(suite.tasks.len());
        for task in suite.tasks.iter().cloned() {
            let ctx = ctx.clone();
            let semaphore = semaphore.clone();
            let stop = stop.clone();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                if stop.load(Ordering::SeqCst) {
                    return None;
                }
                let result = run_task(&ctx, &task).await;
                if !result.success && ctx.config.stop_on_failure {
                    stop.store(true, Ordering::SeqCst);
                }
                Some(result)
            }));
        }

        // Results land in task order; skipped slots are dropped afterwards
        // so the summary only covers executed tasks.
        let mut results = Vec::with_capacity(suite.tasks.len());
        for (idx, handle) in handles.into_iter().enumerate() {
            match handle.await {
                Ok(Some(result)) => results.push(result),
                Ok(None) => {} // skipped by stop-on-failure
                Err(join_err) => {
                    let task = &suite.tasks[idx];
                    error!(task_id = %task.id, %join_err, "task aborted");
                    results.push(EvalResult::failed(
                        &task.id,
                        EvalError::Panic(join_err.to_string()).to_string(),
                        Duration::ZERO,
                    ));
                }
            }
        }

        let summary = summary::summarize(&results);
        Ok(EvalReport {
            run_id: uuid::Uuid::new_v4(),
            suite_id: suite.id.clone(),
            suite_name: suite.name.clone(),
            results,
            summary,
            duration: started.elapsed(),
            generated_at: Utc::now(),
        })
    }

    /// Run several suites with a second level of bounded concurrency
    ///
    /// Suite failures are collected rather than raised; partial reports
    /// come back alongside them.
    pub async fn evaluate_batch(
        &self,
        suites: &[EvalSuite],
        agent: Arc<dyn AgentExecutor>,
    ) -> BatchOutcome {
        let semaphore = Arc::new(Semaphore::new(self.config.batch_size.max(1)));

        let runs = suites.iter().map(|suite| {
            let semaphore = semaphore.clone();
            let agent = agent.clone();
            async move {
                let _permit = semaphore.acquire_owned().await.ok();
                self.evaluate(suite, agent).await
            }
        });
        let outcomes = futures::future::join_all(runs).await;

        let mut reports = Vec::with_capacity(suites.len());
        let mut errors = Vec::new();
        for (suite, outcome) in suites.iter().zip(outcomes) {
            match outcome {
                Ok(report) => reports.push(Some(report)),
                Err(err) => {
                    warn!(suite_id = %suite.id, %err, "suite evaluation failed");
                    errors.push(format!("suite '{}': {err}", suite.id));
                    reports.push(None);
                }
            }
        }

        BatchOutcome { reports, errors }
    }

    /// Aggregate several suite reports and snapshot current alerts
    ///
    /// Totals cover the present reports only; `None` placeholders are kept
    /// in `reports` untouched.
    pub fn generate_report(&self, reports: &[Option<EvalReport>]) -> BatchEvalReport {
        let present: Vec<&EvalReport> = reports.iter().flatten().collect();

        let scores: Vec<f64> = present
            .iter()
            .flat_map(|r| r.results.iter().map(|result| result.score))
            .collect();

        let total_tasks: usize = present.iter().map(|r| r.summary.total_tasks).sum();
        let passed: usize = present.iter().map(|r| r.summary.passed).sum();
        let failed: usize = present.iter().map(|r| r.summary.failed).sum();

        let average_score = if scores.is_empty() {
            0.0
        } else {
            scores.iter().sum::<f64>() / scores.len() as f64
        };
        let score_stddev = if scores.is_empty() {
            0.0
        } else {
            (scores
                .iter()
                .map(|s| (s - average_score).powi(2))
                .sum::<f64>()
                / scores.len() as f64)
                .sqrt()
        };

        let mut sorted = scores;
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let mut percentiles = HashMap::new();
        if !sorted.is_empty() {
            for (name, p) in [("p50", 50.0), ("p90", 90.0), ("p95", 95.0), ("p99", 99.0)] {
                percentiles.insert(name.to_string(), summary::percentile(&sorted, p));
            }
        }

        BatchEvalReport {
            reports: reports.to_vec(),
            total_suites: present.len(),
            total_tasks,
            passed,
            failed,
            pass_rate: if total_tasks > 0 {
                passed as f64 / total_tasks as f64
            } else {
                0.0
            },
            average_score,
            score_stddev,
            score_median: summary::percentile(&sorted, 50.0),
            percentiles,
            total_tokens: present.iter().map(|r| r.summary.total_tokens).sum(),
            total_cost: present.iter().map(|r| r.summary.total_cost).sum(),
            total_duration: present.iter().map(|r| r.summary.total_duration).sum(),
            alerts: self.alerts.snapshot(),
            generated_at: Utc::now(),
        }
    }
}

/// Execute, score, and post-process one task
async fn run_task(ctx: &RunContext, task: &EvalTask) -> EvalResult {
    let started = Instant::now();
    let timeout = match task.timeout {
        Some(timeout) if !timeout.is_zero() => timeout,
        _ => ctx.config.default_timeout,
    };
    let expected = task.expected.clone().unwrap_or_default();

    let attempts = if ctx.config.retry_on_error {
        ctx.config.max_retries as usize + 1
    } else {
        1
    };

    let mut last_error = String::new();
    let mut response: Option<AgentResponse> = None;
    for _ in 0..attempts {
        match tokio::time::timeout(timeout, ctx.agent.execute(&task.input)).await {
            Ok(Ok(agent_response)) => {
                response = Some(agent_response);
                break;
            }
            Ok(Err(err)) => last_error = err.to_string(),
            Err(_) => last_error = EvalError::Timeout(timeout).to_string(),
        }
    }

    let response = match response {
        Some(response) => response,
        None => {
            let mut result = EvalResult::failed(&task.id, last_error, started.elapsed());
            result.expected = expected;
            return result;
        }
    };

    let outcome = match task.task_type().and_then(|t| ctx.scorers.resolve(t)) {
        Some(scorer) => scorer.score(task, &response.output),
        None => ExactMatchScorer.score(task, &response.output),
    };
    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(err) => {
            return EvalResult {
                task_id: task.id.clone(),
                success: false,
                output: response.output,
                expected,
                score: 0.0,
                metrics: HashMap::new(),
                error: Some(format!("scoring failed: {err}")),
                duration: started.elapsed(),
                tokens_used: response.tokens_used,
                cost: response.tokens_used as f64 * ctx.config.cost_per_token,
            };
        }
    };

    let duration = started.elapsed();
    let cost = response.tokens_used as f64 * ctx.config.cost_per_token;
    let mut result = EvalResult {
        task_id: task.id.clone(),
        success: outcome.score >= ctx.config.pass_threshold,
        output: response.output.clone(),
        expected: expected.clone(),
        score: outcome.score,
        metrics: outcome.metrics,
        error: None,
        duration,
        tokens_used: response.tokens_used,
        cost,
    };

    if ctx.config.collect_metrics {
        if let Some(registry) = &ctx.metrics {
            let input = EvalInput {
                prompt: task.input.clone(),
                expected,
            };
            let output = EvalOutput {
                response: response.output,
                tokens_used: result.tokens_used,
                latency: duration,
                cost,
            };
            // Registry failures stay inside its report; only clean values
            // merge into the result.
            let metric_report = registry.compute_all(&input, &output).await;
            for (name, value) in metric_report.values {
                result.metrics.insert(name, value);
            }
        }
    }

    if ctx.config.enable_alerts {
        ctx.alerts.check(&ctx.config.alert_thresholds, &result);
    }

    result
}
