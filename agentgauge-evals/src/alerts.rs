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

//! Threshold-based alerting
//!
//! Thresholds are checked per result as it is produced. Breaches append to
//! an in-memory buffer and fan out synchronously to every registered
//! handler; a panicking handler is recovered and logged, never propagated.

use agentgauge_core::EvalResult;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Severity of a threshold breach
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Info,
    Warning,
    Critical,
}

/// Comparison operator for a threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdOp {
    Gt,
    Lt,
    Gte,
    Lte,
    Eq,
}

impl ThresholdOp {
    pub fn matches(&self, actual: f64, threshold: f64) -> bool {
        match self {
            ThresholdOp::Gt => actual > threshold,
            ThresholdOp::Lt => actual < threshold,
            ThresholdOp::Gte => actual >= threshold,
            ThresholdOp::Lte => actual <= threshold,
            ThresholdOp::Eq => actual == threshold,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ThresholdOp::Gt => "gt",
            ThresholdOp::Lt => "lt",
            ThresholdOp::Gte => "gte",
            ThresholdOp::Lte => "lte",
            ThresholdOp::Eq => "eq",
        }
    }
}

impl std::fmt::Display for ThresholdOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A configured alert condition over a metric
///
/// `metric` may name a result metric or one of the synthetic values
/// `score`, `duration_ms`, `tokens_used`, `cost`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertThreshold {
    pub metric: String,
    pub op: ThresholdOp,
    pub value: f64,
    pub level: AlertLevel,

    /// Custom alert message; a default is derived when absent
    #[serde(default)]
    pub message: Option<String>,
}

impl AlertThreshold {
    pub fn new(metric: impl Into<String>, op: ThresholdOp, value: f64, level: AlertLevel) -> Self {
        Self {
            metric: metric.into(),
            op,
            value,
            level,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// A recorded threshold breach
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub level: AlertLevel,
    pub metric_name: String,
    pub threshold: f64,
    pub actual: f64,
    pub message: String,
    pub task_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Receives alerts synchronously as they fire
pub trait AlertHandler: Send + Sync {
    fn handle(&self, alert: &Alert);
}

/// Default handler that routes alerts into the tracing log at their level
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingAlertHandler;

impl AlertHandler for LoggingAlertHandler {
    fn handle(&self, alert: &Alert) {
        match alert.level {
            AlertLevel::Info => info!(
                metric = %alert.metric_name,
                actual = alert.actual,
                threshold = alert.threshold,
                "{}", alert.message
            ),
            AlertLevel::Warning => warn!(
                metric = %alert.metric_name,
                actual = alert.actual,
                threshold = alert.threshold,
                "{}", alert.message
            ),
            AlertLevel::Critical => error!(
                metric = %alert.metric_name,
                actual = alert.actual,
                threshold = alert.threshold,
                "{}", alert.message
            ),
        }
    }
}

/// Buffer plus handler fan-out; shared by the evaluator
#[derive(Default)]
pub(crate) struct AlertSink {
    buffer: Mutex<Vec<Alert>>,
    handlers: RwLock<Vec<Arc<dyn AlertHandler>>>,
}

impl AlertSink {
    pub(crate) fn add_handler(&self, handler: Arc<dyn AlertHandler>) {
        self.handlers.write().push(handler);
    }

    /// Copy of the current alert buffer
    pub(crate) fn snapshot(&self) -> Vec<Alert> {
        self.buffer.lock().clone()
    }

    /// Check every threshold against a result, recording breaches
    pub(crate) fn check(&self, thresholds: &[AlertThreshold], result: &EvalResult) {
        for threshold in thresholds {
            let actual = match metric_value(&threshold.metric, result) {
                Some(value) if value.is_finite() => value,
                _ => continue,
            };
            if !threshold.op.matches(actual, threshold.value) {
                continue;
            }

            let message = threshold.message.clone().unwrap_or_else(|| {
                format!(
                    "metric {} ({}) exceeded threshold {} {}",
                    threshold.metric, actual, threshold.op, threshold.value
                )
            });

            let alert = Alert {
                level: threshold.level,
                metric_name: threshold.metric.clone(),
                threshold: threshold.value,
                actual,
                message,
                task_id: Some(result.task_id.clone()),
                timestamp: Utc::now(),
            };

            self.buffer.lock().push(alert.clone());
            self.dispatch(&alert);
        }
    }

    fn dispatch(&self, alert: &Alert) {
        let handlers: Vec<Arc<dyn AlertHandler>> = self.handlers.read().clone();
        for handler in handlers {
            let outcome =
                std::panic::catch_unwind(AssertUnwindSafe(|| handler.handle(alert)));
            if outcome.is_err() {
                error!(metric = %alert.metric_name, "alert handler panicked");
            }
        }
    }
}

/// Resolve a threshold's metric against a result
///
/// Result metrics win over the synthetic names.
fn metric_value(name: &str, result: &EvalResult) -> Option<f64> {
    if let Some(&value) = result.metrics.get(name) {
        return Some(value);
    }
    match name {
        "score" => Some(result.score),
        "duration_ms" => Some(result.duration.as_secs_f64() * 1000.0),
        "tokens_used" => Some(result.tokens_used as f64),
        "cost" => Some(result.cost),
        _ => None,
    }
}
