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

//! # Agentgauge Evaluation Pipeline
//!
//! Batch execution of tasks against an agent under bounded concurrency,
//! with pluggable scorers, derived metrics, threshold alerting, and an
//! LLM-as-judge for rubric-based quality scoring.
//!
//! ## Features
//!
//! - **Trait-based seams**: agent executor, scorer, metric, alert handler,
//!   and LLM provider are all small trait objects with built-in defaults
//! - **Bounded concurrency**: task fan-out behind a semaphore, with
//!   per-task timeout, retry, and optional stop-on-failure
//! - **Aggregated statistics**: pass rate, interpolated percentiles, and
//!   per-metric averages per suite and across batches
//! - **LLM-as-judge**: dimension-weighted scoring with normalization,
//!   result caching, and batch fan-out
//!
//! ## Example
//!
//! ```rust,ignore
//! use agentgauge_evals::{Evaluator, EvaluatorConfig};
//! use agentgauge_core::{EvalSuite, EvalTask};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let evaluator = Evaluator::new(EvaluatorConfig::default());
//!     let suite = EvalSuite::new("smoke", "smoke tests")
//!         .with_task(EvalTask::new("t-1", "greeting", "Say hello").with_expected("hello"));
//!
//!     let report = evaluator.evaluate(&suite, my_agent()).await?;
//!     println!("pass rate: {:.1}%", report.summary.pass_rate * 100.0);
//!     Ok(())
//! }
//! ```

use std::time::Duration;
use thiserror::Error;

pub mod agent;
pub mod alerts;
pub mod evaluator;
pub mod judge;
pub mod metrics;
pub mod scorers;
pub mod summary;

pub use agent::{AgentExecutor, AgentResponse};
pub use agentgauge_core::{EvalResult, EvalSuite, EvalTask};
pub use alerts::{
    Alert, AlertHandler, AlertLevel, AlertThreshold, LoggingAlertHandler, ThresholdOp,
};
pub use evaluator::{BatchEvalReport, BatchOutcome, EvalReport, Evaluator, EvaluatorConfig};
pub use judge::provider::{
    AnthropicProvider, ChatMessage, ChatRequest, ChatResponse, Choice, LlmProvider,
    OpenAiProvider, ProviderError,
};
pub use judge::{
    AggregatedJudgeResult, CacheStats, DimensionScore, JudgeConfig, JudgeDimension, JudgeError,
    JudgeRequest, JudgeResult, LlmJudge, DEFAULT_JUDGE_PROMPT,
};
pub use metrics::{
    AccuracyMetric, CostMetric, EvalInput, EvalOutput, LatencyMetric, Metric, MetricReport,
    MetricRegistry, TokenUsageMetric,
};
pub use scorers::{ContainsScorer, ExactMatchScorer, JsonScorer, ScoreOutcome, Scorer, ScorerRegistry};
pub use summary::{summarize, EvalSummary};

/// Errors surfaced by the evaluation pipeline
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("invalid argument: {0}")]
    InvalidInput(String),

    #[error("agent execution failed: {0}")]
    Execution(String),

    #[error("evaluation timeout after {0:?}")]
    Timeout(Duration),

    #[error("task panicked: {0}")]
    Panic(String),

    #[error("upstream error: {0}")]
    Upstream(String),
}
