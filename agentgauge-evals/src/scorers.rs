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

//! Deterministic scorers
//!
//! Scorers map `(task, output)` to a normalized score in [0, 1] plus
//! optional metrics. They cost nothing and are reproducible, which makes
//! them the default for regression suites; LLM-based judging lives in
//! [`crate::judge`].

use crate::EvalError;
use agentgauge_core::EvalTask;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Score plus the metrics the scorer derived along the way
#[derive(Debug, Clone, Default)]
pub struct ScoreOutcome {
    /// Normalized score in [0, 1]
    pub score: f64,

    /// Scorer-specific metrics (e.g. `exact_match`, `similarity`)
    pub metrics: HashMap<String, f64>,
}

impl ScoreOutcome {
    pub fn passing() -> Self {
        Self {
            score: 1.0,
            metrics: HashMap::new(),
        }
    }

    fn with_metric(score: f64, name: &str, value: f64) -> Self {
        Self {
            score,
            metrics: HashMap::from([(name.to_string(), value)]),
        }
    }
}

/// Maps a task and its agent output to a normalized score
pub trait Scorer: Send + Sync {
    fn score(&self, task: &EvalTask, output: &str) -> Result<ScoreOutcome, EvalError>;
}

/// Character-aligned similarity: matching aligned characters over the
/// longer length. 1.0 for two empty strings.
pub(crate) fn char_similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let longer = a.len().max(b.len());
    if longer == 0 {
        return 1.0;
    }
    let matching = a.iter().zip(b.iter()).filter(|(x, y)| x == y).count();
    matching as f64 / longer as f64
}

/// Default scorer: exact equality, with character similarity as the
/// partial-credit fallback
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactMatchScorer;

impl Scorer for ExactMatchScorer {
    fn score(&self, task: &EvalTask, output: &str) -> Result<ScoreOutcome, EvalError> {
        let expected = match task.expected.as_deref() {
            Some(expected) if !expected.is_empty() => expected,
            // No golden answer means nothing to fail against.
            _ => return Ok(ScoreOutcome::passing()),
        };

        if output == expected {
            return Ok(ScoreOutcome::with_metric(1.0, "exact_match", 1.0));
        }

        let similarity = char_similarity(expected, output);
        Ok(ScoreOutcome::with_metric(similarity, "similarity", similarity))
    }
}

/// Substring scorer: full credit when the expected text appears anywhere
/// in the output
#[derive(Debug, Clone, Copy, Default)]
pub struct ContainsScorer;

impl Scorer for ContainsScorer {
    fn score(&self, task: &EvalTask, output: &str) -> Result<ScoreOutcome, EvalError> {
        let expected = match task.expected.as_deref() {
            Some(expected) if !expected.is_empty() => expected,
            _ => return Ok(ScoreOutcome::passing()),
        };

        if output.len() >= expected.len() && output.contains(expected) {
            Ok(ScoreOutcome {
                score: 1.0,
                metrics: HashMap::new(),
            })
        } else {
            Ok(ScoreOutcome {
                score: 0.0,
                metrics: HashMap::new(),
            })
        }
    }
}

/// Structural JSON scorer
///
/// Parses both sides as JSON and scores the similarity of their canonical
/// serializations (serde_json orders object keys, so formatting and key
/// order don't matter). Invalid output JSON scores 0 with `valid_json=0`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonScorer;

impl Scorer for JsonScorer {
    fn score(&self, task: &EvalTask, output: &str) -> Result<ScoreOutcome, EvalError> {
        let expected = match task.expected.as_deref() {
            Some(expected) if !expected.is_empty() => expected,
            _ => return Ok(ScoreOutcome::passing()),
        };

        let expected_value: serde_json::Value = serde_json::from_str(expected)
            .map_err(|e| EvalError::InvalidInput(format!("expected is not valid JSON: {e}")))?;

        let actual_value: serde_json::Value = match serde_json::from_str(output) {
            Ok(value) => value,
            Err(_) => return Ok(ScoreOutcome::with_metric(0.0, "valid_json", 0.0)),
        };

        let expected_canonical = expected_value.to_string();
        let actual_canonical = actual_value.to_string();
        let similarity = char_similarity(&expected_canonical, &actual_canonical);

        let mut outcome = ScoreOutcome::with_metric(similarity, "valid_json", 1.0);
        outcome.metrics.insert("similarity".to_string(), similarity);
        Ok(outcome)
    }
}

/// Concurrency-safe registry of scorers keyed by task type
///
/// The registry lock is independent of the evaluator's other state so
/// registration never contends with running tasks.
#[derive(Default)]
pub struct ScorerRegistry {
    scorers: RwLock<HashMap<String, Arc<dyn Scorer>>>,
}

impl ScorerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, task_type: impl Into<String>, scorer: Arc<dyn Scorer>) {
        self.scorers.write().insert(task_type.into(), scorer);
    }

    pub fn resolve(&self, task_type: &str) -> Option<Arc<dyn Scorer>> {
        self.scorers.read().get(task_type).cloned()
    }
}
