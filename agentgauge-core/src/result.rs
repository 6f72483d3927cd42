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

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Scored outcome of a single task execution
///
/// Produced by the evaluation pipeline and appended to the experiment store
/// under `(experiment_id, variant_id)`. Scores are expected in `[0, 1]`;
/// metric values must be finite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalResult {
    /// Task that produced this result
    pub task_id: String,

    /// Whether the score cleared the pass threshold
    pub success: bool,

    /// Raw agent output
    pub output: String,

    /// Expected output the score was computed against (may be empty)
    pub expected: String,

    /// Normalized score in [0, 1]
    pub score: f64,

    /// Named metric values attached to this result
    #[serde(default)]
    pub metrics: HashMap<String, f64>,

    /// Execution or scoring error, if any
    #[serde(default)]
    pub error: Option<String>,

    /// Wall-clock duration of the task
    pub duration: Duration,

    /// Tokens consumed by the agent
    pub tokens_used: u64,

    /// Cost attributed to this task in USD
    pub cost: f64,
}

impl EvalResult {
    /// Result for a task that failed before it could be scored
    pub fn failed(task_id: impl Into<String>, error: impl Into<String>, duration: Duration) -> Self {
        Self {
            task_id: task_id.into(),
            success: false,
            output: String::new(),
            expected: String::new(),
            score: 0.0,
            metrics: HashMap::new(),
            error: Some(error.into()),
            duration,
            tokens_used: 0,
            cost: 0.0,
        }
    }

    /// True when the result carries no execution or scoring error
    pub fn is_clean(&self) -> bool {
        self.error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_result_shape() {
        let r = EvalResult::failed("t-9", "agent timed out", Duration::from_millis(250));
        assert!(!r.success);
        assert_eq!(r.score, 0.0);
        assert!(r.metrics.is_empty());
        assert_eq!(r.error.as_deref(), Some("agent timed out"));
        assert!(!r.is_clean());
    }

    #[test]
    fn test_result_serde_roundtrip() {
        let mut r = EvalResult::failed("t-1", "boom", Duration::from_secs(1));
        r.metrics.insert("similarity".to_string(), 0.42);
        let json = serde_json::to_string(&r).unwrap();
        let back: EvalResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back.task_id, "t-1");
        assert_eq!(back.metrics["similarity"], 0.42);
        assert_eq!(back.duration, Duration::from_secs(1));
    }
}
