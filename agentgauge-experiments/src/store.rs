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

//! Persistence backend abstraction for experiments, assignments, and results
//!
//! Stores are expected to be concurrency-safe and to hand back copies of
//! mutable values; the engine performs no multi-statement transactions on
//! top of them. [`MemoryStore`] is the reference implementation.

use crate::{Experiment, ExperimentError, Result};
use agentgauge_core::EvalResult;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Durable backend the experiment engine delegates to
#[async_trait]
pub trait ExperimentStore: Send + Sync {
    async fn save_experiment(&self, experiment: &Experiment) -> Result<()>;

    /// Load an experiment; `ExperimentNotFound` when absent
    async fn load_experiment(&self, experiment_id: &str) -> Result<Experiment>;

    async fn list_experiments(&self) -> Result<Vec<Experiment>>;

    /// Remove the experiment along with its assignments and results
    async fn delete_experiment(&self, experiment_id: &str) -> Result<()>;

    async fn record_assignment(
        &self,
        experiment_id: &str,
        user_id: &str,
        variant_id: &str,
    ) -> Result<()>;

    /// `Ok(None)` means the user has no recorded assignment yet
    async fn get_assignment(&self, experiment_id: &str, user_id: &str) -> Result<Option<String>>;

    /// Append one result under `(experiment_id, variant_id)`; no deduplication
    async fn record_result(
        &self,
        experiment_id: &str,
        variant_id: &str,
        result: &EvalResult,
    ) -> Result<()>;

    /// All recorded results keyed by variant id
    async fn get_results(&self, experiment_id: &str) -> Result<HashMap<String, Vec<EvalResult>>>;
}

/// Reference in-memory store
///
/// Keeps deep copies on both write and read paths so callers can never
/// alias the stored state.
#[derive(Default)]
pub struct MemoryStore {
    experiments: RwLock<HashMap<String, Experiment>>,
    assignments: RwLock<HashMap<(String, String), String>>,
    results: RwLock<HashMap<String, HashMap<String, Vec<EvalResult>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored experiments (test/diagnostic helper)
    pub fn experiment_count(&self) -> usize {
        self.experiments.read().len()
    }
}

#[async_trait]
impl ExperimentStore for MemoryStore {
    async fn save_experiment(&self, experiment: &Experiment) -> Result<()> {
        self.experiments
            .write()
            .insert(experiment.id.clone(), experiment.clone());
        Ok(())
    }

    async fn load_experiment(&self, experiment_id: &str) -> Result<Experiment> {
        self.experiments
            .read()
            .get(experiment_id)
            .cloned()
            .ok_or_else(|| ExperimentError::ExperimentNotFound(experiment_id.to_string()))
    }

    async fn list_experiments(&self) -> Result<Vec<Experiment>> {
        Ok(self.experiments.read().values().cloned().collect())
    }

    async fn delete_experiment(&self, experiment_id: &str) -> Result<()> {
        self.experiments.write().remove(experiment_id);
        self.assignments
            .write()
            .retain(|(exp_id, _), _| exp_id != experiment_id);
        self.results.write().remove(experiment_id);
        Ok(())
    }

    async fn record_assignment(
        &self,
        experiment_id: &str,
        user_id: &str,
        variant_id: &str,
    ) -> Result<()> {
        self.assignments.write().insert(
            (experiment_id.to_string(), user_id.to_string()),
            variant_id.to_string(),
        );
        Ok(())
    }

    async fn get_assignment(&self, experiment_id: &str, user_id: &str) -> Result<Option<String>> {
        Ok(self
            .assignments
            .read()
            .get(&(experiment_id.to_string(), user_id.to_string()))
            .cloned())
    }

    async fn record_result(
        &self,
        experiment_id: &str,
        variant_id: &str,
        result: &EvalResult,
    ) -> Result<()> {
        self.results
            .write()
            .entry(experiment_id.to_string())
            .or_default()
            .entry(variant_id.to_string())
            .or_default()
            .push(result.clone());
        Ok(())
    }

    async fn get_results(&self, experiment_id: &str) -> Result<HashMap<String, Vec<EvalResult>>> {
        Ok(self
            .results
            .read()
            .get(experiment_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Variant;
    use std::time::Duration;

    fn sample_result(task_id: &str, score: f64) -> EvalResult {
        EvalResult {
            task_id: task_id.to_string(),
            success: score >= 0.7,
            output: "out".to_string(),
            expected: "out".to_string(),
            score,
            metrics: HashMap::new(),
            error: None,
            duration: Duration::from_millis(12),
            tokens_used: 42,
            cost: 0.0001,
        }
    }

    #[tokio::test]
    async fn test_save_load_roundtrip() {
        let store = MemoryStore::new();
        let exp = Experiment::new("exp-1", "roundtrip")
            .with_variant(Variant::new("a", "a", 0.7).control())
            .with_variant(Variant::new("b", "b", 0.3))
            .with_metric("latency_ms");

        store.save_experiment(&exp).await.unwrap();
        let loaded = store.load_experiment("exp-1").await.unwrap();

        assert_eq!(loaded.id, exp.id);
        assert_eq!(loaded.variants.len(), 2);
        assert_eq!(loaded.variants[0].weight, 0.7);
        assert!(loaded.variants[0].is_control);
        assert_eq!(loaded.metrics, vec!["latency_ms"]);
    }

    #[tokio::test]
    async fn test_load_missing_is_not_found() {
        let store = MemoryStore::new();
        let err = store.load_experiment("nope").await.unwrap_err();
        assert!(matches!(err, ExperimentError::ExperimentNotFound(_)));
    }

    #[tokio::test]
    async fn test_assignment_roundtrip() {
        let store = MemoryStore::new();
        assert_eq!(store.get_assignment("e", "u").await.unwrap(), None);

        store.record_assignment("e", "u", "treatment").await.unwrap();
        assert_eq!(
            store.get_assignment("e", "u").await.unwrap().as_deref(),
            Some("treatment")
        );
    }

    #[tokio::test]
    async fn test_results_append_without_dedup() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store
                .record_result("e", "a", &sample_result(&format!("t-{i}"), 0.9))
                .await
                .unwrap();
        }
        // Same task id twice is still two entries.
        store
            .record_result("e", "a", &sample_result("t-0", 0.9))
            .await
            .unwrap();

        let results = store.get_results("e").await.unwrap();
        assert_eq!(results["a"].len(), 6);
    }

    #[tokio::test]
    async fn test_delete_removes_assignments_and_results() {
        let store = MemoryStore::new();
        let exp = Experiment::new("e", "x").with_variant(Variant::new("a", "a", 1.0));
        store.save_experiment(&exp).await.unwrap();
        store.record_assignment("e", "u", "a").await.unwrap();
        store
            .record_result("e", "a", &sample_result("t", 1.0))
            .await
            .unwrap();

        store.delete_experiment("e").await.unwrap();

        assert!(store.load_experiment("e").await.is_err());
        assert_eq!(store.get_assignment("e", "u").await.unwrap(), None);
        assert!(store.get_results("e").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_returns_copies() {
        let store = MemoryStore::new();
        let exp = Experiment::new("e", "x").with_variant(Variant::new("a", "a", 1.0));
        store.save_experiment(&exp).await.unwrap();

        let mut loaded = store.load_experiment("e").await.unwrap();
        loaded.name = "mutated".to_string();
        loaded.variants[0].weight = 99.0;

        let fresh = store.load_experiment("e").await.unwrap();
        assert_eq!(fresh.name, "x");
        assert_eq!(fresh.variants[0].weight, 1.0);
    }
}
