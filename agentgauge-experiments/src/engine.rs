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

//! A/B experiment engine
//!
//! Owns the in-memory experiment table; the store is a durable replica.
//! Persistence failures on the write path are logged and swallowed (the
//! in-memory state stays authoritative), read failures surface to the
//! caller. All methods are safe for concurrent use; the table lock is
//! never held across an await point.

use crate::allocation;
use crate::analysis::{self, ExperimentResult};
use crate::experiment::{Experiment, ExperimentStatus, Variant};
use crate::report::{self, StatisticalReport};
use crate::store::ExperimentStore;
use crate::{ExperimentError, Result};
use agentgauge_core::EvalResult;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Default confidence a winner must reach for auto-selection
const DEFAULT_MIN_CONFIDENCE: f64 = 0.95;

/// Lifecycle, assignment, and analysis for A/B experiments
pub struct ExperimentEngine {
    experiments: RwLock<HashMap<String, Experiment>>,
    store: Arc<dyn ExperimentStore>,
}

impl ExperimentEngine {
    pub fn new(store: Arc<dyn ExperimentStore>) -> Self {
        Self {
            experiments: RwLock::new(HashMap::new()),
            store,
        }
    }

    /// Validate and register a new experiment in `draft` status
    pub async fn create_experiment(&self, experiment: Experiment) -> Result<()> {
        experiment.validate()?;

        self.experiments
            .write()
            .insert(experiment.id.clone(), experiment.clone());

        if let Err(err) = self.store.save_experiment(&experiment).await {
            warn!(experiment_id = %experiment.id, %err, "failed to persist experiment");
        }
        Ok(())
    }

    /// Cached copy of an experiment, loading through the store on a miss
    pub async fn get_experiment(&self, experiment_id: &str) -> Result<Experiment> {
        if let Some(experiment) = self.experiments.read().get(experiment_id) {
            return Ok(experiment.clone());
        }

        let experiment = self
            .store
            .load_experiment(experiment_id)
            .await
            .map_err(|_| ExperimentError::ExperimentNotFound(experiment_id.to_string()))?;

        debug!(experiment_id, "cache filled from store");
        self.experiments
            .write()
            .insert(experiment.id.clone(), experiment.clone());
        Ok(experiment)
    }

    /// draft/paused → running
    pub async fn start_experiment(&self, experiment_id: &str) -> Result<()> {
        self.transition(experiment_id, |experiment| {
            match experiment.status {
                ExperimentStatus::Draft | ExperimentStatus::Paused => {
                    experiment.status = ExperimentStatus::Running;
                    experiment.start_time = Some(Utc::now());
                    Ok(())
                }
                status => Err(ExperimentError::InvalidArgument(format!(
                    "cannot start experiment '{experiment_id}' from status {status}"
                ))),
            }
        })
        .await
    }

    /// running → paused
    pub async fn pause_experiment(&self, experiment_id: &str) -> Result<()> {
        self.transition(experiment_id, |experiment| match experiment.status {
            ExperimentStatus::Running => {
                experiment.status = ExperimentStatus::Paused;
                Ok(())
            }
            status => Err(ExperimentError::InvalidArgument(format!(
                "cannot pause experiment '{experiment_id}' from status {status}"
            ))),
        })
        .await
    }

    /// running → completed, stamping the end time
    pub async fn complete_experiment(&self, experiment_id: &str) -> Result<()> {
        self.transition(experiment_id, |experiment| match experiment.status {
            ExperimentStatus::Running => {
                experiment.status = ExperimentStatus::Completed;
                experiment.end_time = Some(Utc::now());
                Ok(())
            }
            status => Err(ExperimentError::InvalidArgument(format!(
                "cannot complete experiment '{experiment_id}' from status {status}"
            ))),
        })
        .await
    }

    /// Remove the experiment plus its assignments and results
    pub async fn delete_experiment(&self, experiment_id: &str) -> Result<()> {
        self.experiments.write().remove(experiment_id);
        if let Err(err) = self.store.delete_experiment(experiment_id).await {
            warn!(experiment_id, %err, "failed to delete experiment from store");
        }
        Ok(())
    }

    /// Deterministically map a user to a variant of a running experiment
    ///
    /// A previously recorded assignment wins as long as its variant still
    /// exists; otherwise the allocation hash decides and the choice is
    /// recorded.
    pub async fn assign(&self, experiment_id: &str, user_id: &str) -> Result<Variant> {
        let experiment = self.get_experiment(experiment_id).await?;
        if !experiment.is_running() {
            return Err(ExperimentError::ExperimentNotActive(format!(
                "experiment '{}' is {}",
                experiment_id, experiment.status
            )));
        }

        if let Some(variant_id) = self.store.get_assignment(experiment_id, user_id).await? {
            if let Some(variant) = experiment.variant(&variant_id) {
                return Ok(variant.clone());
            }
            // Stale assignment against a removed variant falls through to
            // a fresh allocation.
        }

        let variant = allocation::allocate(&experiment, user_id)
            .ok_or_else(|| ExperimentError::InvalidArgument("no variants defined".to_string()))?
            .clone();

        if let Err(err) = self
            .store
            .record_assignment(experiment_id, user_id, &variant.id)
            .await
        {
            warn!(experiment_id, user_id, %err, "failed to record assignment");
        }
        debug!(experiment_id, user_id, variant_id = %variant.id, "assigned");

        Ok(variant)
    }

    /// Append a scored result for a variant
    ///
    /// Results are accepted in every experiment status; analysis is
    /// recomputed from the store.
    pub async fn record_result(
        &self,
        experiment_id: &str,
        variant_id: &str,
        result: &EvalResult,
    ) -> Result<()> {
        let experiment = self.get_experiment(experiment_id).await?;
        if experiment.variant(variant_id).is_none() {
            return Err(ExperimentError::VariantNotFound(format!(
                "variant '{variant_id}' in experiment '{experiment_id}'"
            )));
        }

        self.store
            .record_result(experiment_id, variant_id, result)
            .await
    }

    /// Per-variant statistics and winner determination over stored results
    pub async fn analyze(&self, experiment_id: &str) -> Result<ExperimentResult> {
        let experiment = self.get_experiment(experiment_id).await?;
        let stored = self.store.get_results(experiment_id).await?;
        Ok(analysis::analyze_experiment(&experiment, &stored))
    }

    /// The winning variant, iff its confidence reaches `min_confidence`
    ///
    /// `min_confidence` outside (0, 1] falls back to 0.95. The experiment
    /// is left untouched; completing it stays a caller decision.
    pub async fn auto_select_winner(
        &self,
        experiment_id: &str,
        min_confidence: f64,
    ) -> Result<Variant> {
        let min_confidence = if min_confidence <= 0.0 || min_confidence > 1.0 {
            DEFAULT_MIN_CONFIDENCE
        } else {
            min_confidence
        };

        let analysis = self.analyze(experiment_id).await?;
        let winner_id = analysis.winner.ok_or_else(|| {
            ExperimentError::NoWinner(format!(
                "experiment '{experiment_id}' has no winning variant"
            ))
        })?;
        if analysis.confidence < min_confidence {
            return Err(ExperimentError::NoWinner(format!(
                "winner '{}' confidence {:.3} below required {:.3}",
                winner_id, analysis.confidence, min_confidence
            )));
        }

        let experiment = self.get_experiment(experiment_id).await?;
        experiment
            .variant(&winner_id)
            .cloned()
            .ok_or_else(|| ExperimentError::VariantNotFound(winner_id))
    }

    /// Full statistical report with CIs, comparisons, and a recommendation
    pub async fn generate_report(&self, experiment_id: &str) -> Result<StatisticalReport> {
        let experiment = self.get_experiment(experiment_id).await?;
        let stored = self.store.get_results(experiment_id).await?;
        let analysis = analysis::analyze_experiment(&experiment, &stored);
        Ok(report::build_report(&experiment, &analysis))
    }

    /// Cached experiments, sorted by start time ascending (unstarted first)
    pub fn list_experiments(&self) -> Vec<Experiment> {
        let mut experiments: Vec<Experiment> =
            self.experiments.read().values().cloned().collect();
        experiments.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        experiments
    }

    /// Apply a lifecycle transition under the table lock, then persist
    async fn transition<F>(&self, experiment_id: &str, apply: F) -> Result<()>
    where
        F: FnOnce(&mut Experiment) -> Result<()>,
    {
        // Fill the cache first so transitions work on store-backed
        // experiments after a restart.
        self.get_experiment(experiment_id).await?;

        let updated = {
            let mut experiments = self.experiments.write();
            let experiment = experiments
                .get_mut(experiment_id)
                .ok_or_else(|| ExperimentError::ExperimentNotFound(experiment_id.to_string()))?;
            apply(experiment)?;
            experiment.clone()
        };

        if let Err(err) = self.store.save_experiment(&updated).await {
            warn!(experiment_id, %err, "failed to persist experiment transition");
        }
        Ok(())
    }
}
