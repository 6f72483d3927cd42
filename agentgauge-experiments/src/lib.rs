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

//! # Agentgauge Experiment Engine
//!
//! Online A/B experimentation between competing agent/model configurations:
//! experiment lifecycle management, deterministic traffic allocation by
//! consistent hashing, per-variant result accumulation, and statistical
//! analysis (Welch's t-test, confidence intervals, winner selection, report
//! generation).
//!
//! ## Example
//!
//! ```rust,ignore
//! use agentgauge_experiments::{Experiment, ExperimentEngine, MemoryStore, Variant};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let engine = ExperimentEngine::new(Arc::new(MemoryStore::new()));
//!
//!     let exp = Experiment::new("exp-1", "prompt-v2 rollout")
//!         .with_variant(Variant::new("control", "baseline prompt", 0.5).control())
//!         .with_variant(Variant::new("treatment", "candidate prompt", 0.5));
//!     engine.create_experiment(exp).await?;
//!     engine.start_experiment("exp-1").await?;
//!
//!     let variant = engine.assign("exp-1", "user-42").await?;
//!     // ... run the agent with variant.config, record results ...
//!     let report = engine.generate_report("exp-1").await?;
//!     println!("{}", report.recommendation);
//!     Ok(())
//! }
//! ```

use thiserror::Error;

pub mod allocation;
pub mod analysis;
pub mod engine;
pub mod experiment;
pub mod report;
pub mod stats;
pub mod store;

pub use agentgauge_core::EvalResult;
pub use analysis::{ExperimentResult, VariantResult};
pub use engine::ExperimentEngine;
pub use experiment::{Experiment, ExperimentStatus, Variant};
pub use report::{
    ComparisonReport, EffectSize, MetricComparison, StatisticalReport, VariantReport,
};
pub use stats::{welch_t_test, WelchResult};
pub use store::{ExperimentStore, MemoryStore};

/// Errors surfaced by the experiment engine and its store
#[derive(Debug, Error)]
pub enum ExperimentError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("experiment not found: {0}")]
    ExperimentNotFound(String),

    #[error("variant not found: {0}")]
    VariantNotFound(String),

    #[error("experiment not active: {0}")]
    ExperimentNotActive(String),

    #[error("no significant winner: {0}")]
    NoWinner(String),

    #[error("upstream error: {0}")]
    Store(String),
}

pub type Result<T> = std::result::Result<T, ExperimentError>;
