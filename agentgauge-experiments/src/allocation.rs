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

//! Deterministic traffic allocation
//!
//! Maps `(experiment_id, user_id)` to a variant as a pure function: the same
//! pair lands on the same variant across calls, process restarts, and engine
//! instances. SHA-256 is required here; the empirical-share guarantees are
//! validated against its distribution.

use crate::experiment::{Experiment, Variant};
use sha2::{Digest, Sha256};

/// Position of a user in the unit interval for a given experiment
///
/// First 8 bytes of SHA-256("{experiment_id}:{user_id}") as a big-endian
/// u64, normalized to [0, 1).
pub fn bucket(experiment_id: &str, user_id: &str) -> f64 {
    let digest = Sha256::digest(format!("{experiment_id}:{user_id}").as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    let h = u64::from_be_bytes(prefix);
    h as f64 / 18_446_744_073_709_551_616.0 // 2^64
}

/// Pick the variant for a user by cumulative weight over the unit interval
///
/// Returns the smallest index k with `Σᵢ≤ₖ wᵢ > r · W`; the last variant
/// absorbs any floating-point edge where the cumulative sum never clears
/// the threshold.
pub fn allocate<'a>(experiment: &'a Experiment, user_id: &str) -> Option<&'a Variant> {
    if experiment.variants.is_empty() {
        return None;
    }

    let threshold = bucket(&experiment.id, user_id) * experiment.total_weight();
    let mut cumulative = 0.0;
    for variant in &experiment.variants {
        cumulative += variant.weight;
        if cumulative > threshold {
            return Some(variant);
        }
    }
    experiment.variants.last()
}
