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

//! Judge result caching
//!
//! Judging the same `(input, output)` pair twice costs a second LLM call
//! for an identical answer at temperature 0.1. The cache keys on the full
//! request plus the model and keeps results for a configurable TTL.

use super::{JudgeRequest, JudgeResult};
use moka::future::Cache;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const MAX_ENTRIES: u64 = 10_000;

/// TTL cache for judge results with hit/miss accounting
pub struct JudgeCache {
    cache: Cache<u64, JudgeResult>,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Copy-out view of cache effectiveness
#[derive(Debug, Clone, Copy)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub entry_count: u64,
}

impl JudgeCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(MAX_ENTRIES)
                .time_to_live(ttl)
                .build(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Cache key over the request content and the judging model
    pub(crate) fn key(request: &JudgeRequest, model: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        request.prompt.hash(&mut hasher);
        request.response.hash(&mut hasher);
        request.reference.hash(&mut hasher);
        request.expected.hash(&mut hasher);
        model.hash(&mut hasher);
        hasher.finish()
    }

    pub(crate) async fn get(&self, key: u64) -> Option<JudgeResult> {
        match self.cache.get(&key).await {
            Some(result) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(result)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub(crate) async fn insert(&self, key: u64, result: JudgeResult) {
        self.cache.insert(key, result).await;
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            hits,
            misses,
            hit_rate: if total > 0 {
                hits as f64 / total as f64
            } else {
                0.0
            },
            entry_count: self.cache.entry_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn request(prompt: &str) -> JudgeRequest {
        JudgeRequest::new(prompt, "response")
    }

    fn result(score: f64) -> JudgeResult {
        JudgeResult {
            overall_score: score,
            dimensions: HashMap::new(),
            reasoning: String::new(),
            confidence: 1.0,
        }
    }

    #[test]
    fn test_key_is_content_sensitive() {
        let a = JudgeCache::key(&request("p1"), "m");
        let b = JudgeCache::key(&request("p2"), "m");
        let c = JudgeCache::key(&request("p1"), "other-model");
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, JudgeCache::key(&request("p1"), "m"));
    }

    #[tokio::test]
    async fn test_hit_miss_accounting() {
        let cache = JudgeCache::new(Duration::from_secs(60));
        let key = JudgeCache::key(&request("p"), "m");

        assert!(cache.get(key).await.is_none());
        cache.insert(key, result(7.0)).await;
        assert_eq!(cache.get(key).await.unwrap().overall_score, 7.0);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate - 0.5).abs() < 1e-12);
    }
}
