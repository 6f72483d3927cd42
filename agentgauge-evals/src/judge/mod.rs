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

//! LLM-as-judge
//!
//! Scores an `(input, output)` pair on configured dimensions by prompting
//! an LLM at low temperature and normalizing its JSON verdict: dimension
//! and overall scores clamp to the configured range, confidence clamps to
//! [0, 1], and the overall score is recomputed as the weighted mean of
//! whichever configured dimensions the judge returned.

pub mod cache;
pub mod provider;
pub mod template;

pub use cache::{CacheStats, JudgeCache};
pub use template::DEFAULT_JUDGE_PROMPT;

use crate::judge::provider::{ChatMessage, ChatRequest, LlmProvider};
use crate::judge::template::TemplateContext;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::debug;

/// Errors surfaced by the judge
#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("invalid argument: {0}")]
    InvalidInput(String),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("judge timeout after {0:?}")]
    Timeout(Duration),
}

/// One scoring dimension with its relative weight
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeDimension {
    pub name: String,
    pub description: String,
    pub weight: f64,
}

impl JudgeDimension {
    pub fn new(name: impl Into<String>, description: impl Into<String>, weight: f64) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            weight,
        }
    }
}

/// Judge configuration
#[derive(Debug, Clone)]
pub struct JudgeConfig {
    pub model: String,
    pub dimensions: Vec<JudgeDimension>,
    pub score_min: f64,
    pub score_max: f64,
    pub max_concurrency: usize,
    pub timeout: Duration,
    pub temperature: f64,

    /// Reject verdicts that carry no overall reasoning
    pub require_reasoning: bool,

    pub prompt_template: String,

    /// Enables the result cache when set
    pub cache_ttl: Option<Duration>,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            dimensions: vec![
                JudgeDimension::new("relevance", "Does the response address the input?", 0.3),
                JudgeDimension::new("accuracy", "Is the response factually correct?", 0.3),
                JudgeDimension::new("completeness", "Does the response cover the input fully?", 0.2),
                JudgeDimension::new("clarity", "Is the response clear and well-structured?", 0.2),
            ],
            score_min: 0.0,
            score_max: 10.0,
            max_concurrency: 5,
            timeout: Duration::from_secs(60),
            temperature: 0.1,
            require_reasoning: false,
            prompt_template: DEFAULT_JUDGE_PROMPT.to_string(),
            cache_ttl: None,
        }
    }
}

impl JudgeConfig {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_dimensions(mut self, dimensions: Vec<JudgeDimension>) -> Self {
        self.dimensions = dimensions;
        self
    }

    pub fn with_score_range(mut self, min: f64, max: f64) -> Self {
        self.score_min = min;
        self.score_max = max;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn require_reasoning(mut self, required: bool) -> Self {
        self.require_reasoning = required;
        self
    }

    pub fn with_prompt_template(mut self, template: impl Into<String>) -> Self {
        self.prompt_template = template.into();
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }
}

/// One pair to judge
#[derive(Debug, Clone, Default)]
pub struct JudgeRequest {
    /// Input that produced the response
    pub prompt: String,

    /// Response being judged
    pub response: String,

    /// Supporting material shown to the judge, if any
    pub reference: Option<String>,

    /// Golden answer shown to the judge, if any
    pub expected: Option<String>,
}

impl JudgeRequest {
    pub fn new(prompt: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            response: response.into(),
            reference: None,
            expected: None,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_expected(mut self, expected: impl Into<String>) -> Self {
        self.expected = Some(expected.into());
        self
    }
}

/// Score and reasoning for one dimension
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimensionScore {
    pub score: f64,
    pub reasoning: String,
}

/// Normalized judge verdict
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeResult {
    /// Weighted overall score within the configured range
    pub overall_score: f64,

    /// Every configured dimension is present
    pub dimensions: HashMap<String, DimensionScore>,

    pub reasoning: String,

    /// Judge's self-reported confidence in [0, 1]
    pub confidence: f64,
}

impl JudgeResult {
    /// Overall score rescaled into [0, 1] for a given range
    ///
    /// This is the bridge into `EvalResult.score`, which the experiment
    /// engine expects normalized.
    pub fn normalized_score(&self, score_min: f64, score_max: f64) -> f64 {
        if score_max <= score_min {
            return 0.0;
        }
        ((self.overall_score - score_min) / (score_max - score_min)).clamp(0.0, 1.0)
    }

    /// Dimension scores and confidence as a flat metric map
    ///
    /// Keys are prefixed `judge_` so they never collide with scorer or
    /// registry metrics when merged into a result.
    pub fn to_metrics(&self) -> HashMap<String, f64> {
        let mut metrics: HashMap<String, f64> = self
            .dimensions
            .iter()
            .map(|(name, dimension)| (format!("judge_{name}"), dimension.score))
            .collect();
        metrics.insert("judge_confidence".to_string(), self.confidence);
        metrics
    }
}

/// Aggregate over a batch of verdicts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedJudgeResult {
    pub count: usize,
    pub mean_score: f64,

    /// Population standard deviation of overall scores
    pub std_dev: f64,

    pub dimension_means: HashMap<String, f64>,

    /// Set when score spread exceeds 20% of the configured range
    pub needs_review: bool,
    pub review_reason: Option<String>,
}

/// Wire shape of the judge's JSON verdict
#[derive(Debug, Deserialize)]
struct RawJudgeResponse {
    #[serde(default)]
    dimensions: HashMap<String, RawDimension>,
    #[serde(default)]
    overall_score: f64,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    confidence: f64,
}

#[derive(Debug, Deserialize)]
struct RawDimension {
    #[serde(default)]
    score: f64,
    #[serde(default)]
    reasoning: String,
}

/// LLM-backed scorer over configured dimensions
pub struct LlmJudge {
    provider: Arc<dyn LlmProvider>,
    config: JudgeConfig,
    semaphore: Arc<Semaphore>,
    cache: Option<JudgeCache>,
}

impl LlmJudge {
    pub fn new(provider: Arc<dyn LlmProvider>, config: JudgeConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrency.max(1)));
        let cache = config.cache_ttl.map(JudgeCache::new);
        Self {
            provider,
            config,
            semaphore,
            cache,
        }
    }

    pub fn with_default_config(provider: Arc<dyn LlmProvider>) -> Self {
        Self::new(provider, JudgeConfig::default())
    }

    pub fn config(&self) -> &JudgeConfig {
        &self.config
    }

    /// Cache effectiveness, when the cache is enabled
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(JudgeCache::stats)
    }

    /// Judge one pair
    pub async fn judge(&self, request: &JudgeRequest) -> Result<JudgeResult, JudgeError> {
        let key = JudgeCache::key(request, &self.config.model);
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(key).await {
                debug!(model = %self.config.model, "judge cache hit");
                return Ok(hit);
            }
        }

        let prompt = template::render(
            &self.config.prompt_template,
            &TemplateContext {
                prompt: &request.prompt,
                response: &request.response,
                reference: request.reference.as_deref(),
                expected: request.expected.as_deref(),
                score_min: self.config.score_min,
                score_max: self.config.score_max,
                dimensions: &self.config.dimensions,
            },
        );

        let chat = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage::system(
                    "You are an expert evaluator. Respond only with valid JSON.",
                ),
                ChatMessage::user(prompt),
            ],
            temperature: self.config.temperature,
        };

        let response = tokio::time::timeout(self.config.timeout, self.provider.completion(chat))
            .await
            .map_err(|_| JudgeError::Timeout(self.config.timeout))?
            .map_err(|err| JudgeError::Upstream(err.to_string()))?;

        let content = response
            .content()
            .ok_or_else(|| JudgeError::Upstream("empty completion".to_string()))?;

        let raw = parse_judge_json(content)?;
        if self.config.require_reasoning && raw.reasoning.trim().is_empty() {
            return Err(JudgeError::InvalidResponse(
                "verdict carries no reasoning".to_string(),
            ));
        }

        let result = self.normalize(raw);
        if let Some(cache) = &self.cache {
            cache.insert(key, result.clone()).await;
        }
        Ok(result)
    }

    /// Judge many pairs in parallel, bounded by `max_concurrency`
    ///
    /// Failures stay per-pair; one bad verdict never sinks the batch.
    pub async fn judge_batch(
        &self,
        requests: &[JudgeRequest],
    ) -> Vec<Result<JudgeResult, JudgeError>> {
        let runs = requests.iter().map(|request| {
            let semaphore = self.semaphore.clone();
            async move {
                let _permit = semaphore.acquire_owned().await.ok();
                self.judge(request).await
            }
        });
        futures::future::join_all(runs).await
    }

    /// Mean, spread, and per-dimension means over a set of verdicts
    pub fn aggregate_results(&self, results: &[JudgeResult]) -> AggregatedJudgeResult {
        if results.is_empty() {
            return AggregatedJudgeResult {
                count: 0,
                mean_score: 0.0,
                std_dev: 0.0,
                dimension_means: HashMap::new(),
                needs_review: false,
                review_reason: None,
            };
        }

        let n = results.len() as f64;
        let mean_score = results.iter().map(|r| r.overall_score).sum::<f64>() / n;
        let std_dev = (results
            .iter()
            .map(|r| (r.overall_score - mean_score).powi(2))
            .sum::<f64>()
            / n)
            .sqrt();

        let mut sums: HashMap<String, (f64, usize)> = HashMap::new();
        for result in results {
            for (name, dimension) in &result.dimensions {
                let entry = sums.entry(name.clone()).or_insert((0.0, 0));
                entry.0 += dimension.score;
                entry.1 += 1;
            }
        }
        let dimension_means = sums
            .into_iter()
            .map(|(name, (sum, count))| (name, sum / count as f64))
            .collect();

        let range = self.config.score_max - self.config.score_min;
        let needs_review = std_dev > 0.2 * range;
        let review_reason = needs_review.then(|| {
            format!(
                "score spread is high: stddev {:.2} exceeds 20% of the [{}, {}] range",
                std_dev, self.config.score_min, self.config.score_max
            )
        });

        AggregatedJudgeResult {
            count: results.len(),
            mean_score,
            std_dev,
            dimension_means,
            needs_review,
            review_reason,
        }
    }

    /// Clamp, reweigh, and backfill a raw verdict
    fn normalize(&self, raw: RawJudgeResponse) -> JudgeResult {
        let (lo, hi) = (self.config.score_min, self.config.score_max);

        let mut dimensions: HashMap<String, DimensionScore> = raw
            .dimensions
            .into_iter()
            .map(|(name, d)| {
                (
                    name,
                    DimensionScore {
                        score: d.score.clamp(lo, hi),
                        reasoning: d.reasoning,
                    },
                )
            })
            .collect();

        let mut overall = raw.overall_score.clamp(lo, hi);

        // Weighted mean over whichever configured dimensions came back.
        let mut weighted = 0.0;
        let mut total_weight = 0.0;
        for dimension in &self.config.dimensions {
            if let Some(scored) = dimensions.get(&dimension.name) {
                weighted += dimension.weight * scored.score;
                total_weight += dimension.weight;
            }
        }
        if total_weight > 0.0 {
            overall = (weighted / total_weight).clamp(lo, hi);
        }

        // Every configured dimension appears in the verdict; absent ones
        // inherit the overall score.
        for dimension in &self.config.dimensions {
            dimensions
                .entry(dimension.name.clone())
                .or_insert_with(|| DimensionScore {
                    score: overall,
                    reasoning: String::new(),
                });
        }

        JudgeResult {
            overall_score: overall,
            dimensions,
            reasoning: raw.reasoning,
            confidence: raw.confidence.clamp(0.0, 1.0),
        }
    }
}

/// Substring between the first `{` and the last `}`, inclusive
fn extract_json(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&content[start..=end])
}

fn parse_judge_json(content: &str) -> Result<RawJudgeResponse, JudgeError> {
    let json = extract_json(content)
        .ok_or_else(|| JudgeError::Upstream("no JSON object in judge response".to_string()))?;
    serde_json::from_str(json)
        .map_err(|err| JudgeError::Upstream(format!("malformed judge JSON: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judge::provider::{ChatResponse, Choice, ProviderError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Provider that replies with fixed content
    struct StubProvider {
        content: String,
        calls: AtomicUsize,
    }

    impl StubProvider {
        fn replying(content: &str) -> Arc<Self> {
            Arc::new(Self {
                content: content.to_string(),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl LlmProvider for StubProvider {
        async fn completion(&self, _request: ChatRequest) -> Result<ChatResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ChatResponse {
                choices: vec![Choice {
                    message: ChatMessage {
                        role: "assistant".to_string(),
                        content: self.content.clone(),
                    },
                }],
            })
        }
    }

    fn two_dim_config() -> JudgeConfig {
        JudgeConfig::default().with_dimensions(vec![
            JudgeDimension::new("a", "first", 0.5),
            JudgeDimension::new("b", "second", 0.5),
        ])
    }

    #[tokio::test]
    async fn test_weighted_overall_score() {
        let provider = StubProvider::replying(
            r#"{"dimensions":{"a":{"score":6,"reasoning":"fine"},"b":{"score":8,"reasoning":"good"}},"overall_score":5,"reasoning":"solid","confidence":0.9}"#,
        );
        let judge = LlmJudge::new(provider, two_dim_config());

        let result = judge
            .judge(&JudgeRequest::new("prompt", "response"))
            .await
            .unwrap();

        // (0.5·6 + 0.5·8) / 1.0 = 7.0, overriding the judge's own 5.
        assert!((result.overall_score - 7.0).abs() < 0.01);
        assert_eq!(result.confidence, 0.9);
        assert_eq!(result.dimensions["a"].score, 6.0);
        assert_eq!(result.dimensions["b"].score, 8.0);
    }

    #[tokio::test]
    async fn test_clamping_and_backfill() {
        let provider = StubProvider::replying(
            r#"{"dimensions":{"a":{"score":15,"reasoning":""}},"overall_score":-3,"reasoning":"r","confidence":1.7}"#,
        );
        let judge = LlmJudge::new(provider, two_dim_config());

        let result = judge
            .judge(&JudgeRequest::new("prompt", "response"))
            .await
            .unwrap();

        // Dimension clamped into [0, 10]; overall recomputed from it.
        assert_eq!(result.dimensions["a"].score, 10.0);
        assert_eq!(result.overall_score, 10.0);
        assert_eq!(result.confidence, 1.0);
        // Missing configured dimension backfilled at the overall score.
        assert_eq!(result.dimensions["b"].score, 10.0);
        assert_eq!(result.dimensions.len(), 2);
    }

    #[tokio::test]
    async fn test_prose_around_json_is_tolerated() {
        let provider = StubProvider::replying(
            "Here is my assessment:\n{\"overall_score\": 6, \"reasoning\": \"ok\", \"confidence\": 0.8}\nThank you.",
        );
        let judge = LlmJudge::new(provider, JudgeConfig::default());

        let result = judge
            .judge(&JudgeRequest::new("p", "r"))
            .await
            .unwrap();
        assert_eq!(result.overall_score, 6.0);
    }

    #[tokio::test]
    async fn test_missing_json_is_upstream_error() {
        let provider = StubProvider::replying("I cannot score this.");
        let judge = LlmJudge::new(provider, JudgeConfig::default());

        let err = judge
            .judge(&JudgeRequest::new("p", "r"))
            .await
            .unwrap_err();
        assert!(matches!(err, JudgeError::Upstream(_)));
        assert!(err.to_string().starts_with("upstream error"));
    }

    #[tokio::test]
    async fn test_require_reasoning() {
        let provider =
            StubProvider::replying(r#"{"overall_score": 6, "reasoning": "", "confidence": 0.8}"#);
        let judge = LlmJudge::new(provider, JudgeConfig::default().require_reasoning(true));

        let err = judge
            .judge(&JudgeRequest::new("p", "r"))
            .await
            .unwrap_err();
        assert!(matches!(err, JudgeError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_batch_returns_per_pair_results() {
        let provider = StubProvider::replying(
            r#"{"overall_score": 7, "reasoning": "ok", "confidence": 0.8}"#,
        );
        let judge = LlmJudge::new(provider.clone(), JudgeConfig::default());

        let requests: Vec<JudgeRequest> = (0..8)
            .map(|i| JudgeRequest::new(format!("p-{i}"), "r"))
            .collect();
        let results = judge.judge_batch(&requests).await;

        assert_eq!(results.len(), 8);
        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 8);
    }

    #[tokio::test]
    async fn test_cache_short_circuits_repeat_judgments() {
        let provider = StubProvider::replying(
            r#"{"overall_score": 7, "reasoning": "ok", "confidence": 0.8}"#,
        );
        let judge = LlmJudge::new(
            provider.clone(),
            JudgeConfig::default().with_cache_ttl(Duration::from_secs(60)),
        );

        let request = JudgeRequest::new("same prompt", "same response");
        judge.judge(&request).await.unwrap();
        judge.judge(&request).await.unwrap();

        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        let stats = judge.cache_stats().unwrap();
        assert_eq!(stats.hits, 1);
    }

    #[test]
    fn test_aggregate_results() {
        let judge = LlmJudge::new(
            StubProvider::replying("{}"),
            JudgeConfig::default(),
        );

        let make = |score: f64| JudgeResult {
            overall_score: score,
            dimensions: HashMap::from([(
                "a".to_string(),
                DimensionScore {
                    score,
                    reasoning: String::new(),
                },
            )]),
            reasoning: String::new(),
            confidence: 1.0,
        };

        let agg = judge.aggregate_results(&[make(6.0), make(8.0)]);
        assert_eq!(agg.count, 2);
        assert!((agg.mean_score - 7.0).abs() < 1e-12);
        // Population divisor: stddev of {6, 8} is 1.
        assert!((agg.std_dev - 1.0).abs() < 1e-12);
        assert!((agg.dimension_means["a"] - 7.0).abs() < 1e-12);
        assert!(!agg.needs_review);

        // Spread of {0, 10} is 5, past 20% of the 10-point range.
        let agg = judge.aggregate_results(&[make(0.0), make(10.0)]);
        assert!(agg.needs_review);
        assert!(agg.review_reason.unwrap().contains("stddev"));

        let empty = judge.aggregate_results(&[]);
        assert_eq!(empty.count, 0);
        assert!(!empty.needs_review);
    }

    #[test]
    fn test_normalized_score_and_metric_bridge() {
        let result = JudgeResult {
            overall_score: 7.0,
            dimensions: HashMap::from([(
                "accuracy".to_string(),
                DimensionScore {
                    score: 8.0,
                    reasoning: String::new(),
                },
            )]),
            reasoning: String::new(),
            confidence: 0.9,
        };

        assert!((result.normalized_score(0.0, 10.0) - 0.7).abs() < 1e-12);
        // Degenerate range collapses to 0 instead of dividing by zero.
        assert_eq!(result.normalized_score(5.0, 5.0), 0.0);

        let metrics = result.to_metrics();
        assert_eq!(metrics["judge_accuracy"], 8.0);
        assert_eq!(metrics["judge_confidence"], 0.9);
    }

    #[test]
    fn test_extract_json_bounds() {
        assert_eq!(extract_json("abc {\"x\":1} def"), Some("{\"x\":1}"));
        assert_eq!(extract_json("no braces"), None);
        assert_eq!(extract_json("} reversed {"), None);
    }
}
