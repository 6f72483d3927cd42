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

//! LLM provider abstraction for the judge

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Completion request the judge sends to its provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
}

/// One completion choice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub message: ChatMessage,
}

/// Provider response; only the choices matter to the judge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<Choice>,
}

impl ChatResponse {
    /// Content of the first choice, if any
    pub fn content(&self) -> Option<&str> {
        self.choices.first().map(|c| c.message.content.as_str())
    }
}

/// Errors from LLM providers
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("API error: {0}")]
    Api(String),

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Request/response transport to an LLM
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn completion(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError>;
}

/// Reference provider for any OpenAI-compatible chat completion endpoint
pub struct OpenAiProvider {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Point at a compatible endpoint (proxy, local server, mock)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn completion(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Err(ProviderError::RateLimited);
            }
            let error_text = response.text().await?;
            return Err(ProviderError::Api(error_text));
        }

        let parsed: ChatResponse = response.json().await?;
        if parsed.choices.is_empty() {
            return Err(ProviderError::InvalidResponse(
                "no choices in completion".to_string(),
            ));
        }
        Ok(parsed)
    }
}

/// Reference provider for the Anthropic Messages API
///
/// Adapts the chat request shape: system messages move to the top-level
/// `system` field, and the first content block of the reply becomes the
/// single choice.
pub struct AnthropicProvider {
    api_key: String,
    model_max_tokens: u32,
    base_url: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model_max_tokens: 4096,
            base_url: "https://api.anthropic.com/v1".to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.model_max_tokens = max_tokens;
        self
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn completion(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let system: Vec<&str> = request
            .messages
            .iter()
            .filter(|m| m.role == "system")
            .map(|m| m.content.as_str())
            .collect();
        let messages: Vec<&ChatMessage> = request
            .messages
            .iter()
            .filter(|m| m.role != "system")
            .collect();

        let body = serde_json::json!({
            "model": request.model,
            "max_tokens": self.model_max_tokens,
            "system": system.join("\n"),
            "messages": messages,
            "temperature": request.temperature,
        });

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Err(ProviderError::RateLimited);
            }
            let error_text = response.text().await?;
            return Err(ProviderError::Api(error_text));
        }

        let parsed: serde_json::Value = response.json().await?;
        let content = parsed["content"][0]["text"]
            .as_str()
            .ok_or_else(|| ProviderError::InvalidResponse("missing content".to_string()))?;

        Ok(ChatResponse {
            choices: vec![Choice {
                message: ChatMessage {
                    role: "assistant".to_string(),
                    content: content.to_string(),
                },
            }],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_openai_provider_against_mock_endpoint() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"choices":[{"message":{"role":"assistant","content":"{\"overall_score\": 8}"}}]}"#,
            )
            .create_async()
            .await;

        let provider = OpenAiProvider::new("test-key").with_base_url(server.url());
        let response = provider
            .completion(ChatRequest {
                model: "gpt-4o-mini".to_string(),
                messages: vec![ChatMessage::user("score this")],
                temperature: 0.1,
            })
            .await
            .unwrap();

        assert_eq!(response.content().unwrap(), r#"{"overall_score": 8}"#);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_anthropic_provider_adapts_the_wire_shape() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/messages")
            .match_header("x-api-key", "test-key")
            .match_header("anthropic-version", "2023-06-01")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"content":[{"type":"text","text":"{\"overall_score\": 7}"}]}"#)
            .create_async()
            .await;

        let provider = AnthropicProvider::new("test-key").with_base_url(server.url());
        let response = provider
            .completion(ChatRequest {
                model: "claude-3-5-haiku-20241022".to_string(),
                messages: vec![
                    ChatMessage::system("You are an evaluator."),
                    ChatMessage::user("score this"),
                ],
                temperature: 0.1,
            })
            .await
            .unwrap();

        assert_eq!(response.content().unwrap(), r#"{"overall_score": 7}"#);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rate_limit_maps_to_dedicated_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .create_async()
            .await;

        let provider = OpenAiProvider::new("k").with_base_url(server.url());
        let err = provider
            .completion(ChatRequest {
                model: "m".to_string(),
                messages: vec![ChatMessage::user("x")],
                temperature: 0.1,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::RateLimited));
    }

    #[tokio::test]
    async fn test_empty_choices_rejected() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[]}"#)
            .create_async()
            .await;

        let provider = OpenAiProvider::new("k").with_base_url(server.url());
        let err = provider
            .completion(ChatRequest {
                model: "m".to_string(),
                messages: vec![ChatMessage::user("x")],
                temperature: 0.1,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse(_)));
    }
}
