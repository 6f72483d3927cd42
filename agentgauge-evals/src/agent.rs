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

//! The agent under evaluation

use crate::EvalError;
use async_trait::async_trait;

/// Output of one agent execution
#[derive(Debug, Clone)]
pub struct AgentResponse {
    pub output: String,
    pub tokens_used: u64,
}

impl AgentResponse {
    pub fn new(output: impl Into<String>, tokens_used: u64) -> Self {
        Self {
            output: output.into(),
            tokens_used,
        }
    }
}

/// The thing being evaluated
///
/// Implementations must be safe for concurrent use; the pipeline calls
/// `execute` from many tasks at once, each under its own deadline.
#[async_trait]
pub trait AgentExecutor: Send + Sync {
    async fn execute(&self, input: &str) -> Result<AgentResponse, EvalError>;
}
