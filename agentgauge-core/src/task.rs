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

//! Evaluation tasks and suites
//!
//! A task is one prompt sent to the agent under evaluation, optionally with
//! a golden answer; a suite is an ordered collection of tasks that is run as
//! a unit. Both are caller-owned and immutable during a run.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// A single evaluation task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalTask {
    /// Unique task identifier
    pub id: String,

    /// Human-readable name
    pub name: String,

    /// Input text sent to the agent
    pub input: String,

    /// Expected output (golden answer), if any
    #[serde(default)]
    pub expected: Option<String>,

    /// Free-form metadata; `type` selects a registered scorer
    #[serde(default)]
    pub metadata: HashMap<String, String>,

    /// Tags for filtering and grouping
    #[serde(default)]
    pub tags: Vec<String>,

    /// Per-task timeout; falls back to the pipeline default when absent
    #[serde(default)]
    pub timeout: Option<Duration>,
}

impl EvalTask {
    pub fn new(id: impl Into<String>, name: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input: input.into(),
            expected: None,
            metadata: HashMap::new(),
            tags: Vec::new(),
            timeout: None,
        }
    }

    pub fn with_expected(mut self, expected: impl Into<String>) -> Self {
        self.expected = Some(expected.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Scorer type declared in metadata, if any
    pub fn task_type(&self) -> Option<&str> {
        self.metadata.get("type").map(String::as_str)
    }
}

/// An ordered collection of tasks executed as one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalSuite {
    /// Unique suite identifier
    pub id: String,

    /// Human-readable name
    pub name: String,

    /// Tasks in execution order
    pub tasks: Vec<EvalTask>,
}

impl EvalSuite {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            tasks: Vec::new(),
        }
    }

    pub fn with_task(mut self, task: EvalTask) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
