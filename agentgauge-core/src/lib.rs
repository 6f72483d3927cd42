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

//! Agentgauge Core
//!
//! Shared data contracts for the Agentgauge evaluation core: the tasks fed
//! into the evaluation pipeline and the scored results that flow from the
//! pipeline into the experiment engine's store.

pub mod result;
pub mod task;

pub use result::EvalResult;
pub use task::{EvalSuite, EvalTask};
