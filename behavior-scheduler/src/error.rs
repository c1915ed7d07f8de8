// Copyright 2025 John Brosnihan
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
//! Scheduler error taxonomy
//!
//! None of these errors cross a controller boundary. The controller that
//! detects one logs it, counts it and moves on; the only visible effect is an
//! entity that did not progress this frame.
//!
//! Stale instance handles are deliberately not an error: a failed handle
//! lookup just means the instance's lifecycle has moved on.

use crate::ecs::RequirementCategory;

/// Errors produced while configuring or running behavior controllers
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    /// A dependency has no native requirement category and was dropped
    #[error("behavior asset '{asset}' declares dependency '{type_name}' with no native requirement category")]
    UnmappedDependency {
        /// Asset that declared the dependency
        asset: String,
        /// Offending type
        type_name: &'static str,
    },

    /// A scheduled batch lacks data its controller requires
    #[error("controller '{controller}' skipped a batch: missing {category} '{type_name}'")]
    MissingRequirement {
        /// Controller that rejected the batch
        controller: String,
        /// Category the type was required in
        category: RequirementCategory,
        /// Missing type
        type_name: &'static str,
    },

    /// Configuration values are unusable
    #[error("invalid scheduler configuration: {0}")]
    InvalidConfig(String),
}
