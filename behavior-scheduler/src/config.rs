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
//! Scheduler configuration
//!
//! # Environment Configuration
//!
//! [`SchedulerConfig::load_or_default`] reads:
//!
//! ```bash
//! export BEHAVIOR_MAX_ACTIVATIONS_PER_TIER=18446744073709551615,200,50,10
//! export BEHAVIOR_TICK_PARALLEL=true
//! export BEHAVIOR_DEFAULT_TIER=2
//! ```
//!
//! Malformed values are logged and the defaults kept.

use crate::error::SchedulerError;
use crate::signal::SignalName;

/// How a tick controller walks its batches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// One batch after another on the calling thread
    #[default]
    Sequential,
    /// Batches spread over the rayon pool, entities within a batch in order
    ///
    /// Falls back to sequential when the `parallel` feature is disabled.
    Parallel,
}

/// Per-tier cold start budget
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionConfig {
    /// Maximum activations per frame, indexed by importance tier
    ///
    /// Tiers past the end of the table use the last entry.
    pub max_activations_per_tier: Vec<usize>,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_activations_per_tier: vec![usize::MAX, 100, 100, 100],
        }
    }
}

impl AdmissionConfig {
    /// Budget of `tier` for one frame
    pub fn cap(&self, tier: u8) -> usize {
        self.max_activations_per_tier
            .get(tier as usize)
            .or_else(|| self.max_activations_per_tier.last())
            .copied()
            .unwrap_or(usize::MAX)
    }
}

/// Scheduler configuration
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    /// Cold start budget
    pub admission: AdmissionConfig,
    /// Execution mode of every tick controller
    pub tick_mode: ExecutionMode,
    /// Tier of batches that carry no importance classification
    pub default_tier: u8,
    /// Signals tick controllers listen to besides the built-in ones
    pub extra_signals: Vec<SignalName>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            admission: AdmissionConfig::default(),
            tick_mode: ExecutionMode::Sequential,
            default_tier: 0,
            extra_signals: Vec::new(),
        }
    }
}

impl SchedulerConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        if let Ok(caps) = std::env::var("BEHAVIOR_MAX_ACTIVATIONS_PER_TIER") {
            match parse_tier_caps(&caps) {
                Some(parsed) => config.admission.max_activations_per_tier = parsed,
                None => tracing::warn!(
                    "Invalid BEHAVIOR_MAX_ACTIVATIONS_PER_TIER '{}', using default",
                    caps
                ),
            }
        }

        if let Ok(parallel) = std::env::var("BEHAVIOR_TICK_PARALLEL") {
            match parse_bool(&parallel) {
                Some(true) => config.tick_mode = ExecutionMode::Parallel,
                Some(false) => config.tick_mode = ExecutionMode::Sequential,
                None => tracing::warn!("Invalid BEHAVIOR_TICK_PARALLEL '{}', using default", parallel),
            }
        }

        if let Ok(tier) = std::env::var("BEHAVIOR_DEFAULT_TIER") {
            if let Ok(parsed) = tier.trim().parse::<u8>() {
                config.default_tier = parsed;
            } else {
                tracing::warn!("Invalid BEHAVIOR_DEFAULT_TIER '{}', using default", tier);
            }
        }

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.admission.max_activations_per_tier.is_empty() {
            return Err(SchedulerError::InvalidConfig(
                "max_activations_per_tier needs at least one tier".to_string(),
            ));
        }
        Ok(())
    }

    /// Replace the per-tier activation caps
    pub fn with_tier_caps(mut self, caps: impl Into<Vec<usize>>) -> Self {
        self.admission.max_activations_per_tier = caps.into();
        self
    }

    /// Set the tick controllers' execution mode
    pub fn with_tick_mode(mut self, mode: ExecutionMode) -> Self {
        self.tick_mode = mode;
        self
    }

    /// Set the tier of unclassified batches
    pub fn with_default_tier(mut self, tier: u8) -> Self {
        self.default_tier = tier;
        self
    }

    /// Make tick controllers wake up on `name` as well
    pub fn with_extra_signal(mut self, name: SignalName) -> Self {
        if !self.extra_signals.contains(&name) {
            self.extra_signals.push(name);
        }
        self
    }
}

fn parse_tier_caps(value: &str) -> Option<Vec<usize>> {
    let caps: Result<Vec<usize>, _> = value
        .split(',')
        .map(|part| part.trim().parse::<usize>())
        .collect();
    caps.ok().filter(|caps| !caps.is_empty())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
