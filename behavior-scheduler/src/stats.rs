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
//! Frame counters
//!
//! An entity that never leaves its cold state produces no error. These
//! counters are how that situation is diagnosed: per tier, how many entities
//! waited for activation, how many were admitted and how many batches were
//! pushed to a later frame.

/// Admission counters of one importance tier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TierStats {
    /// Entities found waiting for activation
    pub attempted: usize,
    /// Entities started
    pub granted: usize,
    /// Batches skipped because the tier's budget was spent
    pub deferred_batches: usize,
}

impl TierStats {
    fn merge(&mut self, other: &TierStats) {
        self.attempted += other.attempted;
        self.granted += other.granted;
        self.deferred_batches += other.deferred_batches;
    }
}

/// Counters of one frame, or the sum of many
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Admission counters indexed by tier
    pub tiers: Vec<TierStats>,
    /// Tick calls, not counting re-ticks
    pub ticks: usize,
    /// Immediate zero-delta re-ticks
    pub reticks: usize,
    /// Entities queued for re-evaluation next frame
    pub resignaled: usize,
    /// Signaled entities whose instance was already gone
    pub stale_handles: usize,
    /// Batches abandoned because required data was missing
    pub aborted_batches: usize,
    /// Instances stopped and released
    pub finalized: usize,
    /// Tick controllers created
    pub controllers_created: usize,
}

impl FrameStats {
    /// Empty counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Counters of `tier`, zero if the tier saw no activity
    pub fn tier(&self, tier: u8) -> TierStats {
        self.tiers.get(tier as usize).copied().unwrap_or_default()
    }

    pub(crate) fn tier_mut(&mut self, tier: u8) -> &mut TierStats {
        let index = tier as usize;
        if self.tiers.len() <= index {
            self.tiers.resize(index + 1, TierStats::default());
        }
        &mut self.tiers[index]
    }

    /// Entities started across all tiers
    pub fn activated(&self) -> usize {
        self.tiers.iter().map(|t| t.granted).sum()
    }

    /// Entities still waiting after admission, across all tiers
    pub fn deferred(&self) -> usize {
        self.tiers
            .iter()
            .map(|t| t.attempted.saturating_sub(t.granted))
            .sum()
    }

    /// Share of waiting entities that were admitted, as a percentage
    pub fn admission_rate(&self) -> f64 {
        let attempted: usize = self.tiers.iter().map(|t| t.attempted).sum();
        if attempted == 0 {
            0.0
        } else {
            (self.activated() as f64 / attempted as f64) * 100.0
        }
    }

    /// Add another set of counters to this one
    pub fn merge(&mut self, other: &FrameStats) {
        for (tier, stats) in other.tiers.iter().enumerate() {
            let tier = u8::try_from(tier).unwrap_or(u8::MAX);
            self.tier_mut(tier).merge(stats);
        }
        self.ticks += other.ticks;
        self.reticks += other.reticks;
        self.resignaled += other.resignaled;
        self.stale_handles += other.stale_handles;
        self.aborted_batches += other.aborted_batches;
        self.finalized += other.finalized;
        self.controllers_created += other.controllers_created;
    }
}
