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
//! Cold start of behavior instances
//!
//! Entities carrying a [`BehaviorInstance`] but no [`BehaviorActivated`] tag
//! are started here: an arena slot is assigned, the machine's `start` runs,
//! and the tag is added through a deferred command. Every started entity is
//! then sent [`ACTIVATED`](crate::signal::signals::ACTIVATED) so the tick
//! controllers pick it up in the same frame.
//!
//! # Admission
//!
//! Starting a machine is expensive, so each importance tier has a per-frame
//! budget. Admission is decided per batch: a batch is skipped once its tier's
//! running total has reached the cap, otherwise all of its entities are
//! started and the total grows by the batch size. A tier can therefore
//! overshoot its cap by at most one batch. Skipped entities stay cold and are
//! retried next frame.

use crate::arena::InstanceArena;
use crate::behavior::{
    BatchOutbox, BehaviorActivated, BehaviorAssetRef, BehaviorInstance, ExecutionContext,
    ImportanceTier,
};
use crate::config::SchedulerConfig;
use crate::ecs::{Access, Entity, Requirements, TypeInfo, World};
use crate::signal::{signals, SignalBus};
use crate::stats::FrameStats;
use rustc_hash::FxHashMap;
use tracing::warn;

const CONTROLLER_NAME: &str = "activation";

/// Starts cold behavior instances under per-tier admission caps
pub struct ActivationController {
    requirements: Requirements,
}

impl ActivationController {
    /// Create the controller
    pub fn new() -> Self {
        let mut requirements = Requirements::new();
        requirements.add_fragment(TypeInfo::of::<BehaviorInstance>(), Access::ReadWrite);
        requirements.add_tag_none(TypeInfo::of::<BehaviorActivated>());
        requirements.add_const_shared(TypeInfo::of::<BehaviorAssetRef>());
        ActivationController { requirements }
    }

    /// Native requirements of the controller
    ///
    /// [`ImportanceTier`] is not among them. It is read when present, and
    /// batches without one fall back to the configured default tier.
    pub fn requirements(&self) -> &Requirements {
        &self.requirements
    }

    /// Start admitted entities, apply their deferred output and signal them
    ///
    /// Returns the started entities in processing order.
    pub(crate) fn run(
        &self,
        world: &mut World,
        arena: &mut InstanceArena,
        bus: &mut SignalBus,
        config: &SchedulerConfig,
        now: f64,
        stats: &mut FrameStats,
    ) -> Vec<Entity> {
        let mut activated = Vec::new();
        let mut outbox = BatchOutbox::new();
        let mut admitted: FxHashMap<u8, usize> = FxHashMap::default();

        let (archetypes, services) = world.batches_mut();
        for archetype in archetypes.iter_mut() {
            if !self.requirements.matches(archetype) || archetype.entity_count() == 0 {
                continue;
            }
            let asset_requirements = match archetype.shared().get::<BehaviorAssetRef>() {
                Some(asset_ref) => asset_ref.asset().requirements().clone(),
                None => continue,
            };
            if let Err(err) =
                asset_requirements.validate_archetype(CONTROLLER_NAME, archetype, services)
            {
                warn!("{}", err);
                stats.aborted_batches +=
                    archetype.chunks().iter().filter(|c| !c.is_empty()).count();
                continue;
            }

            let (shared, chunks) = archetype.split_mut();
            let Some(asset_ref) = shared.get::<BehaviorAssetRef>() else {
                continue;
            };
            let machine = asset_ref.asset().machine();

            for chunk in chunks.iter_mut().filter(|c| !c.is_empty()) {
                let tier = chunk
                    .chunk_fragment::<ImportanceTier>()
                    .map(|t| t.0)
                    .unwrap_or(config.default_tier);
                let cap = config.admission.cap(tier);
                let total = admitted.entry(tier).or_insert(0);
                stats.tier_mut(tier).attempted += chunk.len();
                if *total >= cap {
                    stats.tier_mut(tier).deferred_batches += 1;
                    continue;
                }
                if let Err(err) = asset_requirements.validate_chunk(CONTROLLER_NAME, chunk) {
                    warn!("{}", err);
                    stats.aborted_batches += 1;
                    continue;
                }
                *total += chunk.len();

                let mut granted = 0;
                for row in 0..chunk.len() {
                    let entity = chunk.entities()[row];
                    let Some(current) = chunk.get::<BehaviorInstance>(row).map(|i| i.handle) else {
                        continue;
                    };
                    let handle = if arena.is_valid(current) {
                        current
                    } else {
                        arena.allocate()
                    };
                    let Some(data) = arena.get(handle) else {
                        continue;
                    };
                    if let Some(instance) = chunk.get_mut::<BehaviorInstance>(row) {
                        instance.handle = handle;
                        instance.last_update_time = now;
                    }

                    let mut ctx = ExecutionContext::new(entity, now, services, &mut outbox)
                        .with_row(&mut *chunk, row)
                        .with_shared(shared);
                    machine.start(&mut ctx, data);

                    outbox.commands.add_tag::<BehaviorActivated>(entity);
                    activated.push(entity);
                    granted += 1;
                }
                stats.tier_mut(tier).granted += granted;
            }
        }

        outbox.flush(world, bus);
        bus.signal_entities(signals::ACTIVATED, &activated);
        activated
    }
}

impl Default for ActivationController {
    fn default() -> Self {
        Self::new()
    }
}
