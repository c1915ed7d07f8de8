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
//! Signal-driven tick controller
//!
//! One controller exists per distinct requirement hash. It only looks at
//! entities that received one of its subscribed signals since it last ran, and
//! only at batches whose asset it handles.
//!
//! # Re-tick policy
//!
//! A tick that does not report [`RunStatus::Running`](crate::behavior::RunStatus)
//! is followed by exactly one more tick at zero elapsed time in the same
//! frame, so a machine can finish a transition without waiting a frame. If the
//! machine still has not settled, the entity is sent a
//! [`REEVALUATE`](crate::signal::signals::REEVALUATE) signal and is looked at
//! again next frame. There is no further retry within a frame.
//!
//! # Parallel mode
//!
//! In [`ExecutionMode::Parallel`] whole batches are handed to rayon workers.
//! A batch is always processed by one worker, entity by entity, and each batch
//! writes its deferred output into its own outbox. Outboxes are merged in
//! batch order once every batch is done.

use crate::arena::InstanceArena;
use crate::behavior::{
    AssetId, BatchOutbox, BehaviorActivated, BehaviorAsset, BehaviorAssetRef, BehaviorInstance,
    DependencySet, ExecutionContext,
};
use crate::config::ExecutionMode;
use crate::ecs::{Access, Chunk, Entity, Requirements, Services, SharedFragments, TypeInfo, World};
use crate::signal::{signals, SignalBus, SignalName, SubscriberId};
use crate::stats::FrameStats;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

/// Elapsed time is rounded to multiples of `1 / ELAPSED_STEPS_PER_SECOND`
pub const ELAPSED_STEPS_PER_SECOND: f64 = 256.0;

/// Clamp negative elapsed time to zero and round it to 1/256 s
pub fn quantize_elapsed(elapsed: f64) -> f64 {
    (elapsed.max(0.0) * ELAPSED_STEPS_PER_SECOND).round() / ELAPSED_STEPS_PER_SECOND
}

/// Index of a tick controller inside the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ControllerId(pub(crate) usize);

impl ControllerId {
    /// Position in registration order
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for ControllerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tick#{}", self.0)
    }
}

struct PendingEntity {
    row: usize,
    entity: Entity,
    received: SmallVec<[SignalName; 2]>,
}

struct BatchJob<'w> {
    asset: &'w BehaviorAsset,
    shared: &'w SharedFragments,
    chunk: &'w mut Chunk,
    pending: Vec<PendingEntity>,
}

#[derive(Default)]
struct BatchOutcome {
    outbox: BatchOutbox,
    reevaluate: Vec<Entity>,
    ticks: usize,
    reticks: usize,
    stale: usize,
    aborted: bool,
}

/// Ticks signaled entities of every asset sharing one requirement set
pub struct TickController {
    id: ControllerId,
    name: String,
    dependencies: DependencySet,
    filter: Requirements,
    requirements: Requirements,
    handled_assets: Vec<AssetId>,
    subscriber: SubscriberId,
    mode: ExecutionMode,
}

impl TickController {
    pub(crate) fn new(
        id: ControllerId,
        asset: &BehaviorAsset,
        subscriber: SubscriberId,
        mode: ExecutionMode,
    ) -> Self {
        let mut filter = Requirements::new();
        filter.add_fragment(TypeInfo::of::<BehaviorInstance>(), Access::ReadWrite);
        filter.add_tag_all(TypeInfo::of::<BehaviorActivated>());
        filter.add_const_shared(TypeInfo::of::<BehaviorAssetRef>());

        let mut requirements = filter.clone();
        requirements.merge(asset.requirements());

        TickController {
            id,
            name: format!("{} [{:016x}]", id, asset.requirement_hash()),
            dependencies: asset.dependencies().clone(),
            filter,
            requirements,
            handled_assets: Vec::new(),
            subscriber,
            mode,
        }
    }

    /// Registry index
    pub fn id(&self) -> ControllerId {
        self.id
    }

    /// Name used in diagnostics
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Hash of the dependency set this controller serves
    pub fn requirement_hash(&self) -> u64 {
        self.dependencies.hash()
    }

    /// Dependency set this controller serves
    pub fn dependencies(&self) -> &DependencySet {
        &self.dependencies
    }

    /// Full native requirements, checked before a batch is touched
    pub fn requirements(&self) -> &Requirements {
        &self.requirements
    }

    /// Assets whose batches this controller processes
    pub fn handled_assets(&self) -> &[AssetId] {
        &self.handled_assets
    }

    /// Whether batches of `asset` are processed here
    pub fn handles(&self, asset: AssetId) -> bool {
        self.handled_assets.contains(&asset)
    }

    /// Signal queue this controller drains
    pub fn subscriber(&self) -> SubscriberId {
        self.subscriber
    }

    /// Batch execution mode
    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub(crate) fn set_mode(&mut self, mode: ExecutionMode) {
        self.mode = mode;
    }

    /// Append `asset` unless already handled; returns whether it was added
    pub(crate) fn add_asset(&mut self, asset: AssetId) -> bool {
        if self.handles(asset) {
            return false;
        }
        self.handled_assets.push(asset);
        true
    }

    /// Tick every entity signaled since the last run
    pub(crate) fn run(
        &self,
        world: &mut World,
        arena: &InstanceArena,
        bus: &mut SignalBus,
        now: f64,
        stats: &mut FrameStats,
    ) {
        let drained = bus.drain(self.subscriber);
        if drained.is_empty() {
            return;
        }
        let mut pending = group_by_batch(world, drained);
        if pending.is_empty() {
            return;
        }

        let (archetypes, services) = world.batches_mut();
        let mut jobs: Vec<BatchJob<'_>> = Vec::new();
        for (index, archetype) in archetypes.iter_mut().enumerate() {
            let Some(chunks_pending) = pending.remove(&index) else {
                continue;
            };
            if !self.filter.matches(archetype) {
                continue;
            }
            let handled = archetype
                .shared()
                .get::<BehaviorAssetRef>()
                .is_some_and(|r| self.handles(r.asset().id()));
            if !handled {
                continue;
            }
            if let Err(err) = self
                .requirements
                .validate_archetype(&self.name, archetype, services)
            {
                warn!("{}", err);
                stats.aborted_batches += chunks_pending.len();
                continue;
            }

            let (shared, chunks) = archetype.split_mut();
            let Some(asset_ref) = shared.get::<BehaviorAssetRef>() else {
                continue;
            };
            let asset = asset_ref.asset().as_ref();
            let mut wanted = chunks_pending.into_iter().peekable();
            for (chunk_index, chunk) in chunks.iter_mut().enumerate() {
                if let Some((_, pending)) = wanted.next_if(|(c, _)| *c == chunk_index) {
                    jobs.push(BatchJob {
                        asset,
                        shared,
                        chunk,
                        pending,
                    });
                }
            }
        }

        let outcomes: Vec<BatchOutcome> = match self.mode {
            #[cfg(feature = "parallel")]
            ExecutionMode::Parallel => {
                use rayon::prelude::*;
                jobs.into_par_iter()
                    .map(|job| self.run_batch(job, arena, services, now))
                    .collect()
            }
            _ => jobs
                .into_iter()
                .map(|job| self.run_batch(job, arena, services, now))
                .collect(),
        };

        let mut outbox = BatchOutbox::new();
        let mut reevaluate = Vec::new();
        for mut outcome in outcomes {
            stats.ticks += outcome.ticks;
            stats.reticks += outcome.reticks;
            stats.stale_handles += outcome.stale;
            if outcome.aborted {
                stats.aborted_batches += 1;
            }
            outbox.append(&mut outcome.outbox);
            reevaluate.append(&mut outcome.reevaluate);
        }

        outbox.flush(world, bus);
        stats.resignaled += reevaluate.len();
        bus.signal_entities(signals::REEVALUATE, &reevaluate);
    }

    fn run_batch(
        &self,
        job: BatchJob<'_>,
        arena: &InstanceArena,
        services: &Services,
        now: f64,
    ) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        let BatchJob {
            asset,
            shared,
            chunk,
            pending,
        } = job;

        if let Err(err) = self.requirements.validate_chunk(&self.name, chunk) {
            warn!("{}", err);
            outcome.aborted = true;
            return outcome;
        }

        let machine = asset.machine();
        for p in &pending {
            if chunk.entities().get(p.row) != Some(&p.entity) {
                continue;
            }
            let Some(instance) = chunk.get_mut::<BehaviorInstance>(p.row) else {
                continue;
            };
            let Some(mut data) = arena.lock(instance.handle) else {
                outcome.stale += 1;
                continue;
            };
            let elapsed = quantize_elapsed(now - instance.last_update_time);
            instance.last_update_time = now;

            let mut ctx = ExecutionContext::new(p.entity, now, services, &mut outcome.outbox)
                .with_row(&mut *chunk, p.row)
                .with_shared(shared)
                .with_signals(&p.received);
            ctx.set_delta_time(elapsed);

            let status = machine.tick(&mut ctx, &mut data, elapsed);
            outcome.ticks += 1;
            if status.is_running() {
                continue;
            }

            ctx.set_delta_time(0.0);
            let status = machine.tick(&mut ctx, &mut data, 0.0);
            outcome.reticks += 1;
            if !status.is_running() {
                outcome.reevaluate.push(p.entity);
            }
        }
        outcome
    }
}

type PendingChunks = Vec<(usize, Vec<PendingEntity>)>;

/// Merge drained signals per entity and group live entities by
/// (archetype, chunk), both in ascending order
fn group_by_batch(
    world: &World,
    drained: Vec<(Entity, SignalName)>,
) -> BTreeMap<usize, PendingChunks> {
    let mut received: FxHashMap<Entity, SmallVec<[SignalName; 2]>> = FxHashMap::default();
    let mut order = Vec::new();
    for (entity, name) in drained {
        let names = received.entry(entity).or_insert_with(|| {
            order.push(entity);
            SmallVec::new()
        });
        if !names.contains(&name) {
            names.push(name);
        }
    }

    let mut batches: BTreeMap<(usize, usize), Vec<PendingEntity>> = BTreeMap::new();
    for entity in order {
        let Some(location) = world.location(entity) else {
            continue;
        };
        if let Some(names) = received.remove(&entity) {
            batches
                .entry((location.archetype, location.chunk))
                .or_default()
                .push(PendingEntity {
                    row: location.row,
                    entity,
                    received: names,
                });
        }
    }

    let mut by_archetype: BTreeMap<usize, PendingChunks> = BTreeMap::new();
    for ((archetype, chunk), mut pending) in batches {
        pending.sort_by_key(|p| p.row);
        by_archetype
            .entry(archetype)
            .or_default()
            .push((chunk, pending));
    }
    by_archetype
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantize_elapsed() {
        assert_eq!(quantize_elapsed(0.0), 0.0);
        assert_eq!(quantize_elapsed(-1.0), 0.0);
        assert_eq!(quantize_elapsed(f64::NAN), 0.0);
        assert_eq!(quantize_elapsed(0.5), 0.5);
        assert_eq!(quantize_elapsed(1.0 / 60.0), 4.0 / 256.0);
        assert_eq!(quantize_elapsed(0.001), 0.0);
    }

    #[test]
    fn test_group_by_batch_merges_signals_and_drops_dead() {
        use crate::ecs::{EntityBuilder, Fragment};

        struct Pace;
        impl Fragment for Pace {}

        let mut world = World::with_chunk_capacity(2);
        let a = world.spawn(EntityBuilder::new().with(Pace));
        let b = world.spawn(EntityBuilder::new().with(Pace));
        let c = world.spawn(EntityBuilder::new().with(Pace));
        let dead = world.spawn(EntityBuilder::new().with(Pace));
        world.despawn(dead);

        let drained = vec![
            (c, signals::ACTIVATED),
            (a, signals::ACTIVATED),
            (dead, signals::ACTIVATED),
            (a, signals::REEVALUATE),
            (a, signals::ACTIVATED),
            (b, signals::REEVALUATE),
        ];
        let grouped = group_by_batch(&world, drained);

        let chunks = &grouped[&0];
        assert_eq!(chunks.len(), 2);
        let (first_chunk, first) = &chunks[0];
        assert_eq!(*first_chunk, 0);
        let entities: Vec<Entity> = first.iter().map(|p| p.entity).collect();
        assert_eq!(entities, vec![a, b]);
        assert_eq!(
            first[0].received.as_slice(),
            &[signals::ACTIVATED, signals::REEVALUATE]
        );
        assert_eq!(chunks[1].1[0].entity, c);
    }
}
