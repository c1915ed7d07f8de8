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
//! Release of behavior instances
//!
//! When an entity loses its [`BehaviorInstance`], either by despawn or by
//! removal of the fragment, the world journals the old value together with the
//! archetype's shared values. The finalizer drains that journal, stops the
//! machine and frees the arena slot. The entity row is already gone at that
//! point, so `stop` sees shared values and services but no fragments.

use crate::arena::{InstanceArena, InstanceHandle};
use crate::behavior::{
    BatchOutbox, BehaviorActivated, BehaviorAssetRef, BehaviorInstance, ExecutionContext,
};
use crate::ecs::{Access, Requirements, TypeInfo, World};
use crate::signal::SignalBus;
use crate::stats::FrameStats;
use tracing::debug;

/// Stops and releases instances of entities that left the behavior set
pub struct Finalizer {
    live: Requirements,
}

impl Finalizer {
    /// Create the finalizer
    pub fn new() -> Self {
        let mut live = Requirements::new();
        live.add_fragment(TypeInfo::of::<BehaviorInstance>(), Access::ReadWrite);
        live.add_const_shared(TypeInfo::of::<BehaviorAssetRef>());
        Finalizer { live }
    }

    /// Stop and free the instance of every journaled removal
    ///
    /// Removals whose handle is no longer valid are skipped: their slot was
    /// already released. Returns the number of instances freed.
    pub(crate) fn run(
        &self,
        world: &mut World,
        arena: &mut InstanceArena,
        bus: &mut SignalBus,
        now: f64,
        stats: &mut FrameStats,
    ) -> usize {
        let removals = world.drain_removals::<BehaviorInstance>();
        if removals.is_empty() {
            return 0;
        }

        let mut outbox = BatchOutbox::new();
        let mut freed = 0;
        let services = world.services();
        for removed in &removals {
            let handle = removed.value.handle;
            if !arena.is_valid(handle) {
                continue;
            }
            if let (Some(asset_ref), Some(data)) =
                (removed.shared.get::<BehaviorAssetRef>(), arena.get(handle))
            {
                let mut ctx = ExecutionContext::new(removed.entity, now, services, &mut outbox)
                    .with_shared(&removed.shared);
                asset_ref.asset().machine().stop(&mut ctx, data);
            }
            if arena.free(handle) {
                freed += 1;
            }
        }

        outbox.flush(world, bus);
        stats.finalized += freed;
        debug!(removals = removals.len(), freed, "Finalized behavior instances");
        freed
    }

    /// Stop and free every live instance while keeping the entities
    ///
    /// Handles are reset to [`InstanceHandle::UNSET`] and the activation tag
    /// is removed, so the entities would be started again by a later frame.
    pub(crate) fn finalize_all(
        &self,
        world: &mut World,
        arena: &mut InstanceArena,
        bus: &mut SignalBus,
        now: f64,
        stats: &mut FrameStats,
    ) -> usize {
        // Pending journaled removals go first.
        let mut freed = self.run(world, arena, bus, now, stats);

        let mut outbox = BatchOutbox::new();
        let mut stopped = 0;
        let (archetypes, services) = world.batches_mut();
        for archetype in archetypes.iter_mut() {
            if !self.live.matches(archetype) {
                continue;
            }
            let activated = archetype.has_tag(std::any::TypeId::of::<BehaviorActivated>());
            let (shared, chunks) = archetype.split_mut();
            let Some(asset_ref) = shared.get::<BehaviorAssetRef>() else {
                continue;
            };
            let machine = asset_ref.asset().machine();

            for chunk in chunks.iter_mut().filter(|c| !c.is_empty()) {
                for row in 0..chunk.len() {
                    let entity = chunk.entities()[row];
                    let Some(handle) = chunk.get::<BehaviorInstance>(row).map(|i| i.handle) else {
                        continue;
                    };
                    if let Some(data) = arena.get(handle) {
                        let mut ctx = ExecutionContext::new(entity, now, services, &mut outbox)
                            .with_row(&mut *chunk, row)
                            .with_shared(shared);
                        machine.stop(&mut ctx, data);
                        if arena.free(handle) {
                            stopped += 1;
                        }
                    }
                    if let Some(instance) = chunk.get_mut::<BehaviorInstance>(row) {
                        instance.handle = InstanceHandle::UNSET;
                    }
                    if activated {
                        outbox.commands.remove_tag::<BehaviorActivated>(entity);
                    }
                }
            }
        }

        outbox.flush(world, bus);
        stats.finalized += stopped;
        freed += stopped;
        debug!(freed, "Finalized all behavior instances");
        freed
    }
}

impl Default for Finalizer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::InstanceData;
    use crate::behavior::{BehaviorAsset, RunStatus, StateMachine};
    use crate::ecs::{Entity, EntityBuilder};
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct StopLog {
        stopped: Mutex<Vec<(Entity, bool)>>,
    }

    struct Logged(Arc<StopLog>);

    impl StateMachine for Logged {
        fn start(&self, _ctx: &mut ExecutionContext<'_>, _instance: &mut InstanceData) -> RunStatus {
            RunStatus::Running
        }

        fn tick(
            &self,
            _ctx: &mut ExecutionContext<'_>,
            _instance: &mut InstanceData,
            _delta_time: f64,
        ) -> RunStatus {
            RunStatus::Running
        }

        fn stop(&self, ctx: &mut ExecutionContext<'_>, _instance: &mut InstanceData) {
            let has_row = ctx.fragment::<BehaviorInstance>().is_some();
            self.0.stopped.lock().push((ctx.entity(), has_row));
        }
    }

    fn spawn_active(
        world: &mut World,
        arena: &mut InstanceArena,
        asset: &Arc<BehaviorAsset>,
    ) -> Entity {
        let handle = arena.allocate();
        world.spawn(
            EntityBuilder::new()
                .with(BehaviorInstance {
                    handle,
                    last_update_time: 0.0,
                })
                .with_tag::<BehaviorActivated>()
                .with_shared(BehaviorAssetRef::new(asset)),
        )
    }

    #[test]
    fn test_despawn_stops_and_frees() {
        let log = Arc::new(StopLog::default());
        let asset = BehaviorAsset::link("logged", Logged(Arc::clone(&log)));
        let mut world = World::new();
        world.watch_removals::<BehaviorInstance>();
        let mut arena = InstanceArena::new();
        let mut bus = SignalBus::new();
        let entity = spawn_active(&mut world, &mut arena, &asset);
        let handle = world.get::<BehaviorInstance>(entity).unwrap().handle;

        world.despawn(entity);
        let mut stats = FrameStats::new();
        let freed = Finalizer::new().run(&mut world, &mut arena, &mut bus, 1.0, &mut stats);

        assert_eq!(freed, 1);
        assert_eq!(stats.finalized, 1);
        assert!(!arena.is_valid(handle));
        assert_eq!(log.stopped.lock().as_slice(), &[(entity, false)]);
    }

    #[test]
    fn test_unset_handle_is_not_stopped() {
        let log = Arc::new(StopLog::default());
        let asset = BehaviorAsset::link("logged", Logged(Arc::clone(&log)));
        let mut world = World::new();
        world.watch_removals::<BehaviorInstance>();
        let mut arena = InstanceArena::new();
        let mut bus = SignalBus::new();
        let entity = world.spawn(
            EntityBuilder::new()
                .with(BehaviorInstance::new())
                .with_shared(BehaviorAssetRef::new(&asset)),
        );

        world.remove::<BehaviorInstance>(entity);
        let mut stats = FrameStats::new();
        let freed = Finalizer::new().run(&mut world, &mut arena, &mut bus, 0.0, &mut stats);

        assert_eq!(freed, 0);
        assert!(log.stopped.lock().is_empty());
    }

    #[test]
    fn test_finalize_all_resets_entities() {
        let log = Arc::new(StopLog::default());
        let asset = BehaviorAsset::link("logged", Logged(Arc::clone(&log)));
        let mut world = World::new();
        world.watch_removals::<BehaviorInstance>();
        let mut arena = InstanceArena::new();
        let mut bus = SignalBus::new();
        let entities: Vec<Entity> = (0..3)
            .map(|_| spawn_active(&mut world, &mut arena, &asset))
            .collect();

        let mut stats = FrameStats::new();
        let freed =
            Finalizer::new().finalize_all(&mut world, &mut arena, &mut bus, 2.0, &mut stats);

        assert_eq!(freed, 3);
        assert_eq!(arena.active_count(), 0);
        for entity in entities {
            assert!(world.is_alive(entity));
            assert!(!world.has_tag::<BehaviorActivated>(entity));
            assert!(world.get::<BehaviorInstance>(entity).unwrap().handle.is_unset());
        }
        assert!(log.stopped.lock().iter().all(|(_, has_row)| *has_row));
    }
}
