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
//! Controller sharing and requirement checks
//!
//! Assets declaring the same data share a tick controller; batches missing
//! declared data are skipped whole, never partially processed, whether the
//! gap shows up before activation or after it.

use behavior_scheduler::arena::InstanceData;
use behavior_scheduler::behavior::{
    BehaviorActivated, BehaviorAsset, BehaviorAssetRef, BehaviorInstance, BehaviorNode,
    DependencyBuilder, ExecutionContext, RunStatus, StateMachine,
};
use behavior_scheduler::ecs::{Access, ChunkFragment, Entity, EntityBuilder, Fragment, World};
use behavior_scheduler::signal::signals;
use behavior_scheduler::Scheduler;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct Hunger;
impl Fragment for Hunger {}

#[derive(Debug, Default)]
struct Fatigue(f32);
impl Fragment for Fatigue {}

/// World-level clock service
struct Daylight {
    hour: u8,
}

/// Reads hunger and writes fatigue, declared in either order
struct NeedsNode {
    hunger_first: bool,
}

impl BehaviorNode for NeedsNode {
    fn collect_dependencies(&self, builder: &mut DependencyBuilder) {
        if self.hunger_first {
            builder
                .add_fragment::<Hunger>(Access::ReadOnly)
                .add_fragment::<Fatigue>(Access::ReadWrite);
        } else {
            builder
                .add_fragment::<Fatigue>(Access::ReadOnly)
                .add_fragment::<Hunger>(Access::ReadOnly)
                .add_fragment::<Fatigue>(Access::ReadWrite);
        }
    }
}

/// Crowd density band, one value per batch
#[derive(Debug, Clone, Copy, PartialEq)]
struct Band(u8);
impl ChunkFragment for Band {}

struct DaylightNode;

impl BehaviorNode for DaylightNode {
    fn collect_dependencies(&self, builder: &mut DependencyBuilder) {
        builder.add_service::<Daylight>(Access::ReadOnly);
    }
}

struct BandNode;

impl BehaviorNode for BandNode {
    fn collect_dependencies(&self, builder: &mut DependencyBuilder) {
        builder.add_chunk_fragment::<Band>(Access::ReadOnly);
    }
}

struct MemoryNode;

impl BehaviorNode for MemoryNode {
    fn collect_dependencies(&self, builder: &mut DependencyBuilder) {
        // Per-agent scratch memory has no place in the batch store
        builder.add_opaque::<Vec<String>>(Access::ReadWrite);
    }
}

/// Counts ticks and tires the entity a little on each one
struct Counted {
    nodes: Vec<Box<dyn BehaviorNode>>,
    ticks: Arc<AtomicUsize>,
}

impl Counted {
    fn new(nodes: Vec<Box<dyn BehaviorNode>>) -> (Self, Arc<AtomicUsize>) {
        let ticks = Arc::new(AtomicUsize::new(0));
        (
            Counted {
                nodes,
                ticks: Arc::clone(&ticks),
            },
            ticks,
        )
    }
}

impl StateMachine for Counted {
    fn for_each_node(&self, visit: &mut dyn FnMut(&dyn BehaviorNode)) {
        for node in &self.nodes {
            visit(node.as_ref());
        }
    }

    fn start(&self, _ctx: &mut ExecutionContext<'_>, _instance: &mut InstanceData) -> RunStatus {
        RunStatus::Running
    }

    fn tick(
        &self,
        ctx: &mut ExecutionContext<'_>,
        _instance: &mut InstanceData,
        delta_time: f64,
    ) -> RunStatus {
        self.ticks.fetch_add(1, Ordering::SeqCst);
        if let Some(fatigue) = ctx.fragment_mut::<Fatigue>() {
            fatigue.0 += 1.0 + delta_time as f32;
        }
        RunStatus::Running
    }

    fn stop(&self, _ctx: &mut ExecutionContext<'_>, _instance: &mut InstanceData) {}
}

fn spawn_needy(world: &mut World, asset: &Arc<BehaviorAsset>) -> Entity {
    world.spawn(
        EntityBuilder::new()
            .with(BehaviorInstance::new())
            .with(Hunger)
            .with(Fatigue::default())
            .with_shared(BehaviorAssetRef::new(asset)),
    )
}

#[test]
fn test_set_equal_assets_share_one_controller() {
    let (forward, forward_ticks) = Counted::new(vec![Box::new(NeedsNode { hunger_first: true })]);
    let (reverse, reverse_ticks) = Counted::new(vec![Box::new(NeedsNode { hunger_first: false })]);
    let a = BehaviorAsset::link("forward", forward);
    let b = BehaviorAsset::link("reverse", reverse);
    assert_eq!(a.requirement_hash(), b.requirement_hash());

    let mut world = World::new();
    let ea = spawn_needy(&mut world, &a);
    let eb = spawn_needy(&mut world, &b);
    let mut scheduler = Scheduler::default();

    let stats = scheduler.run_frame(&mut world, 0.0).clone();

    assert_eq!(stats.controllers_created, 1);
    assert_eq!(scheduler.registry().len(), 1);
    assert_eq!(
        scheduler.registry().controller_of(a.id()),
        scheduler.registry().controller_of(b.id())
    );
    // Each asset's batch is ticked by its own machine, once
    assert_eq!(forward_ticks.load(Ordering::SeqCst), 1);
    assert_eq!(reverse_ticks.load(Ordering::SeqCst), 1);
    assert_eq!(world.get::<Fatigue>(ea).map(|f| f.0), Some(1.0));
    assert_eq!(world.get::<Fatigue>(eb).map(|f| f.0), Some(1.0));
}

#[test]
fn test_distinct_requirements_get_distinct_controllers() {
    let (needs, _) = Counted::new(vec![Box::new(NeedsNode { hunger_first: true })]);
    let (plain, _) = Counted::new(Vec::new());
    let needs = BehaviorAsset::link("needs", needs);
    let plain = BehaviorAsset::link("plain", plain);

    let mut scheduler = Scheduler::default();
    let a = scheduler.register_asset(&needs);
    let b = scheduler.register_asset(&plain);

    assert_ne!(a, b);
    assert_eq!(scheduler.registry().len(), 2);
    assert!(scheduler
        .registry()
        .controller(a)
        .is_some_and(|c| c.handles(needs.id()) && !c.handles(plain.id())));
}

#[test]
fn test_batch_missing_declared_fragment_is_skipped() {
    let (machine, ticks) = Counted::new(vec![Box::new(NeedsNode { hunger_first: true })]);
    let asset = BehaviorAsset::link("needs", machine);
    let mut world = World::new();
    // No Fatigue fragment
    let entity = world.spawn(
        EntityBuilder::new()
            .with(BehaviorInstance::new())
            .with(Hunger)
            .with_shared(BehaviorAssetRef::new(&asset)),
    );
    let mut scheduler = Scheduler::default();

    let stats = scheduler.run_frame(&mut world, 0.0).clone();

    assert_eq!(stats.aborted_batches, 1);
    assert_eq!(stats.activated(), 0);
    assert_eq!(ticks.load(Ordering::SeqCst), 0);
    assert!(!world.has_tag::<BehaviorActivated>(entity));
    assert_eq!(scheduler.arena().active_count(), 0);
}

#[test]
fn test_missing_service_blocks_until_registered() {
    let (machine, ticks) = Counted::new(vec![Box::new(DaylightNode)]);
    let asset = BehaviorAsset::link("daylight", machine);
    let mut world = World::new();
    let entity = spawn_needy(&mut world, &asset);
    let mut scheduler = Scheduler::default();

    let stats = scheduler.run_frame(&mut world, 0.0).clone();
    assert_eq!(stats.aborted_batches, 1);
    assert_eq!(stats.activated(), 0);

    world.insert_service(Daylight { hour: 6 });
    let stats = scheduler.run_frame(&mut world, 0.1).clone();
    assert_eq!(stats.aborted_batches, 0);
    assert_eq!(stats.activated(), 1);
    assert_eq!(ticks.load(Ordering::SeqCst), 1);
    assert!(world.has_tag::<BehaviorActivated>(entity));
    assert_eq!(world.services().get::<Daylight>().map(|d| d.hour), Some(6));
}

#[test]
fn test_unmapped_dependency_is_dropped_not_fatal() {
    let (machine, ticks) = Counted::new(vec![Box::new(MemoryNode)]);
    let asset = BehaviorAsset::link("memory", machine);
    assert_eq!(asset.dependencies().len(), 1);
    assert!(asset.requirements().is_empty());

    let mut world = World::new();
    spawn_needy(&mut world, &asset);
    let mut scheduler = Scheduler::default();
    let stats = scheduler.run_frame(&mut world, 0.0).clone();

    assert_eq!(stats.activated(), 1);
    assert_eq!(ticks.load(Ordering::SeqCst), 1);
}

#[test]
fn test_chunk_scoped_dependency_survives_activation() {
    let (machine, ticks) = Counted::new(vec![Box::new(BandNode)]);
    let asset = BehaviorAsset::link("banded", machine);
    let mut world = World::new();
    let entity = spawn_needy(&mut world, &asset);
    world.set_chunk_fragment(entity, Band(1));
    let mut scheduler = Scheduler::default();

    let stats = scheduler.run_frame(&mut world, 0.0).clone();
    assert_eq!(stats.activated(), 1);
    assert_eq!(stats.aborted_batches, 0);
    assert_eq!(stats.ticks, 1);
    assert!(world.has_tag::<BehaviorActivated>(entity));
    // The activated batch inherited the band of the cold one
    assert_eq!(world.chunk_fragment::<Band>(entity), Some(&Band(1)));

    scheduler
        .signals_mut()
        .signal_entity(signals::REEVALUATE, entity);
    let stats = scheduler.run_frame(&mut world, 0.1).clone();
    assert_eq!(stats.aborted_batches, 0);
    assert_eq!(stats.ticks, 1);
    assert_eq!(ticks.load(Ordering::SeqCst), 2);
}

#[test]
fn test_tick_aborts_batch_after_service_removed() {
    let (machine, ticks) = Counted::new(vec![Box::new(DaylightNode)]);
    let asset = BehaviorAsset::link("daylight", machine);
    let mut world = World::new();
    world.insert_service(Daylight { hour: 9 });
    let entity = spawn_needy(&mut world, &asset);
    let mut scheduler = Scheduler::default();

    let stats = scheduler.run_frame(&mut world, 0.0).clone();
    assert_eq!((stats.activated(), stats.ticks), (1, 1));

    assert_eq!(world.remove_service::<Daylight>().map(|d| d.hour), Some(9));
    scheduler
        .signals_mut()
        .signal_entity(signals::REEVALUATE, entity);
    let stats = scheduler.run_frame(&mut world, 0.1).clone();

    assert_eq!(stats.aborted_batches, 1);
    assert_eq!(stats.ticks, 0);
    assert_eq!(ticks.load(Ordering::SeqCst), 1);
    assert!(world.has_tag::<BehaviorActivated>(entity));
}

#[test]
fn test_tick_aborts_batch_missing_chunk_fragment() {
    let (machine, ticks) = Counted::new(vec![Box::new(BandNode)]);
    let asset = BehaviorAsset::link("banded", machine);
    let mut world = World::new();
    let entity = spawn_needy(&mut world, &asset);
    world.set_chunk_fragment(entity, Band(2));
    let mut scheduler = Scheduler::default();

    let stats = scheduler.run_frame(&mut world, 0.0).clone();
    assert_eq!((stats.activated(), stats.ticks), (1, 1));

    assert_eq!(world.remove_chunk_fragment::<Band>(entity), Some(Band(2)));
    scheduler
        .signals_mut()
        .signal_entity(signals::REEVALUATE, entity);
    let stats = scheduler.run_frame(&mut world, 0.1).clone();

    assert_eq!(stats.aborted_batches, 1);
    assert_eq!(stats.ticks, 0);
    assert_eq!(ticks.load(Ordering::SeqCst), 1);
}
