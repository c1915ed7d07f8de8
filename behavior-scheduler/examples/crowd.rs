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
//! Crowd example
//!
//! A few thousand agents alternate between resting and walking. Resting is a
//! delayed transition, so resting agents cost nothing until their wake-up
//! signal arrives. A classification processor sorts batches into importance
//! tiers by distance from the camera, and far batches are started at a
//! throttled rate. Agents that run out of stamina leave the simulation.
//!
//! Run with `RUST_LOG=behavior_scheduler=debug` to see per-frame summaries.

use behavior_scheduler::arena::InstanceData;
use behavior_scheduler::behavior::{
    BehaviorActivated, BehaviorAsset, BehaviorAssetRef, BehaviorInstance, BehaviorNode,
    DependencyBuilder, ExecutionContext, ImportanceTier, RunStatus, StateMachine,
};
use behavior_scheduler::ecs::{Access, EntityBuilder, Fragment, Requirements, TypeInfo, World};
use behavior_scheduler::scheduler::{stages, Processor};
use behavior_scheduler::signal::{signals, SignalBus};
use behavior_scheduler::{Scheduler, SchedulerConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

const AGENTS: usize = 4_000;
const FRAMES: usize = 240;
const DELTA_TIME: f64 = 1.0 / 60.0;

#[derive(Debug, Clone, Copy)]
struct Position {
    x: f32,
    y: f32,
}

impl Fragment for Position {}

#[derive(Debug, Clone, Copy)]
struct Stamina(f32);

impl Fragment for Stamina {}

/// Camera the classification processor measures distance from
struct Camera {
    x: f32,
    y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mode {
    Resting,
    Walking { heading: f32 },
}

struct Locomotion;

impl BehaviorNode for Locomotion {
    fn collect_dependencies(&self, builder: &mut DependencyBuilder) {
        builder
            .add_fragment::<Position>(Access::ReadWrite)
            .add_fragment::<Stamina>(Access::ReadWrite);
    }
}

/// Rest for a while, walk until tired, repeat
struct Wander {
    locomotion: Locomotion,
    rest_seconds: f64,
    speed: f32,
}

impl StateMachine for Wander {
    fn for_each_node(&self, visit: &mut dyn FnMut(&dyn BehaviorNode)) {
        visit(&self.locomotion);
    }

    fn start(&self, ctx: &mut ExecutionContext<'_>, instance: &mut InstanceData) -> RunStatus {
        let heading = (ctx.entity().id().raw() % 628) as f32 / 100.0;
        instance.insert(Mode::Walking { heading });
        RunStatus::Running
    }

    fn tick(
        &self,
        ctx: &mut ExecutionContext<'_>,
        instance: &mut InstanceData,
        delta_time: f64,
    ) -> RunStatus {
        let mode = instance.update_or_insert_with(|| Mode::Resting, |mode| *mode);
        match mode {
            Mode::Resting => {
                if !ctx.has_received(signals::DELAYED_TRANSITION_WAKEUP) {
                    return RunStatus::Running;
                }
                let heading = (ctx.now() * 1.7).rem_euclid(std::f64::consts::TAU) as f32;
                instance.insert(Mode::Walking { heading });
                // Finish the transition within this frame
                RunStatus::Succeeded
            }
            Mode::Walking { heading } => {
                let step = self.speed * delta_time as f32;
                if let Some(position) = ctx.fragment_mut::<Position>() {
                    position.x += heading.cos() * step;
                    position.y += heading.sin() * step;
                }
                let exhausted = ctx.fragment_mut::<Stamina>().is_some_and(|stamina| {
                    stamina.0 -= step;
                    stamina.0 <= 0.0
                });
                let entity = ctx.entity();
                if exhausted {
                    ctx.commands().despawn(entity);
                    return RunStatus::Running;
                }
                if delta_time > 0.0 && ctx.now() % 2.0 < delta_time {
                    instance.insert(Mode::Resting);
                    ctx.request_delayed_transition(self.rest_seconds);
                    return RunStatus::Running;
                }
                // Walking agents want a tick every frame
                ctx.signal(signals::REEVALUATE, entity);
                RunStatus::Running
            }
        }
    }

    fn stop(&self, _ctx: &mut ExecutionContext<'_>, instance: &mut InstanceData) {
        instance.clear();
    }
}

/// Writes each cold batch's importance tier from its distance to the camera
struct DistanceTiers {
    cold: Requirements,
    band: f32,
}

impl DistanceTiers {
    fn new(band: f32) -> Self {
        let mut cold = Requirements::new();
        cold.add_fragment(TypeInfo::of::<BehaviorInstance>(), Access::ReadOnly);
        cold.add_fragment(TypeInfo::of::<Position>(), Access::ReadOnly);
        cold.add_tag_none(TypeInfo::of::<BehaviorActivated>());
        DistanceTiers { cold, band }
    }
}

impl Processor for DistanceTiers {
    fn run(&mut self, world: &mut World, _signals: &mut SignalBus) {
        let band = self.band;
        world.for_each_batch(&self.cold, |_shared, chunk, services| {
            let Some(camera) = services.get::<Camera>() else {
                return;
            };
            let Some(positions) = chunk.column::<Position>() else {
                return;
            };
            let nearest = positions
                .iter()
                .map(|p| ((p.x - camera.x).powi(2) + (p.y - camera.y).powi(2)).sqrt())
                .fold(f32::INFINITY, f32::min);
            let tier = (nearest / band).min(3.0) as u8;
            chunk.set_chunk_fragment(ImportanceTier(tier));
        });
    }

    fn name(&self) -> &str {
        "DistanceTiers"
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

fn main() {
    init_tracing();

    println!("Behavior Scheduler - Crowd Example");
    println!("==================================\n");

    let config = SchedulerConfig::load_or_default();
    let mut scheduler = match Scheduler::new(config) {
        Ok(scheduler) => scheduler,
        Err(err) => {
            eprintln!("Invalid configuration: {err}");
            std::process::exit(1);
        }
    };
    scheduler.add_processor(DistanceTiers::new(50.0), stages::CLASSIFY);

    let wander = BehaviorAsset::link(
        "wander",
        Wander {
            locomotion: Locomotion,
            rest_seconds: 0.75,
            speed: 3.0,
        },
    );

    let mut world = World::new();
    world.insert_service(Camera { x: 0.0, y: 0.0 });
    for i in 0..AGENTS {
        let ring = (i / 64) as f32 * 2.5;
        let angle = i as f32 * 0.37;
        world.spawn(
            EntityBuilder::new()
                .with(BehaviorInstance::new())
                .with(Position {
                    x: ring * angle.cos(),
                    y: ring * angle.sin(),
                })
                .with(Stamina(2.0 + (i % 7) as f32))
                .with_shared(BehaviorAssetRef::new(&wander)),
        );
    }
    println!(
        "Spawned {} agents in batches of up to {}",
        AGENTS,
        world.chunk_capacity()
    );

    for frame in 1..=FRAMES {
        let stats = scheduler.step(&mut world, DELTA_TIME);
        if frame % 30 == 0 {
            println!(
                "frame {:>3}: activated {:>4}, waiting {:>4}, ticks {:>4} (+{}), finalized {}",
                frame,
                stats.activated(),
                stats.deferred(),
                stats.ticks,
                stats.reticks,
                stats.finalized,
            );
        }
    }

    let totals = scheduler.total_stats().clone();
    let freed = scheduler.shutdown(&mut world);
    info!(
        remaining = world.entity_count(),
        released = freed,
        "Simulation finished"
    );

    println!("\nTotals after {} frames:", scheduler.frame());
    for (tier, tier_stats) in totals.tiers.iter().enumerate() {
        println!(
            "  tier {}: {} started, {} deferred batches",
            tier, tier_stats.granted, tier_stats.deferred_batches
        );
    }
    println!("  admission rate: {:.1}%", totals.admission_rate());
    println!("  ticks: {} (+{} re-ticks)", totals.ticks, totals.reticks);
    println!("  controllers: {}", scheduler.registry().len());
}
