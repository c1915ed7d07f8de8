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
//! Frame-stepped behavior scheduler
//!
//! The [`Scheduler`] owns everything with session lifetime: the instance
//! arena, the signal bus, the controller registry and the host processors.
//! One call to [`Scheduler::run_frame`] executes a frame in this order:
//!
//! 1. Deliver delayed signals that came due.
//! 2. Host processors of stages before [`stages::BEHAVIOR`].
//! 3. Finalize instances of entities that lost their behavior state.
//! 4. Register the assets of newly seen behavior batches.
//! 5. Activation, then the deferred commands it recorded, then the
//!    activation signal.
//! 6. Every tick controller in creation order. Deferred commands and
//!    signals are applied after each controller.
//! 7. Finalize again, for removals requested during this frame.
//! 8. Host processors of [`stages::BEHAVIOR`] and later.
//!
//! Structural changes are never applied while a batch is being iterated.

mod activation;
mod finalizer;
mod processor;
mod registry;
mod tick;

pub use activation::ActivationController;
pub use finalizer::Finalizer;
pub use processor::{stages, Processor, StageId};
pub use registry::SchedulerRegistry;
pub use tick::{quantize_elapsed, ControllerId, TickController, ELAPSED_STEPS_PER_SECOND};

use crate::arena::InstanceArena;
use crate::behavior::{BehaviorAsset, BehaviorInstance};
use crate::config::{ExecutionMode, SchedulerConfig};
use crate::ecs::World;
use crate::error::SchedulerError;
use crate::signal::SignalBus;
use crate::stats::FrameStats;
use processor::ScheduledProcessor;
use tracing::{debug, info};

/// Drives activation, ticking and finalization of behavior instances
///
/// # Examples
///
/// ```
/// use behavior_scheduler::config::SchedulerConfig;
/// use behavior_scheduler::ecs::World;
/// use behavior_scheduler::scheduler::Scheduler;
///
/// let mut scheduler = Scheduler::new(SchedulerConfig::default()).unwrap();
/// let mut world = World::new();
/// scheduler.step(&mut world, 1.0 / 60.0);
/// assert_eq!(scheduler.frame(), 1);
/// ```
pub struct Scheduler {
    config: SchedulerConfig,
    arena: InstanceArena,
    signals: SignalBus,
    registry: SchedulerRegistry,
    activation: ActivationController,
    finalizer: Finalizer,
    processors: Vec<ScheduledProcessor>,
    now: f64,
    frame: u64,
    last_frame: FrameStats,
    totals: FrameStats,
}

impl Scheduler {
    /// Create a scheduler after validating `config`
    pub fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        config.validate()?;
        Ok(Self::with_valid_config(config))
    }

    fn with_valid_config(config: SchedulerConfig) -> Self {
        Scheduler {
            config,
            arena: InstanceArena::new(),
            signals: SignalBus::new(),
            registry: SchedulerRegistry::new(),
            activation: ActivationController::new(),
            finalizer: Finalizer::new(),
            processors: Vec::new(),
            now: 0.0,
            frame: 0,
            last_frame: FrameStats::new(),
            totals: FrameStats::new(),
        }
    }

    /// Add a host processor to a stage
    ///
    /// Stages run in ascending order; processors of one stage run in the
    /// order they were added.
    pub fn add_processor<P: Processor + 'static>(&mut self, processor: P, stage: StageId) {
        self.processors.push(ScheduledProcessor {
            processor: Box::new(processor),
            stage,
        });
        // Stable, so insertion order holds within a stage
        self.processors.sort_by_key(|p| p.stage);
    }

    /// Number of host processors
    pub fn processor_count(&self) -> usize {
        self.processors.len()
    }

    /// Create or join the tick controller for `asset` ahead of its first use
    pub fn register_asset(&mut self, asset: &BehaviorAsset) -> ControllerId {
        let before = self.registry.len();
        let id = self
            .registry
            .get_or_create_controller(asset, &mut self.signals, &self.config);
        self.totals.controllers_created += self.registry.len() - before;
        id
    }

    /// Register `asset` and run its controller in `mode`
    ///
    /// The mode belongs to the controller, so it also applies to other assets
    /// with the same requirements.
    pub fn register_asset_with_mode(
        &mut self,
        asset: &BehaviorAsset,
        mode: ExecutionMode,
    ) -> ControllerId {
        let id = self.register_asset(asset);
        self.registry.set_mode(id, mode);
        id
    }

    /// Override the execution mode of an existing controller
    pub fn set_controller_mode(&mut self, id: ControllerId, mode: ExecutionMode) -> bool {
        self.registry.set_mode(id, mode)
    }

    /// Run one frame at simulation time `now`
    ///
    /// Returns the counters of the frame.
    pub fn run_frame(&mut self, world: &mut World, now: f64) -> &FrameStats {
        world.watch_removals::<BehaviorInstance>();
        self.now = now;
        self.frame += 1;
        let mut stats = FrameStats::new();

        let delivered = self.signals.advance(now);

        let split = self
            .processors
            .partition_point(|p| p.stage < stages::BEHAVIOR);
        for scheduled in &mut self.processors[..split] {
            scheduled.processor.run(world, &mut self.signals);
        }

        self.finalizer
            .run(world, &mut self.arena, &mut self.signals, now, &mut stats);

        stats.controllers_created = self.registry.discover(world, &mut self.signals, &self.config);

        self.activation.run(
            world,
            &mut self.arena,
            &mut self.signals,
            &self.config,
            now,
            &mut stats,
        );

        for controller in self.registry.controllers() {
            controller.run(world, &self.arena, &mut self.signals, now, &mut stats);
        }

        self.finalizer
            .run(world, &mut self.arena, &mut self.signals, now, &mut stats);

        for scheduled in &mut self.processors[split..] {
            scheduled.processor.run(world, &mut self.signals);
        }

        debug!(
            frame = self.frame,
            now,
            delivered,
            activated = stats.activated(),
            deferred = stats.deferred(),
            ticks = stats.ticks,
            reticks = stats.reticks,
            resignaled = stats.resignaled,
            stale = stats.stale_handles,
            aborted = stats.aborted_batches,
            finalized = stats.finalized,
            "Frame complete"
        );

        self.totals.merge(&stats);
        self.last_frame = stats;
        &self.last_frame
    }

    /// Advance the clock by `delta_time` and run one frame
    pub fn step(&mut self, world: &mut World, delta_time: f64) -> &FrameStats {
        let now = self.now + delta_time.max(0.0);
        self.run_frame(world, now)
    }

    /// Stop and free every live instance
    ///
    /// Entities keep their behavior state with an unset handle and lose the
    /// activation tag. Returns the number of instances released.
    pub fn shutdown(&mut self, world: &mut World) -> usize {
        let mut stats = FrameStats::new();
        let freed = self.finalizer.finalize_all(
            world,
            &mut self.arena,
            &mut self.signals,
            self.now,
            &mut stats,
        );
        self.totals.merge(&stats);
        info!(
            freed,
            frames = self.frame,
            controllers = self.registry.len(),
            "Behavior scheduler shut down"
        );
        freed
    }

    /// Instance arena
    pub fn arena(&self) -> &InstanceArena {
        &self.arena
    }

    /// Signal bus
    pub fn signals(&self) -> &SignalBus {
        &self.signals
    }

    /// Signal bus, for raising host signals between frames
    pub fn signals_mut(&mut self) -> &mut SignalBus {
        &mut self.signals
    }

    /// Controller registry
    pub fn registry(&self) -> &SchedulerRegistry {
        &self.registry
    }

    /// Active configuration
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Simulation time of the last frame
    pub fn now(&self) -> f64 {
        self.now
    }

    /// Number of frames run
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Counters of the last frame
    pub fn last_frame_stats(&self) -> &FrameStats {
        &self.last_frame
    }

    /// Counters summed over every frame and the shutdown
    pub fn total_stats(&self) -> &FrameStats {
        &self.totals
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::with_valid_config(SchedulerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::InstanceData;
    use crate::behavior::{BehaviorAssetRef, ExecutionContext, RunStatus, StateMachine};
    use crate::ecs::EntityBuilder;
    use parking_lot::Mutex;
    use std::sync::Arc;

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Processor for Recorder {
        fn run(&mut self, _world: &mut World, _signals: &mut SignalBus) {
            self.log.lock().push(self.name);
        }

        fn name(&self) -> &str {
            self.name
        }
    }

    struct Idle;

    impl StateMachine for Idle {
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

        fn stop(&self, _ctx: &mut ExecutionContext<'_>, _instance: &mut InstanceData) {}
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = SchedulerConfig::default().with_tier_caps(Vec::<usize>::new());
        assert!(matches!(
            Scheduler::new(config),
            Err(SchedulerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_processors_run_in_stage_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut scheduler = Scheduler::default();
        for (name, stage) in [
            ("post", stages::POST_BEHAVIOR),
            ("classify", stages::CLASSIFY),
            ("behavior", stages::BEHAVIOR),
            ("pre", stages::PRE_BEHAVIOR),
            ("classify-2", stages::CLASSIFY),
        ] {
            scheduler.add_processor(
                Recorder {
                    name,
                    log: Arc::clone(&log),
                },
                stage,
            );
        }
        assert_eq!(scheduler.processor_count(), 5);

        scheduler.run_frame(&mut World::new(), 0.0);

        assert_eq!(
            log.lock().as_slice(),
            &["classify", "classify-2", "pre", "behavior", "post"]
        );
    }

    #[test]
    fn test_step_advances_clock() {
        let mut scheduler = Scheduler::default();
        let mut world = World::new();
        scheduler.step(&mut world, 0.25);
        scheduler.step(&mut world, -1.0);
        scheduler.step(&mut world, 0.25);
        assert_eq!(scheduler.now(), 0.5);
        assert_eq!(scheduler.frame(), 3);
    }

    #[test]
    fn test_register_asset_counts_controllers() {
        let mut scheduler = Scheduler::default();
        let asset = BehaviorAsset::link("idle", Idle);
        let first = scheduler.register_asset(&asset);
        let second = scheduler.register_asset(&asset);
        assert_eq!(first, second);
        assert_eq!(scheduler.total_stats().controllers_created, 1);

        let mut world = World::new();
        world.spawn(
            EntityBuilder::new()
                .with(BehaviorInstance::new())
                .with_shared(BehaviorAssetRef::new(&asset)),
        );
        let stats = scheduler.run_frame(&mut world, 0.0);
        assert_eq!(stats.controllers_created, 0);
        assert_eq!(stats.activated(), 1);
        assert_eq!(stats.ticks, 1);
    }
}
