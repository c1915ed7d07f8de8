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
//! # Behavior Scheduler
//!
//! Runs one hierarchical state machine per entity over a batched
//! entity/fragment store, frame by frame.
//!
//! ## Features
//!
//! - **Instance Arena**: generational slots holding per-entity machine memory
//! - **Requirement-keyed controllers**: assets with equal data dependencies
//!   share one tick controller
//! - **Admission control**: per-importance-tier activation budgets
//! - **Signal-driven ticking**: entities are only ticked when a signal reached
//!   them, with one immediate re-tick for unsettled machines
//! - **Parallelization**: optional Rayon integration for batch-parallel ticks
//!
//! ## Example
//!
//! ```rust
//! use behavior_scheduler::arena::InstanceData;
//! use behavior_scheduler::behavior::{
//!     BehaviorAsset, BehaviorAssetRef, BehaviorInstance, ExecutionContext, RunStatus,
//!     StateMachine,
//! };
//! use behavior_scheduler::ecs::{EntityBuilder, World};
//! use behavior_scheduler::{Scheduler, SchedulerConfig};
//!
//! struct Wander;
//!
//! impl StateMachine for Wander {
//!     fn start(&self, _ctx: &mut ExecutionContext<'_>, _instance: &mut InstanceData) -> RunStatus {
//!         RunStatus::Running
//!     }
//!
//!     fn tick(
//!         &self,
//!         _ctx: &mut ExecutionContext<'_>,
//!         _instance: &mut InstanceData,
//!         _delta_time: f64,
//!     ) -> RunStatus {
//!         RunStatus::Running
//!     }
//!
//!     fn stop(&self, _ctx: &mut ExecutionContext<'_>, _instance: &mut InstanceData) {}
//! }
//!
//! let asset = BehaviorAsset::link("wander", Wander);
//! let mut world = World::new();
//! world.spawn(
//!     EntityBuilder::new()
//!         .with(BehaviorInstance::new())
//!         .with_shared(BehaviorAssetRef::new(&asset)),
//! );
//!
//! let mut scheduler = Scheduler::new(SchedulerConfig::default()).unwrap();
//! let stats = scheduler.step(&mut world, 1.0 / 60.0);
//! assert_eq!(stats.activated(), 1);
//! ```

#![warn(missing_docs)]

/// Generational storage for behavior instance memory
pub mod arena;

/// Behavior assets, dependencies and the execution context
pub mod behavior;

/// Scheduler configuration
pub mod config;

/// Batched entity/fragment store
pub mod ecs;

/// Error types
pub mod error;

/// Frame driver and controllers
pub mod scheduler;

/// Named entity signals
pub mod signal;

/// Per-frame counters
pub mod stats;

pub use arena::{InstanceArena, InstanceHandle};
pub use behavior::{BehaviorAsset, RunStatus, StateMachine};
pub use config::SchedulerConfig;
pub use ecs::{Entity, World};
pub use error::SchedulerError;
pub use scheduler::Scheduler;
pub use stats::FrameStats;
