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
//! Host processors
//!
//! Processors are the host's own per-frame logic: classifying batches into
//! importance tiers, spawning agents, raising gameplay signals. They run in
//! stage order around the built-in behavior stage.

use crate::ecs::World;
use crate::signal::SignalBus;

/// Stage identifier for ordering processors
///
/// Stages execute in ascending order. Processors within one stage run in the
/// order they were added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StageId(pub usize);

impl StageId {
    /// Create a new stage ID
    pub fn new(id: usize) -> Self {
        StageId(id)
    }
}

/// Pre-defined stages
pub mod stages {
    use super::StageId;

    /// Batch classification, e.g. writing importance tiers
    pub const CLASSIFY: StageId = StageId(0);

    /// Anything else that must be visible to this frame's behavior pass
    pub const PRE_BEHAVIOR: StageId = StageId(1);

    /// The built-in finalize, activate and tick pass
    ///
    /// Processors added to this stage or later run after the pass.
    pub const BEHAVIOR: StageId = StageId(2);

    /// Consumers of the frame's behavior output
    pub const POST_BEHAVIOR: StageId = StageId(3);
}

/// Per-frame host logic run by the [`Scheduler`](crate::scheduler::Scheduler)
pub trait Processor: Send + Sync {
    /// Execute the processor
    fn run(&mut self, world: &mut World, signals: &mut SignalBus);

    /// Get the name of this processor for debugging
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

pub(crate) struct ScheduledProcessor {
    pub(crate) processor: Box<dyn Processor>,
    pub(crate) stage: StageId,
}
