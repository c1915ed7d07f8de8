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
//! Per-entity scheduling state

use crate::arena::InstanceHandle;
use crate::ecs::{ChunkFragment, Fragment, Tag};

/// Which arena slot backs the entity's machine and when it was last ticked
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BehaviorInstance {
    /// Arena slot, [`InstanceHandle::UNSET`] until activation
    pub handle: InstanceHandle,
    /// Simulation time of the last start or tick
    pub last_update_time: f64,
}

impl BehaviorInstance {
    /// Scheduling state of an entity that still needs activation
    pub fn new() -> Self {
        BehaviorInstance {
            handle: InstanceHandle::UNSET,
            last_update_time: 0.0,
        }
    }
}

impl Fragment for BehaviorInstance {}

/// Present once the entity's machine has been started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BehaviorActivated;

impl Tag for BehaviorActivated {}

/// Importance classification of a whole batch, 0 being most important
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ImportanceTier(pub u8);

impl ChunkFragment for ImportanceTier {}
