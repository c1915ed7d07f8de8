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
//! Requirement-keyed controller registry
//!
//! Maps the hash of an asset's dependency set to the tick controller serving
//! it. Assets with set-equal dependencies share one controller; the controller
//! tells their batches apart through its handled-asset list.
//!
//! Controllers are created on first sight of a novel hash and live as long as
//! the registry. Nothing is ever unregistered.

use crate::behavior::{AssetId, BehaviorAsset, BehaviorAssetRef, BehaviorInstance};
use crate::config::{ExecutionMode, SchedulerConfig};
use crate::ecs::World;
use crate::scheduler::tick::{ControllerId, TickController};
use crate::signal::{signals, SignalBus, SignalName};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::any::TypeId;
use tracing::{debug, info, warn};

/// Owner of every tick controller of a session
#[derive(Default)]
pub struct SchedulerRegistry {
    entries: FxHashMap<u64, ControllerId>,
    controllers: Vec<TickController>,
    assets: FxHashMap<AssetId, ControllerId>,
}

impl SchedulerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        SchedulerRegistry {
            entries: FxHashMap::default(),
            controllers: Vec::new(),
            assets: FxHashMap::default(),
        }
    }

    /// Controller serving `asset`'s requirement hash, created if needed
    ///
    /// New controllers subscribe to the built-in signals plus the configured
    /// extra signals. Registering the same asset twice is a no-op.
    pub fn get_or_create_controller(
        &mut self,
        asset: &BehaviorAsset,
        bus: &mut SignalBus,
        config: &SchedulerConfig,
    ) -> ControllerId {
        let hash = asset.requirement_hash();
        if let Some(&id) = self.entries.get(&hash) {
            if let Some(controller) = self.controllers.get_mut(id.index()) {
                if controller.dependencies() != asset.dependencies() {
                    warn!(
                        asset = %asset.name(),
                        controller = %controller.name(),
                        "Requirement hash collision, asset shares a controller with different dependencies"
                    );
                }
                controller.add_asset(asset.id());
            }
            self.assets.insert(asset.id(), id);
            return id;
        }

        let id = ControllerId(self.controllers.len());
        let mut names: SmallVec<[SignalName; 4]> = SmallVec::from_slice(&[
            signals::ACTIVATED,
            signals::REEVALUATE,
            signals::DELAYED_TRANSITION_WAKEUP,
        ]);
        names.extend(config.extra_signals.iter().copied());
        let subscriber = bus.subscribe(&names);

        let mut controller = TickController::new(id, asset, subscriber, config.tick_mode);
        controller.add_asset(asset.id());
        info!(
            controller = %controller.name(),
            asset = %asset.name(),
            requirements = controller.requirements().len(),
            "Created tick controller"
        );

        self.controllers.push(controller);
        self.entries.insert(hash, id);
        self.assets.insert(asset.id(), id);
        id
    }

    /// Register the asset of every behavior batch not seen before
    ///
    /// Returns the number of controllers created.
    pub(crate) fn discover(
        &mut self,
        world: &World,
        bus: &mut SignalBus,
        config: &SchedulerConfig,
    ) -> usize {
        let before = self.controllers.len();
        let instance = TypeId::of::<BehaviorInstance>();
        for archetype in world.archetypes() {
            if !archetype.has_fragment(instance) || archetype.entity_count() == 0 {
                continue;
            }
            let Some(asset_ref) = archetype.shared().get::<BehaviorAssetRef>() else {
                continue;
            };
            if !self.assets.contains_key(&asset_ref.asset().id()) {
                self.get_or_create_controller(asset_ref.asset(), bus, config);
            }
        }
        self.controllers.len() - before
    }

    /// Override the batch execution mode of one controller
    ///
    /// Controllers start in the configured `tick_mode`. The override applies
    /// to every asset the controller serves. Returns false for an unknown id.
    pub fn set_mode(&mut self, id: ControllerId, mode: ExecutionMode) -> bool {
        let Some(controller) = self.controllers.get_mut(id.index()) else {
            return false;
        };
        if controller.mode() != mode {
            debug!(controller = %controller.name(), ?mode, "Execution mode changed");
            controller.set_mode(mode);
        }
        true
    }

    /// Controller by id
    pub fn controller(&self, id: ControllerId) -> Option<&TickController> {
        self.controllers.get(id.index())
    }

    /// Controller registered for a requirement hash
    pub fn controller_for_hash(&self, hash: u64) -> Option<&TickController> {
        self.entries.get(&hash).and_then(|id| self.controller(*id))
    }

    /// Controller an asset was registered with
    pub fn controller_of(&self, asset: AssetId) -> Option<ControllerId> {
        self.assets.get(&asset).copied()
    }

    /// All controllers in creation order
    pub fn controllers(&self) -> &[TickController] {
        &self.controllers
    }

    /// Number of controllers
    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    /// Whether no controller exists yet
    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }
}
