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
//! Execution context handed to state machines
//!
//! A context wraps exactly one `start`, `tick` or `stop` call for one entity.
//! It gives the machine access to the entity's row in the batch being
//! processed, the batch's shared values and the world services, and it
//! collects everything the machine wants to change outside its own row:
//! structural commands, signals and delayed transitions. Collected output is
//! applied by the controller after the batch completes.

use crate::ecs::{
    Chunk, ChunkFragment, CommandBuffer, Entity, Fragment, Services, SharedFragment,
    SharedFragments, World,
};
use crate::signal::{signals, SignalBus, SignalName};
use std::any::Any;

/// Output of one batch, applied once the batch has been fully processed
#[derive(Default)]
pub(crate) struct BatchOutbox {
    pub(crate) commands: CommandBuffer,
    pub(crate) signals: Vec<(SignalName, Entity)>,
    pub(crate) delayed: Vec<(SignalName, Entity, f64)>,
}

impl BatchOutbox {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn append(&mut self, other: &mut BatchOutbox) {
        self.commands.append(&mut other.commands);
        self.signals.append(&mut other.signals);
        self.delayed.append(&mut other.delayed);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.commands.is_empty() && self.signals.is_empty() && self.delayed.is_empty()
    }

    /// Apply structural commands, then send the collected signals
    pub(crate) fn flush(&mut self, world: &mut World, bus: &mut SignalBus) {
        world.apply_commands(&mut self.commands);
        for (name, entity) in self.signals.drain(..) {
            bus.signal_entity(name, entity);
        }
        for (name, entity, delay) in self.delayed.drain(..) {
            bus.delay_signal_entity(name, entity, delay);
        }
    }
}

/// Per-entity view passed to [`StateMachine`](crate::behavior::StateMachine)
/// calls
pub struct ExecutionContext<'a> {
    entity: Entity,
    now: f64,
    delta_time: f64,
    row: Option<(&'a mut Chunk, usize)>,
    shared: Option<&'a SharedFragments>,
    services: &'a Services,
    outbox: &'a mut BatchOutbox,
    received: &'a [SignalName],
}

impl<'a> ExecutionContext<'a> {
    pub(crate) fn new(
        entity: Entity,
        now: f64,
        services: &'a Services,
        outbox: &'a mut BatchOutbox,
    ) -> Self {
        ExecutionContext {
            entity,
            now,
            delta_time: 0.0,
            row: None,
            shared: None,
            services,
            outbox,
            received: &[],
        }
    }

    pub(crate) fn with_row(mut self, chunk: &'a mut Chunk, row: usize) -> Self {
        self.row = Some((chunk, row));
        self
    }

    pub(crate) fn with_shared(mut self, shared: &'a SharedFragments) -> Self {
        self.shared = Some(shared);
        self
    }

    pub(crate) fn with_signals(mut self, received: &'a [SignalName]) -> Self {
        self.received = received;
        self
    }

    pub(crate) fn set_delta_time(&mut self, delta_time: f64) {
        self.delta_time = delta_time;
    }

    /// The entity this call runs for
    pub fn entity(&self) -> Entity {
        self.entity
    }

    /// Simulation time of the current frame
    pub fn now(&self) -> f64 {
        self.now
    }

    /// Elapsed time passed to the current tick, 0 outside of ticks
    pub fn delta_time(&self) -> f64 {
        self.delta_time
    }

    /// Fragment `T` of the entity
    ///
    /// `None` when the entity's row is not available, which is the case
    /// during `stop` for a despawned entity.
    pub fn fragment<T: Fragment>(&self) -> Option<&T> {
        let (chunk, row) = self.row.as_ref()?;
        chunk.get::<T>(*row)
    }

    /// Mutable fragment `T` of the entity
    pub fn fragment_mut<T: Fragment>(&mut self) -> Option<&mut T> {
        let (chunk, row) = self.row.as_mut()?;
        chunk.get_mut::<T>(*row)
    }

    /// Chunk-scoped value `T` of the entity's batch
    pub fn chunk_fragment<T: ChunkFragment>(&self) -> Option<&T> {
        let (chunk, _) = self.row.as_ref()?;
        chunk.chunk_fragment::<T>()
    }

    /// Shared value `T` of the entity's archetype
    pub fn shared<T: SharedFragment>(&self) -> Option<&T> {
        self.shared?.get::<T>()
    }

    /// World service `T`
    pub fn service<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.services.get::<T>()
    }

    /// Deferred structural commands, applied after the batch
    pub fn commands(&mut self) -> &mut CommandBuffer {
        &mut self.outbox.commands
    }

    /// Send `name` to `entity` once the batch is done
    pub fn signal(&mut self, name: SignalName, entity: Entity) {
        self.outbox.signals.push((name, entity));
    }

    /// Send `name` to `entity` after `delay` seconds
    pub fn delay_signal(&mut self, name: SignalName, entity: Entity, delay: f64) {
        self.outbox.delayed.push((name, entity, delay));
    }

    /// Ask to be ticked again once `delay` seconds have passed
    ///
    /// Never blocks: a wake-up signal is scheduled for the entity and the
    /// machine is expected to report its pending transition on that tick.
    pub fn request_delayed_transition(&mut self, delay: f64) {
        let entity = self.entity;
        self.delay_signal(signals::DELAYED_TRANSITION_WAKEUP, entity, delay);
    }

    /// Signals that woke the entity up this frame
    pub fn received_signals(&self) -> &[SignalName] {
        self.received
    }

    /// Whether `name` is among the signals received this frame
    pub fn has_received(&self, name: SignalName) -> bool {
        self.received.contains(&name)
    }
}
