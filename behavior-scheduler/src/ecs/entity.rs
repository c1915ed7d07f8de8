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
//! Entity handles
//!
//! Entities are opaque agent identifiers. A handle pairs a slot id with the
//! generation the slot had when the entity was spawned, so a handle kept past
//! the entity's despawn never resolves to whoever reuses the slot.
//!
//! [`EntitySlots`] is the table behind that rule: it hands out handles, maps
//! live handles to a per-entity record and retires handles on release.

use std::fmt;

/// Slot identifier of an entity inside the [`World`](crate::ecs::World)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(u64);

impl EntityId {
    /// Create a new EntityId from a raw u64 value
    pub fn new(id: u64) -> Self {
        EntityId(id)
    }

    /// Get the raw u64 value
    pub fn raw(&self) -> u64 {
        self.0
    }

    pub(crate) fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({})", self.0)
    }
}

/// Generational entity handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Entity {
    id: EntityId,
    generation: u32,
}

impl Entity {
    /// Create a new entity with the given ID and generation
    pub fn new(id: u64, generation: u32) -> Self {
        Entity {
            id: EntityId::new(id),
            generation,
        }
    }

    /// Get the entity ID
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Get the generation number
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({}, gen: {})", self.id.0, self.generation)
    }
}

struct Slot<T> {
    generation: u32,
    record: Option<T>,
}

/// Generation-checked table of per-entity records
pub(crate) struct EntitySlots<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u64>,
    alive: usize,
}

impl<T> EntitySlots<T> {
    pub(crate) fn new() -> Self {
        EntitySlots {
            slots: Vec::new(),
            free: Vec::new(),
            alive: 0,
        }
    }

    /// Hand out a handle for `record`, reusing a released slot if one exists
    pub(crate) fn allocate(&mut self, record: T) -> Entity {
        self.alive += 1;
        if let Some(id) = self.free.pop() {
            if let Some(slot) = self.slots.get_mut(id as usize) {
                slot.record = Some(record);
                return Entity::new(id, slot.generation);
            }
        }
        self.slots.push(Slot {
            generation: 0,
            record: Some(record),
        });
        Entity::new((self.slots.len() - 1) as u64, 0)
    }

    fn slot(&self, entity: Entity) -> Option<&Slot<T>> {
        self.slots
            .get(entity.id().index())
            .filter(|slot| slot.generation == entity.generation())
    }

    /// Record of a live entity; `None` once the handle has been released
    pub(crate) fn get(&self, entity: Entity) -> Option<&T> {
        self.slot(entity)?.record.as_ref()
    }

    pub(crate) fn get_mut(&mut self, entity: Entity) -> Option<&mut T> {
        self.slots
            .get_mut(entity.id().index())
            .filter(|slot| slot.generation == entity.generation())?
            .record
            .as_mut()
    }

    /// Retire `entity` and queue its slot for reuse under the next generation
    pub(crate) fn release(&mut self, entity: Entity) -> Option<T> {
        let slot = self
            .slots
            .get_mut(entity.id().index())
            .filter(|slot| slot.generation == entity.generation())?;
        let record = slot.record.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(entity.id().raw());
        self.alive -= 1;
        Some(record)
    }

    /// Number of live entities
    pub(crate) fn len(&self) -> usize {
        self.alive
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_creation() {
        let entity = Entity::new(42, 1);
        assert_eq!(entity.id().raw(), 42);
        assert_eq!(entity.id().index(), 42);
        assert_eq!(entity.generation(), 1);
    }

    #[test]
    fn test_entity_equality_includes_generation() {
        let e1 = Entity::new(1, 0);
        let e2 = Entity::new(1, 0);
        let e3 = Entity::new(1, 1);
        assert_eq!(e1, e2);
        assert_ne!(e1, e3);
    }

    #[test]
    fn test_entity_display() {
        assert_eq!(Entity::new(7, 3).to_string(), "Entity(7, gen: 3)");
    }

    #[test]
    fn test_released_handle_stops_resolving() {
        let mut slots = EntitySlots::new();
        let a = slots.allocate("a");
        let b = slots.allocate("b");
        assert_eq!(slots.len(), 2);

        assert_eq!(slots.release(a), Some("a"));
        assert_eq!(slots.get(a), None);
        assert_eq!(slots.release(a), None);
        assert_eq!(slots.get(b), Some(&"b"));
        assert_eq!(slots.len(), 1);
    }

    #[test]
    fn test_reused_slot_gets_next_generation() {
        let mut slots = EntitySlots::new();
        let first = slots.allocate(1);
        slots.release(first);

        let second = slots.allocate(2);

        assert_eq!(second.id(), first.id());
        assert_eq!(second.generation(), first.generation() + 1);
        assert_eq!(slots.get(first), None);
        if let Some(record) = slots.get_mut(second) {
            *record += 10;
        }
        assert_eq!(slots.get(second), Some(&12));
    }
}
