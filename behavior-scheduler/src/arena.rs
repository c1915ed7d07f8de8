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
//! Instance arena
//!
//! Owns the runtime memory of every live behavior instance. Slots are
//! recycled through a free list and every slot carries a generation counter;
//! an [`InstanceHandle`] is valid only while its generation matches the
//! slot's. Every operation is total: stale, unset or out-of-range handles are
//! answered with `false`/`None`, never with a panic.
//!
//! # Generation wraparound
//!
//! Generations are 32-bit and wrap (skipping 0, which is reserved for the
//! unset handle). A handle kept across 2^32 - 1 free/allocate cycles of the
//! same slot would alias the newest instance. That is accepted: it is not
//! reachable in practice within one process lifetime.
//!
//! # Threading
//!
//! Bookkeeping (`allocate`, `free`) requires `&mut self`, so only the single
//! context that owns the arena can mutate it. Tick controllers running
//! batches in parallel only need `&self` and go through [`InstanceArena::lock`],
//! which hands out the per-slot lock of an already-valid slot.

use parking_lot::{Mutex, MutexGuard};
use std::any::Any;
use std::fmt;

/// Opaque per-entity machine memory
#[derive(Default)]
pub struct InstanceData {
    state: Option<Box<dyn Any + Send>>,
}

impl InstanceData {
    /// Whether nothing has been stored yet
    pub fn is_empty(&self) -> bool {
        self.state.is_none()
    }

    /// Stored state as `T`
    pub fn get<T: Any + Send>(&self) -> Option<&T> {
        self.state.as_ref().and_then(|s| s.downcast_ref::<T>())
    }

    /// Stored state as mutable `T`
    pub fn get_mut<T: Any + Send>(&mut self) -> Option<&mut T> {
        self.state.as_mut().and_then(|s| s.downcast_mut::<T>())
    }

    /// Replace the stored state
    pub fn insert<T: Any + Send>(&mut self, value: T) {
        self.state = Some(Box::new(value));
    }

    /// Run `f` on the stored state as `T`, initialising it (or replacing state
    /// of another type) with `init` first
    pub fn update_or_insert_with<T, R>(
        &mut self,
        init: impl FnOnce() -> T,
        f: impl FnOnce(&mut T) -> R,
    ) -> R
    where
        T: Any + Send,
    {
        let mut value = self
            .state
            .take()
            .and_then(|s| s.downcast::<T>().ok())
            .unwrap_or_else(|| Box::new(init()));
        let result = f(&mut value);
        self.state = Some(value);
        result
    }

    /// Drop the stored state
    pub fn clear(&mut self) {
        self.state = None;
    }
}

impl fmt::Debug for InstanceData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceData")
            .field("populated", &self.state.is_some())
            .finish()
    }
}

/// Generation-tagged reference to an arena slot
///
/// The all-zero value is the unset sentinel; it never validates because slot
/// generations start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct InstanceHandle {
    index: u32,
    generation: u32,
}

impl InstanceHandle {
    /// The unset handle
    pub const UNSET: InstanceHandle = InstanceHandle {
        index: 0,
        generation: 0,
    };

    /// Slot index
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Slot generation at allocation time
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Whether this is the unset sentinel
    pub fn is_unset(&self) -> bool {
        *self == Self::UNSET
    }
}

impl fmt::Display for InstanceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Instance({}, gen: {})", self.index, self.generation)
    }
}

struct Slot {
    data: Mutex<InstanceData>,
    generation: u32,
}

/// Free-list backed arena of behavior instances
#[derive(Default)]
pub struct InstanceArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl InstanceArena {
    /// Create an empty arena
    pub fn new() -> Self {
        InstanceArena {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    /// Create an arena with room for `capacity` slots before reallocating
    pub fn with_capacity(capacity: usize) -> Self {
        InstanceArena {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
        }
    }

    /// Hand out a slot with empty instance memory
    ///
    /// Reuses a freed slot when one exists, otherwise grows the arena.
    pub fn allocate(&mut self) -> InstanceHandle {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot {
                    data: Mutex::new(InstanceData::default()),
                    generation: 1,
                });
                (self.slots.len() - 1) as u32
            }
        };
        let slot = &mut self.slots[index as usize];
        slot.data.get_mut().clear();
        InstanceHandle {
            index,
            generation: slot.generation,
        }
    }

    /// Release the slot behind `handle`
    ///
    /// Stale, unset and out-of-range handles are ignored so that two teardown
    /// paths racing on the same entity cannot double-free. Returns whether a
    /// slot was released.
    pub fn free(&mut self, handle: InstanceHandle) -> bool {
        if !self.is_valid(handle) {
            return false;
        }
        let slot = &mut self.slots[handle.index as usize];
        slot.data.get_mut().clear();
        slot.generation = next_generation(slot.generation);
        self.free.push(handle.index);
        true
    }

    /// Instance memory behind a valid handle
    pub fn get(&mut self, handle: InstanceHandle) -> Option<&mut InstanceData> {
        if !self.is_valid(handle) {
            return None;
        }
        Some(self.slots[handle.index as usize].data.get_mut())
    }

    /// Lock the instance memory behind a valid handle through a shared
    /// reference
    pub fn lock(&self, handle: InstanceHandle) -> Option<MutexGuard<'_, InstanceData>> {
        if !self.is_valid(handle) {
            return None;
        }
        Some(self.slots[handle.index as usize].data.lock())
    }

    /// Whether `handle` refers to the current occupant of its slot
    pub fn is_valid(&self, handle: InstanceHandle) -> bool {
        self.slots
            .get(handle.index as usize)
            .map(|slot| slot.generation == handle.generation)
            .unwrap_or(false)
    }

    /// Number of slots ever created
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of slots currently handed out
    pub fn active_count(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Number of slots waiting for reuse
    pub fn free_count(&self) -> usize {
        self.free.len()
    }
}

fn next_generation(generation: u32) -> u32 {
    match generation.wrapping_add(1) {
        0 => 1,
        next => next,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_handle_is_never_valid() {
        let mut arena = InstanceArena::new();
        assert!(!arena.is_valid(InstanceHandle::UNSET));
        let first = arena.allocate();
        assert_eq!(first.index(), 0);
        assert!(!arena.is_valid(InstanceHandle::UNSET));
        assert!(InstanceHandle::default().is_unset());
        assert!(!first.is_unset());
    }

    #[test]
    fn test_get_agrees_with_is_valid() {
        let mut arena = InstanceArena::new();
        let live = arena.allocate();
        let dead = arena.allocate();
        arena.free(dead);
        let out_of_range = InstanceHandle {
            index: 99,
            generation: 1,
        };

        for handle in [live, dead, out_of_range, InstanceHandle::UNSET] {
            let valid = arena.is_valid(handle);
            assert_eq!(arena.get(handle).is_some(), valid);
            assert_eq!(arena.lock(handle).is_some(), valid);
        }
    }

    #[test]
    fn test_allocate_free_round_trip() {
        let mut arena = InstanceArena::new();
        let h = arena.allocate();
        assert!(arena.free(h));
        let h2 = arena.allocate();

        assert_eq!(h2.index(), h.index());
        assert_ne!(h2.generation(), h.generation());
        assert!(!arena.is_valid(h));
        assert!(arena.is_valid(h2));
    }

    #[test]
    fn test_freed_handle_stays_invalid() {
        let mut arena = InstanceArena::new();
        let h = arena.allocate();
        arena.free(h);
        for _ in 0..1000 {
            let next = arena.allocate();
            assert!(!arena.is_valid(h));
            arena.free(next);
        }
        assert!(!arena.is_valid(h));
    }

    #[test]
    fn test_double_free_is_ignored() {
        let mut arena = InstanceArena::new();
        let h = arena.allocate();
        assert!(arena.free(h));
        assert!(!arena.free(h));
        assert_eq!(arena.free_count(), 1);
        assert_eq!(arena.active_count(), 0);
    }

    #[test]
    fn test_reused_slot_starts_empty() {
        let mut arena = InstanceArena::new();
        let h = arena.allocate();
        arena.get(h).unwrap().insert(17u32);
        arena.free(h);

        let h2 = arena.allocate();
        assert!(arena.get(h2).unwrap().is_empty());
    }

    #[test]
    fn test_instance_data_typed_access() {
        let mut data = InstanceData::default();
        assert!(data.is_empty());
        data.update_or_insert_with(|| 1u64, |v| *v += 4);
        assert_eq!(data.get::<u64>(), Some(&5));
        assert!(data.get::<u32>().is_none());
        data.clear();
        assert!(data.is_empty());
    }

    #[test]
    fn test_update_replaces_state_of_another_type() {
        let mut data = InstanceData::default();
        data.insert(3u32);

        let doubled = data.update_or_insert_with(
            || 10u64,
            |v| {
                *v *= 2;
                *v
            },
        );

        assert_eq!(doubled, 20);
        assert!(data.get::<u32>().is_none());
        assert_eq!(data.update_or_insert_with(|| 0u64, |v| *v), 20);
    }

    #[test]
    fn test_generation_skips_zero_on_wrap() {
        assert_eq!(next_generation(u32::MAX), 1);
        assert_eq!(next_generation(1), 2);
    }
}
